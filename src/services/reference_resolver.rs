//! Reference resolution
//!
//! Turns the denormalized dealer code and advisor reference carried by a
//! canonical row into persisted identifiers, auto-creating dealers when the
//! code is unknown. One resolver lives for one job and caches per code.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::db::{ImportStore, StoreError};
use crate::types::{CanonicalRow, DealerRef, DealerType, NewDealer};

/// Row-level resolution failure (recorded as a processing error)
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("dealer {0} belongs to another dealership")]
    CrossTenantDealer(String),
    #[error("advisor {0} belongs to another dealership")]
    CrossTenantAdvisor(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ResolveError {
    /// Canonical field the failure is attributed to
    pub fn field(&self) -> Option<&'static str> {
        match self {
            ResolveError::CrossTenantDealer(_) => Some("dealer_code"),
            ResolveError::CrossTenantAdvisor(_) => Some("advisor"),
            ResolveError::Store(_) => None,
        }
    }
}

/// Identifiers resolved for one row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolvedRefs {
    pub dealer_id: Option<Uuid>,
    pub advisor_id: Option<Uuid>,
}

pub struct ReferenceResolver {
    store: Arc<dyn ImportStore>,
    dealership_id: Uuid,
    default_assignee: Option<String>,
    dealers: HashMap<String, Uuid>,
    advisors: HashMap<String, Option<Uuid>>,
}

impl ReferenceResolver {
    pub fn new(
        store: Arc<dyn ImportStore>,
        dealership_id: Uuid,
        default_assignee: Option<String>,
    ) -> Self {
        let default_assignee = default_assignee
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        Self {
            store,
            dealership_id,
            default_assignee,
            dealers: HashMap::new(),
            advisors: HashMap::new(),
        }
    }

    /// Resolve every reference a row carries
    pub async fn resolve(&mut self, row: &CanonicalRow) -> Result<ResolvedRefs, ResolveError> {
        let dealer_id = match row.dealer_ref() {
            Some(dealer) => Some(self.resolve_dealer(dealer).await?),
            None => None,
        };

        let reference = row
            .advisor_ref()
            .map(str::to_string)
            .or_else(|| self.default_assignee.clone());
        let advisor_id = match reference {
            Some(reference) => self.resolve_advisor(&reference).await?,
            None => None,
        };

        Ok(ResolvedRefs {
            dealer_id,
            advisor_id,
        })
    }

    /// Look up a dealer by code within the tenant, creating it when absent
    pub async fn resolve_dealer(&mut self, dealer: &DealerRef) -> Result<Uuid, ResolveError> {
        let code = dealer.code.trim().to_uppercase();
        if let Some(id) = self.dealers.get(&code) {
            return Ok(*id);
        }

        let stored = match self.store.find_dealer_by_code(&code).await? {
            Some(existing) => existing,
            None => {
                let new = NewDealer {
                    dealership_id: self.dealership_id,
                    code: code.clone(),
                    name: dealer.name.clone().unwrap_or_else(|| code.clone()),
                    zone: dealer.zone.clone(),
                    region: dealer.region.clone(),
                    dealer_type: DealerType::from_code(&code),
                };
                let created = self.store.create_dealer_if_absent(&new).await?;
                if created.dealership_id == self.dealership_id {
                    info!(
                        "Auto-created dealer {} ({:?}) for dealership {}",
                        created.code, created.dealer_type, self.dealership_id
                    );
                }
                created
            }
        };

        if stored.dealership_id != self.dealership_id {
            return Err(ResolveError::CrossTenantDealer(code));
        }

        self.dealers.insert(code, stored.id);
        Ok(stored.id)
    }

    /// Resolve an advisor reference. Ambiguous or unknown references leave the
    /// row unassigned.
    pub async fn resolve_advisor(&mut self, reference: &str) -> Result<Option<Uuid>, ResolveError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Ok(None);
        }

        if let Ok(user_id) = Uuid::parse_str(reference) {
            return match self.store.get_advisor(user_id).await? {
                Some(user) if user.dealership_id != self.dealership_id => {
                    Err(ResolveError::CrossTenantAdvisor(user_id))
                }
                _ => Ok(Some(user_id)),
            };
        }

        let key = reference.to_lowercase();
        if let Some(cached) = self.advisors.get(&key) {
            return Ok(*cached);
        }

        let candidates = self
            .store
            .search_advisors(self.dealership_id, reference)
            .await?;
        let resolved = match candidates.as_slice() {
            [only] => {
                debug!("Advisor '{}' resolved to {}", reference, only.id);
                Some(only.id)
            }
            [] => {
                warn!("No advisor matches '{}'; leaving rows unassigned", reference);
                None
            }
            many => {
                warn!(
                    "Advisor '{}' is ambiguous ({} matches); leaving rows unassigned",
                    reference,
                    many.len()
                );
                None
            }
        };

        self.advisors.insert(key, resolved);
        Ok(resolved)
    }
}
