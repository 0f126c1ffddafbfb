//! Dealer and advisor types used by reference resolution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use uuid::Uuid;

/// Dealer type, inferred from the dealer code prefix on auto-create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "dealer_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DealerType {
    MainDealer,
    SubDealer,
    AuthorizedService,
    Outlet,
    Other,
}

impl DealerType {
    /// Infer the dealer type from a code such as `MD-0042` or `sd17`
    pub fn from_code(code: &str) -> Self {
        let prefix: String = code
            .trim()
            .chars()
            .take(2)
            .collect::<String>()
            .to_ascii_uppercase();
        match prefix.as_str() {
            "MD" => DealerType::MainDealer,
            "SD" => DealerType::SubDealer,
            "AS" => DealerType::AuthorizedService,
            "OL" => DealerType::Outlet,
            _ => DealerType::Other,
        }
    }
}

/// Dealer entity
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Dealer {
    pub id: Uuid,
    pub dealership_id: Uuid,
    pub code: String,
    pub name: String,
    pub zone: Option<String>,
    pub region: Option<String>,
    pub dealer_type: DealerType,
    pub auto_created: bool,
    pub created_at: DateTime<Utc>,
}

/// Dealer to be auto-created from a row's denormalized fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDealer {
    pub dealership_id: Uuid,
    pub code: String,
    pub name: String,
    pub zone: Option<String>,
    pub region: Option<String>,
    pub dealer_type: DealerType,
}

/// Sales advisor, read from the user directory
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Advisor {
    pub id: Uuid,
    pub dealership_id: Uuid,
    pub login: String,
    pub email: Option<String>,
    pub display_name: String,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dealer_type_from_code_prefix() {
        assert_eq!(DealerType::from_code("MD-0042"), DealerType::MainDealer);
        assert_eq!(DealerType::from_code("sd17"), DealerType::SubDealer);
        assert_eq!(DealerType::from_code("AS9"), DealerType::AuthorizedService);
        assert_eq!(DealerType::from_code(" OL-3"), DealerType::Outlet);
        assert_eq!(DealerType::from_code("X1"), DealerType::Other);
        assert_eq!(DealerType::from_code("M"), DealerType::Other);
    }
}
