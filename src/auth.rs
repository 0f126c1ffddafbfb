//! Authentication: JWT validation for NATS requests
//!
//! Tokens are issued by the account service; this worker only validates
//! them and extracts the acting user and tenant.

use anyhow::{anyhow, Result};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::Request;

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Tenant the user belongs to
    pub dealership_id: String,
    /// User role (admin, manager, advisor)
    #[serde(default = "default_role")]
    pub role: String,
    /// Issued at (unix timestamp)
    pub iat: usize,
    /// Expiration (unix timestamp)
    pub exp: usize,
}

fn default_role() -> String {
    "advisor".to_string()
}

/// Acting user and tenant of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub dealership_id: Uuid,
    pub role: String,
}

/// Validate a JWT token and return claims
pub fn validate_token(token: &str, secret: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| anyhow!("Invalid token: {}", e))?;

    Ok(token_data.claims)
}

/// Extract the auth context from a NATS request. A JWT is required.
pub fn extract_auth<T>(request: &Request<T>, jwt_secret: &str) -> Result<AuthContext> {
    let token = request
        .token
        .as_deref()
        .ok_or_else(|| anyhow!("No authentication provided, JWT token is required"))?;

    let claims = validate_token(token, jwt_secret)?;
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|e| anyhow!("Invalid user_id in token: {}", e))?;
    let dealership_id = Uuid::parse_str(&claims.dealership_id)
        .map_err(|e| anyhow!("Invalid dealership_id in token: {}", e))?;

    Ok(AuthContext {
        user_id,
        dealership_id,
        role: claims.role,
    })
}

// =============================================================================
// Tests
// =============================================================================
