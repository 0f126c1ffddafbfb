//! NATS message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generic request wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request<T> {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub token: Option<String>, // JWT access token
    pub payload: T,
}

impl<T> Request<T> {
    pub fn with_token(token: String, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            token: Some(token),
            payload,
        }
    }
}

/// Generic success response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponse<T> {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub payload: T,
}

impl<T> SuccessResponse<T> {
    pub fn new(request_id: Uuid, payload: T) -> Self {
        Self {
            id: request_id,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(request_id: Uuid, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: request_id,
            timestamp: Utc::now(),
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }
}

/// Queue introspection request; no state lists every state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueListRequest {
    #[serde(default)]
    pub state: Option<String>,
}

/// List response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_token_is_optional() {
        let json = serde_json::json!({
            "id": Uuid::nil(),
            "timestamp": "2025-10-15T10:00:00Z",
            "payload": { "state": "waiting" }
        });
        let request: Request<QueueListRequest> = serde_json::from_value(json).unwrap();
        assert!(request.token.is_none());
        assert_eq!(request.payload.state.as_deref(), Some("waiting"));
    }

    #[test]
    fn test_error_response_omits_empty_details() {
        let response = ErrorResponse::new(Uuid::nil(), "NOT_FOUND", "missing");
        let json = serde_json::to_value(&response).unwrap();
        assert!(json["error"].get("details").is_none());

        let detailed = response.with_details(serde_json::json!({ "limit": 10 }));
        assert_eq!(detailed.error.details.unwrap()["limit"], 10);
    }
}
