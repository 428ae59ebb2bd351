//! Typed error handling for the engine
//!
//! One flat taxonomy covers every failure the request pipeline can produce.
//! Expected, recoverable-by-caller conditions (bad request, validation
//! failure, uniqueness conflict, not found) carry enough structure for the
//! caller to correct its input and are never logged as incidents. Backend
//! and internal failures are logged with full detail server-side and
//! surfaced with an opaque message.

use crate::core::validation::Notification;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::fmt;
use uuid::Uuid;

/// The error type for all engine operations.
#[derive(Debug)]
pub enum EngineError {
    /// Malformed filter/sort/view token or unknown field/entity reference.
    BadRequest { message: String },

    /// Hard constraint violations on a write. Carries the full violation
    /// list; nothing was persisted.
    ValidationFailed { notifications: Vec<Notification> },

    /// A unique field-group collision, detected pre-flight or by a
    /// backend-native index.
    UniqueViolation {
        fields: Vec<String>,
        values: Map<String, Value>,
    },

    /// No record with the given id.
    NotFound { entity: String, id: Uuid },

    /// Connection or timeout failure talking to a storage backend.
    BackendUnavailable { backend: String, message: String },

    /// Unexpected backend response shape or other internal failure.
    Internal { message: String },
}

impl EngineError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        EngineError::BadRequest {
            message: message.into(),
        }
    }

    pub fn unknown_entity(entity: &str) -> Self {
        Self::bad_request(format!("unknown entity type '{entity}'"))
    }

    pub fn not_found(entity: &str, id: Uuid) -> Self {
        EngineError::NotFound {
            entity: entity.to_string(),
            id,
        }
    }

    pub fn backend(backend: &str, message: impl Into<String>) -> Self {
        EngineError::BackendUnavailable {
            backend: backend.to_string(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        EngineError::Internal {
            message: message.into(),
        }
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            EngineError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            EngineError::ValidationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::UniqueViolation { .. } => StatusCode::CONFLICT,
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::BackendUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code for programmatic handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::BadRequest { .. } => "BAD_REQUEST",
            EngineError::ValidationFailed { .. } => "VALIDATION_FAILED",
            EngineError::UniqueViolation { .. } => "UNIQUE_CONSTRAINT_VIOLATION",
            EngineError::NotFound { .. } => "NOT_FOUND",
            EngineError::BackendUnavailable { .. } => "BACKEND_UNAVAILABLE",
            EngineError::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::BadRequest { message } => write!(f, "{message}"),
            EngineError::ValidationFailed { notifications } => {
                let fields: Vec<&str> = notifications
                    .iter()
                    .filter_map(|n| n.field.as_deref())
                    .collect();
                write!(f, "validation failed on fields: {}", fields.join(", "))
            }
            EngineError::UniqueViolation { fields, .. } => {
                write!(
                    f,
                    "unique constraint violated on field-group [{}]",
                    fields.join(", ")
                )
            }
            EngineError::NotFound { entity, id } => {
                write!(f, "{entity} with id '{id}' not found")
            }
            EngineError::BackendUnavailable { backend, message } => {
                write!(f, "storage backend '{backend}' unavailable: {message}")
            }
            EngineError::Internal { message } => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for EngineError {}

/// Error envelope for non-validation failures.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = match &self {
            // Validation outcomes use the notifications envelope so the
            // caller sees field/rule/message for every violation.
            EngineError::ValidationFailed { notifications } => {
                json!({ "notifications": notifications })
            }
            EngineError::UniqueViolation { fields, values } => {
                let notification =
                    Notification::unique(fields.clone(), values.clone());
                json!({ "notifications": [notification] })
            }
            EngineError::BadRequest { .. } | EngineError::NotFound { .. } => {
                serde_json::to_value(ErrorResponse {
                    code: self.error_code().to_string(),
                    message: self.to_string(),
                    details: match &self {
                        EngineError::NotFound { entity, id } => Some(json!({
                            "entity": entity,
                            "id": id.to_string(),
                        })),
                        _ => None,
                    },
                })
                .unwrap_or_else(|_| json!({ "code": self.error_code() }))
            }
            // Opaque to the caller, detailed in the server log.
            EngineError::BackendUnavailable { .. } | EngineError::Internal { .. } => {
                tracing::error!(error = %self, code = self.error_code(), "request failed");
                json!({
                    "code": self.error_code(),
                    "message": "the request could not be completed",
                })
            }
        };

        (status, Json(body)).into_response()
    }
}

/// A specialized Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::validation::rules;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            EngineError::bad_request("x").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            EngineError::ValidationFailed {
                notifications: vec![]
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            EngineError::UniqueViolation {
                fields: vec![],
                values: Map::new()
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            EngineError::not_found("user", Uuid::nil()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            EngineError::backend("mongodb", "refused").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            EngineError::internal("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_display() {
        let err = EngineError::not_found("user", Uuid::nil());
        assert!(err.to_string().contains("user"));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_unique_violation_display_names_group() {
        let err = EngineError::UniqueViolation {
            fields: vec!["userId".to_string(), "tag".to_string()],
            values: Map::new(),
        };
        assert!(err.to_string().contains("[userId, tag]"));
    }

    #[test]
    fn test_validation_failed_display_names_fields() {
        let err = EngineError::ValidationFailed {
            notifications: vec![
                Notification::blocking("username", rules::REQUIRED, "required"),
                Notification::blocking("email", rules::PATTERN, "bad email"),
            ],
        };
        let display = err.to_string();
        assert!(display.contains("username"));
        assert!(display.contains("email"));
    }

    #[test]
    fn test_unknown_entity_is_bad_request() {
        let err = EngineError::unknown_entity("ghost");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            EngineError::backend("es", "down").error_code(),
            "BACKEND_UNAVAILABLE"
        );
        assert_eq!(
            EngineError::not_found("url", Uuid::nil()).error_code(),
            "NOT_FOUND"
        );
    }
}
