//! Error handling for the Plant Nursery Management Platform
//!
//! Domain rejections are typed and carry the figures a caller needs to
//! explain them. Infrastructure failures stay opaque.

use serde::Serialize;
use shared::{BatchStage, BatchStatus, Location, Pathway};
use thiserror::Error;
use uuid::Uuid;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error on {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict on {resource}: {message}")]
    Conflict { resource: String, message: String },

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    // Business rule errors
    #[error("{location} cannot accept {requested} plants ({occupied}/{capacity} occupied)")]
    CapacityExceeded {
        location: Location,
        capacity: i32,
        occupied: i32,
        requested: i32,
    },

    #[error("{pathway} batches cannot move from {from} to {to}")]
    InvalidTransition {
        pathway: Pathway,
        from: BatchStage,
        to: BatchStage,
    },

    #[error("Batch {batch_id} is {status} and can no longer change")]
    BatchTerminal { batch_id: Uuid, status: BatchStatus },

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    // Transient errors
    #[error("Concurrent update on {resource} after {attempts} attempt(s)")]
    ConcurrencyConflict { resource: String, attempts: u32 },

    // Infrastructure errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Infrastructure failure")]
    Infrastructure(#[from] anyhow::Error),
}

/// How a caller should react to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected input or rule violation; retrying will not help
    Permanent,
    /// Lost an optimistic race; the whole operation may be retried
    Transient,
    /// Storage or runtime failure outside the domain
    Infrastructure,
}

/// Error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str, id: Uuid) -> Self {
        AppError::NotFound(format!("{} {}", resource, id))
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict { .. } => "CONFLICT",
            AppError::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            AppError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            AppError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AppError::BatchTerminal { .. } => "BATCH_TERMINAL",
            AppError::InvalidQuantity(_) => "INVALID_QUANTITY",
            AppError::ConcurrencyConflict { .. } => "CONCURRENCY_CONFLICT",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
            AppError::Infrastructure(_) => "INFRASTRUCTURE_FAILURE",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::ConcurrencyConflict { .. } => ErrorKind::Transient,
            AppError::DatabaseError(_) | AppError::Internal(_) | AppError::Infrastructure(_) => {
                ErrorKind::Infrastructure
            }
            _ => ErrorKind::Permanent,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Structured form handed to the presentation layer
    pub fn to_response(&self) -> ErrorResponse {
        let (message, field, details) = match self {
            AppError::Validation { field, message } => (message.clone(), Some(field.clone()), None),
            AppError::Conflict { resource, message } => {
                (message.clone(), Some(resource.clone()), None)
            }
            AppError::CapacityExceeded {
                location,
                capacity,
                occupied,
                requested,
            } => (
                self.to_string(),
                None,
                Some(serde_json::json!({
                    "location": location,
                    "capacity": capacity,
                    "occupied": occupied,
                    "requested": requested,
                    "available": (capacity - occupied).max(0),
                })),
            ),
            AppError::InvalidTransition { pathway, from, to } => (
                self.to_string(),
                Some("to_stage".to_string()),
                Some(serde_json::json!({
                    "pathway": pathway,
                    "from": from,
                    "to": to,
                })),
            ),
            AppError::BatchTerminal { batch_id, status } => (
                self.to_string(),
                None,
                Some(serde_json::json!({ "batch_id": batch_id, "status": status })),
            ),
            AppError::ConcurrencyConflict { resource, attempts } => (
                "The record was changed by someone else. Please try again.".to_string(),
                None,
                Some(serde_json::json!({ "resource": resource, "attempts": attempts })),
            ),
            AppError::DatabaseError(_) | AppError::Internal(_) | AppError::Infrastructure(_) => {
                // Log the error for debugging
                tracing::error!(error = ?self, "infrastructure failure");
                ("An internal error occurred".to_string(), None, None)
            }
            _ => (self.to_string(), None, None),
        };

        ErrorResponse {
            error: ErrorDetail {
                code: self.code().to_string(),
                message,
                field,
                retryable: self.is_retryable(),
                details,
            },
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by_key(|(field, _)| *field);

        match fields.first() {
            Some((field, errs)) => {
                let message = errs
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field));
                AppError::validation(*field, message)
            }
            None => AppError::validation("input", "Invalid input"),
        }
    }
}

/// Result type alias for domain operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_error_carries_figures() {
        let err = AppError::CapacityExceeded {
            location: Location::Bed(Uuid::nil()),
            capacity: 900,
            occupied: 850,
            requested: 100,
        };
        let response = err.to_response();
        assert_eq!(response.error.code, "CAPACITY_EXCEEDED");
        assert!(!response.error.retryable);
        let details = response.error.details.unwrap();
        assert_eq!(details["capacity"], 900);
        assert_eq!(details["occupied"], 850);
        assert_eq!(details["available"], 50);
    }

    #[test]
    fn test_error_kinds() {
        let conflict = AppError::ConcurrencyConflict {
            resource: "batch".to_string(),
            attempts: 5,
        };
        assert_eq!(conflict.kind(), ErrorKind::Transient);
        assert!(conflict.to_response().error.retryable);

        assert_eq!(
            AppError::InvalidQuantity("too many".into()).kind(),
            ErrorKind::Permanent
        );
        assert_eq!(
            AppError::Infrastructure(anyhow::anyhow!("disk full")).kind(),
            ErrorKind::Infrastructure
        );
    }

    #[test]
    fn test_infrastructure_message_is_opaque() {
        let response = AppError::Internal("lock poisoned at store.rs:42".into()).to_response();
        assert_eq!(response.error.message, "An internal error occurred");
    }
}
