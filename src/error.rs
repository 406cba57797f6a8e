// 🚨 Error taxonomy for the back-office core
//
// Every failure of the normalizer, reconciler or registrar is one of these.
// They abort the enclosing transaction and surface directly to the caller.

use thiserror::Error;

/// Stable, machine-readable error codes. Clients match on these, never on
/// the message text.
pub mod error_code {
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const INTEGRITY_VIOLATION: &str = "INTEGRITY_VIOLATION";
    pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
}

#[derive(Error, Debug)]
pub enum BackofficeError {
    /// Malformed input or an unresolvable reference.
    #[error("{0}")]
    Validation(String),

    /// The id does not exist, or does not belong to the claimed parent.
    #[error("{0}")]
    NotFound(String),

    /// Uniqueness, NOT NULL or foreign-key violation at the storage layer.
    #[error("{0}")]
    Integrity(String),

    /// Caller lacks the required permission. Raised before any mutation.
    #[error("{0}")]
    Permission(String),

    /// Any other storage failure.
    #[error("storage: {0}")]
    Storage(rusqlite::Error),
}

pub type Result<T, E = BackofficeError> = std::result::Result<T, E>;

impl BackofficeError {
    pub fn validation(message: impl Into<String>) -> Self {
        BackofficeError::Validation(message.into())
    }

    pub fn not_found(entity: &str, id: i64) -> Self {
        BackofficeError::NotFound(format!("{} with id {} not found", entity, id))
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            BackofficeError::Validation(_) => error_code::VALIDATION_FAILED,
            BackofficeError::NotFound(_) => error_code::NOT_FOUND,
            BackofficeError::Integrity(_) => error_code::INTEGRITY_VIOLATION,
            BackofficeError::Permission(_) => error_code::PERMISSION_DENIED,
            BackofficeError::Storage(_) => error_code::STORAGE_ERROR,
        }
    }

    pub fn is_integrity(&self) -> bool {
        matches!(self, BackofficeError::Integrity(_))
    }
}

impl From<rusqlite::Error> for BackofficeError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref code, ref message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                BackofficeError::Integrity(
                    message.clone().unwrap_or_else(|| code.to_string()),
                )
            }
            other => BackofficeError::Storage(other),
        }
    }
}

#[cfg(feature = "server")]
mod http {
    use super::BackofficeError;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};

    impl BackofficeError {
        pub fn status_code(&self) -> StatusCode {
            match self {
                BackofficeError::Validation(_) => StatusCode::BAD_REQUEST,
                BackofficeError::NotFound(_) => StatusCode::NOT_FOUND,
                BackofficeError::Integrity(_) => StatusCode::CONFLICT,
                // Forbidden and unauthenticated share 401 on this API.
                BackofficeError::Permission(_) => StatusCode::UNAUTHORIZED,
                BackofficeError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }
    }

    impl IntoResponse for BackofficeError {
        fn into_response(self) -> Response {
            if let BackofficeError::Storage(ref e) = self {
                tracing::error!("storage failure: {}", e);
            }
            let body = serde_json::json!({
                "code": self.error_code(),
                "message": self.to_string(),
            });
            (self.status_code(), axum::Json(body)).into_response()
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
