use serde::{Deserialize, Serialize};
use std::fmt;

use crate::access::ActorRole;

/// Broad classification callers branch on. `code` carries the precise reason.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    Authorization,
    Store,
}

/// Single structured error shape used across backend layers and exposed to the request layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    /// Offending input field for validation failures.
    pub field: Option<String>,
    /// Role of the actor that hit a conflict, so the boundary can choose how to present it.
    pub actor_role: Option<ActorRole>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            details: None,
            field: None,
            actor_role: None,
            retryable: false,
        }
    }

    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, code, message)
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, code, message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, code, message)
    }

    pub fn authorization(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, code, message)
    }

    pub fn store(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Store, code, message)
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_actor_role(mut self, role: ActorRole) -> Self {
        self.actor_role = Some(role);
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Attach a SQLite failure. Busy/locked failures are the only retryable store errors.
    pub fn with_sqlite(self, err: &rusqlite::Error) -> Self {
        let retryable = matches!(
            err.sqlite_error_code(),
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
        );
        self.with_details(err.to_string()).with_retryable(retryable)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(field) = &self.field {
            write!(f, " (field: {field})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_sqlite_errors_are_retryable() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        let err = AppError::store("DB_WRITE_FAILED", "write failed").with_sqlite(&busy);
        assert!(err.retryable);

        let other = rusqlite::Error::QueryReturnedNoRows;
        let err = AppError::store("DB_WRITE_FAILED", "write failed").with_sqlite(&other);
        assert!(!err.retryable);
    }

    #[test]
    fn display_includes_field() {
        let err = AppError::validation("VALIDATION_REQUIRED", "description is required")
            .with_field("description");
        assert_eq!(
            err.to_string(),
            "[VALIDATION_REQUIRED] description is required (field: description)"
        );
    }
}
