//! # Error Handling
//!
//! Error types shared by the allocator, the ingestion pipeline, the monitor
//! and the store collaborators.
//!
//! ## Propagation
//! - Allocation and store errors bubble up to the caller with `?`
//! - Ingestion and monitor failures never leave their loop: they are logged
//!   where they happen and the loop moves on to the next item
//!
//! Two enums live here:
//! - [`StoreError`]: what a Link Store / Click Store can report
//! - [`AppError`]: what the core reports to its callers

use thiserror::Error;

// =====================================
// Result Type Aliases
// =====================================
/// Result type of the core operations.
///
/// `Result<Link>` instead of `Result<Link, AppError>`.
pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// Result type of the store collaborators.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

// =====================================
// Store Errors
// =====================================
/// Failure reported by a Link Store or Click Store.
///
/// "Not found" is not an error: lookups return `Ok(None)`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write (e.g. a duplicate short code)
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// The backing database failed
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    /// The store could not serve the request for another reason
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether the allocator should treat this as a code collision.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }
}

// sqlx reports constraint failures as a generic database error;
// pull unique violations out so the allocator can retry on them.
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::UniqueViolation(db_err.message().to_string())
            }
            _ => Self::Database(err),
        }
    }
}

// =====================================
// Application Errors
// =====================================
/// Main error of the crate.
#[derive(Debug, Error)]
pub enum AppError {
    // ----------------------------------------
    // Core operation failures
    // ----------------------------------------

    /// The OS entropy source could not produce random bytes.
    /// Fatal to the current allocation attempt, never retried internally.
    #[error("Random source unavailable: {0}")]
    RandomSource(#[from] rand::Error),

    /// A store collaborator failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Every allocation attempt hit an existing short code
    #[error("Failed to allocate a unique short code after {attempts} attempts")]
    ExhaustedRetries { attempts: u32 },

    // ----------------------------------------
    // Caller errors
    // ----------------------------------------

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // ----------------------------------------
    // Runtime errors
    // ----------------------------------------

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Builds the not-found error for a short code.
    #[must_use]
    pub fn link_not_found(short_code: &str) -> Self {
        Self::NotFound(format!("Link with code '{}' not found", short_code))
    }
}

// =====================================
// From Implementations
// =====================================

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Store(err.into())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

// =====================================
// Result Extensions
// =====================================
/// Extension trait for foreign `Result`s.
pub trait ResultExt<T, E> {
    /// Maps any displayable error to [`AppError::Internal`]
    fn map_internal(self) -> Result<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T, E> for std::result::Result<T, E> {
    fn map_internal(self) -> Result<T> {
        self.map_err(|e| AppError::Internal(e.to_string()))
    }
}

// =====================================
// Tests
// =====================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_converts_into_app_error() {
        let err: AppError = StoreError::Unavailable("down".to_string()).into();
        assert!(matches!(err, AppError::Store(StoreError::Unavailable(_))));
    }

    #[test]
    fn test_non_constraint_sqlx_error_is_not_unique_violation() {
        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(!err.is_unique_violation());
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[test]
    fn test_exhausted_retries_message() {
        let err = AppError::ExhaustedRetries { attempts: 5 };
        assert_eq!(
            err.to_string(),
            "Failed to allocate a unique short code after 5 attempts"
        );
    }

    #[test]
    fn test_result_extension() {
        let err: std::result::Result<i32, &str> = Err("original error");
        assert!(matches!(err.map_internal(), Err(AppError::Internal(_))));
    }
}
