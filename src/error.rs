use crate::database::DatabaseError;
use rust_decimal::Decimal;
use sqlx::Error as SqlxError;
use thiserror::Error;
use uuid::Uuid;

/// Application-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Placement total exceeds the user's token balance
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: i64, available: i64 },

    /// Event is not accepting bets or settlement in its current state
    #[error("Event {0} is not active")]
    EventNotActive(Uuid),

    /// Settlement guard tripped or lifecycle precondition violated
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// Ledger store I/O failure; the operation was not applied
    #[error("Storage failure: {0}")]
    StorageFailure(LedgerError),

    /// Database setup errors (pool creation, migrations)
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stake calculator errors
    #[error("Stake calculation error: {0}")]
    Stake(#[from] crate::stake::StakeError),

    /// Audit trail I/O errors
    #[error("Audit trail error: {0}")]
    Audit(#[from] std::io::Error),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Check if error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    /// Whether the caller may retry the whole operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::StorageFailure(_) | AppError::InvalidStateTransition(_)
        )
    }

    /// Get HTTP status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::NotFound(_) => 404,
            AppError::Validation(_) => 400,
            AppError::EventNotActive(_) => 409,
            AppError::InvalidStateTransition(_) => 409,
            AppError::InsufficientBalance { .. } => 422,
            AppError::StorageFailure(_) | AppError::Database(_) => 503,
            _ => 500,
        }
    }
}

impl From<LedgerError> for AppError {
    /// Lock contention surfaces as a settlement conflict, everything else as storage failure
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Contended(msg) => AppError::InvalidStateTransition(msg),
            other => AppError::StorageFailure(other),
        }
    }
}

/// Ledger store error types
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Database query error
    #[error("Query error: {0}")]
    Query(SqlxError),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Row lock held by another transaction
    #[error("Row is locked by a concurrent operation: {0}")]
    Contended(String),

    /// Persisted row cannot be decoded into the domain model
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Failure injected by the in-memory store
    #[error("Injected failure: {0}")]
    Injected(String),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

impl From<SqlxError> for LedgerError {
    fn from(err: SqlxError) -> Self {
        match &err {
            SqlxError::RowNotFound => LedgerError::NotFound("Record not found".to_string()),
            SqlxError::Database(db_err) => {
                // Check for common PostgreSQL error codes
                let code = db_err.code().map(|c| c.to_string());
                match code.as_deref() {
                    // lock_not_available (FOR UPDATE NOWAIT)
                    Some("55P03") => LedgerError::Contended(db_err.message().to_string()),
                    // Unique, foreign key and check violations
                    Some("23505") | Some("23503") | Some("23514") => {
                        LedgerError::ConstraintViolation(db_err.message().to_string())
                    }
                    _ => LedgerError::Query(err),
                }
            }
            _ => LedgerError::Query(err),
        }
    }
}

/// Convenience function to convert Option<T> to Result<T, AppError>
pub fn option_to_result<T>(opt: Option<T>, error_msg: &str) -> AppResult<T> {
    opt.ok_or_else(|| AppError::NotFound(error_msg.to_string()))
}

/// Checked token arithmetic that surfaces overflow as a validation error
pub fn checked_tokens(value: Option<i64>, context: &str) -> AppResult<i64> {
    value.ok_or_else(|| AppError::Validation(format!("Token arithmetic overflow: {}", context)))
}

/// Convert a decimal payout to whole tokens
pub fn decimal_to_tokens(value: Decimal) -> AppResult<i64> {
    use rust_decimal::prelude::ToPrimitive;
    value
        .to_i64()
        .ok_or_else(|| AppError::Validation(format!("Payout {} does not fit in a token amount", value)))
}
