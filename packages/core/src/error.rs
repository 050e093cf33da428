use std::error::Error;
use std::fmt;

use sqlx::error::ErrorKind;
use thiserror::Error;

/// Errors surfaced by the fee telemetry store.
///
/// Database failures are passed through unchanged except for constraint
/// violations, which are split out so callers can tell a bad record from
/// a broken connection.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Constraint violation: {message}")]
    ConstraintViolation { message: String },

    #[error("Invalid record: {message}")]
    InvalidRecord { message: String },

    #[error("Invalid time range: {message}")]
    InvalidRange { message: String },

    #[error("Corrupt row: {message}")]
    CorruptRow { message: String },

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord { message: message.into() }
    }

    pub fn invalid_range(message: impl Into<String>) -> Self {
        Self::InvalidRange { message: message.into() }
    }

    pub fn corrupt_row(message: impl Into<String>) -> Self {
        Self::CorruptRow { message: message.into() }
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let is_constraint = match db_err.kind() {
                ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation
                | ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation => true,
                _ => db_err.message().contains("constraint failed"),
            };
            if is_constraint {
                return Self::ConstraintViolation {
                    message: db_err.message().to_string(),
                };
            }
        }
        Self::Database(err)
    }
}

/// Unified application error for the operator binary.
///
/// Keeps config, storage and lookup failures distinguishable when a command
/// exits non-zero. `Unknown` covers internal failures such as rendering
/// output; malformed arguments never get this far because clap rejects them.
#[derive(Debug)]
pub enum AppError {
    Config(String),
    Store(StoreError),
    NotFound(String),
    Unknown(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "Config error: {}", msg),
            AppError::Store(err) => write!(f, "Store error: {}", err),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Unknown(msg) => write!(f, "Unknown error: {}", msg),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::Store(err)
    }
}
