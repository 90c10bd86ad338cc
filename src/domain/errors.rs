//! Domain Errors
//!
//! Error taxonomy surfaced by the telemetry service and its repositories.

/// Errors returned by telemetry repositories.
///
/// Passed through the service to the caller without retry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RepositoryError {
    /// Storage medium unreachable
    #[error("connection error: {0}")]
    Connection(String),
    /// Statement or API call failed
    #[error("query error: {0}")]
    Query(String),
    /// Stored data could not be decoded
    #[error("data error: {0}")]
    Data(String),
    /// Constraint violated
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::SqliteFailure(ref code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                RepositoryError::Conflict(e.to_string())
            }
            rusqlite::Error::SqliteFailure(ref code, _)
                if matches!(
                    code.code,
                    rusqlite::ErrorCode::CannotOpen
                        | rusqlite::ErrorCode::DatabaseBusy
                        | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                RepositoryError::Connection(e.to_string())
            }
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..) => RepositoryError::Data(e.to_string()),
            _ => RepositoryError::Query(e.to_string()),
        }
    }
}

impl From<reqwest::Error> for RepositoryError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            RepositoryError::Connection(e.to_string())
        } else if e.is_decode() {
            RepositoryError::Data(e.to_string())
        } else {
            RepositoryError::Query(e.to_string())
        }
    }
}

/// Errors returned by the telemetry service.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TelemetryError {
    /// Malformed IP address, negative offset, unknown repository, bad query
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Token rejected by the authorizer
    #[error("unauthorized")]
    Unauthorized,
    /// Repository call failed
    #[error("storage failure: {0}")]
    Storage(#[from] RepositoryError),
    /// Call cancelled before completion
    #[error("request cancelled")]
    Cancelled,
    /// Call deadline elapsed before completion
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl TelemetryError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        TelemetryError::InvalidInput(msg.into())
    }
}
