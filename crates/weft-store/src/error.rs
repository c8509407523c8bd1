//! Store error taxonomy.
//!
//! Callers never see raw driver errors: every `rusqlite` failure is
//! classified into one of these kinds at the store boundary.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store is not open")]
    NotOpen,
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },
    #[error("conflict: {message}")]
    Conflict { message: String },
    #[error("store is corrupt: {message}")]
    Corrupt { message: String },
    #[error("store failure: {message}")]
    Internal { message: String },
}

impl StoreError {
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn corrupt(message: impl Into<String>) -> Self {
        StoreError::Corrupt {
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::QueryReturnedNoRows => StoreError::not_found("row", ""),
            rusqlite::Error::SqliteFailure(code, message) => match code.code {
                rusqlite::ErrorCode::ConstraintViolation => StoreError::Conflict {
                    message: message.clone().unwrap_or_else(|| err.to_string()),
                },
                rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase => {
                    StoreError::Corrupt {
                        message: message.clone().unwrap_or_else(|| err.to_string()),
                    }
                }
                _ => StoreError::Internal {
                    message: err.to_string(),
                },
            },
            _ => StoreError::Internal {
                message: err.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
