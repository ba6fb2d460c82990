use thiserror::Error;

use crate::construct::RecordId;

#[derive(Error, Debug)]
pub enum LivelistError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Data corruption: {message}")]
    DataCorruption { message: String },
    #[error("Schema error: {0}")]
    Schema(String),
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),
    #[error("Unknown field '{field}' in collection '{collection}'")]
    UnknownField { collection: String, field: String },
    #[error("Type mismatch for field '{field}': expected {expected}, found {found}")]
    TypeMismatch { field: String, expected: &'static str, found: &'static str },
    #[error("Constraint violated: {0}")]
    Constraint(String),
    #[error("Record {id} not found in collection '{collection}'")]
    NotFound { collection: String, id: RecordId },
    #[error("Malformed change set: {0}")]
    MalformedChangeSet(String),
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, LivelistError>;

// Helper conversions
impl From<rusqlite::Error> for LivelistError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}
impl From<serde_json::Error> for LivelistError {
    fn from(e: serde_json::Error) -> Self { Self::DataCorruption { message: e.to_string() } }
}
impl From<::config::ConfigError> for LivelistError {
    fn from(e: ::config::ConfigError) -> Self { Self::Config(e.to_string()) }
}
impl<T> From<std::sync::PoisonError<T>> for LivelistError {
    fn from(e: std::sync::PoisonError<T>) -> Self { Self::Lock(e.to_string()) }
}
