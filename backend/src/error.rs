//! Error types for the automation core.
//!
//! Scans and workflow runs never surface these to their callers; they are
//! logged at the point of failure and folded into the run reports.

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Failed to decode {collection} record: {message}")]
    Decode { collection: String, message: String },
    #[error("{collection} record {id} not found")]
    NotFound { collection: String, id: Uuid },
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub fn not_found(collection: &str, id: Uuid) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            id,
        }
    }

    pub fn decode(collection: &str, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            collection: collection.to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ActionError {
    #[error("Missing parameter '{0}'")]
    MissingParam(&'static str),
    #[error("Invalid parameter '{param}': {message}")]
    InvalidParam { param: &'static str, message: String },
    #[error("Task {0} not found")]
    TaskNotFound(Uuid),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type ActionResult<T> = Result<T, ActionError>;

impl ActionError {
    pub fn invalid(param: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParam {
            param,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
