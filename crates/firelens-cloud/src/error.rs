//! Resource graph error types

use thiserror::Error;

/// Resource graph errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource already exists: {0}")]
    DuplicateResource(String),

    #[error("Resource '{resource}' references unknown id '{target}'")]
    UnresolvedReference { resource: String, target: String },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;
