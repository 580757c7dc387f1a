//! Errors from provider adapters and the state store

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Resource already exists: {0}")]
    ResourceAlreadyExists(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Dependency violation: {0}")]
    DependencyViolation(String),

    #[error("Provider rejected the request: {0}")]
    ApiError(String),

    #[error("Provider command failed: {0}")]
    CommandFailed(String),

    #[error("Not supported for this resource kind: {0}")]
    Unsupported(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Deployment state error: {0}")]
    StateError(String),

    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CloudError {
    /// Deletion and detach paths treat a vanished resource as done.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudError::ResourceNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
