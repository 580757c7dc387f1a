//! AWS provider error types

use gpufleet_cloud::CloudError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("aws CLI not found. Please install AWS CLI v2")]
    AwsCliNotFound,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Dependency violation: {0}")]
    DependencyViolation(String),

    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("aws command failed: {0}")]
    CommandFailed(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AwsError {
    /// Map CLI stderr onto a typed error
    pub fn from_stderr(stderr: &str) -> Self {
        let text = stderr.trim().to_string();
        if NOT_FOUND_CODES.iter().any(|c| text.contains(c)) {
            AwsError::NotFound(text)
        } else if ACCESS_DENIED_CODES.iter().any(|c| text.contains(c)) {
            AwsError::AccessDenied(text)
        } else if DEPENDENCY_CODES.iter().any(|c| text.contains(c)) {
            AwsError::DependencyViolation(text)
        } else if ALREADY_EXISTS_CODES.iter().any(|c| text.contains(c)) {
            AwsError::AlreadyExists(text)
        } else {
            AwsError::CommandFailed(text)
        }
    }
}

const NOT_FOUND_CODES: &[&str] = &[
    ".NotFound",
    "NotFoundException",
    "NoSuchEntity",
    "NoSuchResource",
    "DBInstanceNotFound",
    "InvalidInstanceType",
    "ResourceNotFoundException",
    "does not exist",
];

const ACCESS_DENIED_CODES: &[&str] = &[
    "AccessDenied",
    "UnauthorizedOperation",
    "is not authorized to perform",
];

const DEPENDENCY_CODES: &[&str] = &["DependencyViolation", "DeleteConflict", "ResourceInUse"];

const ALREADY_EXISTS_CODES: &[&str] = &["AlreadyExists", "EntityAlreadyExists", "Duplicate"];

impl From<AwsError> for CloudError {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::AwsCliNotFound => {
                CloudError::InvalidConfig("aws CLI not found".to_string())
            }
            AwsError::NotFound(msg) => CloudError::ResourceNotFound(msg),
            AwsError::AccessDenied(msg) => CloudError::AccessDenied(msg),
            AwsError::DependencyViolation(msg) => CloudError::DependencyViolation(msg),
            AwsError::AlreadyExists(msg) => CloudError::ResourceAlreadyExists(msg),
            AwsError::CommandFailed(msg) => CloudError::CommandFailed(msg),
            AwsError::JsonError(e) => CloudError::Json(e),
            AwsError::IoError(e) => CloudError::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;
