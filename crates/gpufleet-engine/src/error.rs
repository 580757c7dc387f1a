//! Engine adapter error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0} not found. Please install terraform (or set engine.binary)")]
    EngineNotFound(String),

    #[error("engine command failed: {command}\n{stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("invalid plan output: {0}")]
    InvalidPlan(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
