//! Orchestrator error types

use gpufleet_cloud::{CloudError, DeploymentState};
use gpufleet_config::ConfigError;
use gpufleet_engine::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Cloud error: {0}")]
    Cloud(#[from] CloudError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: DeploymentState,
        to: DeploymentState,
    },

    #[error("Pre-flight blocked by: {}", .0.join(", "))]
    Blocked(Vec<String>),

    #[error("Cannot roll back from state {0}")]
    NotRollbackable(DeploymentState),

    #[error("Unknown instance type {0}: the region reports no vCPU count for it")]
    UnknownInstanceType(String),

    #[error("Invalid address range: {0}")]
    InvalidCidr(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
