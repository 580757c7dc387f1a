use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "settings file not found. Looked in:\n\
        - current directory: gpufleet.local.yaml, gpufleet.yaml, .gpufleet.yaml\n\
        - ./.gpufleet/ directory\n\
        - ~/.config/gpufleet/gpufleet.yaml\n\
        or point GPUFLEET_CONFIG at the file"
    )]
    SettingsNotFound,

    #[error("invalid settings in {path}: {message}")]
    InvalidSettings { path: PathBuf, message: String },

    #[error("variable file {path} must hold a JSON object")]
    InvalidVarFile { path: PathBuf },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
