pub mod error;
pub mod settings;
pub mod vars;

pub use error::*;
pub use settings::{
    ComputeSettings, EngineSettings, MonitorSettings, NamingSettings, NetworkSettings,
    PollingSettings, Settings,
};
pub use vars::{SavedEdit, VarChange, VarFile};

use std::path::PathBuf;

/// Environment variable pointing directly at a settings file
pub const CONFIG_ENV: &str = "GPUFLEET_CONFIG";

const CANDIDATES: [&str; 3] = ["gpufleet.local.yaml", "gpufleet.yaml", ".gpufleet.yaml"];

/// Locate the settings file
///
/// Search order:
/// 1. `GPUFLEET_CONFIG`
/// 2. current directory: gpufleet.local.yaml, gpufleet.yaml, .gpufleet.yaml
/// 3. `./.gpufleet/`, same order
/// 4. `~/.config/gpufleet/gpufleet.yaml`
pub fn find_settings_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!("{} points at a missing file: {}", CONFIG_ENV, path.display());
    }

    let current_dir = std::env::current_dir()?;

    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let local_dir = current_dir.join(".gpufleet");
    if local_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = local_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("gpufleet").join("gpufleet.yaml");
        if global.exists() {
            return Ok(global);
        }
    }

    Err(ConfigError::SettingsNotFound)
}

/// Find and load the settings file
pub fn load_settings() -> Result<Settings> {
    let path = find_settings_file()?;
    Settings::load(&path)
}
