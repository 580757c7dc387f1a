//! `gpufleet.yaml` settings

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level settings for one project
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Project name; also the default naming prefix root
    pub project: String,

    /// Environment name (dev, stg, prod...)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Cloud provider
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Target region
    pub region: String,

    /// Named credentials profile, if any
    #[serde(default)]
    pub profile: Option<String>,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub naming: NamingSettings,

    #[serde(default)]
    pub network: NetworkSettings,

    #[serde(default)]
    pub compute: ComputeSettings,

    #[serde(default)]
    pub polling: PollingSettings,

    #[serde(default)]
    pub monitor: MonitorSettings,

    /// Where deployment state and the lock file live
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Where operator reports are written
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,

    /// Zone failover cycles allowed per run
    #[serde(default = "default_max_zone_failovers")]
    pub max_zone_failovers: u32,

    /// Directory the settings file was loaded from
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Directory holding the resource definitions
    pub dir: PathBuf,
    /// Engine binary
    pub binary: String,
    /// Variable file (JSON) read by the engine and edited by remediation
    pub var_file: PathBuf,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("infra"),
            binary: "terraform".to_string(),
            var_file: PathBuf::from("gpufleet.tfvars.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingSettings {
    /// Variable holding the resource name prefix
    pub prefix_var: String,
    /// Tag key carrying the project name
    pub tag_key: String,
    /// Prefixes of other environments that extend this one's prefix
    /// (`gpu-dev-eu` next to `gpu-dev`); never treated as ours
    pub sibling_prefixes: Vec<String>,
}

impl Default for NamingSettings {
    fn default() -> Self {
        Self {
            prefix_var: "name_prefix".to_string(),
            tag_key: "Project".to_string(),
            sibling_prefixes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub vpc_cidr_var: String,
    pub subnet_cidrs_var: String,
    pub existing_vpc_var: String,
    pub existing_subnets_var: String,
    /// Address allocations the run will create
    pub required_addresses: u32,
    /// Used when the provider reports no quota value
    pub address_limit_fallback: u32,
    pub network_limit_fallback: u32,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            vpc_cidr_var: "vpc_cidr".to_string(),
            subnet_cidrs_var: "subnet_cidrs".to_string(),
            existing_vpc_var: "existing_vpc_id".to_string(),
            existing_subnets_var: "existing_subnet_ids".to_string(),
            required_addresses: 1,
            address_limit_fallback: 5,
            network_limit_fallback: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeSettings {
    pub instance_type_var: String,
    /// Boolean variable: true = spot pricing
    pub spot_var: String,
    pub zone_var: String,
    /// Used when the variable file has no instance type
    pub default_instance_type: String,
}

impl Default for ComputeSettings {
    fn default() -> Self {
        Self {
            instance_type_var: "instance_type".to_string(),
            spot_var: "use_spot".to_string(),
            zone_var: "availability_zone".to_string(),
            default_instance_type: "g5.xlarge".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    pub max_attempts: u32,
    pub interval_secs: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Progress denominator when no plan summary is available
    pub fallback_total_resources: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            fallback_total_resources: 20,
        }
    }
}

fn default_environment() -> String {
    "dev".to_string()
}

fn default_provider() -> String {
    "aws".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".gpufleet")
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from(".gpufleet/reports")
}

fn default_max_zone_failovers() -> u32 {
    2
}

impl Settings {
    /// Load settings from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut settings: Settings = serde_yaml::from_str(&content)?;
        settings.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        settings.validate(path)?;

        tracing::debug!(
            project = %settings.project,
            environment = %settings.environment,
            region = %settings.region,
            "Loaded settings from {}",
            path.display()
        );
        Ok(settings)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let invalid = |message: &str| ConfigError::InvalidSettings {
            path: path.to_path_buf(),
            message: message.to_string(),
        };

        if self.project.trim().is_empty() {
            return Err(invalid("project must not be empty"));
        }
        if self.region.trim().is_empty() {
            return Err(invalid("region must not be empty"));
        }
        if self.provider != "aws" {
            return Err(invalid("only the aws provider is supported"));
        }
        Ok(())
    }

    /// Resolve a configured path against the settings file directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn engine_dir(&self) -> PathBuf {
        self.resolve(&self.engine.dir)
    }

    /// Variable file path; relative paths are inside the engine directory
    pub fn var_file(&self) -> PathBuf {
        if self.engine.var_file.is_absolute() {
            self.engine.var_file.clone()
        } else {
            self.engine_dir().join(&self.engine.var_file)
        }
    }

    pub fn state_dir(&self) -> PathBuf {
        self.resolve(&self.state_dir)
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.resolve(&self.reports_dir)
    }

    /// Naming prefix used when the variable file has none
    pub fn default_prefix(&self) -> String {
        format!("{}-{}", self.project, self.environment)
    }
}
