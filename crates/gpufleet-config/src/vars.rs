//! Engine variable file (`*.tfvars.json`)
//!
//! Remediation that rewrites names, address ranges or zones persists the
//! change here so later runs stay consistent. Every save first copies the
//! current file aside as a timestamped backup.

use crate::error::{ConfigError, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Before/after record of one automated edit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarChange {
    pub key: String,
    pub before: Option<Value>,
    pub after: Value,
}

/// Outcome of [`VarFile::save`]
#[derive(Debug, Clone, Serialize)]
pub struct SavedEdit {
    pub path: PathBuf,
    /// `None` when the file did not exist before
    pub backup: Option<PathBuf>,
    pub changes: Vec<VarChange>,
}

/// In-memory view of the variable file with pending changes
#[derive(Debug, Clone)]
pub struct VarFile {
    path: PathBuf,
    values: Map<String, Value>,
    pending: Vec<VarChange>,
}

impl VarFile {
    /// Load the file; a missing file is an empty object
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Map::new()
            } else {
                match serde_json::from_str::<Value>(&content)? {
                    Value::Object(map) => map,
                    _ => return Err(ConfigError::InvalidVarFile { path }),
                }
            }
        } else {
            Map::new()
        };

        Ok(Self {
            path,
            values,
            pending: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(Value::as_bool)
    }

    pub fn get_str_list(&self, key: &str) -> Vec<String> {
        self.values
            .get(key)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Stage a change; a no-op when the value is unchanged
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let before = self.values.get(key).cloned();
        if before.as_ref() == Some(&value) {
            return;
        }
        self.values.insert(key.to_string(), value.clone());
        self.pending.push(VarChange {
            key: key.to_string(),
            before,
            after: value,
        });
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Back up the file on disk, then write the new content
    pub fn save(&mut self) -> Result<SavedEdit> {
        let backup = if self.path.exists() {
            let backup = self.backup_path();
            std::fs::copy(&self.path, &backup)?;
            Some(backup)
        } else {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            None
        };

        let content = serde_json::to_string_pretty(&Value::Object(self.values.clone()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content + "\n")?;
        std::fs::rename(&tmp, &self.path)?;

        let changes = std::mem::take(&mut self.pending);
        for change in &changes {
            tracing::info!(
                file = %self.path.display(),
                key = %change.key,
                before = %change.before.as_ref().map(serde_json::Value::to_string).unwrap_or_else(|| "<unset>".to_string()),
                after = %change.after,
                "variable rewritten"
            );
        }

        Ok(SavedEdit {
            path: self.path.clone(),
            backup,
            changes,
        })
    }

    fn backup_path(&self) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "vars.json".to_string());
        self.path.with_file_name(format!("{}.{}.bak", file_name, stamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let vars = VarFile::load(dir.path().join("none.tfvars.json")).unwrap();
        assert!(vars.get("vpc_cidr").is_none());
        assert!(vars.get_str_list("subnet_cidrs").is_empty());
    }

    #[test]
    fn test_save_backs_up_and_records_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gpu.tfvars.json");
        std::fs::write(&path, r#"{"vpc_cidr": "10.0.0.0/16", "name_prefix": "gpu-dev"}"#).unwrap();

        let mut vars = VarFile::load(&path).unwrap();
        vars.set("vpc_cidr", "10.20.0.0/16");
        vars.set("name_prefix", "gpu-dev");
        assert!(vars.has_pending());

        let saved = vars.save().unwrap();
        assert_eq!(saved.changes.len(), 1);
        assert_eq!(saved.changes[0].before, Some(json!("10.0.0.0/16")));
        assert_eq!(saved.changes[0].after, json!("10.20.0.0/16"));

        let backup = saved.backup.unwrap();
        let original = std::fs::read_to_string(backup).unwrap();
        assert!(original.contains("10.0.0.0/16"));

        let reloaded = VarFile::load(&path).unwrap();
        assert_eq!(reloaded.get_str("vpc_cidr"), Some("10.20.0.0/16"));
        assert_eq!(reloaded.get_str("name_prefix"), Some("gpu-dev"));
    }

    #[test]
    fn test_lists_and_bools() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gpu.tfvars.json");
        let mut vars = VarFile::load(&path).unwrap();
        vars.set("subnet_cidrs", json!(["10.0.1.0/24", "10.0.2.0/24"]));
        vars.set("use_spot", true);
        let saved = vars.save().unwrap();
        assert!(saved.backup.is_none());

        let reloaded = VarFile::load(&path).unwrap();
        assert_eq!(reloaded.get_str_list("subnet_cidrs").len(), 2);
        assert_eq!(reloaded.get_bool("use_spot"), Some(true));
    }

    #[test]
    fn test_rejects_non_object() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.tfvars.json");
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(
            VarFile::load(&path),
            Err(ConfigError::InvalidVarFile { .. })
        ));
    }
}
