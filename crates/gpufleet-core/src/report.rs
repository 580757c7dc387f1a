//! Operator report files
//!
//! Written as pretty JSON under the reports directory. Every exhausted
//! remediation chain, quota halt and access-denied failure leaves one.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportKind {
    MissingPermissions,
    QuotaIncrease,
    ManualRemediation,
}

impl ReportKind {
    pub fn file_stem(&self) -> &'static str {
        match self {
            ReportKind::MissingPermissions => "missing-permissions",
            ReportKind::QuotaIncrease => "quota-increase",
            ReportKind::ManualRemediation => "manual-remediation",
        }
    }
}

/// One manual way out, with commands ready to paste
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualOption {
    pub title: String,
    pub commands: Vec<String>,
}

impl ManualOption {
    pub fn new(title: impl Into<String>, commands: Vec<String>) -> Self {
        Self {
            title: title.into(),
            commands,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualRemediationReport {
    pub project: String,
    pub environment: String,
    pub check: String,
    pub summary: String,
    pub options: Vec<ManualOption>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissingPermissionsReport {
    pub project: String,
    pub environment: String,
    pub denied_actions: Vec<String>,
    pub raw_error: String,
    pub generated_at: DateTime<Utc>,
}

/// Writes report files into one directory
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn write<T: Serialize>(
        &self,
        kind: ReportKind,
        slug: &str,
        payload: &T,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f");
        let slug = sanitize(slug);
        let file_name = if slug.is_empty() {
            format!("{}-{}.json", kind.file_stem(), stamp)
        } else {
            format!("{}-{}-{}.json", kind.file_stem(), slug, stamp)
        };
        let path = self.dir.join(file_name);

        let content = serde_json::to_string_pretty(payload)?;
        tokio::fs::write(&path, content).await?;

        tracing::info!(report = %path.display(), "wrote {} report", kind.file_stem());
        Ok(path)
    }
}

fn sanitize(slug: &str) -> String {
    let mut out = String::with_capacity(slug.len());
    for c in slug.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}
