//! terraform CLI wrapper
//!
//! Wraps the terraform CLI commands the orchestrator needs. Output that
//! the rest of the system consumes is parsed here, once.

use crate::engine::{InfraEngine, LineSink, StreamExit};
use crate::error::{EngineError, Result};
use crate::plan::{PlanSummary, TrackedResource, ensure_plan_document, tracked_from_show_json};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

const DEFAULT_PLAN_FILE: &str = "gpufleet.tfplan";

/// terraform CLI wrapper
pub struct Terraform {
    binary: String,
    working_dir: PathBuf,
    var_file: Option<PathBuf>,
    plan_file: PathBuf,
}

impl Terraform {
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        let working_dir = working_dir.as_ref().to_path_buf();
        Self {
            binary: "terraform".to_string(),
            plan_file: working_dir.join(DEFAULT_PLAN_FILE),
            working_dir,
            var_file: None,
        }
    }

    /// Use another binary (e.g. `tofu`)
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_var_file(mut self, var_file: impl Into<PathBuf>) -> Self {
        self.var_file = Some(var_file.into());
        self
    }

    pub fn plan_file(&self) -> &Path {
        &self.plan_file
    }

    /// Check the binary is on PATH
    pub async fn check_installed(&self) -> Result<()> {
        let which = Command::new("which").arg(&self.binary).output().await?;

        if !which.status.success() {
            return Err(EngineError::EngineNotFound(self.binary.clone()));
        }
        Ok(())
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.current_dir(&self.working_dir);
        cmd.args(args);
        cmd.env("TF_IN_AUTOMATION", "1");
        cmd
    }

    fn var_file_arg(&self) -> Option<String> {
        self.var_file
            .as_ref()
            .map(|p| format!("-var-file={}", p.display()))
    }

    /// Run a terraform command and return stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = self.command(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: {} {}", self.binary, args.join(" "));

        let output = cmd.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::CommandFailed {
                command: format!("{} {}", self.binary, args.join(" ")),
                stderr: stderr.to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run a terraform command, forwarding stdout and stderr lines as
    /// they arrive. The child never outlives the call.
    async fn stream_command(&self, args: &[&str], sink: LineSink<'_>) -> Result<StreamExit> {
        let mut cmd = self.command(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);

        tracing::debug!("Streaming: {} {}", self.binary, args.join(" "));

        let mut child = cmd.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("stderr not captured"))?;

        if let Err(e) = pump_lines(stdout, stderr, sink).await {
            tracing::warn!(error = %e, "lost {} output, stopping it", self.binary);
            // kill() also reaps the child
            if let Err(kill_err) = child.kill().await {
                tracing::warn!(error = %kill_err, "failed to stop {}", self.binary);
            }
            return Err(e.into());
        }

        let status = child.wait().await?;
        Ok(if status.success() {
            StreamExit::ok()
        } else {
            StreamExit::failed(status.code())
        })
    }
}

/// Forward lines from both pipes until both close. Output that is not
/// UTF-8 is replaced, not fatal.
async fn pump_lines<O, E>(stdout: O, stderr: E, sink: LineSink<'_>) -> std::io::Result<()>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let mut out = BufReader::new(stdout);
    let mut err = BufReader::new(stderr);
    // Partial reads survive a lost select race, so buffers live out here
    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();
    let mut out_open = true;
    let mut err_open = true;

    while out_open || err_open {
        tokio::select! {
            read = out.read_until(b'\n', &mut out_buf), if out_open => {
                if read? == 0 {
                    out_open = false;
                } else {
                    sink(&decode_line(&out_buf));
                    out_buf.clear();
                }
            }
            read = err.read_until(b'\n', &mut err_buf), if err_open => {
                if read? == 0 {
                    err_open = false;
                } else {
                    sink(&decode_line(&err_buf));
                    err_buf.clear();
                }
            }
        }
    }
    Ok(())
}

fn decode_line(bytes: &[u8]) -> String {
    let line = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

#[async_trait]
impl InfraEngine for Terraform {
    fn name(&self) -> &str {
        &self.binary
    }

    async fn init(&self) -> Result<()> {
        self.check_installed().await?;
        self.run_command(&["init", "-input=false", "-no-color"])
            .await?;
        Ok(())
    }

    async fn plan(&self) -> Result<PlanSummary> {
        let out_arg = format!("-out={}", self.plan_file.display());
        let mut args = vec!["plan", "-input=false", "-no-color", out_arg.as_str()];
        let var_arg = self.var_file_arg();
        if let Some(ref v) = var_arg {
            args.push(v.as_str());
        }
        self.run_command(&args).await?;

        let plan_path = self.plan_file.display().to_string();
        let json = self
            .run_command(&["show", "-json", "-no-color", plan_path.as_str()])
            .await?;
        ensure_plan_document(&json)?;
        PlanSummary::from_show_json(&json)
    }

    async fn apply(&self, sink: LineSink<'_>) -> Result<StreamExit> {
        let plan_path = self.plan_file.display().to_string();
        self.stream_command(
            &["apply", "-input=false", "-no-color", plan_path.as_str()],
            sink,
        )
        .await
    }

    async fn import(&self, address: &str, id: &str) -> Result<()> {
        let mut args = vec!["import", "-input=false", "-no-color"];
        let var_arg = self.var_file_arg();
        if let Some(ref v) = var_arg {
            args.push(v.as_str());
        }
        args.push(address);
        args.push(id);
        self.run_command(&args).await?;
        Ok(())
    }

    async fn state_list(&self) -> Result<Vec<String>> {
        match self.run_command(&["state", "list"]).await {
            Ok(output) => Ok(output
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect()),
            // A fresh working directory has no state yet
            Err(EngineError::CommandFailed { stderr, .. })
                if stderr.contains("No state file was found") =>
            {
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn tracked_resources(&self) -> Result<Vec<TrackedResource>> {
        let json = self.run_command(&["show", "-json", "-no-color"]).await?;
        tracked_from_show_json(&json)
    }

    async fn destroy(&self, sink: LineSink<'_>) -> Result<StreamExit> {
        let mut args = vec!["destroy", "-auto-approve", "-input=false", "-no-color"];
        let var_arg = self.var_file_arg();
        if let Some(ref v) = var_arg {
            args.push(v.as_str());
        }
        self.stream_command(&args, sink).await
    }

    async fn clear_plan(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.plan_file).await {
            Ok(()) => {
                tracing::debug!("Removed plan file {}", self.plan_file.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
