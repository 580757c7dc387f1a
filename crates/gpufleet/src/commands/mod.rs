pub mod cleanup;
pub mod preflight;
pub mod quota;
pub mod rollback;
pub mod status;
pub mod up;

use crate::decider::StdinDecider;
use colored::Colorize;
use gpufleet_aws::AwsInspector;
use gpufleet_cloud::{CloudInspector, FileStateStore, StateLock};
use gpufleet_config::Settings;
use gpufleet_core::RunContext;
use gpufleet_engine::{InfraEngine, Terraform};
use std::sync::Arc;

/// A wired run context, holding the state lock for mutating commands
pub struct Session {
    pub ctx: RunContext,
    lock: Option<StateLock>,
}

impl Session {
    /// Read-only session; no lock
    pub fn open(settings: Settings, decider: StdinDecider) -> Self {
        let store = FileStateStore::new(settings.state_dir());
        Self {
            ctx: wire(settings, store, decider),
            lock: None,
        }
    }

    /// Session for a command that may change cloud or engine state. Fails
    /// while another run holds the lock.
    pub async fn open_locked(settings: Settings, decider: StdinDecider) -> anyhow::Result<Self> {
        let store = FileStateStore::new(settings.state_dir());
        let lock = store.acquire_lock().await?;
        Ok(Self {
            ctx: wire(settings, store, decider),
            lock: Some(lock),
        })
    }

    pub async fn close(self) -> anyhow::Result<()> {
        if let Some(lock) = self.lock {
            lock.release().await?;
        }
        Ok(())
    }
}

fn wire(settings: Settings, store: FileStateStore, decider: StdinDecider) -> RunContext {
    let cloud: Arc<dyn CloudInspector> = Arc::new(AwsInspector::new(
        settings.region.clone(),
        settings.profile.clone(),
    ));
    let engine: Arc<dyn InfraEngine> = Arc::new(
        Terraform::new(settings.engine_dir())
            .with_binary(settings.engine.binary.clone())
            .with_var_file(settings.var_file()),
    );

    RunContext::new(settings, cloud, engine, Arc::new(store), Arc::new(decider))
}

/// Header printed by every command that talks to the provider
pub fn print_target(ctx: &RunContext) {
    println!(
        "{} {} / {} ({})",
        "Target:".bold(),
        ctx.project().cyan(),
        ctx.environment().cyan(),
        ctx.settings.region
    );
}
