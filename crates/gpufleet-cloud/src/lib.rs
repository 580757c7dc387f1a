//! gpufleet cloud model
//!
//! Provider-neutral building blocks shared by the adapters and the
//! orchestrator.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  gpufleet CLI                    │
//! │       (preflight / up / rollback / cleanup)      │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                gpufleet-core                     │
//! │  scanner · quota · monitor · rollback · cleanup  │
//! └───────┬─────────────────────────┬───────────────┘
//!         │                         │
//! ┌───────▼───────────────┐ ┌───────▼───────────────┐
//! │    gpufleet-cloud     │ │    gpufleet-engine    │
//! │ trait CloudInspector  │ │  trait InfraEngine    │
//! │ StateStore · poll     │ │  (terraform)          │
//! └───────┬───────────────┘ └───────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │ gpufleet-aws  │
//! │  (aws CLI)    │
//! └───────────────┘
//! ```

pub mod action;
pub mod error;
pub mod poll;
pub mod provider;
pub mod resource;
pub mod state;

// Re-exports
pub use action::{ActionLog, ActionResult, ActionType};
pub use error::{CloudError, Result};
pub use poll::{PollConfig, PollOutcome, poll_until};
pub use provider::{AuthStatus, CloudInspector};
pub use resource::{CloudResource, ResourceFilter, ResourceKind, Selector};
pub use state::{
    DeploymentRecord, DeploymentState, FileStateStore, MemoryStateStore, StateLock, StateStore,
};
