//! Declarative engine adapter for gpufleet
//!
//! The orchestrator delegates planning and execution to an external
//! declarative engine. This crate wraps the terraform CLI behind the
//! [`InfraEngine`] trait and parses its machine-readable output.
//!
//! # Requirements
//!
//! - `terraform` (or a compatible binary such as `tofu`) must be on PATH
//! - The working directory holds the resource definitions

pub mod engine;
pub mod error;
pub mod plan;
pub mod terraform;

pub use engine::{InfraEngine, LineSink, StreamExit};
pub use error::{EngineError, Result};
pub use plan::{PlanSummary, PlannedAction, PlannedResource, TrackedResource};
pub use terraform::Terraform;
