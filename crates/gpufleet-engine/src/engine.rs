//! Engine adapter trait definition

use crate::error::Result;
use crate::plan::{PlanSummary, TrackedResource};
use async_trait::async_trait;

/// Receives output lines as the engine produces them
pub type LineSink<'a> = &'a mut (dyn FnMut(&str) + Send);

/// How a streamed engine command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamExit {
    pub success: bool,
    pub code: Option<i32>,
}

impl StreamExit {
    pub fn ok() -> Self {
        Self {
            success: true,
            code: Some(0),
        }
    }

    pub fn failed(code: Option<i32>) -> Self {
        Self {
            success: false,
            code,
        }
    }
}

/// Typed adapter over the declarative infrastructure engine
///
/// The orchestrator never builds its own resource graph; it only drives
/// these operations and reasons about conflicts and failures around them.
#[async_trait]
pub trait InfraEngine: Send + Sync {
    /// Human name of the engine (e.g. "terraform")
    fn name(&self) -> &str;

    /// Prepare the working directory (providers, backend)
    async fn init(&self) -> Result<()>;

    /// Produce a plan artifact and return its summary
    async fn plan(&self) -> Result<PlanSummary>;

    /// Apply the last plan, streaming progress lines into `sink`
    async fn apply(&self, sink: LineSink<'_>) -> Result<StreamExit>;

    /// Bring an existing provider resource under engine management
    async fn import(&self, address: &str, id: &str) -> Result<()>;

    /// Addresses currently tracked in the engine's state
    async fn state_list(&self) -> Result<Vec<String>>;

    /// Tracked resources with their provider IDs and names
    async fn tracked_resources(&self) -> Result<Vec<TrackedResource>>;

    /// Tear down everything the engine tracks, streaming lines into `sink`
    async fn destroy(&self, sink: LineSink<'_>) -> Result<StreamExit>;

    /// Remove the saved plan artifact so it cannot be re-applied
    async fn clear_plan(&self) -> Result<()>;
}
