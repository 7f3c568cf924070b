//! Steps
//!
//! A `Step` owns the lifecycle of one `StepExecution`. The work itself is
//! delegated to a `StepBody`, which reports an exit status and may update
//! counters and the execution context but never sets the batch status.

use async_trait::async_trait;

use crate::domain::execution::StepExecution;
use crate::domain::status::ExitStatus;
use crate::error::Result;
use crate::listener::StepListenerDispatcher;

/// Tasklet-style step
pub mod tasklet;

/// Restart-aware step launching
pub mod handler;

pub use handler::StepHandler;
pub use tasklet::TaskletStep;

/// A named unit of work within a job
#[async_trait]
pub trait Step: Send + Sync {
    /// Name, unique within the job
    fn name(&self) -> &str;

    /// Maximum number of executions across restarts; `None` uses the
    /// engine default
    fn start_limit(&self) -> Option<u32> {
        None
    }

    /// Whether a COMPLETED step runs again on restart
    fn allow_start_if_complete(&self) -> bool {
        false
    }

    /// Run the step against an already saved execution and persist the
    /// outcome. Failures of the work itself are recorded on the execution;
    /// an `Err` means the execution could not be driven at all.
    async fn execute(&self, step_execution: &mut StepExecution) -> Result<()>;
}

/// The work of a step.
///
/// How `run` ends decides the batch status of the step: `Ok` gives
/// COMPLETED and `Err` gives FAILED. The returned exit status only selects
/// the next transition, so `Ok(ExitStatus::failed())` leaves a COMPLETED
/// step whose FAILED exit code routes the flow.
#[async_trait]
pub trait StepBody: Send + Sync {
    /// Do the work and return its exit status
    async fn run(
        &self,
        step_execution: &mut StepExecution,
        listeners: &StepListenerDispatcher,
    ) -> Result<ExitStatus>;
}
