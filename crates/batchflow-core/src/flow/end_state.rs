use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::executor::JobFlowExecutor;
use super::state::State;
use super::status::FlowExecutionStatus;
use super::{RESTART_STEP_KEY, STOPPED_STEP_KEY};
use crate::domain::status::BatchStatus;
use crate::error::Result;

/// Terminal state.
///
/// Reports its configured status and sets the job exit code. A stop end
/// state additionally records where to resume, optionally abandons the step
/// that led to it, and lets a restart pass through as COMPLETED.
pub struct EndState {
    name: String,
    status: FlowExecutionStatus,
    code: String,
    abandon: bool,
    restart: Option<String>,
}

impl EndState {
    /// End state reporting `status` with exit code `code`
    pub fn new(name: impl Into<String>, status: FlowExecutionStatus, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            code: code.into(),
            abandon: false,
            restart: None,
        }
    }

    /// Stop end state. `restart` names the state a restart resumes from.
    pub fn stop(name: impl Into<String>, restart: Option<String>, abandon: bool) -> Self {
        Self {
            name: name.into(),
            status: FlowExecutionStatus::stopped(),
            code: "STOPPED".to_string(),
            abandon,
            restart,
        }
    }

    /// Configured status
    pub fn status(&self) -> &FlowExecutionStatus {
        &self.status
    }

    /// Configured exit code
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Whether the last step is abandoned on stop
    pub fn is_abandon(&self) -> bool {
        self.abandon
    }

    /// Restart target of a stop end state
    pub fn restart(&self) -> Option<&str> {
        self.restart.as_deref()
    }
}

#[async_trait]
impl State for EndState {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, executor: &mut JobFlowExecutor) -> Result<FlowExecutionStatus> {
        // The last step could not record its outcome; possibly unrecoverable.
        if let Some(step_execution) = executor.step_execution() {
            if step_execution.status == BatchStatus::Unknown {
                return Ok(FlowExecutionStatus::unknown());
            }
        }

        if self.status.is_stop() {
            let stopped_step = executor
                .step_execution()
                .map(|step_execution| step_execution.step_name.clone());
            if let Some(restart) = &self.restart {
                executor.put_job_context(RESTART_STEP_KEY, json!(restart));
            }
            if let Some(stopped_step) = stopped_step {
                executor.put_job_context(STOPPED_STEP_KEY, json!(stopped_step));
            }
            executor.persist_job_context().await?;

            if executor.is_restart() {
                info!(state = %self.name, "Restart reached the stop point, continuing");
                return Ok(FlowExecutionStatus::completed());
            }
            if self.abandon {
                executor.abandon_step_execution().await?;
            }
        }

        executor.add_exit_status(&self.code);
        Ok(self.status.clone())
    }

    fn is_end_state(&self) -> bool {
        true
    }
}
