use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::{Step, StepBody};
use crate::domain::execution::StepExecution;
use crate::domain::repository::JobRepository;
use crate::domain::status::{BatchStatus, ExitStatus};
use crate::error::Result;
use crate::listener::{Listener, StepListenerDispatcher};

/// Step that runs a single `StepBody` and records its outcome
pub struct TaskletStep {
    name: String,
    body: Arc<dyn StepBody>,
    repository: Arc<dyn JobRepository>,
    listeners: StepListenerDispatcher,
    start_limit: Option<u32>,
    allow_start_if_complete: bool,
}

impl TaskletStep {
    /// New step with no listeners
    pub fn new(
        name: impl Into<String>,
        body: Arc<dyn StepBody>,
        repository: Arc<dyn JobRepository>,
    ) -> Self {
        Self {
            name: name.into(),
            body,
            repository,
            listeners: StepListenerDispatcher::new(),
            start_limit: None,
            allow_start_if_complete: false,
        }
    }

    /// Register a listener
    pub fn with_listener(mut self, listener: Listener) -> Self {
        self.listeners.register(listener);
        self
    }

    /// Register a listener with an explicit order
    pub fn with_ordered_listener(mut self, listener: Listener, order: i32) -> Self {
        self.listeners.register_with_order(listener, order);
        self
    }

    /// Limit the number of executions across restarts
    pub fn with_start_limit(mut self, start_limit: u32) -> Self {
        self.start_limit = Some(start_limit);
        self
    }

    /// Run again on restart even when COMPLETED
    pub fn allowing_start_if_complete(mut self, allow: bool) -> Self {
        self.allow_start_if_complete = allow;
        self
    }

    async fn run_body(&self, step_execution: &mut StepExecution) -> Result<ExitStatus> {
        self.listeners.before_step(step_execution)?;
        self.body.run(step_execution, &self.listeners).await
    }
}

#[async_trait]
impl Step for TaskletStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn start_limit(&self) -> Option<u32> {
        self.start_limit
    }

    fn allow_start_if_complete(&self) -> bool {
        self.allow_start_if_complete
    }

    async fn execute(&self, step_execution: &mut StepExecution) -> Result<()> {
        debug!(step = %self.name, "Executing step");
        step_execution.start_time = Some(Utc::now());
        step_execution.status = BatchStatus::Started;
        self.repository.update_step_execution(step_execution).await?;

        let mut exit_status = ExitStatus::executing();
        match self.run_body(step_execution).await {
            Ok(body_status) => {
                step_execution.exit_status = body_status;
                exit_status = ExitStatus::completed().and(&step_execution.exit_status);
                step_execution.upgrade_status(BatchStatus::Completed);
            }
            Err(e) => {
                error!(step = %self.name, "Encountered an error executing step: {}", e);
                step_execution.upgrade_status(BatchStatus::Failed);
                exit_status =
                    exit_status.and(&ExitStatus::with_description(ExitStatus::FAILED, e.to_string()));
                step_execution.add_failure(&e);
            }
        }

        exit_status = exit_status.and(&step_execution.exit_status);
        step_execution.exit_status = exit_status.clone();
        match self.listeners.after_step(step_execution) {
            Ok(Some(close)) => exit_status = exit_status.and(&close),
            Ok(None) => {}
            Err(e) => error!(step = %self.name, "Exception in after_step callback: {}", e),
        }

        if let Err(e) = self.repository.update_step_execution_context(step_execution).await {
            step_execution.status = BatchStatus::Unknown;
            exit_status = exit_status.and(&ExitStatus::unknown());
            step_execution.add_failure(&e);
            error!(
                step = %self.name,
                "Encountered an error saving batch meta data for step. \
                 This job is now in an unknown state and should not be restarted: {}",
                e
            );
        }

        step_execution.end_time = Some(Utc::now());
        step_execution.exit_status = exit_status.clone();

        if let Err(e) = self.repository.update_step_execution(step_execution).await {
            step_execution.status = BatchStatus::Unknown;
            step_execution.exit_status = exit_status.and(&ExitStatus::unknown());
            step_execution.add_failure(&e);
            error!(
                step = %self.name,
                "Encountered an error saving batch meta data for step. \
                 This job is now in an unknown state and should not be restarted: {}",
                e
            );
        }

        info!(
            step = %self.name,
            status = %step_execution.status,
            exit_code = %step_execution.exit_status.exit_code(),
            "Step finished"
        );
        Ok(())
    }
}
