use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::domain::execution::JobExecution;
use crate::domain::repository::JobRepository;
use crate::domain::status::{BatchStatus, ExitStatus};
use crate::error::Result;
use crate::flow::{Flow, JobFlowExecutor};
use crate::listener::{CompositeJobExecutionListener, JobExecutionListener};
use crate::step::StepHandler;

/// A runnable job
#[async_trait]
pub trait Job: Send + Sync {
    /// Job name
    fn name(&self) -> &str;

    /// Whether a new execution may be created for an instance that already
    /// has one
    fn is_restartable(&self) -> bool {
        true
    }

    /// Run an execution that the repository has already created. Failures
    /// of the job's own work end up on the returned execution; an `Err`
    /// means the execution could not be recorded.
    async fn execute(&self, execution: JobExecution) -> Result<JobExecution>;
}

/// A job whose work is a flow graph
pub struct FlowJob {
    /// Job name
    name: String,

    /// The flow to walk
    flow: Arc<Flow>,

    /// Whether the job may be restarted
    restartable: bool,

    /// Job listeners
    listeners: CompositeJobExecutionListener,

    /// Repository executions are persisted through
    repository: Arc<dyn JobRepository>,

    /// Shared step handler
    step_handler: Arc<StepHandler>,
}

impl FlowJob {
    /// Create a new flow job
    pub fn new(
        name: impl Into<String>,
        flow: Arc<Flow>,
        repository: Arc<dyn JobRepository>,
        config: &EngineConfig,
    ) -> Self {
        let step_handler = Arc::new(StepHandler::new(repository.clone(), config));
        Self {
            name: name.into(),
            flow,
            restartable: true,
            listeners: CompositeJobExecutionListener::new(),
            repository,
            step_handler,
        }
    }

    /// Register a job listener
    pub fn with_listener(mut self, listener: Arc<dyn JobExecutionListener>) -> Self {
        self.listeners.register(listener);
        self
    }

    /// Register a job listener with an explicit order
    pub fn with_ordered_listener(mut self, listener: Arc<dyn JobExecutionListener>, order: i32) -> Self {
        self.listeners.register_with_order(listener, order);
        self
    }

    /// Set whether the job may be restarted
    pub fn restartable(mut self, restartable: bool) -> Self {
        self.restartable = restartable;
        self
    }

    /// The flow
    pub fn flow(&self) -> &Arc<Flow> {
        &self.flow
    }

    async fn run_flow(&self, execution: JobExecution) -> (JobExecution, Result<()>) {
        if let Err(e) = self.listeners.before_job(&execution) {
            return (execution, Err(e));
        }

        let mut executor =
            JobFlowExecutor::new(self.repository.clone(), self.step_handler.clone(), execution);
        let outcome = match self.flow.start(&mut executor).await {
            Ok(result) => {
                executor.update_job_execution_status(&result.status);
                Ok(())
            }
            Err(e) => Err(e),
        };
        (executor.into_job_execution(), outcome)
    }
}

#[async_trait]
impl Job for FlowJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_restartable(&self) -> bool {
        self.restartable
    }

    async fn execute(&self, mut execution: JobExecution) -> Result<JobExecution> {
        info!(job = %self.name, execution_id = ?execution.id, "Job execution starting");

        execution.start_time = Some(Utc::now());
        execution.upgrade_status(BatchStatus::Started);
        self.repository.update_job_execution(&mut execution).await?;

        let (mut execution, outcome) = self.run_flow(execution).await;

        if let Err(e) = outcome {
            error!(job = %self.name, error = %e, "Encountered fatal error executing job");
            execution.upgrade_status(BatchStatus::Failed);
            execution.exit_status = ExitStatus::failed().add_exit_description(&e.to_string());
            execution.add_failure(&e);
        }

        if execution.status <= BatchStatus::Stopped && execution.step_executions.is_empty() {
            execution.exit_status = execution
                .exit_status
                .and(&ExitStatus::noop())
                .add_exit_description("All steps already completed or no steps configured for this job.");
        }

        if let Err(e) = self.listeners.after_job(&execution) {
            warn!(job = %self.name, error = %e, "Exception encountered in afterJob callback");
        }

        execution.end_time = Some(Utc::now());
        self.repository.update_job_execution(&mut execution).await?;

        info!(
            job = %self.name,
            status = %execution.status,
            exit_code = %execution.exit_status.exit_code(),
            "Job execution finished"
        );
        Ok(execution)
    }
}

impl std::fmt::Debug for FlowJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowJob")
            .field("name", &self.name)
            .field("restartable", &self.restartable)
            .finish()
    }
}
