use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::status::{FlowExecution, FlowExecutionStatus};
use crate::domain::execution::{JobExecution, StepExecution};
use crate::domain::execution_context::ExecutionContext;
use crate::domain::repository::JobRepository;
use crate::domain::status::{BatchStatus, ExitStatus};
use crate::error::Result;
use crate::step::{Step, StepHandler};

/// State carried along one path of a flow walk.
///
/// Holds the working copy of the job execution. Parallel sub-flows each get
/// a fork; their step executions and job context writes come back to the
/// parent through `merge`.
pub struct JobFlowExecutor {
    repository: Arc<dyn JobRepository>,
    step_handler: Arc<StepHandler>,
    execution: JobExecution,
    step_execution: Option<StepExecution>,
    exit_status: Option<ExitStatus>,
    context_delta: ExecutionContext,
    forked_at: usize,
}

impl JobFlowExecutor {
    /// Executor for a job execution
    pub fn new(
        repository: Arc<dyn JobRepository>,
        step_handler: Arc<StepHandler>,
        execution: JobExecution,
    ) -> Self {
        Self {
            repository,
            step_handler,
            execution,
            step_execution: None,
            exit_status: None,
            context_delta: ExecutionContext::new(),
            forked_at: 0,
        }
    }

    /// The repository
    pub fn repository(&self) -> &Arc<dyn JobRepository> {
        &self.repository
    }

    /// The working job execution
    pub fn job_execution(&self) -> &JobExecution {
        &self.execution
    }

    /// Mutable access to the working job execution
    pub fn job_execution_mut(&mut self) -> &mut JobExecution {
        &mut self.execution
    }

    /// Give back the job execution
    pub fn into_job_execution(self) -> JobExecution {
        self.execution
    }

    /// The step execution most recently handled on this path
    pub fn step_execution(&self) -> Option<&StepExecution> {
        self.step_execution.as_ref()
    }

    /// Accumulated job exit status, `None` when nothing has set it
    pub fn exit_status(&self) -> Option<&ExitStatus> {
        self.exit_status.as_ref()
    }

    /// Forget the accumulated job exit status
    pub fn reset_exit_status(&mut self) {
        self.exit_status = None;
    }

    /// Job context writes made through this executor
    pub fn context_delta(&self) -> &ExecutionContext {
        &self.context_delta
    }

    /// Write a job context entry and remember it in the delta
    pub fn put_job_context(&mut self, key: &str, value: Value) {
        self.execution.execution_context.put(key, value.clone());
        self.context_delta.put(key, value);
    }

    /// Persist the job context
    pub async fn persist_job_context(&mut self) -> Result<()> {
        self.repository
            .update_job_execution_context(&mut self.execution)
            .await
    }

    /// Run a step through the step handler and return its exit code
    pub async fn execute_step(&mut self, step: &dyn Step) -> Result<String> {
        let step_execution = self
            .step_handler
            .handle_step(step, &mut self.execution)
            .await?;
        let exit_code = step_execution.exit_status.exit_code().to_string();
        debug!(step = %step.name(), exit_code = %exit_code, "Step handled");
        self.step_execution = Some(step_execution);
        Ok(exit_code)
    }

    /// Mark the last step execution ABANDONED so a restart skips it instead
    /// of running it again. Only finished, unsuccessful executions qualify.
    pub async fn abandon_step_execution(&mut self) -> Result<()> {
        if let Some(step_execution) = self.step_execution.as_mut() {
            if step_execution.status.is_greater_than(BatchStatus::Stopping) {
                step_execution.upgrade_status(BatchStatus::Abandoned);
                self.repository.update_step_execution(step_execution).await?;
                let updated = step_execution.clone();
                self.execution.record_step_execution(&updated);
                debug!(step = %updated.step_name, "Abandoned step execution");
            }
        }
        Ok(())
    }

    /// Whether this run restarts a stopped one: the last step is ABANDONED,
    /// or nothing has run yet in this job execution
    pub fn is_restart(&self) -> bool {
        if let Some(step_execution) = &self.step_execution {
            if step_execution.status == BatchStatus::Abandoned {
                return true;
            }
        }
        self.execution.step_executions.is_empty()
    }

    /// Set the job exit code unless a custom one is already in place
    pub fn add_exit_status(&mut self, code: &str) {
        let status = ExitStatus::new(code);
        self.exit_status = Some(match self.exit_status.take() {
            Some(current) if current.is_non_default() => current,
            Some(current) => current.and(&status),
            None => status,
        });
    }

    /// Record the final flow status on the job execution
    pub fn update_job_execution_status(&mut self, status: &FlowExecutionStatus) {
        self.execution.status = status.batch_status();
        let flow_exit = ExitStatus::new(status.name());
        let exit_status = match self.exit_status.take() {
            Some(current) if current.is_non_default() => current,
            Some(current) => current.and(&flow_exit),
            None => flow_exit,
        };
        self.execution.exit_status = exit_status.clone();
        self.exit_status = Some(exit_status);
    }

    /// Called when a flow finishes
    pub fn close(&mut self, result: &FlowExecution) {
        debug!(state = %result.name, status = %result.status, "Flow closed");
        self.step_execution = None;
    }

    /// Executor for a parallel sub-flow, starting from the current state of
    /// this one with an empty delta
    pub fn fork(&self) -> JobFlowExecutor {
        JobFlowExecutor {
            repository: self.repository.clone(),
            step_handler: self.step_handler.clone(),
            execution: self.execution.clone(),
            step_execution: self.step_execution.clone(),
            exit_status: None,
            context_delta: ExecutionContext::new(),
            forked_at: self.execution.step_executions.len(),
        }
    }

    /// Take over the results of a finished fork: its step executions and its
    /// job context writes. Returns the name of the most recent step the fork
    /// ran, if any.
    pub fn merge(&mut self, child: JobFlowExecutor) -> Option<String> {
        let produced = child
            .execution
            .step_executions
            .get(child.forked_at..)
            .unwrap_or_default();
        let last_step = produced
            .last()
            .map(|step_execution| step_execution.step_name.clone());

        for step_execution in produced {
            self.execution.record_step_execution(step_execution);
        }
        self.execution.execution_context.merge(&child.context_delta);
        self.context_delta.merge(&child.context_delta);
        last_step
    }
}
