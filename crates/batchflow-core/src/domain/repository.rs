//! Repository traits for the Batchflow engine
//!
//! `JobRepository` is the port the engine talks to. The DAO traits are the
//! storage-level contracts a backend implements; `SimpleJobRepository`
//! composes them into the engine port.

use async_trait::async_trait;

use super::execution::{JobExecution, JobInstance, StepExecution};
use super::execution_context::ExecutionContext;
use super::job_parameters::JobParameters;
use crate::CoreError;

/// Persistence port used by flows, steps and the partition handler
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Whether an instance exists for the name and identifying parameters
    async fn is_job_instance_exists(
        &self,
        job_name: &str,
        params: &JobParameters,
    ) -> Result<bool, CoreError>;

    /// Create a job instance. Fails with `DuplicateJobInstance` when one
    /// already exists for the same name and key.
    async fn create_job_instance(
        &self,
        job_name: &str,
        params: &JobParameters,
    ) -> Result<JobInstance, CoreError>;

    /// Create and save a new execution, finding or creating its instance.
    /// The previous execution's context is carried forward on restart.
    async fn create_job_execution(
        &self,
        job_name: &str,
        params: &JobParameters,
    ) -> Result<JobExecution, CoreError>;

    /// Save a new job execution, assigning its id and version
    async fn save_job_execution(&self, execution: &mut JobExecution) -> Result<(), CoreError>;

    /// Version-checked update of a job execution
    async fn update_job_execution(&self, execution: &mut JobExecution) -> Result<(), CoreError>;

    /// Save a new step execution and its context
    async fn add_step_execution(&self, execution: &mut StepExecution) -> Result<(), CoreError>;

    /// Save several new step executions
    async fn add_step_executions(&self, executions: &mut [StepExecution]) -> Result<(), CoreError>;

    /// Version-checked update of a step execution
    async fn update_step_execution(&self, execution: &mut StepExecution) -> Result<(), CoreError>;

    /// Persist the step execution context
    async fn update_step_execution_context(
        &self,
        execution: &mut StepExecution,
    ) -> Result<(), CoreError>;

    /// Persist the job execution context
    async fn update_job_execution_context(
        &self,
        execution: &mut JobExecution,
    ) -> Result<(), CoreError>;

    /// Job instance by id
    async fn get_job_instance(&self, instance_id: i64) -> Result<Option<JobInstance>, CoreError>;

    /// Most recent execution of a step within an instance, with its context
    async fn get_last_step_execution(
        &self,
        instance: &JobInstance,
        step_name: &str,
    ) -> Result<Option<StepExecution>, CoreError>;

    /// Number of executions of a step within an instance
    async fn get_step_execution_count(
        &self,
        instance: &JobInstance,
        step_name: &str,
    ) -> Result<usize, CoreError>;

    /// Most recent execution of the instance identified by name and parameters
    async fn get_last_job_execution(
        &self,
        job_name: &str,
        params: &JobParameters,
    ) -> Result<Option<JobExecution>, CoreError>;

    /// All executions of an instance, newest first, with step executions
    async fn get_job_executions(&self, instance: &JobInstance)
        -> Result<Vec<JobExecution>, CoreError>;

    /// A single step execution of a job execution, with its context
    async fn get_step_execution(
        &self,
        job_execution_id: i64,
        step_execution_id: i64,
    ) -> Result<Option<StepExecution>, CoreError>;
}

/// Storage of job instances
#[async_trait]
pub trait JobInstanceDao: Send + Sync {
    /// Create an instance; `DuplicateJobInstance` if one already exists
    async fn create_job_instance(
        &self,
        job_name: &str,
        params: &JobParameters,
    ) -> Result<JobInstance, CoreError>;

    /// Find the instance for the name and identifying parameters
    async fn get_job_instance(
        &self,
        job_name: &str,
        params: &JobParameters,
    ) -> Result<Option<JobInstance>, CoreError>;

    /// Find an instance by id
    async fn get_job_instance_by_id(&self, id: i64) -> Result<Option<JobInstance>, CoreError>;
}

/// Storage of job executions
#[async_trait]
pub trait JobExecutionDao: Send + Sync {
    /// Insert; assigns id and version 0
    async fn save_job_execution(&self, execution: &mut JobExecution) -> Result<(), CoreError>;

    /// Update conditioned on the caller's version; increments it on success
    async fn update_job_execution(&self, execution: &mut JobExecution) -> Result<(), CoreError>;

    /// Executions of an instance, newest first, without step executions
    async fn find_job_executions(&self, instance_id: i64) -> Result<Vec<JobExecution>, CoreError>;

    /// Most recently created execution of an instance
    async fn get_last_job_execution(
        &self,
        instance_id: i64,
    ) -> Result<Option<JobExecution>, CoreError>;

    /// Execution by id
    async fn get_job_execution(&self, id: i64) -> Result<Option<JobExecution>, CoreError>;
}

/// Storage of step executions
#[async_trait]
pub trait StepExecutionDao: Send + Sync {
    /// Insert; assigns id and version 0
    async fn save_step_execution(&self, execution: &mut StepExecution) -> Result<(), CoreError>;

    /// Insert several executions
    async fn save_step_executions(&self, executions: &mut [StepExecution]) -> Result<(), CoreError> {
        for execution in executions.iter_mut() {
            self.save_step_execution(execution).await?;
        }
        Ok(())
    }

    /// Update conditioned on the caller's version; increments it on success
    async fn update_step_execution(&self, execution: &mut StepExecution) -> Result<(), CoreError>;

    /// Step execution by owning job execution and id
    async fn get_step_execution(
        &self,
        job_execution_id: i64,
        step_execution_id: i64,
    ) -> Result<Option<StepExecution>, CoreError>;

    /// Step executions of a job execution in creation order
    async fn find_step_executions(
        &self,
        job_execution_id: i64,
    ) -> Result<Vec<StepExecution>, CoreError>;

    /// Latest execution of a step across an instance. Ties on start time are
    /// broken by the higher id.
    async fn get_last_step_execution(
        &self,
        instance_id: i64,
        step_name: &str,
    ) -> Result<Option<StepExecution>, CoreError>;

    /// Number of executions of a step across an instance
    async fn count_step_executions(
        &self,
        instance_id: i64,
        step_name: &str,
    ) -> Result<usize, CoreError>;
}

/// Storage of serialized execution contexts
#[async_trait]
pub trait ExecutionContextDao: Send + Sync {
    /// Context of a job execution; empty if none was stored
    async fn get_job_execution_context(
        &self,
        job_execution_id: i64,
    ) -> Result<ExecutionContext, CoreError>;

    /// Context of a step execution; empty if none was stored
    async fn get_step_execution_context(
        &self,
        step_execution_id: i64,
    ) -> Result<ExecutionContext, CoreError>;

    /// Insert or replace the context of a job execution
    async fn save_job_execution_context(
        &self,
        job_execution_id: i64,
        context: &ExecutionContext,
    ) -> Result<(), CoreError>;

    /// Insert or replace the context of a step execution
    async fn save_step_execution_context(
        &self,
        step_execution_id: i64,
        context: &ExecutionContext,
    ) -> Result<(), CoreError>;
}
