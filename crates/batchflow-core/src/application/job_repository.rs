use crate::{
    domain::execution::{JobExecution, JobInstance, StepExecution},
    domain::job_parameters::JobParameters,
    domain::repository::{
        ExecutionContextDao, JobExecutionDao, JobInstanceDao, JobRepository, StepExecutionDao,
    },
    domain::status::BatchStatus,
    CoreError,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Job repository composed from the four storage DAOs.
///
/// Optimistic locking failures reported by the DAOs are surfaced to the
/// caller as-is; this type never retries.
#[derive(Clone)]
pub struct SimpleJobRepository {
    job_instance_dao: Arc<dyn JobInstanceDao>,
    job_execution_dao: Arc<dyn JobExecutionDao>,
    step_execution_dao: Arc<dyn StepExecutionDao>,
    execution_context_dao: Arc<dyn ExecutionContextDao>,
}

impl SimpleJobRepository {
    /// Create a new repository over the given DAOs
    pub fn new(
        job_instance_dao: Arc<dyn JobInstanceDao>,
        job_execution_dao: Arc<dyn JobExecutionDao>,
        step_execution_dao: Arc<dyn StepExecutionDao>,
        execution_context_dao: Arc<dyn ExecutionContextDao>,
    ) -> Self {
        Self {
            job_instance_dao,
            job_execution_dao,
            step_execution_dao,
            execution_context_dao,
        }
    }

    fn validate_step_execution(execution: &StepExecution) -> Result<(), CoreError> {
        if execution.step_name.is_empty() {
            return Err(CoreError::ValidationError(
                "StepExecution step name cannot be empty".to_string(),
            ));
        }
        if execution.job_execution_id.is_none() {
            return Err(CoreError::ValidationError(format!(
                "StepExecution {} must belong to a saved JobExecution",
                execution.step_name
            )));
        }
        Ok(())
    }

    /// Load step executions and contexts into a job execution
    async fn hydrate(&self, execution: &mut JobExecution) -> Result<(), CoreError> {
        let id = execution.require_id()?;
        execution.execution_context = self
            .execution_context_dao
            .get_job_execution_context(id)
            .await?;

        let mut step_executions = self.step_execution_dao.find_step_executions(id).await?;
        for step_execution in step_executions.iter_mut() {
            let step_id = step_execution.require_id()?;
            step_execution.execution_context = self
                .execution_context_dao
                .get_step_execution_context(step_id)
                .await?;
        }
        execution.step_executions = step_executions;
        Ok(())
    }
}

#[async_trait]
impl JobRepository for SimpleJobRepository {
    async fn is_job_instance_exists(
        &self,
        job_name: &str,
        params: &JobParameters,
    ) -> Result<bool, CoreError> {
        Ok(self
            .job_instance_dao
            .get_job_instance(job_name, params)
            .await?
            .is_some())
    }

    async fn create_job_instance(
        &self,
        job_name: &str,
        params: &JobParameters,
    ) -> Result<JobInstance, CoreError> {
        self.job_instance_dao
            .create_job_instance(job_name, params)
            .await
    }

    async fn create_job_execution(
        &self,
        job_name: &str,
        params: &JobParameters,
    ) -> Result<JobExecution, CoreError> {
        if job_name.is_empty() {
            return Err(CoreError::ValidationError(
                "Job name must not be empty".to_string(),
            ));
        }

        let (instance, context) = match self
            .job_instance_dao
            .get_job_instance(job_name, params)
            .await?
        {
            Some(instance) => {
                let executions = self
                    .job_execution_dao
                    .find_job_executions(instance.id)
                    .await?;

                for execution in &executions {
                    if execution.is_running() {
                        return Err(CoreError::JobExecutionAlreadyRunning(format!(
                            "A job execution for this job is already running: {}",
                            instance.job_name
                        )));
                    }
                    match execution.status {
                        BatchStatus::Completed | BatchStatus::Abandoned => {
                            return Err(CoreError::JobInstanceAlreadyComplete(format!(
                                "A job instance already exists and is complete for parameters={}. \
                                 If you want to run this job again, change the parameters.",
                                params
                            )));
                        }
                        BatchStatus::Unknown => {
                            return Err(CoreError::JobRestartError(format!(
                                "Cannot restart job from UNKNOWN status. \
                                 The last execution ended with a failure that could not be rolled back, \
                                 so it may be dangerous to proceed. Manual intervention is probably necessary. \
                                 Job instance id={}",
                                instance.id
                            )));
                        }
                        _ => {}
                    }
                }

                let context = match self
                    .job_execution_dao
                    .get_last_job_execution(instance.id)
                    .await?
                {
                    Some(last) => {
                        let last_id = last.require_id()?;
                        self.execution_context_dao
                            .get_job_execution_context(last_id)
                            .await?
                    }
                    None => Default::default(),
                };
                debug!(
                    job = %job_name,
                    instance_id = instance.id,
                    "Restarting existing job instance"
                );
                (instance, context)
            }
            None => {
                let instance = self
                    .job_instance_dao
                    .create_job_instance(job_name, params)
                    .await?;
                (instance, Default::default())
            }
        };

        let mut execution = JobExecution::new(instance, params.clone());
        execution.execution_context = context;
        execution.last_updated = Some(Utc::now());

        self.job_execution_dao
            .save_job_execution(&mut execution)
            .await?;
        let id = execution.require_id()?;
        self.execution_context_dao
            .save_job_execution_context(id, &execution.execution_context)
            .await?;
        execution.execution_context.clear_dirty_flag();

        info!(
            job = %job_name,
            execution_id = id,
            instance_id = execution.job_instance.id,
            "Created job execution"
        );
        Ok(execution)
    }

    async fn save_job_execution(&self, execution: &mut JobExecution) -> Result<(), CoreError> {
        if execution.id.is_some() {
            return Err(CoreError::ValidationError(
                "JobExecution is already saved; use update_job_execution".to_string(),
            ));
        }
        execution.last_updated = Some(Utc::now());
        self.job_execution_dao.save_job_execution(execution).await?;
        let id = execution.require_id()?;
        self.execution_context_dao
            .save_job_execution_context(id, &execution.execution_context)
            .await?;
        execution.execution_context.clear_dirty_flag();
        Ok(())
    }

    async fn update_job_execution(&self, execution: &mut JobExecution) -> Result<(), CoreError> {
        execution.require_id()?;
        if execution.version.is_none() {
            return Err(CoreError::ValidationError(
                "JobExecution must have a version to be updated".to_string(),
            ));
        }
        execution.last_updated = Some(Utc::now());
        if let Err(e) = self.job_execution_dao.update_job_execution(execution).await {
            if e.is_optimistic_locking_failure() {
                warn!(job = %execution.job_name(), "Job execution update conflict: {}", e);
            }
            return Err(e);
        }
        Ok(())
    }

    async fn add_step_execution(&self, execution: &mut StepExecution) -> Result<(), CoreError> {
        Self::validate_step_execution(execution)?;
        if execution.id.is_some() {
            return Err(CoreError::ValidationError(format!(
                "StepExecution {} is already saved; use update_step_execution",
                execution.step_name
            )));
        }
        execution.last_updated = Some(Utc::now());
        self.step_execution_dao.save_step_execution(execution).await?;
        let id = execution.require_id()?;
        self.execution_context_dao
            .save_step_execution_context(id, &execution.execution_context)
            .await?;
        execution.execution_context.clear_dirty_flag();
        Ok(())
    }

    async fn add_step_executions(&self, executions: &mut [StepExecution]) -> Result<(), CoreError> {
        for execution in executions.iter() {
            Self::validate_step_execution(execution)?;
            if execution.id.is_some() {
                return Err(CoreError::ValidationError(format!(
                    "StepExecution {} is already saved",
                    execution.step_name
                )));
            }
        }
        let now = Utc::now();
        for execution in executions.iter_mut() {
            execution.last_updated = Some(now);
        }
        self.step_execution_dao
            .save_step_executions(executions)
            .await?;
        for execution in executions.iter_mut() {
            let id = execution.require_id()?;
            self.execution_context_dao
                .save_step_execution_context(id, &execution.execution_context)
                .await?;
            execution.execution_context.clear_dirty_flag();
        }
        Ok(())
    }

    async fn update_step_execution(&self, execution: &mut StepExecution) -> Result<(), CoreError> {
        Self::validate_step_execution(execution)?;
        execution.require_id()?;
        execution.last_updated = Some(Utc::now());
        if let Err(e) = self.step_execution_dao.update_step_execution(execution).await {
            if e.is_optimistic_locking_failure() {
                warn!(step = %execution.step_name, "Step execution update conflict: {}", e);
            }
            return Err(e);
        }
        Ok(())
    }

    async fn update_step_execution_context(
        &self,
        execution: &mut StepExecution,
    ) -> Result<(), CoreError> {
        let id = execution.require_id()?;
        self.execution_context_dao
            .save_step_execution_context(id, &execution.execution_context)
            .await?;
        execution.execution_context.clear_dirty_flag();
        Ok(())
    }

    async fn update_job_execution_context(
        &self,
        execution: &mut JobExecution,
    ) -> Result<(), CoreError> {
        let id = execution.require_id()?;
        self.execution_context_dao
            .save_job_execution_context(id, &execution.execution_context)
            .await?;
        execution.execution_context.clear_dirty_flag();
        Ok(())
    }

    async fn get_job_instance(&self, instance_id: i64) -> Result<Option<JobInstance>, CoreError> {
        self.job_instance_dao
            .get_job_instance_by_id(instance_id)
            .await
    }

    async fn get_last_step_execution(
        &self,
        instance: &JobInstance,
        step_name: &str,
    ) -> Result<Option<StepExecution>, CoreError> {
        let latest = self
            .step_execution_dao
            .get_last_step_execution(instance.id, step_name)
            .await?;
        match latest {
            Some(mut execution) => {
                let id = execution.require_id()?;
                execution.execution_context = self
                    .execution_context_dao
                    .get_step_execution_context(id)
                    .await?;
                Ok(Some(execution))
            }
            None => Ok(None),
        }
    }

    async fn get_step_execution_count(
        &self,
        instance: &JobInstance,
        step_name: &str,
    ) -> Result<usize, CoreError> {
        self.step_execution_dao
            .count_step_executions(instance.id, step_name)
            .await
    }

    async fn get_last_job_execution(
        &self,
        job_name: &str,
        params: &JobParameters,
    ) -> Result<Option<JobExecution>, CoreError> {
        let instance = match self
            .job_instance_dao
            .get_job_instance(job_name, params)
            .await?
        {
            Some(instance) => instance,
            None => return Ok(None),
        };
        match self
            .job_execution_dao
            .get_last_job_execution(instance.id)
            .await?
        {
            Some(mut execution) => {
                self.hydrate(&mut execution).await?;
                Ok(Some(execution))
            }
            None => Ok(None),
        }
    }

    async fn get_job_executions(
        &self,
        instance: &JobInstance,
    ) -> Result<Vec<JobExecution>, CoreError> {
        let mut executions = self
            .job_execution_dao
            .find_job_executions(instance.id)
            .await?;
        for execution in executions.iter_mut() {
            self.hydrate(execution).await?;
        }
        Ok(executions)
    }

    async fn get_step_execution(
        &self,
        job_execution_id: i64,
        step_execution_id: i64,
    ) -> Result<Option<StepExecution>, CoreError> {
        match self
            .step_execution_dao
            .get_step_execution(job_execution_id, step_execution_id)
            .await?
        {
            Some(mut execution) => {
                execution.execution_context = self
                    .execution_context_dao
                    .get_step_execution_context(step_execution_id)
                    .await?;
                Ok(Some(execution))
            }
            None => Ok(None),
        }
    }
}
