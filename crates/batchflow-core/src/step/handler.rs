use std::sync::Arc;
use tracing::info;

use super::Step;
use crate::config::EngineConfig;
use crate::domain::execution::{JobExecution, StepExecution};
use crate::domain::repository::JobRepository;
use crate::domain::status::BatchStatus;
use crate::error::{CoreError, Result};

/// Decides whether a step runs in the current job execution and drives it.
///
/// On restart the previous execution of the step is looked up through the
/// repository. COMPLETED and ABANDONED steps are skipped, UNKNOWN steps
/// refuse to restart, and an unfinished step resumes from its previous
/// execution context.
pub struct StepHandler {
    repository: Arc<dyn JobRepository>,
    default_start_limit: u32,
}

impl StepHandler {
    /// New handler using the default start limit of `config`
    pub fn new(repository: Arc<dyn JobRepository>, config: &EngineConfig) -> Self {
        Self {
            repository,
            default_start_limit: config.default_start_limit,
        }
    }

    /// The repository steps are persisted through
    pub fn repository(&self) -> &Arc<dyn JobRepository> {
        &self.repository
    }

    /// Run `step` within `execution` unless it should be skipped. Returns the
    /// step execution that represents the step in this run: the new one, or
    /// the previous one when skipped.
    pub async fn handle_step(
        &self,
        step: &dyn Step,
        execution: &mut JobExecution,
    ) -> Result<StepExecution> {
        let instance = execution.job_instance.clone();
        let mut last_step_execution = self
            .repository
            .get_last_step_execution(&instance, step.name())
            .await?;

        if let Some(last) = &last_step_execution {
            if last.job_execution_id.is_some() && last.job_execution_id == execution.id {
                info!(
                    "Duplicate step [{}] detected in execution of job=[{}]. \
                     If either step fails, both will be executed again on restart.",
                    step.name(),
                    instance.job_name
                );
                last_step_execution = None;
            }
        }

        if !self
            .should_start(last_step_execution.as_ref(), execution, step)
            .await?
        {
            // Skipped; the previous execution stands for this step.
            return last_step_execution.ok_or_else(|| {
                CoreError::StepExecutionError(format!(
                    "No previous execution for skipped step {}",
                    step.name()
                ))
            });
        }

        let mut current = execution.create_step_execution(step.name());
        match &last_step_execution {
            Some(last) if last.status != BatchStatus::Completed => {
                current.execution_context = last.execution_context.clone();
            }
            _ => {}
        }

        self.repository.add_step_execution(&mut current).await?;
        execution.record_step_execution(&current);

        info!(step = %step.name(), job = %instance.job_name, "Executing step: [{}]", step.name());
        step.execute(&mut current).await?;
        execution.record_step_execution(&current);

        self.repository
            .update_job_execution_context(execution)
            .await?;

        Ok(current)
    }

    async fn should_start(
        &self,
        last_step_execution: Option<&StepExecution>,
        execution: &JobExecution,
        step: &dyn Step,
    ) -> Result<bool> {
        let step_status = last_step_execution
            .map(|last| last.status)
            .unwrap_or(BatchStatus::Starting);

        if step_status == BatchStatus::Unknown {
            return Err(CoreError::JobRestartError(format!(
                "Cannot restart step [{}] from UNKNOWN status. \
                 The last execution ended with a failure that could not be rolled back, \
                 so it may be dangerous to proceed. Manual intervention is probably necessary.",
                step.name()
            )));
        }

        if (step_status == BatchStatus::Completed && !step.allow_start_if_complete())
            || step_status == BatchStatus::Abandoned
        {
            info!(
                step = %step.name(),
                status = %step_status,
                "Step already complete or not restartable, so no action to execute"
            );
            return Ok(false);
        }

        let limit = step.start_limit().unwrap_or(self.default_start_limit);
        let count = self
            .repository
            .get_step_execution_count(&execution.job_instance, step.name())
            .await?;
        if (count as u64) < u64::from(limit) {
            Ok(true)
        } else {
            Err(CoreError::StartLimitExceeded(format!(
                "Maximum start limit exceeded for step: {} StartMax: {}",
                step.name(),
                limit
            )))
        }
    }
}
