use crate::{
    domain::execution::JobExecution, domain::job_parameters::JobParameters,
    domain::repository::JobRepository, domain::status::BatchStatus, job::Job, CoreError,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

/// Launches jobs.
///
/// Creating the execution goes through the repository, which refuses to
/// start an instance that is running, complete or in an unknown state.
#[derive(Clone)]
pub struct JobLauncher {
    /// Repository executions are created through
    repository: Arc<dyn JobRepository>,
}

impl JobLauncher {
    /// Create a new launcher
    pub fn new(repository: Arc<dyn JobRepository>) -> Self {
        Self { repository }
    }

    /// Create an execution for `job` with `parameters` and run it to the end
    #[instrument(skip(self, job, parameters), fields(job = %job.name()))]
    pub async fn run(
        &self,
        job: Arc<dyn Job>,
        parameters: JobParameters,
    ) -> Result<JobExecution, CoreError> {
        let execution = self.create_execution(job.as_ref(), parameters).await?;
        job.execute(execution).await
    }

    /// Create an execution for `job` and run it on its own task. Restart
    /// checks happen before this returns.
    pub async fn spawn(
        &self,
        job: Arc<dyn Job>,
        parameters: JobParameters,
    ) -> Result<JoinHandle<Result<JobExecution, CoreError>>, CoreError> {
        let execution = self.create_execution(job.as_ref(), parameters).await?;
        Ok(tokio::spawn(async move { job.execute(execution).await }))
    }

    async fn create_execution(
        &self,
        job: &dyn Job,
        parameters: JobParameters,
    ) -> Result<JobExecution, CoreError> {
        let last_execution = self
            .repository
            .get_last_job_execution(job.name(), &parameters)
            .await?;

        if let Some(last) = last_execution {
            if !job.is_restartable() {
                return Err(CoreError::JobRestartError(format!(
                    "JobInstance already exists and is not restartable: {}",
                    job.name()
                )));
            }
            // An UNKNOWN step cannot be restarted safely.
            if let Some(step) = last
                .step_executions
                .iter()
                .find(|step| step.status == BatchStatus::Unknown)
            {
                return Err(CoreError::JobRestartError(format!(
                    "Step [{}] is of status UNKNOWN",
                    step.step_name
                )));
            }
            info!(
                job = %job.name(),
                last_execution_id = ?last.id,
                last_status = %last.status,
                "Restarting job instance"
            );
        }

        self.repository
            .create_job_execution(job.name(), &parameters)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::status::ExitStatus;
    use crate::test_support::{saved_job_execution, MockRepository};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob {
        restartable: bool,
        runs: AtomicUsize,
    }

    #[async_trait]
    impl Job for CountingJob {
        fn name(&self) -> &str {
            "job"
        }

        fn is_restartable(&self) -> bool {
            self.restartable
        }

        async fn execute(&self, mut execution: JobExecution) -> Result<JobExecution, CoreError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            execution.status = BatchStatus::Completed;
            execution.exit_status = ExitStatus::completed();
            Ok(execution)
        }
    }

    fn job(restartable: bool) -> Arc<CountingJob> {
        Arc::new(CountingJob {
            restartable,
            runs: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_run_creates_and_executes() {
        let mut repository = MockRepository::new();
        repository
            .expect_get_last_job_execution()
            .returning(|_, _| Ok(None));
        repository
            .expect_create_job_execution()
            .times(1)
            .returning(|name, _| Ok(saved_job_execution(name)));
        let launcher = JobLauncher::new(Arc::new(repository));
        let job = job(false);

        let execution = launcher
            .run(job.clone(), JobParameters::new())
            .await
            .unwrap();

        assert_eq!(execution.status, BatchStatus::Completed);
        assert_eq!(job.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_restartable_job_refused() {
        let mut repository = MockRepository::new();
        repository
            .expect_get_last_job_execution()
            .returning(|name, _| Ok(Some(saved_job_execution(name))));
        repository.expect_create_job_execution().never();
        let launcher = JobLauncher::new(Arc::new(repository));
        let job = job(false);

        let result = launcher.run(job.clone(), JobParameters::new()).await;

        assert!(matches!(result, Err(CoreError::JobRestartError(_))));
        assert_eq!(job.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_step_blocks_restart() {
        let mut repository = MockRepository::new();
        repository.expect_get_last_job_execution().returning(|name, _| {
            let mut last = saved_job_execution(name);
            let mut step = last.create_step_execution("step");
            step.id = Some(1);
            step.status = BatchStatus::Unknown;
            last.record_step_execution(&step);
            Ok(Some(last))
        });
        let launcher = JobLauncher::new(Arc::new(repository));

        let result = launcher.run(job(true), JobParameters::new()).await;
        assert!(matches!(result, Err(CoreError::JobRestartError(_))));
    }

    #[tokio::test]
    async fn test_spawn_runs_on_its_own_task() {
        let mut repository = MockRepository::new();
        repository
            .expect_get_last_job_execution()
            .returning(|_, _| Ok(None));
        repository
            .expect_create_job_execution()
            .returning(|name, _| Ok(saved_job_execution(name)));
        let launcher = JobLauncher::new(Arc::new(repository));

        let handle = launcher
            .spawn(job(true), JobParameters::new())
            .await
            .unwrap();
        let execution = handle.await.unwrap().unwrap();
        assert_eq!(execution.status, BatchStatus::Completed);
    }
}
