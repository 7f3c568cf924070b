use async_trait::async_trait;
use mockall::mock;

use crate::domain::execution::{JobExecution, JobInstance, StepExecution};
use crate::domain::job_parameters::JobParameters;
use crate::domain::repository::JobRepository;
use crate::error::Result;

mock! {
    pub Repository {}

    #[async_trait]
    impl JobRepository for Repository {
        async fn is_job_instance_exists(&self, job_name: &str, params: &JobParameters) -> Result<bool>;
        async fn create_job_instance(&self, job_name: &str, params: &JobParameters) -> Result<JobInstance>;
        async fn create_job_execution(&self, job_name: &str, params: &JobParameters) -> Result<JobExecution>;
        async fn save_job_execution(&self, execution: &mut JobExecution) -> Result<()>;
        async fn update_job_execution(&self, execution: &mut JobExecution) -> Result<()>;
        async fn add_step_execution(&self, execution: &mut StepExecution) -> Result<()>;
        async fn add_step_executions(&self, executions: &mut [StepExecution]) -> Result<()>;
        async fn update_step_execution(&self, execution: &mut StepExecution) -> Result<()>;
        async fn update_step_execution_context(&self, execution: &mut StepExecution) -> Result<()>;
        async fn update_job_execution_context(&self, execution: &mut JobExecution) -> Result<()>;
        async fn get_job_instance(&self, instance_id: i64) -> Result<Option<JobInstance>>;
        async fn get_last_step_execution(&self, instance: &JobInstance, step_name: &str) -> Result<Option<StepExecution>>;
        async fn get_step_execution_count(&self, instance: &JobInstance, step_name: &str) -> Result<usize>;
        async fn get_last_job_execution(&self, job_name: &str, params: &JobParameters) -> Result<Option<JobExecution>>;
        async fn get_job_executions(&self, instance: &JobInstance) -> Result<Vec<JobExecution>>;
        async fn get_step_execution(&self, job_execution_id: i64, step_execution_id: i64) -> Result<Option<StepExecution>>;
    }
}

/// A job execution that looks like it came out of the repository
pub fn saved_job_execution(job_name: &str) -> JobExecution {
    let params = JobParameters::new();
    let instance = JobInstance {
        id: 1,
        job_name: job_name.to_string(),
        job_key: params.job_key(),
        version: 0,
    };
    let mut execution = JobExecution::new(instance, params);
    execution.id = Some(1);
    execution.version = Some(0);
    execution
}
