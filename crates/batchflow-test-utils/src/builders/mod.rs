//! Builders for test environments.

use batchflow_core::{
    Flow, FlowBuilder, FlowJob, Job, JobExecution, JobLauncher, JobParameters, JobRepository,
    StepBody, TaskletStep,
};
use batchflow_state_inmemory::InMemoryStateStoreProvider;
use std::sync::Arc;

use crate::config::TestConfig;
use crate::error::TestError;

/// An in-memory store, the repository over it and a launcher
pub struct TestEnvironment {
    /// Settings of this environment
    pub config: TestConfig,
    /// The backing store, for inspecting persisted rows
    pub provider: InMemoryStateStoreProvider,
    /// Repository shared by every job built here
    pub repository: Arc<dyn JobRepository>,
    /// Launcher over the repository
    pub launcher: JobLauncher,
}

impl TestEnvironment {
    /// Environment with the default configuration
    pub fn new() -> Self {
        Self::with_config(TestConfig::default())
    }

    /// Environment with a custom configuration
    pub fn with_config(config: TestConfig) -> Self {
        let provider = InMemoryStateStoreProvider::with_config(&config.engine);
        let repository = provider.create_repository();
        let launcher = JobLauncher::new(repository.clone());
        Self {
            config,
            provider,
            repository,
            launcher,
        }
    }

    /// A tasklet step named `name` running `body`
    pub fn tasklet(&self, name: &str, body: impl StepBody + 'static) -> Arc<TaskletStep> {
        self.shared_tasklet(name, Arc::new(body))
    }

    /// A tasklet step running a body shared with other steps
    pub fn shared_tasklet(&self, name: &str, body: Arc<dyn StepBody>) -> Arc<TaskletStep> {
        Arc::new(TaskletStep::new(name, body, self.repository.clone()))
    }

    /// A flow builder carrying the engine configuration
    pub fn flow(&self, name: &str) -> FlowBuilder {
        FlowBuilder::new(name).configured(&self.config.engine)
    }

    /// A job named `name` running `flow`
    pub fn job(&self, name: &str, flow: Flow) -> FlowJob {
        FlowJob::new(name, Arc::new(flow), self.repository.clone(), &self.config.engine)
    }

    /// Launch `job`, giving up after the configured timeout
    pub async fn run(
        &self,
        job: Arc<dyn Job>,
        params: JobParameters,
    ) -> Result<JobExecution, TestError> {
        let name = job.name().to_string();
        tokio::time::timeout(self.config.timeout, self.launcher.run(job, params))
            .await
            .map_err(|_| {
                TestError::Timeout(format!(
                    "job {} did not finish within {:?}",
                    name, self.config.timeout
                ))
            })?
            .map_err(TestError::from)
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}
