//! In-memory state store for the Batchflow engine
//!
//! This crate provides in-memory implementations of the storage DAOs
//! defined in batchflow-core. It is primarily useful for development,
//! testing and single-process deployments where nothing has to survive a
//! restart of the process.

use std::sync::Arc;
use tracing::debug;

pub mod repositories;
pub use repositories::{
    ContextRow, InMemoryExecutionContextDao, InMemoryJobExecutionDao, InMemoryJobInstanceDao,
    InMemoryStepExecutionDao,
};

use batchflow_core::{
    domain::repository::JobRepository,
    domain::serializer::{ExecutionContextSerializer, JsonExecutionContextSerializer},
    EngineConfig, SimpleJobRepository,
};

/// Provider for in-memory state store repositories
pub struct InMemoryStateStoreProvider {
    job_instances: Arc<InMemoryJobInstanceDao>,
    job_executions: Arc<InMemoryJobExecutionDao>,
    step_executions: Arc<InMemoryStepExecutionDao>,
    execution_contexts: Arc<InMemoryExecutionContextDao>,
}

impl InMemoryStateStoreProvider {
    /// Create a provider with the default configuration
    pub fn new() -> Self {
        Self::with_config(&EngineConfig::default())
    }

    /// Create a provider honouring the storage bounds of `config`
    pub fn with_config(config: &EngineConfig) -> Self {
        Self::with_serializer(config, Arc::new(JsonExecutionContextSerializer))
    }

    /// Create a provider with a custom context serializer
    pub fn with_serializer(
        config: &EngineConfig,
        serializer: Arc<dyn ExecutionContextSerializer>,
    ) -> Self {
        debug!(
            max_exit_description_length = config.max_exit_description_length,
            short_context_length = config.short_context_length,
            "Creating in-memory state store"
        );
        Self {
            job_instances: Arc::new(InMemoryJobInstanceDao::new()),
            job_executions: Arc::new(InMemoryJobExecutionDao::new(
                config.max_exit_description_length,
            )),
            step_executions: Arc::new(InMemoryStepExecutionDao::new(
                config.max_exit_description_length,
            )),
            execution_contexts: Arc::new(InMemoryExecutionContextDao::new(
                serializer,
                config.short_context_length,
            )),
        }
    }

    /// Create a job repository over the shared stores
    pub fn create_repository(&self) -> Arc<dyn JobRepository> {
        Arc::new(SimpleJobRepository::new(
            self.job_instances.clone(),
            self.job_executions.clone(),
            self.step_executions.clone(),
            self.execution_contexts.clone(),
        ))
    }

    /// Instance store
    pub fn job_instances(&self) -> &Arc<InMemoryJobInstanceDao> {
        &self.job_instances
    }

    /// Job execution store
    pub fn job_executions(&self) -> &Arc<InMemoryJobExecutionDao> {
        &self.job_executions
    }

    /// Step execution store
    pub fn step_executions(&self) -> &Arc<InMemoryStepExecutionDao> {
        &self.step_executions
    }

    /// Context store
    pub fn execution_contexts(&self) -> &Arc<InMemoryExecutionContextDao> {
        &self.execution_contexts
    }
}

impl Default for InMemoryStateStoreProvider {
    fn default() -> Self {
        Self::new()
    }
}
