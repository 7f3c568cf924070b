use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use batchflow_core::{
    domain::execution::{JobExecution, JobInstance, StepExecution},
    domain::execution_context::ExecutionContext,
    domain::job_parameters::JobParameters,
    domain::repository::{ExecutionContextDao, JobExecutionDao, JobInstanceDao, StepExecutionDao},
    domain::serializer::ExecutionContextSerializer,
    domain::status::ExitStatus,
    CoreError,
};

/// Monotonic id source
#[derive(Debug, Default)]
pub struct Sequence(AtomicI64);

impl Sequence {
    /// Next id, starting at 1
    pub fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Truncate an exit description to `max` characters
fn truncate_exit_status(exit_status: &ExitStatus, max: usize, entity: &str, id: i64) -> ExitStatus {
    let description = exit_status.exit_description();
    if description.chars().count() <= max {
        return exit_status.clone();
    }
    warn!(
        entity,
        id,
        max_length = max,
        "Truncating long exit description before persisting"
    );
    let truncated: String = description.chars().take(max).collect();
    ExitStatus::with_description(exit_status.exit_code(), truncated)
}

/// In-memory implementation of the JobInstanceDao
#[derive(Default)]
pub struct InMemoryJobInstanceDao {
    instances: DashMap<i64, JobInstance>,
    by_key: DashMap<(String, String), i64>,
    sequence: Sequence,
}

impl InMemoryJobInstanceDao {
    /// Create a new, empty instance store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether no instance is stored
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[async_trait]
impl JobInstanceDao for InMemoryJobInstanceDao {
    async fn create_job_instance(
        &self,
        job_name: &str,
        params: &JobParameters,
    ) -> Result<JobInstance, CoreError> {
        let job_key = params.job_key();
        match self.by_key.entry((job_name.to_string(), job_key.clone())) {
            Entry::Occupied(_) => Err(CoreError::DuplicateJobInstance {
                job_name: job_name.to_string(),
                job_key,
            }),
            Entry::Vacant(slot) => {
                let instance = JobInstance {
                    id: self.sequence.next(),
                    job_name: job_name.to_string(),
                    job_key,
                    version: 0,
                };
                self.instances.insert(instance.id, instance.clone());
                slot.insert(instance.id);
                debug!(job = %job_name, instance_id = instance.id, "Created job instance");
                Ok(instance)
            }
        }
    }

    async fn get_job_instance(
        &self,
        job_name: &str,
        params: &JobParameters,
    ) -> Result<Option<JobInstance>, CoreError> {
        let id = match self.by_key.get(&(job_name.to_string(), params.job_key())) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.instances.get(&id).map(|instance| instance.clone()))
    }

    async fn get_job_instance_by_id(&self, id: i64) -> Result<Option<JobInstance>, CoreError> {
        Ok(self.instances.get(&id).map(|instance| instance.clone()))
    }
}

/// In-memory implementation of the JobExecutionDao
pub struct InMemoryJobExecutionDao {
    executions: DashMap<i64, JobExecution>,
    sequence: Sequence,
    max_exit_description_length: usize,
}

impl InMemoryJobExecutionDao {
    /// Create a new, empty execution store
    pub fn new(max_exit_description_length: usize) -> Self {
        Self {
            executions: DashMap::new(),
            sequence: Sequence::default(),
            max_exit_description_length,
        }
    }

    /// Persisted row, without step executions or context
    pub fn row(&self, id: i64) -> Option<JobExecution> {
        self.executions.get(&id).map(|row| row.clone())
    }

    fn to_row(&self, execution: &JobExecution, id: i64) -> JobExecution {
        let mut row = execution.clone();
        row.step_executions.clear();
        row.execution_context = ExecutionContext::new();
        row.exit_status = truncate_exit_status(
            &execution.exit_status,
            self.max_exit_description_length,
            "JobExecution",
            id,
        );
        row
    }
}

#[async_trait]
impl JobExecutionDao for InMemoryJobExecutionDao {
    async fn save_job_execution(&self, execution: &mut JobExecution) -> Result<(), CoreError> {
        let id = self.sequence.next();
        execution.id = Some(id);
        execution.version = Some(0);
        let row = self.to_row(execution, id);
        self.executions.insert(id, row);
        Ok(())
    }

    async fn update_job_execution(&self, execution: &mut JobExecution) -> Result<(), CoreError> {
        let id = execution.require_id()?;
        let caller_version = execution.version.ok_or_else(|| {
            CoreError::ValidationError(format!("JobExecution {} has no version", id))
        })?;
        let row = self.to_row(execution, id);

        let mut persisted = self
            .executions
            .get_mut(&id)
            .ok_or_else(|| CoreError::ExecutionNotFound(format!("JobExecution {}", id)))?;
        let persisted_version = persisted.version.unwrap_or(0);
        if persisted_version != caller_version {
            return Err(CoreError::OptimisticLockingFailure {
                entity: "JobExecution",
                id,
                caller_version,
                persisted_version,
            });
        }

        let next_version = caller_version + 1;
        *persisted = row;
        persisted.version = Some(next_version);
        execution.version = Some(next_version);
        Ok(())
    }

    async fn find_job_executions(&self, instance_id: i64) -> Result<Vec<JobExecution>, CoreError> {
        let mut executions: Vec<JobExecution> = self
            .executions
            .iter()
            .filter(|row| row.job_instance.id == instance_id)
            .map(|row| row.clone())
            .collect();
        executions.sort_by(|a, b| b.create_time.cmp(&a.create_time).then(b.id.cmp(&a.id)));
        Ok(executions)
    }

    async fn get_last_job_execution(
        &self,
        instance_id: i64,
    ) -> Result<Option<JobExecution>, CoreError> {
        Ok(self
            .executions
            .iter()
            .filter(|row| row.job_instance.id == instance_id)
            .max_by(|a, b| a.create_time.cmp(&b.create_time).then(a.id.cmp(&b.id)))
            .map(|row| row.clone()))
    }

    async fn get_job_execution(&self, id: i64) -> Result<Option<JobExecution>, CoreError> {
        Ok(self.row(id))
    }
}

/// In-memory implementation of the StepExecutionDao
pub struct InMemoryStepExecutionDao {
    executions: DashMap<i64, StepExecution>,
    sequence: Sequence,
    max_exit_description_length: usize,
}

impl InMemoryStepExecutionDao {
    /// Create a new, empty step execution store
    pub fn new(max_exit_description_length: usize) -> Self {
        Self {
            executions: DashMap::new(),
            sequence: Sequence::default(),
            max_exit_description_length,
        }
    }

    /// Persisted row, without context
    pub fn row(&self, id: i64) -> Option<StepExecution> {
        self.executions.get(&id).map(|row| row.clone())
    }

    fn to_row(&self, execution: &StepExecution, id: i64) -> StepExecution {
        let mut row = execution.clone();
        row.execution_context = ExecutionContext::new();
        row.exit_status = truncate_exit_status(
            &execution.exit_status,
            self.max_exit_description_length,
            "StepExecution",
            id,
        );
        row
    }
}

#[async_trait]
impl StepExecutionDao for InMemoryStepExecutionDao {
    async fn save_step_execution(&self, execution: &mut StepExecution) -> Result<(), CoreError> {
        let id = self.sequence.next();
        execution.id = Some(id);
        execution.version = Some(0);
        let row = self.to_row(execution, id);
        self.executions.insert(id, row);
        Ok(())
    }

    async fn update_step_execution(&self, execution: &mut StepExecution) -> Result<(), CoreError> {
        let id = execution.require_id()?;
        let caller_version = execution.version.ok_or_else(|| {
            CoreError::ValidationError(format!("StepExecution {} has no version", id))
        })?;
        let row = self.to_row(execution, id);

        let mut persisted = self
            .executions
            .get_mut(&id)
            .ok_or_else(|| CoreError::ExecutionNotFound(format!("StepExecution {}", id)))?;
        let persisted_version = persisted.version.unwrap_or(0);
        if persisted_version != caller_version {
            return Err(CoreError::OptimisticLockingFailure {
                entity: "StepExecution",
                id,
                caller_version,
                persisted_version,
            });
        }

        let next_version = caller_version + 1;
        *persisted = row;
        persisted.version = Some(next_version);
        execution.version = Some(next_version);
        Ok(())
    }

    async fn get_step_execution(
        &self,
        job_execution_id: i64,
        step_execution_id: i64,
    ) -> Result<Option<StepExecution>, CoreError> {
        Ok(self
            .executions
            .get(&step_execution_id)
            .filter(|row| row.job_execution_id == Some(job_execution_id))
            .map(|row| row.clone()))
    }

    async fn find_step_executions(
        &self,
        job_execution_id: i64,
    ) -> Result<Vec<StepExecution>, CoreError> {
        let mut executions: Vec<StepExecution> = self
            .executions
            .iter()
            .filter(|row| row.job_execution_id == Some(job_execution_id))
            .map(|row| row.clone())
            .collect();
        executions.sort_by_key(|execution| execution.id);
        Ok(executions)
    }

    async fn get_last_step_execution(
        &self,
        instance_id: i64,
        step_name: &str,
    ) -> Result<Option<StepExecution>, CoreError> {
        Ok(self
            .executions
            .iter()
            .filter(|row| row.job_instance_id == instance_id && row.step_name == step_name)
            .max_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)))
            .map(|row| row.clone()))
    }

    async fn count_step_executions(
        &self,
        instance_id: i64,
        step_name: &str,
    ) -> Result<usize, CoreError> {
        Ok(self
            .executions
            .iter()
            .filter(|row| row.job_instance_id == instance_id && row.step_name == step_name)
            .count())
    }
}

/// Stored form of an execution context, as produced by the serializer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextRow {
    /// Inline bytes, cut to the configured length when too long
    pub short_context: Vec<u8>,
    /// Full bytes, present only when the inline form was cut
    pub serialized_context: Option<Vec<u8>>,
}

/// In-memory implementation of the ExecutionContextDao
pub struct InMemoryExecutionContextDao {
    job_contexts: DashMap<i64, ContextRow>,
    step_contexts: DashMap<i64, ContextRow>,
    serializer: Arc<dyn ExecutionContextSerializer>,
    short_context_length: usize,
}

impl InMemoryExecutionContextDao {
    /// Create a new, empty context store
    pub fn new(serializer: Arc<dyn ExecutionContextSerializer>, short_context_length: usize) -> Self {
        Self {
            job_contexts: DashMap::new(),
            step_contexts: DashMap::new(),
            serializer,
            short_context_length,
        }
    }

    /// Stored row of a job execution context
    pub fn job_context_row(&self, job_execution_id: i64) -> Option<ContextRow> {
        self.job_contexts
            .get(&job_execution_id)
            .map(|row| row.clone())
    }

    /// Stored row of a step execution context
    pub fn step_context_row(&self, step_execution_id: i64) -> Option<ContextRow> {
        self.step_contexts
            .get(&step_execution_id)
            .map(|row| row.clone())
    }

    fn to_row(&self, context: &ExecutionContext) -> Result<ContextRow, CoreError> {
        let serialized = self.serializer.serialize(&context.to_map())?;
        if serialized.len() <= self.short_context_length {
            return Ok(ContextRow {
                short_context: serialized,
                serialized_context: None,
            });
        }

        let cut = self.short_context_length.saturating_sub(3);
        let mut short_context = serialized[..cut].to_vec();
        short_context.extend_from_slice(b"...");
        Ok(ContextRow {
            short_context,
            serialized_context: Some(serialized),
        })
    }

    fn from_row(&self, row: Option<ContextRow>) -> Result<ExecutionContext, CoreError> {
        let row = match row {
            Some(row) => row,
            None => return Ok(ExecutionContext::new()),
        };
        let stored = row.serialized_context.unwrap_or(row.short_context);
        let entries = self.serializer.deserialize(&stored)?;
        Ok(ExecutionContext::from_map(entries))
    }
}

#[async_trait]
impl ExecutionContextDao for InMemoryExecutionContextDao {
    async fn get_job_execution_context(
        &self,
        job_execution_id: i64,
    ) -> Result<ExecutionContext, CoreError> {
        self.from_row(self.job_context_row(job_execution_id))
    }

    async fn get_step_execution_context(
        &self,
        step_execution_id: i64,
    ) -> Result<ExecutionContext, CoreError> {
        self.from_row(self.step_context_row(step_execution_id))
    }

    async fn save_job_execution_context(
        &self,
        job_execution_id: i64,
        context: &ExecutionContext,
    ) -> Result<(), CoreError> {
        let row = self.to_row(context)?;
        self.job_contexts.insert(job_execution_id, row);
        Ok(())
    }

    async fn save_step_execution_context(
        &self,
        step_execution_id: i64,
        context: &ExecutionContext,
    ) -> Result<(), CoreError> {
        let row = self.to_row(context)?;
        self.step_contexts.insert(step_execution_id, row);
        Ok(())
    }
}
