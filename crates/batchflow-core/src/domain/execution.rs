//! Job instances, job executions and step executions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::execution_context::ExecutionContext;
use crate::domain::job_parameters::JobParameters;
use crate::domain::status::{BatchStatus, ExitStatus};
use crate::error::{CoreError, Result};

/// One unique (job name, identifying parameters) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInstance {
    /// Repository assigned id
    pub id: i64,
    /// Name of the job
    pub job_name: String,
    /// Canonical key of the identifying parameters
    pub job_key: String,
    /// Version, incremented on every update
    pub version: i32,
}

/// Per-step counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounters {
    /// Items read
    pub read_count: u64,
    /// Items written
    pub write_count: u64,
    /// Items filtered by processing
    pub filter_count: u64,
    /// Items skipped while reading
    pub read_skip_count: u64,
    /// Items skipped while writing
    pub write_skip_count: u64,
    /// Items skipped while processing
    pub process_skip_count: u64,
    /// Rolled back transactions
    pub rollback_count: u64,
    /// Committed transactions
    pub commit_count: u64,
}

impl StepCounters {
    /// Total skips across read, process and write
    pub fn skip_count(&self) -> u64 {
        self.read_skip_count + self.write_skip_count + self.process_skip_count
    }

    /// Add another set of counters to this one
    pub fn add(&mut self, other: &StepCounters) {
        self.read_count += other.read_count;
        self.write_count += other.write_count;
        self.filter_count += other.filter_count;
        self.read_skip_count += other.read_skip_count;
        self.write_skip_count += other.write_skip_count;
        self.process_skip_count += other.process_skip_count;
        self.rollback_count += other.rollback_count;
        self.commit_count += other.commit_count;
    }
}

/// One attempt to run one named step within a job execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    /// Assigned on first save
    pub id: Option<i64>,
    /// Assigned on first save, incremented on every update
    pub version: Option<i32>,
    /// Name of the step
    pub step_name: String,
    /// Owning job execution
    pub job_execution_id: Option<i64>,
    /// Owning job instance
    pub job_instance_id: i64,
    /// Lifecycle status
    pub status: BatchStatus,
    /// Exit status
    pub exit_status: ExitStatus,
    /// Counters reported by the step body
    pub counters: StepCounters,
    /// Creation time
    pub create_time: DateTime<Utc>,
    /// Start time
    pub start_time: Option<DateTime<Utc>>,
    /// End time
    pub end_time: Option<DateTime<Utc>>,
    /// Last time the repository persisted this execution
    pub last_updated: Option<DateTime<Utc>>,
    /// Checkpoint state
    pub execution_context: ExecutionContext,
    /// Failures raised while running
    pub failure_exceptions: Vec<String>,
}

impl StepExecution {
    /// New unsaved step execution
    pub fn new(step_name: impl Into<String>, job_execution_id: Option<i64>, job_instance_id: i64) -> Self {
        Self {
            id: None,
            version: None,
            step_name: step_name.into(),
            job_execution_id,
            job_instance_id,
            status: BatchStatus::Starting,
            exit_status: ExitStatus::executing(),
            counters: StepCounters::default(),
            create_time: Utc::now(),
            start_time: None,
            end_time: None,
            last_updated: None,
            execution_context: ExecutionContext::new(),
            failure_exceptions: Vec::new(),
        }
    }

    /// Id, or an error if the execution was never saved
    pub fn require_id(&self) -> Result<i64> {
        self.id.ok_or_else(|| {
            CoreError::ValidationError(format!(
                "StepExecution {} has not been saved",
                self.step_name
            ))
        })
    }

    /// Upgrade the status, see [`BatchStatus::upgrade_to`]
    pub fn upgrade_status(&mut self, status: BatchStatus) {
        self.status = self.status.upgrade_to(status);
    }

    /// Record a failure
    pub fn add_failure(&mut self, failure: &CoreError) {
        self.failure_exceptions.push(failure.to_string());
    }

    /// Whether this execution is the same row as `other`
    pub fn same_identity(&self, other: &StepExecution) -> bool {
        self.id.is_some() && self.id == other.id
    }
}

/// One attempt to run a job instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecution {
    /// Assigned on first save
    pub id: Option<i64>,
    /// Assigned on first save, incremented on every update
    pub version: Option<i32>,
    /// Owning instance
    pub job_instance: JobInstance,
    /// Parameters of this run
    pub job_parameters: JobParameters,
    /// Lifecycle status
    pub status: BatchStatus,
    /// Exit status
    pub exit_status: ExitStatus,
    /// Creation time
    pub create_time: DateTime<Utc>,
    /// Start time
    pub start_time: Option<DateTime<Utc>>,
    /// End time
    pub end_time: Option<DateTime<Utc>>,
    /// Last time the repository persisted this execution
    pub last_updated: Option<DateTime<Utc>>,
    /// Checkpoint state
    pub execution_context: ExecutionContext,
    /// Step executions of this run, in execution order
    pub step_executions: Vec<StepExecution>,
    /// Failures raised while running
    pub failure_exceptions: Vec<String>,
}

impl JobExecution {
    /// New unsaved execution
    pub fn new(job_instance: JobInstance, job_parameters: JobParameters) -> Self {
        Self {
            id: None,
            version: None,
            job_instance,
            job_parameters,
            status: BatchStatus::Starting,
            exit_status: ExitStatus::unknown(),
            create_time: Utc::now(),
            start_time: None,
            end_time: None,
            last_updated: None,
            execution_context: ExecutionContext::new(),
            step_executions: Vec::new(),
            failure_exceptions: Vec::new(),
        }
    }

    /// Name of the owning job
    pub fn job_name(&self) -> &str {
        &self.job_instance.job_name
    }

    /// Id, or an error if the execution was never saved
    pub fn require_id(&self) -> Result<i64> {
        self.id.ok_or_else(|| {
            CoreError::ValidationError(format!(
                "JobExecution for {} has not been saved",
                self.job_instance.job_name
            ))
        })
    }

    /// Whether this execution is still running
    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    /// Upgrade the status, see [`BatchStatus::upgrade_to`]
    pub fn upgrade_status(&mut self, status: BatchStatus) {
        self.status = self.status.upgrade_to(status);
    }

    /// Build a new unsaved step execution pointing back at this execution.
    /// The caller is responsible for recording it once saved.
    pub fn create_step_execution(&self, step_name: impl Into<String>) -> StepExecution {
        StepExecution::new(step_name, self.id, self.job_instance.id)
    }

    /// Insert or replace a step execution, matched by id
    pub fn record_step_execution(&mut self, step_execution: &StepExecution) {
        match self
            .step_executions
            .iter_mut()
            .find(|existing| existing.same_identity(step_execution))
        {
            Some(existing) => *existing = step_execution.clone(),
            None => self.step_executions.push(step_execution.clone()),
        }
    }

    /// Record a failure
    pub fn add_failure(&mut self, failure: &CoreError) {
        self.failure_exceptions.push(failure.to_string());
    }
}
