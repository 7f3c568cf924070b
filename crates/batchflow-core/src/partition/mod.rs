//! Partitioned steps
//!
//! A manager step splits its work into partitions described by a
//! [`PartitionPlan`], runs one worker step execution per partition on a
//! bounded pool and folds the outcomes back into the manager execution.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::execution::StepExecution;
use crate::domain::execution_context::ExecutionContext;
use crate::domain::status::{BatchStatus, ExitStatus};
use crate::error::Result;

/// Folding partition outcomes into the manager
pub mod aggregator;
/// Running partitions concurrently
pub mod handler;
/// Creating partition step executions
pub mod splitter;
/// The manager step
pub mod step;

pub use aggregator::StepExecutionAggregator;
pub use handler::PartitionHandler;
pub use splitter::{StepExecutionSplitter, GRID_SIZE_KEY};
pub use step::{PartitionStep, PartitionStepBuilder};

/// How a step is partitioned
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionPlan {
    /// Number of partitions
    pub partitions: usize,
    /// Number of partitions running at once, 0 for one worker per partition
    pub threads: usize,
    /// Initial context per partition; missing entries start empty
    pub partition_contexts: Vec<ExecutionContext>,
    /// On restart, replace the previous partitions instead of resuming them
    pub partitions_override: bool,
}

impl PartitionPlan {
    /// Plan with `partitions` partitions and as many workers
    pub fn new(partitions: usize) -> Self {
        Self {
            partitions,
            ..Default::default()
        }
    }

    /// Bound the number of concurrent workers
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the initial partition contexts
    pub fn with_partition_contexts(mut self, contexts: Vec<ExecutionContext>) -> Self {
        self.partition_contexts = contexts;
        self
    }

    /// Replace previous partitions on restart
    pub fn with_partitions_override(mut self, partitions_override: bool) -> Self {
        self.partitions_override = partitions_override;
        self
    }

    /// Workers to use: `threads` when set, the partition count otherwise
    pub fn effective_threads(&self) -> usize {
        if self.threads > 0 {
            self.threads
        } else {
            self.partitions
        }
    }
}

/// Produces the partition plan
pub trait PartitionMapper: Send + Sync {
    /// Plan the partitions of a manager execution
    fn map_partitions(&self, manager: &StepExecution) -> Result<PartitionPlan>;
}

impl PartitionMapper for PartitionPlan {
    fn map_partitions(&self, _manager: &StepExecution) -> Result<PartitionPlan> {
        Ok(self.clone())
    }
}

/// Publishes a partial result of a partition
pub trait PartitionCollector: Send + Sync {
    /// Snapshot taken when a partition finishes
    fn collect(&self, partition: &StepExecution) -> Result<Value>;
}

/// Consumes partial results and partition outcomes on the manager side
pub trait PartitionAnalyzer: Send + Sync {
    /// Called for every collected snapshot, while partitions are running
    fn analyze_collector_data(&self, _data: Value) -> Result<()> {
        Ok(())
    }

    /// Called once per finished partition
    fn analyze_status(&self, _status: BatchStatus, _exit_status: &ExitStatus) -> Result<()> {
        Ok(())
    }
}

/// Outcome passed to [`PartitionReducer::after_partitioned_step_completion`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionStatus {
    /// All partitions succeeded
    Commit,
    /// At least one partition did not
    Rollback,
}

/// Brackets the partitioned work on the manager side
pub trait PartitionReducer: Send + Sync {
    /// Before any partition is created
    fn begin_partitioned_step(&self) -> Result<()> {
        Ok(())
    }

    /// Fold the finished partitions into the manager execution. Runs after
    /// counters and statuses were aggregated, so the manager's exit status
    /// and context may be adjusted here.
    fn reduce(&self, _manager: &mut StepExecution, _partitions: &[StepExecution]) -> Result<()> {
        Ok(())
    }

    /// After a successful run, before completion
    fn before_partitioned_step_completion(&self) -> Result<()> {
        Ok(())
    }

    /// After an unsuccessful run, or when any step of the partitioned work
    /// failed once `begin_partitioned_step` returned
    fn rollback_partitioned_step(&self) -> Result<()> {
        Ok(())
    }

    /// Last callback of the partitioned step
    fn after_partitioned_step_completion(&self, _status: PartitionStatus) -> Result<()> {
        Ok(())
    }
}
