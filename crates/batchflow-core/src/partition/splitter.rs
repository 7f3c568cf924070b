use std::sync::Arc;
use tracing::{debug, info};

use super::PartitionPlan;
use crate::domain::execution::{JobInstance, StepExecution};
use crate::domain::execution_context::ExecutionContext;
use crate::domain::repository::JobRepository;
use crate::domain::status::BatchStatus;
use crate::error::{CoreError, Result};

/// Manager context key holding the number of partitions
pub const GRID_SIZE_KEY: &str = "batch.partition.gridSize";

/// Creates and saves the partition step executions of a manager execution.
///
/// The grid size is recorded in the manager context on the first run, so a
/// restart recreates the same partitions. A restarted partition resumes from
/// the context of its previous execution; a COMPLETED one is not created
/// again.
pub struct StepExecutionSplitter {
    step_name: String,
    repository: Arc<dyn JobRepository>,
    allow_start_if_complete: bool,
}

impl StepExecutionSplitter {
    /// Splitter for partitions of `step_name`
    pub fn new(step_name: impl Into<String>, repository: Arc<dyn JobRepository>) -> Self {
        Self {
            step_name: step_name.into(),
            repository,
            allow_start_if_complete: false,
        }
    }

    /// Re-run COMPLETED partitions on restart
    pub fn allowing_start_if_complete(mut self, allow: bool) -> Self {
        self.allow_start_if_complete = allow;
        self
    }

    /// Name of partition `index`
    pub fn partition_name(&self, index: usize) -> String {
        format!("{}:partition{}", self.step_name, index)
    }

    /// Create, save and return the partitions that have to run
    pub async fn split(
        &self,
        manager: &mut StepExecution,
        plan: &PartitionPlan,
    ) -> Result<Vec<StepExecution>> {
        let job_execution_id = manager.job_execution_id.ok_or_else(|| {
            CoreError::ValidationError(format!(
                "Manager step execution {} has no job execution",
                manager.step_name
            ))
        })?;
        let instance = self
            .repository
            .get_job_instance(manager.job_instance_id)
            .await?
            .ok_or_else(|| {
                CoreError::ExecutionNotFound(format!(
                    "Job instance {} of step {}",
                    manager.job_instance_id, manager.step_name
                ))
            })?;

        let requested = plan.partitions as i64;
        let grid_size = if plan.partitions_override {
            requested
        } else {
            manager.execution_context.get_long_or(GRID_SIZE_KEY, requested)
        };
        manager.execution_context.put_long(GRID_SIZE_KEY, grid_size);

        // A clean context means the grid size was already known: a restart.
        let restart = !plan.partitions_override && !manager.execution_context.is_dirty();
        if !restart {
            self.repository
                .update_step_execution_context(manager)
                .await?;
        }
        let grid_size = usize::try_from(grid_size).map_err(|_| {
            CoreError::ValidationError(format!("Invalid grid size {}", grid_size))
        })?;
        debug!(step = %self.step_name, grid_size, restart, "Splitting step");

        let mut partitions = Vec::with_capacity(grid_size);
        for index in 0..grid_size {
            let name = self.partition_name(index);
            let mut partition =
                StepExecution::new(name.clone(), Some(job_execution_id), manager.job_instance_id);
            let initial = if restart {
                ExecutionContext::new()
            } else {
                plan.partition_contexts.get(index).cloned().unwrap_or_default()
            };
            if self
                .prepare(&instance, &mut partition, initial, plan.partitions_override)
                .await?
            {
                partitions.push(partition);
            }
        }

        self.repository.add_step_executions(&mut partitions).await?;
        info!(
            step = %self.step_name,
            grid_size,
            starting = partitions.len(),
            "Partitions created"
        );
        Ok(partitions)
    }

    async fn prepare(
        &self,
        instance: &JobInstance,
        partition: &mut StepExecution,
        initial: ExecutionContext,
        partitions_override: bool,
    ) -> Result<bool> {
        let last = if partitions_override {
            None
        } else {
            self.repository
                .get_last_step_execution(instance, &partition.step_name)
                .await?
        };

        match last {
            Some(last) if last.status == BatchStatus::Unknown => {
                Err(CoreError::JobRestartError(format!(
                    "Cannot restart partition [{}] from UNKNOWN status",
                    partition.step_name
                )))
            }
            Some(last) if last.status == BatchStatus::Completed => {
                partition.execution_context = initial;
                Ok(self.allow_start_if_complete)
            }
            Some(last) => {
                partition.execution_context = last.execution_context;
                Ok(true)
            }
            None => {
                partition.execution_context = initial;
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockRepository;

    fn manager() -> StepExecution {
        let mut manager = StepExecution::new("step", Some(1), 1);
        manager.id = Some(2);
        manager.version = Some(1);
        manager
    }

    fn instance() -> JobInstance {
        JobInstance {
            id: 1,
            job_name: "job".to_string(),
            job_key: String::new(),
            version: 0,
        }
    }

    fn repository(last: impl Fn(&str) -> Option<StepExecution> + Send + 'static) -> MockRepository {
        let mut repository = MockRepository::new();
        repository
            .expect_get_job_instance()
            .returning(|_| Ok(Some(instance())));
        repository
            .expect_get_last_step_execution()
            .returning(move |_, name| Ok(last(name)));
        repository
            .expect_update_step_execution_context()
            .returning(|_| Ok(()));
        repository
            .expect_add_step_executions()
            .returning(|executions| {
                for (i, execution) in executions.iter_mut().enumerate() {
                    execution.id = Some(10 + i as i64);
                    execution.version = Some(0);
                }
                Ok(())
            });
        repository
    }

    #[tokio::test]
    async fn test_first_split_uses_plan_contexts() {
        let splitter = StepExecutionSplitter::new("step", Arc::new(repository(|_| None)));
        let mut context = ExecutionContext::new();
        context.put_long("from", 100);
        let plan = PartitionPlan::new(3).with_partition_contexts(vec![context]);
        let mut manager = manager();

        let partitions = splitter.split(&mut manager, &plan).await.unwrap();

        let names: Vec<_> = partitions.iter().map(|p| p.step_name.as_str()).collect();
        assert_eq!(names, vec!["step:partition0", "step:partition1", "step:partition2"]);
        assert_eq!(partitions[0].execution_context.get_long("from"), Some(100));
        assert!(partitions[1].execution_context.is_empty());
        assert_eq!(manager.execution_context.get_long(GRID_SIZE_KEY), Some(3));
    }

    #[tokio::test]
    async fn test_restart_keeps_grid_and_skips_completed() {
        let splitter = StepExecutionSplitter::new(
            "step",
            Arc::new(repository(|name| {
                let mut last = StepExecution::new(name, Some(0), 1);
                last.id = Some(1);
                if name == "step:partition0" {
                    last.status = BatchStatus::Completed;
                } else {
                    last.status = BatchStatus::Failed;
                    last.execution_context.put_long("offset", 7);
                }
                Some(last)
            })),
        );
        let mut manager = manager();
        manager.execution_context.put_long(GRID_SIZE_KEY, 2);
        manager.execution_context.clear_dirty_flag();

        let partitions = splitter
            .split(&mut manager, &PartitionPlan::new(5))
            .await
            .unwrap();

        assert_eq!(partitions.len(), 1);
        assert_eq!(partitions[0].step_name, "step:partition1");
        assert_eq!(partitions[0].execution_context.get_long("offset"), Some(7));
    }

    #[tokio::test]
    async fn test_unknown_partition_refuses_restart() {
        let splitter = StepExecutionSplitter::new(
            "step",
            Arc::new(repository(|name| {
                let mut last = StepExecution::new(name, Some(0), 1);
                last.status = BatchStatus::Unknown;
                Some(last)
            })),
        );
        let result = splitter
            .split(&mut manager(), &PartitionPlan::new(1))
            .await;
        assert!(matches!(result, Err(CoreError::JobRestartError(_))));
    }
}
