use crate::domain::execution::StepExecution;
use crate::domain::status::BatchStatus;

/// Folds finished partitions into the manager execution: counters are
/// summed, exit statuses combined and the status is FAILED as soon as one
/// partition failed.
#[derive(Debug, Default, Clone, Copy)]
pub struct StepExecutionAggregator;

impl StepExecutionAggregator {
    /// Aggregate `partitions` into `manager`
    pub fn aggregate(&self, manager: &mut StepExecution, partitions: &[StepExecution]) {
        if partitions.is_empty() {
            return;
        }

        let mut status = manager.status;
        let mut exit_status = manager.exit_status.clone();
        for partition in partitions {
            status = if status == BatchStatus::Failed || partition.status == BatchStatus::Failed {
                BatchStatus::Failed
            } else {
                status.upgrade_to(partition.status)
            };
            exit_status = exit_status.and(&partition.exit_status);
            manager.counters.add(&partition.counters);
        }
        manager.status = status;
        manager.exit_status = exit_status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::status::ExitStatus;

    fn partition(status: BatchStatus, exit_status: ExitStatus, writes: u64) -> StepExecution {
        let mut partition = StepExecution::new("step:partition", Some(1), 1);
        partition.status = status;
        partition.exit_status = exit_status;
        partition.counters.write_count = writes;
        partition
    }

    #[test]
    fn test_failed_partition_fails_manager() {
        let mut manager = StepExecution::new("step", Some(1), 1);
        manager.status = BatchStatus::Completed;
        manager.exit_status = ExitStatus::completed();

        StepExecutionAggregator.aggregate(
            &mut manager,
            &[
                partition(BatchStatus::Completed, ExitStatus::completed(), 3),
                partition(BatchStatus::Failed, ExitStatus::failed(), 1),
                partition(BatchStatus::Stopped, ExitStatus::stopped(), 2),
            ],
        );

        assert_eq!(manager.status, BatchStatus::Failed);
        assert_eq!(manager.exit_status.exit_code(), "FAILED");
        assert_eq!(manager.counters.write_count, 6);
    }

    #[test]
    fn test_successful_partitions_complete_manager() {
        let mut manager = StepExecution::new("step", Some(1), 1);
        manager.status = BatchStatus::Started;

        StepExecutionAggregator.aggregate(
            &mut manager,
            &[
                partition(BatchStatus::Completed, ExitStatus::completed(), 1),
                partition(BatchStatus::Completed, ExitStatus::completed(), 1),
            ],
        );

        assert_eq!(manager.status, BatchStatus::Completed);
        assert_eq!(manager.counters.write_count, 2);
    }

    #[test]
    fn test_no_partitions_leaves_manager_alone() {
        let mut manager = StepExecution::new("step", Some(1), 1);
        StepExecutionAggregator.aggregate(&mut manager, &[]);
        assert_eq!(manager.status, BatchStatus::Starting);
    }
}
