//! Mock implementations of the engine's callback interfaces.
//!
//! Listener and partition collaborator traits are mocked with mockall so
//! tests can assert call counts and ordering without writing recorders.

use batchflow_core::{
    listener::{JobExecutionListener, StepExecutionListener},
    partition::{PartitionAnalyzer, PartitionCollector, PartitionReducer, PartitionStatus},
    BatchStatus, ExitStatus, JobExecution, Result, StepExecution,
};
use mockall::mock;
use serde_json::Value;

mock! {
    pub JobListener {}

    impl JobExecutionListener for JobListener {
        fn before_job(&self, job_execution: &JobExecution) -> Result<()>;
        fn after_job(&self, job_execution: &JobExecution) -> Result<()>;
    }
}

mock! {
    pub StepListener {}

    impl StepExecutionListener for StepListener {
        fn before_step(&self, step_execution: &StepExecution) -> Result<()>;
        fn after_step(&self, step_execution: &StepExecution) -> Result<Option<ExitStatus>>;
    }
}

mock! {
    pub Collector {}

    impl PartitionCollector for Collector {
        fn collect(&self, partition: &StepExecution) -> Result<Value>;
    }
}

mock! {
    pub Analyzer {}

    impl PartitionAnalyzer for Analyzer {
        fn analyze_collector_data(&self, data: Value) -> Result<()>;
        fn analyze_status(&self, status: BatchStatus, exit_status: &ExitStatus) -> Result<()>;
    }
}

mock! {
    pub Reducer {}

    impl PartitionReducer for Reducer {
        fn begin_partitioned_step(&self) -> Result<()>;
        fn before_partitioned_step_completion(&self) -> Result<()>;
        fn rollback_partitioned_step(&self) -> Result<()>;
        fn after_partitioned_step_completion(&self, status: PartitionStatus) -> Result<()>;
    }
}
