use futures::FutureExt;
use serde_json::Value;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::{PartitionAnalyzer, PartitionCollector};
use crate::domain::execution::StepExecution;
use crate::domain::status::{BatchStatus, ExitStatus};
use crate::error::{CoreError, Result};
use crate::step::Step;

/// Queue of collected partition data, shared by all partitions of a run
#[derive(Default)]
struct CollectorQueue {
    items: Mutex<VecDeque<Value>>,
    ready: Notify,
}

impl CollectorQueue {
    async fn push(&self, item: Value) {
        self.items.lock().await.push_back(item);
        self.ready.notify_one();
    }

    async fn drain(&self) -> Vec<Value> {
        self.items.lock().await.drain(..).collect()
    }
}

/// Runs partition step executions on a bounded pool of workers.
///
/// Every partition runs to a terminal status; one failing partition does
/// not cancel the others. Data collected from finished partitions is handed
/// to the analyzer while the remaining partitions are still running.
pub struct PartitionHandler {
    step: Arc<dyn Step>,
    collector: Option<Arc<dyn PartitionCollector>>,
    analyzer: Option<Arc<dyn PartitionAnalyzer>>,
}

impl PartitionHandler {
    /// Handler running `step` once per partition
    pub fn new(step: Arc<dyn Step>) -> Self {
        Self {
            step,
            collector: None,
            analyzer: None,
        }
    }

    /// Collect data from every finished partition
    pub fn with_collector(mut self, collector: Arc<dyn PartitionCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Analyze collected data and partition outcomes
    pub fn with_analyzer(mut self, analyzer: Arc<dyn PartitionAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// The worker step
    pub fn step(&self) -> &Arc<dyn Step> {
        &self.step
    }

    /// Run the partitions with at most `threads` at a time and return them
    /// once all have finished, ordered by id. An analyzer failure is
    /// reported after the last partition finished.
    pub async fn handle(
        &self,
        partitions: Vec<StepExecution>,
        threads: usize,
    ) -> Result<Vec<StepExecution>> {
        if partitions.is_empty() {
            return Ok(partitions);
        }
        if threads == 0 {
            return Err(CoreError::ConfigurationError(
                "Either a number of threads or partitions is required".to_string(),
            ));
        }

        let semaphore = Arc::new(Semaphore::new(threads));
        let queue = Arc::new(CollectorQueue::default());
        let mut tasks = JoinSet::new();

        for partition in partitions {
            let step = self.step.clone();
            let semaphore = semaphore.clone();
            let queue = queue.clone();
            let collector = self.collector.clone();
            tasks.spawn(run_partition(step, partition, semaphore, queue, collector));
        }

        let mut finished = Vec::new();
        let mut analyzer_error: Option<CoreError> = None;
        let mut lost = 0usize;

        while !tasks.is_empty() {
            tokio::select! {
                joined = tasks.join_next() => {
                    // Data a partition published before finishing is analyzed first.
                    self.analyze_data(queue.drain().await, &mut analyzer_error);
                    match joined {
                        Some(Ok(partition)) => {
                            self.analyze_status(&partition, &mut analyzer_error);
                            finished.push(partition);
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Partition task was lost");
                            lost += 1;
                        }
                        None => {}
                    }
                }
                _ = queue.ready.notified() => {
                    self.analyze_data(queue.drain().await, &mut analyzer_error);
                }
            }
        }
        self.analyze_data(queue.drain().await, &mut analyzer_error);

        finished.sort_by_key(|partition| partition.id);
        if lost > 0 {
            return Err(CoreError::PartitionError(format!(
                "{} partition task(s) of step {} did not complete",
                lost,
                self.step.name()
            )));
        }
        if let Some(e) = analyzer_error {
            return Err(e);
        }
        Ok(finished)
    }

    fn analyze_data(&self, items: Vec<Value>, failure: &mut Option<CoreError>) {
        let Some(analyzer) = &self.analyzer else {
            return;
        };
        for item in items {
            if let Err(e) = analyzer.analyze_collector_data(item) {
                warn!(error = %e, "Partition analyzer rejected collector data");
                failure.get_or_insert(e);
            }
        }
    }

    fn analyze_status(&self, partition: &StepExecution, failure: &mut Option<CoreError>) {
        if let Some(analyzer) = &self.analyzer {
            if let Err(e) = analyzer.analyze_status(partition.status, &partition.exit_status) {
                warn!(partition = %partition.step_name, error = %e, "Partition analyzer failed");
                failure.get_or_insert(e);
            }
        }
    }
}

async fn run_partition(
    step: Arc<dyn Step>,
    mut partition: StepExecution,
    semaphore: Arc<Semaphore>,
    queue: Arc<CollectorQueue>,
    collector: Option<Arc<dyn PartitionCollector>>,
) -> StepExecution {
    let _permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => {
            let failure = CoreError::PartitionError(format!("Worker pool closed: {}", e));
            fail(&mut partition, &failure);
            return partition;
        }
    };
    debug!(partition = %partition.step_name, "Partition starting");

    let outcome = AssertUnwindSafe(step.execute(&mut partition))
        .catch_unwind()
        .await;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => fail(&mut partition, &e),
        Err(_) => fail(
            &mut partition,
            &CoreError::PartitionError("Partition worker panicked".to_string()),
        ),
    }

    if let Some(collector) = collector {
        match collector.collect(&partition) {
            Ok(data) => queue.push(data).await,
            Err(e) => warn!(partition = %partition.step_name, error = %e, "Partition collector failed"),
        }
    }
    partition
}

fn fail(partition: &mut StepExecution, failure: &CoreError) {
    error!(partition = %partition.step_name, error = %failure, "Partition failed");
    partition.upgrade_status(BatchStatus::Failed);
    partition.exit_status = partition
        .exit_status
        .and(&ExitStatus::with_description(ExitStatus::FAILED, failure.to_string()));
    partition.add_failure(failure);
}
