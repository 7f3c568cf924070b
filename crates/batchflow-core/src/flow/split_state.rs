use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use super::executor::JobFlowExecutor;
use super::graph::Flow;
use super::state::State;
use super::status::{FlowExecution, FlowExecutionStatus, FlowStatus};
use super::LAST_STEPS_KEY;
use crate::error::{CoreError, Result};

/// Combines the results of the sub-flows of a split into one status
pub trait FlowExecutionAggregator: Send + Sync {
    /// Aggregate the finished sub-flow executions
    fn aggregate(&self, executions: &[FlowExecution]) -> FlowExecutionStatus;
}

/// Worst status wins. Any FAILED sub-flow fails the split; otherwise the
/// result is the least favorable of COMPLETED, STOPPED and UNKNOWN.
#[derive(Debug, Default, Clone, Copy)]
pub struct MaxValueFlowExecutionAggregator;

impl FlowExecutionAggregator for MaxValueFlowExecutionAggregator {
    fn aggregate(&self, executions: &[FlowExecution]) -> FlowExecutionStatus {
        if let Some(failed) = executions
            .iter()
            .find(|execution| execution.status.status() == FlowStatus::Failed)
        {
            return failed.status.clone();
        }
        executions
            .iter()
            .map(|execution| &execution.status)
            .max()
            .cloned()
            .unwrap_or_else(FlowExecutionStatus::unknown)
    }
}

/// Runs several flows concurrently and joins them.
///
/// Each sub-flow walks its own fork of the executor. When all of them have
/// finished, the job exit status accumulated so far is reset, the forks'
/// step executions and context writes are merged back, and the name of the
/// last step of every sub-flow is recorded under `batch.lastSteps`.
pub struct SplitState {
    name: String,
    flows: Vec<Arc<Flow>>,
    aggregator: Arc<dyn FlowExecutionAggregator>,
    max_concurrency: Option<usize>,
}

impl SplitState {
    /// Split over `flows`, one worker per flow
    pub fn new(name: impl Into<String>, flows: Vec<Arc<Flow>>) -> Self {
        Self {
            name: name.into(),
            flows,
            aggregator: Arc::new(MaxValueFlowExecutionAggregator),
            max_concurrency: None,
        }
    }

    /// Replace the aggregator
    pub fn with_aggregator(mut self, aggregator: Arc<dyn FlowExecutionAggregator>) -> Self {
        self.aggregator = aggregator;
        self
    }

    /// Bound the number of sub-flows running at once
    pub fn with_max_concurrency(mut self, max_concurrency: Option<usize>) -> Self {
        self.max_concurrency = max_concurrency.filter(|limit| *limit > 0);
        self
    }

    /// Sub-flows
    pub fn flows(&self) -> &[Arc<Flow>] {
        &self.flows
    }
}

#[async_trait]
impl State for SplitState {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, executor: &mut JobFlowExecutor) -> Result<FlowExecutionStatus> {
        info!(split = %self.name, flows = self.flows.len(), "Starting split");
        let semaphore = self
            .max_concurrency
            .map(|limit| Arc::new(Semaphore::new(limit)));

        let mut tasks = JoinSet::new();
        for (index, flow) in self.flows.iter().enumerate() {
            let flow = flow.clone();
            let semaphore = semaphore.clone();
            let mut child = executor.fork();
            tasks.spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => match semaphore.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(e) => {
                            return (
                                index,
                                child,
                                Err(CoreError::Other(format!("Split worker pool closed: {}", e))),
                            )
                        }
                    },
                    None => None,
                };
                let result = flow.start(&mut child).await;
                (index, child, result)
            });
        }

        let mut finished = Vec::with_capacity(self.flows.len());
        let mut errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => finished.push(outcome),
                Err(e) => {
                    error!(split = %self.name, error = %e, "Split worker task failed");
                    errors.push(CoreError::from(e));
                }
            }
        }
        finished.sort_by_key(|(index, _, _)| *index);

        // Sub-flows do not get to set the job exit status.
        executor.reset_exit_status();

        let mut results = Vec::with_capacity(finished.len());
        let mut last_steps = Vec::new();
        for (_, child, result) in finished {
            if let Some(last_step) = executor.merge(child) {
                last_steps.push(Value::String(last_step));
            }
            match result {
                Ok(execution) => results.push(execution),
                Err(e) => errors.push(e),
            }
        }

        if !last_steps.is_empty() {
            executor.put_job_context(LAST_STEPS_KEY, Value::Array(last_steps));
            executor.persist_job_context().await?;
        }

        if let Some(first) = errors.into_iter().next() {
            return Err(first);
        }

        let status = self.aggregator.aggregate(&results);
        debug!(split = %self.name, status = %status, "Split joined");
        Ok(status)
    }
}
