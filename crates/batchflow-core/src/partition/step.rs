use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    PartitionAnalyzer, PartitionCollector, PartitionHandler, PartitionMapper, PartitionReducer,
    PartitionStatus, StepExecutionAggregator, StepExecutionSplitter,
};
use crate::domain::execution::StepExecution;
use crate::domain::repository::JobRepository;
use crate::domain::status::ExitStatus;
use crate::error::{CoreError, Result};
use crate::listener::{Listener, StepListenerDispatcher};
use crate::step::{Step, StepBody, TaskletStep};

/// Manager step of a partitioned step.
///
/// Its lifecycle is that of any other step. Its work is to plan the
/// partitions, create them, run them through the [`PartitionHandler`] and
/// fold the results back into the manager execution.
pub struct PartitionStep {
    inner: TaskletStep,
}

#[async_trait]
impl Step for PartitionStep {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn start_limit(&self) -> Option<u32> {
        self.inner.start_limit()
    }

    fn allow_start_if_complete(&self) -> bool {
        self.inner.allow_start_if_complete()
    }

    async fn execute(&self, step_execution: &mut StepExecution) -> Result<()> {
        self.inner.execute(step_execution).await
    }
}

/// Builds a [`PartitionStep`]
pub struct PartitionStepBuilder {
    name: String,
    worker: Arc<dyn Step>,
    mapper: Arc<dyn PartitionMapper>,
    repository: Arc<dyn JobRepository>,
    collector: Option<Arc<dyn PartitionCollector>>,
    analyzer: Option<Arc<dyn PartitionAnalyzer>>,
    reducer: Option<Arc<dyn PartitionReducer>>,
    listeners: Vec<(Listener, Option<i32>)>,
    start_limit: Option<u32>,
    allow_start_if_complete: bool,
}

impl PartitionStepBuilder {
    /// Partitioned step `name` running `worker` once per partition planned
    /// by `mapper`
    pub fn new(
        name: impl Into<String>,
        worker: Arc<dyn Step>,
        mapper: Arc<dyn PartitionMapper>,
        repository: Arc<dyn JobRepository>,
    ) -> Self {
        Self {
            name: name.into(),
            worker,
            mapper,
            repository,
            collector: None,
            analyzer: None,
            reducer: None,
            listeners: Vec::new(),
            start_limit: None,
            allow_start_if_complete: false,
        }
    }

    /// Collect data from finished partitions
    pub fn collector(mut self, collector: Arc<dyn PartitionCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Analyze collected data and partition outcomes
    pub fn analyzer(mut self, analyzer: Arc<dyn PartitionAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Bracket the partitioned work
    pub fn reducer(mut self, reducer: Arc<dyn PartitionReducer>) -> Self {
        self.reducer = Some(reducer);
        self
    }

    /// Listener on the manager step
    pub fn listener(mut self, listener: Listener) -> Self {
        self.listeners.push((listener, None));
        self
    }

    /// Ordered listener on the manager step
    pub fn ordered_listener(mut self, listener: Listener, order: i32) -> Self {
        self.listeners.push((listener, Some(order)));
        self
    }

    /// Limit the number of manager executions across restarts
    pub fn start_limit(mut self, start_limit: u32) -> Self {
        self.start_limit = Some(start_limit);
        self
    }

    /// Run again on restart even when COMPLETED, partitions included
    pub fn allow_start_if_complete(mut self, allow: bool) -> Self {
        self.allow_start_if_complete = allow;
        self
    }

    /// Build the step
    pub fn build(self) -> PartitionStep {
        let mut handler = PartitionHandler::new(self.worker);
        if let Some(collector) = self.collector {
            handler = handler.with_collector(collector);
        }
        if let Some(analyzer) = self.analyzer {
            handler = handler.with_analyzer(analyzer);
        }

        let work = PartitionWork {
            splitter: StepExecutionSplitter::new(self.name.clone(), self.repository.clone())
                .allowing_start_if_complete(self.allow_start_if_complete),
            handler,
            mapper: self.mapper,
            reducer: self.reducer,
            aggregator: StepExecutionAggregator,
        };

        let mut inner = TaskletStep::new(self.name, Arc::new(work), self.repository)
            .allowing_start_if_complete(self.allow_start_if_complete);
        if let Some(start_limit) = self.start_limit {
            inner = inner.with_start_limit(start_limit);
        }
        for (listener, order) in self.listeners {
            inner = match order {
                Some(order) => inner.with_ordered_listener(listener, order),
                None => inner.with_listener(listener),
            };
        }
        PartitionStep { inner }
    }
}

struct PartitionWork {
    splitter: StepExecutionSplitter,
    handler: PartitionHandler,
    mapper: Arc<dyn PartitionMapper>,
    reducer: Option<Arc<dyn PartitionReducer>>,
    aggregator: StepExecutionAggregator,
}

impl PartitionWork {
    fn rollback(&self) -> Result<()> {
        if let Some(reducer) = &self.reducer {
            reducer.rollback_partitioned_step()?;
            reducer.after_partitioned_step_completion(PartitionStatus::Rollback)?;
        }
        Ok(())
    }

    async fn partition(&self, manager: &mut StepExecution) -> Result<ExitStatus> {
        let plan = self.mapper.map_partitions(manager)?;
        let partitions = self.splitter.split(manager, &plan).await?;
        let threads = match plan.effective_threads() {
            0 => partitions.len(),
            threads => threads,
        };

        let finished = self.handler.handle(partitions, threads).await?;
        if finished.is_empty() {
            info!(step = %manager.step_name, "No partitions left to run");
            return Ok(ExitStatus::completed());
        }

        self.aggregator.aggregate(manager, &finished);
        if let Some(reducer) = &self.reducer {
            reducer.reduce(manager, &finished)?;
        }
        if manager.status.is_unsuccessful() {
            return Err(CoreError::PartitionError(
                "Partition handler returned an unsuccessful step".to_string(),
            ));
        }
        Ok(manager.exit_status.clone())
    }
}

#[async_trait]
impl StepBody for PartitionWork {
    async fn run(
        &self,
        manager: &mut StepExecution,
        _listeners: &StepListenerDispatcher,
    ) -> Result<ExitStatus> {
        let Some(reducer) = &self.reducer else {
            return self.partition(manager).await;
        };

        reducer.begin_partitioned_step()?;
        let outcome = match self.partition(manager).await {
            Ok(exit_status) => reducer
                .before_partitioned_step_completion()
                .map(|_| exit_status),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(exit_status) => {
                reducer.after_partitioned_step_completion(PartitionStatus::Commit)?;
                Ok(exit_status)
            }
            Err(e) => {
                warn!(step = %manager.step_name, "Rolling back partitioned step: {}", e);
                self.rollback()?;
                Err(e)
            }
        }
    }
}
