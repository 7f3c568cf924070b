use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

use super::executor::JobFlowExecutor;
use super::graph::Flow;
use super::status::FlowExecutionStatus;
use super::LAST_STEPS_KEY;
use crate::domain::execution::{JobExecution, StepExecution};
use crate::domain::status::ExitStatus;
use crate::error::Result;
use crate::step::Step;

/// A named node of a flow graph
#[async_trait]
pub trait State: Send + Sync {
    /// Name, unique within the flow
    fn name(&self) -> &str;

    /// Do whatever this state does and report the status that selects the
    /// outgoing transition
    async fn handle(&self, executor: &mut JobFlowExecutor) -> Result<FlowExecutionStatus>;

    /// Whether this is a terminal state
    fn is_end_state(&self) -> bool {
        false
    }
}

/// Runs one step
pub struct StepState {
    name: String,
    step: Arc<dyn Step>,
}

impl StepState {
    /// State named after the step
    pub fn new(step: Arc<dyn Step>) -> Self {
        Self {
            name: step.name().to_string(),
            step,
        }
    }

    /// State with an explicit name
    pub fn named(name: impl Into<String>, step: Arc<dyn Step>) -> Self {
        Self {
            name: name.into(),
            step,
        }
    }

    /// The wrapped step
    pub fn step(&self) -> &Arc<dyn Step> {
        &self.step
    }
}

#[async_trait]
impl State for StepState {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, executor: &mut JobFlowExecutor) -> Result<FlowExecutionStatus> {
        executor.put_job_context(LAST_STEPS_KEY, json!([self.step.name()]));
        let exit_code = executor.execute_step(self.step.as_ref()).await?;
        Ok(FlowExecutionStatus::new(exit_code))
    }
}

/// Chooses the outgoing transition of a decision
pub trait Decider: Send + Sync {
    /// Decide from the job execution and the last step execution
    fn decide(
        &self,
        job_execution: &JobExecution,
        step_execution: Option<&StepExecution>,
    ) -> Result<ExitStatus>;
}

impl<F> Decider for F
where
    F: Fn(&JobExecution, Option<&StepExecution>) -> Result<ExitStatus> + Send + Sync,
{
    fn decide(
        &self,
        job_execution: &JobExecution,
        step_execution: Option<&StepExecution>,
    ) -> Result<ExitStatus> {
        self(job_execution, step_execution)
    }
}

/// Delegates to a `Decider`; runs no step
pub struct DecisionState {
    name: String,
    decider: Arc<dyn Decider>,
}

impl DecisionState {
    /// New decision
    pub fn new(name: impl Into<String>, decider: Arc<dyn Decider>) -> Self {
        Self {
            name: name.into(),
            decider,
        }
    }
}

#[async_trait]
impl State for DecisionState {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, executor: &mut JobFlowExecutor) -> Result<FlowExecutionStatus> {
        let status = self
            .decider
            .decide(executor.job_execution(), executor.step_execution())?;
        Ok(FlowExecutionStatus::new(status.exit_code()))
    }
}

/// Runs a nested flow as a single state
pub struct FlowState {
    name: String,
    flow: Arc<Flow>,
}

impl FlowState {
    /// State named after the flow
    pub fn new(flow: Arc<Flow>) -> Self {
        Self {
            name: flow.name().to_string(),
            flow,
        }
    }

    /// The nested flow
    pub fn flow(&self) -> &Arc<Flow> {
        &self.flow
    }
}

#[async_trait]
impl State for FlowState {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, executor: &mut JobFlowExecutor) -> Result<FlowExecutionStatus> {
        Ok(self.flow.start(executor).await?.status)
    }
}
