//! Flow graph
//!
//! A [`Flow`] is a set of named [`State`]s connected by
//! [`StateTransition`]s keyed on exit code patterns. The [`JobFlowExecutor`]
//! carries the job execution along the walk.

/// Terminal states
pub mod end_state;
/// Working state of a flow walk
pub mod executor;
/// The flow graph and its walk
pub mod graph;
/// Flow assembly and validation
pub mod builder;
/// Parallel sub-flows
pub mod split_state;
/// Step, decision and nested-flow states
pub mod state;
/// Flow statuses
pub mod status;
/// Transitions and pattern matching
pub mod transition;

pub use builder::{FlowBuilder, TransitionTarget};
pub use end_state::EndState;
pub use executor::JobFlowExecutor;
pub use graph::Flow;
pub use split_state::{FlowExecutionAggregator, MaxValueFlowExecutionAggregator, SplitState};
pub use state::{DecisionState, Decider, FlowState, State, StepState};
pub use status::{FlowExecution, FlowExecutionStatus, FlowStatus};
pub use transition::StateTransition;

/// Job context key holding the names of the steps that ran last
pub const LAST_STEPS_KEY: &str = "batch.lastSteps";

/// Job context key holding the state a stopped job resumes from
pub const RESTART_STEP_KEY: &str = "batch.restartStep";

/// Job context key holding the step that led to a stop
pub const STOPPED_STEP_KEY: &str = "batch.stoppedStep";
