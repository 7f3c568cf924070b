use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

use super::executor::JobFlowExecutor;
use super::state::State;
use super::status::{FlowExecution, FlowExecutionStatus};
use super::transition::{sort_by_specificity, StateTransition};
use crate::error::{CoreError, Result};

/// A validated graph of states.
///
/// Built through [`super::FlowBuilder`]. Walking it is sequential: each state
/// is handled, its status is matched against the state's transitions (most
/// specific first) and the walk moves on until a state reports STOPPED or
/// an end transition is taken.
pub struct Flow {
    name: String,
    start_state: String,
    states: HashMap<String, Arc<dyn State>>,
    transitions: HashMap<String, Vec<StateTransition>>,
}

impl Flow {
    pub(crate) fn new(
        name: String,
        start_state: String,
        states: HashMap<String, Arc<dyn State>>,
        transitions: Vec<StateTransition>,
    ) -> Self {
        let mut by_state: HashMap<String, Vec<StateTransition>> = HashMap::new();
        for transition in transitions {
            by_state
                .entry(transition.state_name.clone())
                .or_default()
                .push(transition);
        }
        for list in by_state.values_mut() {
            sort_by_specificity(list);
        }
        Self {
            name,
            start_state,
            states,
            transitions: by_state,
        }
    }

    /// Flow name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the first state
    pub fn start_state(&self) -> &str {
        &self.start_state
    }

    /// State by name
    pub fn state(&self, name: &str) -> Option<&Arc<dyn State>> {
        self.states.get(name)
    }

    /// Names of all states
    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }

    /// Outgoing transitions of a state, most specific first
    pub fn transitions(&self, state_name: &str) -> &[StateTransition] {
        self.transitions
            .get(state_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Walk the flow from its start state
    pub async fn start(&self, executor: &mut JobFlowExecutor) -> Result<FlowExecution> {
        self.resume(&self.start_state, executor).await
    }

    /// Walk the flow from the named state
    pub async fn resume(
        &self,
        state_name: &str,
        executor: &mut JobFlowExecutor,
    ) -> Result<FlowExecution> {
        let mut state = self.state(state_name).cloned().ok_or_else(|| {
            CoreError::ConfigurationError(format!(
                "No state found in flow={} with name={}",
                self.name, state_name
            ))
        })?;
        let mut status = FlowExecutionStatus::unknown();

        loop {
            let current = state.name().to_string();
            debug!(flow = %self.name, state = %current, "Handling state");

            status = match state.handle(executor).await {
                Ok(status) => status,
                Err(e) => {
                    executor.close(&FlowExecution::new(current.clone(), status));
                    error!(flow = %self.name, state = %current, error = %e, "State failed");
                    return Err(match e {
                        nested @ CoreError::FlowExecutionError { .. } => nested,
                        other => CoreError::FlowExecutionError {
                            flow: self.name.clone(),
                            state: current,
                            cause: Box::new(other),
                        },
                    });
                }
            };

            if status.is_stop() {
                break;
            }

            match self.next_state(&current, &status) {
                Ok(Some(next)) => state = next,
                Ok(None) => break,
                Err(e) => {
                    executor.close(&FlowExecution::new(current.clone(), status));
                    return Err(CoreError::FlowExecutionError {
                        flow: self.name.clone(),
                        state: current,
                        cause: Box::new(e),
                    });
                }
            }
        }

        let result = FlowExecution::new(state.name(), status);
        executor.close(&result);
        Ok(result)
    }

    fn next_state(
        &self,
        state_name: &str,
        status: &FlowExecutionStatus,
    ) -> Result<Option<Arc<dyn State>>> {
        let transitions = self.transitions(state_name);
        if transitions.is_empty() {
            if self
                .state(state_name)
                .map(|state| state.is_end_state())
                .unwrap_or(false)
            {
                return Ok(None);
            }
            return Err(CoreError::TransitionError(format!(
                "No transition found in flow={} for state={}",
                self.name, state_name
            )));
        }

        let transition = transitions
            .iter()
            .find(|transition| transition.matches(status.name()))
            .ok_or_else(|| {
                CoreError::TransitionError(format!(
                    "Next state not found in flow={} for state={} with exit status={}",
                    self.name,
                    state_name,
                    status.name()
                ))
            })?;

        match &transition.next {
            None => Ok(None),
            Some(next) => self.state(next).cloned().map(Some).ok_or_else(|| {
                CoreError::TransitionError(format!(
                    "Next state not specified in flow={} for state={} with exit status={}",
                    self.name,
                    state_name,
                    status.name()
                ))
            }),
        }
    }
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flow")
            .field("name", &self.name)
            .field("start_state", &self.start_state)
            .field("transitions", &self.transitions)
            .finish()
    }
}
