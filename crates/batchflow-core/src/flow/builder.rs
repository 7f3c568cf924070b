use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use super::end_state::EndState;
use super::graph::Flow;
use super::split_state::SplitState;
use super::state::{State, StepState};
use super::status::FlowExecutionStatus;
use super::transition::StateTransition;
use crate::config::EngineConfig;
use crate::error::{CoreError, Result};
use crate::step::Step;

/// Where a transition leads
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionTarget {
    /// Another state of the flow
    To(String),
    /// End the flow COMPLETED with the given job exit code
    End {
        /// Job exit code
        exit_code: String,
    },
    /// End the flow FAILED with the given job exit code
    Fail {
        /// Job exit code
        exit_code: String,
    },
    /// Stop the flow so that it can be restarted
    Stop {
        /// State a restart continues with
        restart: Option<String>,
        /// Abandon the step execution that led here
        abandon: bool,
    },
}

impl TransitionTarget {
    /// Transition to a state
    pub fn to(state: impl Into<String>) -> Self {
        TransitionTarget::To(state.into())
    }

    /// COMPLETED end with the default exit code
    pub fn end() -> Self {
        TransitionTarget::End {
            exit_code: "COMPLETED".to_string(),
        }
    }

    /// FAILED end with the default exit code
    pub fn fail() -> Self {
        TransitionTarget::Fail {
            exit_code: "FAILED".to_string(),
        }
    }
}

enum Edge {
    Explicit {
        pattern: String,
        target: TransitionTarget,
    },
    Next(String),
}

/// Assembles and validates a [`Flow`]
pub struct FlowBuilder {
    name: String,
    states: Vec<Arc<dyn State>>,
    start: Option<String>,
    edges: Vec<(String, Edge)>,
    split_max_concurrency: Option<usize>,
}

impl FlowBuilder {
    /// New builder for a flow called `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            states: Vec::new(),
            start: None,
            edges: Vec::new(),
            split_max_concurrency: None,
        }
    }

    /// Apply engine defaults to the states added afterwards
    pub fn configured(mut self, config: &EngineConfig) -> Self {
        self.split_max_concurrency = config.split_max_concurrency;
        self
    }

    /// Add a state. The first state added is the start state unless
    /// `start_with` says otherwise.
    pub fn add_state(mut self, state: Arc<dyn State>) -> Self {
        self.states.push(state);
        self
    }

    /// Add a step wrapped in a `StepState`
    pub fn step(self, step: Arc<dyn Step>) -> Self {
        self.add_state(Arc::new(StepState::new(step)))
    }

    /// Add a split over `flows`. Without an explicit bound the configured
    /// split concurrency applies.
    pub fn split(
        self,
        name: impl Into<String>,
        flows: Vec<Arc<Flow>>,
        max_concurrency: Option<usize>,
    ) -> Self {
        let max_concurrency = max_concurrency.or(self.split_max_concurrency);
        self.add_state(Arc::new(
            SplitState::new(name, flows).with_max_concurrency(max_concurrency),
        ))
    }

    /// Name the start state
    pub fn start_with(mut self, state: impl Into<String>) -> Self {
        self.start = Some(state.into());
        self
    }

    /// Unconditional successor of a state. Unlike an explicit transition it
    /// keeps the implicit FAILED and UNKNOWN transitions of the state.
    pub fn next(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push((from.into(), Edge::Next(to.into())));
        self
    }

    /// Explicit transition on exit codes matching `pattern`
    pub fn transition(
        mut self,
        from: impl Into<String>,
        pattern: impl Into<String>,
        target: TransitionTarget,
    ) -> Self {
        self.edges.push((
            from.into(),
            Edge::Explicit {
                pattern: pattern.into(),
                target,
            },
        ));
        self
    }

    /// Validate the graph and build the flow
    pub fn build(self) -> Result<Flow> {
        let FlowBuilder {
            name,
            states,
            start,
            edges,
            ..
        } = self;

        let mut by_name: HashMap<String, Arc<dyn State>> = HashMap::new();
        let mut order = Vec::with_capacity(states.len());
        for state in states {
            let state_name = state.name().to_string();
            if by_name.insert(state_name.clone(), state).is_some() {
                return Err(CoreError::ConfigurationError(format!(
                    "Duplicate state name {} in flow {}",
                    state_name, name
                )));
            }
            order.push(state_name);
        }

        let start = match start.or_else(|| order.first().cloned()) {
            Some(start) if by_name.contains_key(&start) => start,
            Some(start) => {
                return Err(CoreError::ConfigurationError(format!(
                    "Start state {} is not a state of flow {}",
                    start, name
                )))
            }
            None => {
                return Err(CoreError::ConfigurationError(format!(
                    "Flow {} has no states",
                    name
                )))
            }
        };

        let mut synthesizer = EndStateSynthesizer::new(&name);
        let mut transitions = Vec::new();
        let mut patterns: HashSet<(String, String)> = HashSet::new();
        let mut explicit: HashSet<String> = HashSet::new();
        let mut next_targets: HashMap<String, String> = HashMap::new();

        for (from, edge) in edges {
            if !by_name.contains_key(&from) {
                return Err(CoreError::ConfigurationError(format!(
                    "Transition from unknown state {} in flow {}",
                    from, name
                )));
            }
            let (pattern, target) = match edge {
                Edge::Explicit { pattern, target } => {
                    explicit.insert(from.clone());
                    (pattern, target)
                }
                Edge::Next(to) => {
                    if next_targets.insert(from.clone(), to.clone()).is_some() {
                        return Err(CoreError::ConfigurationError(format!(
                            "State {} of flow {} has more than one next state",
                            from, name
                        )));
                    }
                    continue;
                }
            };
            if !patterns.insert((from.clone(), pattern.clone())) {
                return Err(CoreError::ConfigurationError(format!(
                    "Duplicate transition for state {} on pattern {} in flow {}",
                    from, pattern, name
                )));
            }
            transitions.push(synthesizer.transition(&by_name, &from, &pattern, target)?);
        }

        for state_name in &order {
            let is_end = by_name
                .get(state_name)
                .map(|state| state.is_end_state())
                .unwrap_or(false);
            if is_end {
                continue;
            }
            let next = next_targets.get(state_name);
            if !explicit.contains(state_name) {
                transitions.push(synthesizer.transition(
                    &by_name,
                    state_name,
                    "FAILED",
                    TransitionTarget::fail(),
                )?);
                transitions.push(synthesizer.unknown(state_name));
                if next.is_none() {
                    transitions.push(synthesizer.transition(
                        &by_name,
                        state_name,
                        "*",
                        TransitionTarget::end(),
                    )?);
                }
            }
            if let Some(next) = next {
                if !patterns.insert((state_name.clone(), "*".to_string())) {
                    return Err(CoreError::ConfigurationError(format!(
                        "Duplicate transition for state {} on pattern * in flow {}",
                        state_name, name
                    )));
                }
                transitions.push(synthesizer.transition(
                    &by_name,
                    state_name,
                    "*",
                    TransitionTarget::To(next.clone()),
                )?);
            }
        }

        transitions.extend(synthesizer.end_transitions.drain(..));
        check_reachable(&name, &start, &order, &transitions)?;

        for state in synthesizer.end_states {
            by_name.insert(state.name().to_string(), state);
        }
        Ok(Flow::new(name, start, by_name, transitions))
    }
}

struct EndStateSynthesizer {
    flow: String,
    counter: usize,
    end_states: Vec<Arc<dyn State>>,
    end_transitions: Vec<StateTransition>,
}

impl EndStateSynthesizer {
    fn new(flow: &str) -> Self {
        Self {
            flow: flow.to_string(),
            counter: 0,
            end_states: Vec::new(),
            end_transitions: Vec::new(),
        }
    }

    fn next_name(&mut self, status: &str) -> String {
        self.counter += 1;
        format!("{}.{}.{}", self.flow, status, self.counter)
    }

    fn transition(
        &mut self,
        states: &HashMap<String, Arc<dyn State>>,
        from: &str,
        pattern: &str,
        target: TransitionTarget,
    ) -> Result<StateTransition> {
        let flow = self.flow.clone();
        let check = |target: &str| {
            if states.contains_key(target) {
                Ok(())
            } else {
                Err(CoreError::ConfigurationError(format!(
                    "Transition from {} on {} targets unknown state {} in flow {}",
                    from, pattern, target, flow
                )))
            }
        };

        match target {
            TransitionTarget::To(next) => {
                check(&next)?;
                Ok(StateTransition::to(from, pattern, next))
            }
            TransitionTarget::End { exit_code } => {
                let end = self.next_name("COMPLETED");
                self.push_end(
                    EndState::new(end.clone(), FlowExecutionStatus::completed(), exit_code),
                    None,
                );
                Ok(StateTransition::to(from, pattern, end))
            }
            TransitionTarget::Fail { exit_code } => {
                let end = self.next_name("FAILED");
                self.push_end(
                    EndState::new(end.clone(), FlowExecutionStatus::failed(), exit_code),
                    None,
                );
                Ok(StateTransition::to(from, pattern, end))
            }
            TransitionTarget::Stop { restart, abandon } => {
                if let Some(restart) = &restart {
                    check(restart)?;
                }
                let end = self.next_name("STOPPED");
                self.push_end(
                    EndState::stop(end.clone(), restart.clone(), abandon),
                    restart.clone(),
                );
                let transition = StateTransition::to(from, pattern, end);
                Ok(match restart {
                    Some(restart) => transition.with_restart(restart),
                    None => transition,
                })
            }
        }
    }

    fn unknown(&mut self, from: &str) -> StateTransition {
        let end = self.next_name("UNKNOWN");
        self.push_end(
            EndState::new(end.clone(), FlowExecutionStatus::unknown(), "UNKNOWN"),
            None,
        );
        StateTransition::to(from, "UNKNOWN", end)
    }

    fn push_end(&mut self, state: EndState, restart: Option<String>) {
        let name = state.name().to_string();
        self.end_transitions.push(match restart {
            Some(restart) => StateTransition::to(name, "*", restart),
            None => StateTransition::end(name, "*"),
        });
        self.end_states.push(Arc::new(state));
    }
}

fn check_reachable(
    flow: &str,
    start: &str,
    states: &[String],
    transitions: &[StateTransition],
) -> Result<()> {
    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();
    for transition in transitions {
        if let Some(next) = &transition.next {
            edges
                .entry(transition.state_name.as_str())
                .or_default()
                .push(next.as_str());
        }
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut queue = VecDeque::from([start]);
    while let Some(current) = queue.pop_front() {
        if !seen.insert(current) {
            continue;
        }
        if let Some(targets) = edges.get(current) {
            queue.extend(targets.iter().copied());
        }
    }

    let unreachable: Vec<&str> = states
        .iter()
        .map(String::as_str)
        .filter(|state| !seen.contains(state))
        .collect();
    if unreachable.is_empty() {
        Ok(())
    } else {
        Err(CoreError::ConfigurationError(format!(
            "Unreachable states in flow {}: {}",
            flow,
            unreachable.join(", ")
        )))
    }
}
