use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Edge of a flow graph: from `state_name`, on an exit code matching
/// `pattern`, go to `next`. A transition without `next` ends the flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    /// Source state
    pub state_name: String,
    /// Exit code pattern; `*` matches any run of characters, `?` exactly one
    pub pattern: String,
    /// Restart target recorded for stop transitions
    pub restart: Option<String>,
    /// Target state, `None` for an end transition
    pub next: Option<String>,
}

impl StateTransition {
    /// Transition to another state
    pub fn to(state_name: impl Into<String>, pattern: impl Into<String>, next: impl Into<String>) -> Self {
        Self {
            state_name: state_name.into(),
            pattern: pattern.into(),
            restart: None,
            next: Some(next.into()),
        }
    }

    /// End transition
    pub fn end(state_name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            state_name: state_name.into(),
            pattern: pattern.into(),
            restart: None,
            next: None,
        }
    }

    /// Attach a restart target
    pub fn with_restart(mut self, restart: impl Into<String>) -> Self {
        self.restart = Some(restart.into());
        self
    }

    /// Whether this transition ends the flow
    pub fn is_end(&self) -> bool {
        self.next.is_none()
    }

    /// Whether the exit code matches this transition's pattern
    pub fn matches(&self, exit_code: &str) -> bool {
        pattern_matches(&self.pattern, exit_code)
    }

    fn count(&self, c: char) -> usize {
        self.pattern.chars().filter(|p| *p == c).count()
    }

    /// Order transitions from most to least specific: fewer `*`, then fewer
    /// `?`, then longer patterns, then alphabetical.
    pub fn specificity_cmp(&self, other: &StateTransition) -> Ordering {
        self.count('*')
            .cmp(&other.count('*'))
            .then_with(|| self.count('?').cmp(&other.count('?')))
            .then_with(|| other.pattern.len().cmp(&self.pattern.len()))
            .then_with(|| self.pattern.cmp(&other.pattern))
    }
}

impl fmt::Display for StateTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StateTransition: [state={}, pattern={}, next={}]",
            self.state_name,
            self.pattern,
            self.next.as_deref().unwrap_or("<end>")
        )
    }
}

/// Wildcard match of a whole string
pub fn pattern_matches(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

/// Sort transitions so the first match is the most specific one
pub fn sort_by_specificity(transitions: &mut [StateTransition]) {
    transitions.sort_by(|a, b| a.specificity_cmp(b));
}
