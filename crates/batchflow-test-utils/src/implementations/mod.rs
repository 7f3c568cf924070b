//! Fake step bodies for driving jobs in tests.

use async_trait::async_trait;
use batchflow_core::{
    listener::StepListenerDispatcher, CoreError, ExitStatus, Result, StepBody, StepExecution,
};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// Shared, ordered record of what ran
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    /// Empty journal
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Snapshot of the entries so far
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Number of entries equal to `entry`
    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == entry).count()
    }

    /// Forget everything recorded
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// What a scripted body does on one run
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Return this exit status
    Exit(ExitStatus),
    /// Return a step error with this message
    Fail(String),
}

impl Outcome {
    /// Complete normally
    pub fn completed() -> Self {
        Outcome::Exit(ExitStatus::completed())
    }

    /// Complete with a custom exit code
    pub fn exit(code: &str) -> Self {
        Outcome::Exit(ExitStatus::new(code))
    }

    /// Fail with `message`
    pub fn fail(message: &str) -> Self {
        Outcome::Fail(message.to_string())
    }
}

/// Step body that plays back a script of outcomes, one per run, and
/// records each run in a [`Journal`] under its step name. Once the script
/// is used up every run gets the fallback outcome.
pub struct ScriptedBody {
    journal: Journal,
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
}

impl ScriptedBody {
    /// Body that always completes
    pub fn completing(journal: &Journal) -> Self {
        Self::scripted(journal, Vec::new(), Outcome::completed())
    }

    /// Body that always fails
    pub fn failing(journal: &Journal, message: &str) -> Self {
        Self::scripted(journal, Vec::new(), Outcome::fail(message))
    }

    /// Body that exits with `code` every time
    pub fn exiting(journal: &Journal, code: &str) -> Self {
        Self::scripted(journal, Vec::new(), Outcome::exit(code))
    }

    /// Body that plays `script` and then falls back to `fallback`
    pub fn scripted(journal: &Journal, script: Vec<Outcome>, fallback: Outcome) -> Self {
        Self {
            journal: journal.clone(),
            script: Mutex::new(script.into()),
            fallback,
        }
    }

    fn next_outcome(&self) -> Outcome {
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl StepBody for ScriptedBody {
    async fn run(
        &self,
        step_execution: &mut StepExecution,
        _listeners: &StepListenerDispatcher,
    ) -> Result<ExitStatus> {
        self.journal.record(step_execution.step_name.clone());
        step_execution.counters.commit_count += 1;
        match self.next_outcome() {
            Outcome::Exit(exit_status) => Ok(exit_status),
            Outcome::Fail(message) => Err(CoreError::StepExecutionError(message)),
        }
    }
}

/// Step body that measures how many runs overlap. Each run holds for a
/// fixed delay, counts one written item and fails when its step name is in
/// the failing set.
pub struct ConcurrencyProbe {
    gauge: Mutex<(usize, usize)>,
    delay: Duration,
    failing: HashSet<String>,
    journal: Journal,
}

impl ConcurrencyProbe {
    /// Probe holding each run for `delay`
    pub fn new(delay: Duration, journal: &Journal) -> Self {
        Self {
            gauge: Mutex::new((0, 0)),
            delay,
            failing: HashSet::new(),
            journal: journal.clone(),
        }
    }

    /// Fail runs of the step called `step_name`
    pub fn failing_on(mut self, step_name: impl Into<String>) -> Self {
        self.failing.insert(step_name.into());
        self
    }

    /// Highest number of overlapping runs seen
    pub fn peak(&self) -> usize {
        self.gauge.lock().1
    }

    fn enter(&self) {
        let mut gauge = self.gauge.lock();
        gauge.0 += 1;
        gauge.1 = gauge.1.max(gauge.0);
    }

    fn leave(&self) {
        self.gauge.lock().0 -= 1;
    }
}

#[async_trait]
impl StepBody for ConcurrencyProbe {
    async fn run(
        &self,
        step_execution: &mut StepExecution,
        _listeners: &StepListenerDispatcher,
    ) -> Result<ExitStatus> {
        self.enter();
        tokio::time::sleep(self.delay).await;
        self.leave();

        self.journal.record(step_execution.step_name.clone());
        step_execution.counters.write_count += 1;
        if self.failing.contains(&step_execution.step_name) {
            return Err(CoreError::StepExecutionError(format!(
                "{} failed",
                step_execution.step_name
            )));
        }
        Ok(ExitStatus::completed())
    }
}
