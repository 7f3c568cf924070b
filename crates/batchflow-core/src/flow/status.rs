use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::domain::status::BatchStatus;

/// Coarse outcome of a flow, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FlowStatus {
    /// Finished normally
    Completed,
    /// Stopped, restartable
    Stopped,
    /// Failed
    Failed,
    /// Could not be determined
    Unknown,
}

impl FlowStatus {
    fn prefix(self) -> &'static str {
        match self {
            FlowStatus::Completed => "COMPLETED",
            FlowStatus::Stopped => "STOPPED",
            FlowStatus::Failed => "FAILED",
            FlowStatus::Unknown => "UNKNOWN",
        }
    }

    /// Status for a name: the worst status whose name prefixes it, or
    /// COMPLETED for custom names.
    pub fn from_name(name: &str) -> FlowStatus {
        [
            FlowStatus::Unknown,
            FlowStatus::Failed,
            FlowStatus::Stopped,
            FlowStatus::Completed,
        ]
        .into_iter()
        .find(|status| name.starts_with(status.prefix()))
        .unwrap_or(FlowStatus::Completed)
    }
}

/// The status a state reports back to its flow
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowExecutionStatus {
    name: String,
    status: FlowStatus,
}

impl FlowExecutionStatus {
    /// Status for a name, see [`FlowStatus::from_name`]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let status = FlowStatus::from_name(&name);
        Self { name, status }
    }

    /// COMPLETED
    pub fn completed() -> Self {
        Self::new("COMPLETED")
    }

    /// STOPPED
    pub fn stopped() -> Self {
        Self::new("STOPPED")
    }

    /// FAILED
    pub fn failed() -> Self {
        Self::new("FAILED")
    }

    /// UNKNOWN
    pub fn unknown() -> Self {
        Self::new("UNKNOWN")
    }

    /// The full name, used for transition matching
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The coarse status
    pub fn status(&self) -> FlowStatus {
        self.status
    }

    /// STOPPED
    pub fn is_stop(&self) -> bool {
        self.status == FlowStatus::Stopped
    }

    /// FAILED
    pub fn is_fail(&self) -> bool {
        self.status == FlowStatus::Failed
    }

    /// COMPLETED
    pub fn is_complete(&self) -> bool {
        self.status == FlowStatus::Completed
    }

    /// Any outcome other than UNKNOWN
    pub fn is_end(&self) -> bool {
        self.status != FlowStatus::Unknown
    }

    /// The batch status with the longest name that prefixes this name, or
    /// UNKNOWN.
    pub fn batch_status(&self) -> BatchStatus {
        [
            BatchStatus::Completed,
            BatchStatus::Starting,
            BatchStatus::Started,
            BatchStatus::Stopping,
            BatchStatus::Stopped,
            BatchStatus::Failed,
            BatchStatus::Abandoned,
            BatchStatus::Unknown,
        ]
        .into_iter()
        .filter(|status| self.name.starts_with(status.as_str()))
        .max_by_key(|status| status.as_str().len())
        .unwrap_or(BatchStatus::Unknown)
    }
}

impl PartialOrd for FlowExecutionStatus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FlowExecutionStatus {
    fn cmp(&self, other: &Self) -> Ordering {
        self.status
            .cmp(&other.status)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl fmt::Display for FlowExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Final state name and status of a flow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowExecution {
    /// Name of the last state handled
    pub name: String,
    /// Status it reported
    pub status: FlowExecutionStatus,
}

impl FlowExecution {
    /// New flow execution result
    pub fn new(name: impl Into<String>, status: FlowExecutionStatus) -> Self {
        Self {
            name: name.into(),
            status,
        }
    }
}
