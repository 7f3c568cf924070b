//! Batch and exit statuses
//!
//! `BatchStatus` is the coarse lifecycle of an execution. `ExitStatus` is the
//! finer-grained (code, description) pair that drives flow transitions.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Lifecycle status of a job or step execution.
///
/// Variants are declared from most to least favorable, so the derived
/// ordering doubles as the severity ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    /// Finished successfully
    Completed,
    /// Created but not yet running
    Starting,
    /// Running
    Started,
    /// A stop was requested while running
    Stopping,
    /// Stopped and restartable
    Stopped,
    /// Finished with an error
    Failed,
    /// Given up on; never restarted
    Abandoned,
    /// Outcome could not be determined
    Unknown,
}

impl BatchStatus {
    /// Running states
    pub fn is_running(self) -> bool {
        matches!(
            self,
            BatchStatus::Starting | BatchStatus::Started | BatchStatus::Stopping
        )
    }

    /// FAILED or worse
    pub fn is_unsuccessful(self) -> bool {
        self >= BatchStatus::Failed
    }

    /// Strictly more severe than `other`
    pub fn is_greater_than(self, other: BatchStatus) -> bool {
        self > other
    }

    /// The more severe of two statuses
    pub fn max(self, other: BatchStatus) -> BatchStatus {
        std::cmp::max(self, other)
    }

    /// Combine a status with a newer observation.
    ///
    /// Once either side has finished (anything past STARTED) the most severe
    /// wins. While both are still running, COMPLETED on either side wins.
    pub fn upgrade_to(self, other: BatchStatus) -> BatchStatus {
        if self > BatchStatus::Started || other > BatchStatus::Started {
            self.max(other)
        } else if self == BatchStatus::Completed || other == BatchStatus::Completed {
            BatchStatus::Completed
        } else {
            self.max(other)
        }
    }

    /// Upper-case name, as persisted
    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::Starting => "STARTING",
            BatchStatus::Started => "STARTED",
            BatchStatus::Stopping => "STOPPING",
            BatchStatus::Stopped => "STOPPED",
            BatchStatus::Failed => "FAILED",
            BatchStatus::Abandoned => "ABANDONED",
            BatchStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COMPLETED" => Ok(BatchStatus::Completed),
            "STARTING" => Ok(BatchStatus::Starting),
            "STARTED" => Ok(BatchStatus::Started),
            "STOPPING" => Ok(BatchStatus::Stopping),
            "STOPPED" => Ok(BatchStatus::Stopped),
            "FAILED" => Ok(BatchStatus::Failed),
            "ABANDONED" => Ok(BatchStatus::Abandoned),
            "UNKNOWN" => Ok(BatchStatus::Unknown),
            other => Err(CoreError::ValidationError(format!(
                "Unknown batch status: {}",
                other
            ))),
        }
    }
}

/// Exit code and description of a finished (or running) execution
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExitStatus {
    exit_code: String,
    exit_description: String,
}

impl ExitStatus {
    /// Code for an outcome that could not be determined
    pub const UNKNOWN: &'static str = "UNKNOWN";
    /// Code for an execution still in progress
    pub const EXECUTING: &'static str = "EXECUTING";
    /// Code for a successful execution
    pub const COMPLETED: &'static str = "COMPLETED";
    /// Code for an execution that had nothing to do
    pub const NOOP: &'static str = "NOOP";
    /// Code for a failed execution
    pub const FAILED: &'static str = "FAILED";
    /// Code for a stopped execution
    pub const STOPPED: &'static str = "STOPPED";

    /// New exit status with an empty description
    pub fn new(exit_code: impl Into<String>) -> Self {
        Self {
            exit_code: exit_code.into(),
            exit_description: String::new(),
        }
    }

    /// New exit status with a description
    pub fn with_description(exit_code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            exit_code: exit_code.into(),
            exit_description: description.into(),
        }
    }

    /// UNKNOWN
    pub fn unknown() -> Self {
        Self::new(Self::UNKNOWN)
    }

    /// EXECUTING
    pub fn executing() -> Self {
        Self::new(Self::EXECUTING)
    }

    /// COMPLETED
    pub fn completed() -> Self {
        Self::new(Self::COMPLETED)
    }

    /// NOOP
    pub fn noop() -> Self {
        Self::new(Self::NOOP)
    }

    /// FAILED
    pub fn failed() -> Self {
        Self::new(Self::FAILED)
    }

    /// STOPPED
    pub fn stopped() -> Self {
        Self::new(Self::STOPPED)
    }

    /// The exit code
    pub fn exit_code(&self) -> &str {
        &self.exit_code
    }

    /// The exit description (may be empty)
    pub fn exit_description(&self) -> &str {
        &self.exit_description
    }

    fn severity(&self) -> u8 {
        match self.exit_code.as_str() {
            Self::EXECUTING => 1,
            Self::COMPLETED => 2,
            Self::NOOP => 3,
            Self::STOPPED => 4,
            Self::FAILED => 5,
            Self::UNKNOWN => 6,
            _ => 7,
        }
    }

    /// Combine with another status: descriptions are concatenated and the
    /// more severe code is kept. Custom codes rank above all built-in ones.
    pub fn and(&self, other: &ExitStatus) -> ExitStatus {
        let mut result = self.add_exit_description(&other.exit_description);
        if self.cmp(other) == Ordering::Less {
            result = result.replace_exit_code(&other.exit_code);
        }
        result
    }

    /// Append a description, separated by `"; "`, unless it is empty or
    /// equal to the current one.
    pub fn add_exit_description(&self, description: &str) -> ExitStatus {
        let description = description.trim();
        if description.is_empty() || description == self.exit_description {
            return self.clone();
        }
        let mut combined = self.exit_description.clone();
        if !combined.is_empty() {
            combined.push_str("; ");
        }
        combined.push_str(description);
        ExitStatus::with_description(self.exit_code.clone(), combined)
    }

    /// Same description, different code
    pub fn replace_exit_code(&self, code: &str) -> ExitStatus {
        ExitStatus::with_description(code, self.exit_description.clone())
    }

    /// EXECUTING or UNKNOWN
    pub fn is_running(&self) -> bool {
        self.exit_code == Self::EXECUTING || self.exit_code == Self::UNKNOWN
    }

    /// True for custom codes, i.e. anything other than the built-in ones.
    /// A custom job exit code is never overwritten by the engine.
    pub fn is_non_default(&self) -> bool {
        !self.exit_code.is_empty() && self.severity() == 7
    }
}

impl Default for ExitStatus {
    fn default() -> Self {
        Self::executing()
    }
}

impl PartialOrd for ExitStatus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ExitStatus {
    fn cmp(&self, other: &Self) -> Ordering {
        self.severity()
            .cmp(&other.severity())
            .then_with(|| self.exit_code.cmp(&other.exit_code))
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "exitCode={};exitDescription={}",
            self.exit_code, self.exit_description
        )
    }
}

impl From<BatchStatus> for ExitStatus {
    fn from(status: BatchStatus) -> Self {
        match status {
            BatchStatus::Completed => ExitStatus::completed(),
            BatchStatus::Starting | BatchStatus::Started | BatchStatus::Stopping => {
                ExitStatus::executing()
            }
            BatchStatus::Stopped => ExitStatus::stopped(),
            BatchStatus::Failed => ExitStatus::failed(),
            BatchStatus::Abandoned | BatchStatus::Unknown => ExitStatus::unknown(),
        }
    }
}
