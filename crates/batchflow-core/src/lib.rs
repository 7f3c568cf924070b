//!
//! Batchflow Core - resumable batch job engine
//!
//! This crate defines the execution model, the repository port, listener
//! dispatch, the flow state machine and partitioned steps. Storage backends
//! implement the DAO traits in [`domain::repository`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Engine configuration
pub mod config;

/// Error types
pub mod error;

/// Domain layer - executions, statuses, checkpoints and repository ports
pub mod domain;

/// Application services - repository composition and job launching
pub mod application;

/// Lifecycle listeners and their dispatch
pub mod listener;

/// Flow graph and state machine
pub mod flow;

/// Steps and restart handling
pub mod step;

/// Jobs
pub mod job;

/// Partitioned steps
pub mod partition;

#[cfg(test)]
mod test_support;

// Re-export key types
pub use config::EngineConfig;
pub use error::{CoreError, Result};

pub use domain::execution::{JobExecution, JobInstance, StepCounters, StepExecution};
pub use domain::execution_context::ExecutionContext;
pub use domain::job_parameters::{JobParameter, JobParameters};
pub use domain::repository::{
    ExecutionContextDao, JobExecutionDao, JobInstanceDao, JobRepository, StepExecutionDao,
};
pub use domain::serializer::{ExecutionContextSerializer, JsonExecutionContextSerializer};
pub use domain::status::{BatchStatus, ExitStatus};

pub use application::job_launcher::JobLauncher;
pub use application::job_repository::SimpleJobRepository;

pub use flow::{Flow, FlowBuilder, FlowExecutionStatus, State, TransitionTarget};
pub use job::{FlowJob, Job};
pub use step::{Step, StepBody, StepHandler, TaskletStep};
