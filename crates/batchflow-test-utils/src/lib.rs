//! Testing utilities for Batchflow.
//!
//! This crate provides the shared fixtures of the Batchflow test suites:
//! an in-memory environment, scripted step bodies (fakes), mocks of the
//! listener and partition collaborator traits, and assertions over finished
//! executions.

pub mod assertions;
pub mod builders;
pub mod config;
pub mod error;
pub mod implementations;
pub mod mocks;
pub mod util;

/// Re-export commonly used types for convenience
pub use mockall;

pub use builders::TestEnvironment;
pub use config::TestConfig;
pub use error::TestError;
pub use implementations::{ConcurrencyProbe, Journal, Outcome, ScriptedBody};
pub use util::init_test_tracing;
