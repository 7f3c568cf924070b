//! Shared fixtures of the Batchflow scenario suites.

use batchflow_core::{JobParameter, JobParameters};

/// Parameters identifying one run of a scenario job. `attempt` is
/// non-identifying, so every attempt maps to the same job instance.
pub fn run_parameters(input: &str, attempt: i64) -> JobParameters {
    JobParameters::new()
        .with_string("input", input)
        .with("attempt", JobParameter::non_identifying(attempt))
}
