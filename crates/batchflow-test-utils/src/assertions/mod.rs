//! Assertion utilities for finished job executions.

use batchflow_core::{BatchStatus, JobExecution, StepExecution};

use crate::error::TestError;

/// Names of the step executions recorded in `execution`, in order
pub fn step_names(execution: &JobExecution) -> Vec<String> {
    execution
        .step_executions
        .iter()
        .map(|step| step.step_name.clone())
        .collect()
}

/// The step execution of `step_name`
pub fn step<'a>(execution: &'a JobExecution, step_name: &str) -> Result<&'a StepExecution, TestError> {
    execution
        .step_executions
        .iter()
        .find(|step| step.step_name == step_name)
        .ok_or_else(|| {
            TestError::Assertion(format!(
                "No execution of step {} in {:?}",
                step_name,
                step_names(execution)
            ))
        })
}

/// Asserts the job ended with `status` and `exit_code`
pub fn assert_job_outcome(
    execution: &JobExecution,
    status: BatchStatus,
    exit_code: &str,
) -> Result<(), TestError> {
    if execution.status != status || execution.exit_status.exit_code() != exit_code {
        return Err(TestError::Assertion(format!(
            "Expected job {} to end {} / {}, got {} / {}",
            execution.job_name(),
            status,
            exit_code,
            execution.status,
            execution.exit_status.exit_code()
        )));
    }
    Ok(())
}

/// Asserts the step execution of `step_name` ended with `status`
pub fn assert_step_status(
    execution: &JobExecution,
    step_name: &str,
    status: BatchStatus,
) -> Result<(), TestError> {
    let actual = step(execution, step_name)?.status;
    if actual != status {
        return Err(TestError::Assertion(format!(
            "Expected step {} to be {}, got {}",
            step_name, status, actual
        )));
    }
    Ok(())
}
