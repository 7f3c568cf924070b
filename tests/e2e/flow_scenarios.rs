use anyhow::Result;
use batchflow_core::{
    flow::DecisionState, BatchStatus, ExitStatus, JobExecution, StepExecution, TransitionTarget,
};
use batchflow_test_utils::{
    assertions::{assert_job_outcome, assert_step_status, step_names},
    init_test_tracing,
    mocks::MockJobListener,
    ConcurrencyProbe, Journal, ScriptedBody, TestConfig, TestEnvironment, TestError,
};
use batchflow_tests::run_parameters;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_failed_transition_beats_wildcard() -> Result<()> {
    init_test_tracing();
    let env = TestEnvironment::new();
    let journal = Journal::new();

    let flow = env
        .flow("import")
        .step(env.tasklet("extract", ScriptedBody::failing(&journal, "bad header")))
        .step(env.tasklet("load", ScriptedBody::completing(&journal)))
        .step(env.tasklet("recover", ScriptedBody::completing(&journal)))
        .transition("extract", "FAILED", TransitionTarget::to("recover"))
        .transition("extract", "*", TransitionTarget::to("load"))
        .build()?;
    let job = Arc::new(env.job("import", flow));

    let execution = env
        .run(job, run_parameters("orders.csv", 1))
        .await?;

    assert_eq!(journal.entries(), vec!["extract", "recover"]);
    assert_step_status(&execution, "extract", BatchStatus::Failed)?;
    assert_job_outcome(&execution, BatchStatus::Completed, "COMPLETED")?;
    Ok(())
}

#[tokio::test]
async fn test_custom_exit_code_routes_by_pattern() -> Result<()> {
    let env = TestEnvironment::new();
    let journal = Journal::new();

    let flow = env
        .flow("import")
        .step(env.tasklet(
            "extract",
            ScriptedBody::exiting(&journal, "COMPLETED WITH SKIPS"),
        ))
        .step(env.tasklet("audit", ScriptedBody::completing(&journal)))
        .step(env.tasklet("load", ScriptedBody::completing(&journal)))
        .transition("extract", "COMPLETED*", TransitionTarget::to("audit"))
        .transition("extract", "*", TransitionTarget::to("load"))
        .build()?;

    let execution = env
        .run(Arc::new(env.job("import", flow)), run_parameters("orders.csv", 1))
        .await?;

    assert_eq!(journal.entries(), vec!["extract", "audit"]);
    assert_eq!(
        execution.step_executions[0].exit_status.exit_code(),
        "COMPLETED WITH SKIPS"
    );
    assert_job_outcome(&execution, BatchStatus::Completed, "COMPLETED")?;
    Ok(())
}

#[tokio::test]
async fn test_next_keeps_implicit_failure() -> Result<()> {
    let env = TestEnvironment::new();
    let journal = Journal::new();

    let flow = env
        .flow("import")
        .step(env.tasklet("extract", ScriptedBody::failing(&journal, "disk full")))
        .step(env.tasklet("load", ScriptedBody::completing(&journal)))
        .next("extract", "load")
        .build()?;

    let execution = env
        .run(Arc::new(env.job("import", flow)), run_parameters("orders.csv", 1))
        .await?;

    assert_eq!(journal.entries(), vec!["extract"]);
    assert_job_outcome(&execution, BatchStatus::Failed, "FAILED")?;
    assert!(execution.step_executions[0]
        .failure_exceptions
        .iter()
        .any(|failure| failure.contains("disk full")));
    Ok(())
}

#[tokio::test]
async fn test_unmatched_exit_code_fails_job() -> Result<()> {
    let env = TestEnvironment::new();
    let journal = Journal::new();

    let flow = env
        .flow("import")
        .step(env.tasklet("extract", ScriptedBody::exiting(&journal, "ODD")))
        .step(env.tasklet("load", ScriptedBody::completing(&journal)))
        .transition("extract", "COMPLETED", TransitionTarget::to("load"))
        .build()?;

    let execution = env
        .run(Arc::new(env.job("import", flow)), run_parameters("orders.csv", 1))
        .await?;

    assert_eq!(journal.entries(), vec!["extract"]);
    assert_eq!(execution.status, BatchStatus::Failed);
    assert_eq!(execution.exit_status.exit_code(), "FAILED");
    assert!(execution
        .exit_status
        .exit_description()
        .contains("Next state not found"));
    Ok(())
}

#[tokio::test]
async fn test_decision_routes_on_job_parameters() -> Result<()> {
    let env = TestEnvironment::new();
    let journal = Journal::new();

    let decider = |execution: &JobExecution, _last: Option<&StepExecution>| -> batchflow_core::Result<ExitStatus> {
        let code = match execution.job_parameters.get_string("input") {
            Some(input) if input.ends_with(".csv") => "CSV",
            _ => "OTHER",
        };
        Ok(ExitStatus::new(code))
    };

    let flow = env
        .flow("import")
        .step(env.tasklet("fetch", ScriptedBody::completing(&journal)))
        .add_state(Arc::new(DecisionState::new("format", Arc::new(decider))))
        .step(env.tasklet("parse_csv", ScriptedBody::completing(&journal)))
        .step(env.tasklet("parse_other", ScriptedBody::completing(&journal)))
        .next("fetch", "format")
        .transition("format", "CSV", TransitionTarget::to("parse_csv"))
        .transition("format", "*", TransitionTarget::to("parse_other"))
        .transition("parse_csv", "*", TransitionTarget::end())
        .transition("parse_other", "*", TransitionTarget::end())
        .build()?;
    let job = Arc::new(env.job("import", flow));

    let csv = env
        .run(job.clone(), run_parameters("orders.csv", 1))
        .await?;
    assert_eq!(step_names(&csv), vec!["fetch", "parse_csv"]);

    let other = env
        .run(job, run_parameters("orders.json", 1))
        .await?;
    assert_eq!(step_names(&other), vec!["fetch", "parse_other"]);
    Ok(())
}

#[tokio::test]
async fn test_job_listener_sees_final_status() -> Result<()> {
    let env = TestEnvironment::new();
    let journal = Journal::new();

    let mut listener = MockJobListener::new();
    listener
        .expect_before_job()
        .withf(|execution| execution.status == BatchStatus::Started)
        .times(1)
        .returning(|_| Ok(()));
    listener
        .expect_after_job()
        .withf(|execution| execution.status == BatchStatus::Completed)
        .times(1)
        .returning(|_| Ok(()));

    let flow = env
        .flow("import")
        .step(env.tasklet("extract", ScriptedBody::completing(&journal)))
        .build()?;
    let job = Arc::new(env.job("import", flow).with_listener(Arc::new(listener)));

    let execution = env
        .run(job, run_parameters("orders.csv", 1))
        .await?;
    assert_job_outcome(&execution, BatchStatus::Completed, "COMPLETED")?;
    Ok(())
}

#[tokio::test]
async fn test_slow_job_times_out() -> Result<()> {
    let config = TestConfig {
        timeout: Duration::from_millis(50),
        step_delay: Duration::from_secs(5),
        ..TestConfig::default()
    };
    let env = TestEnvironment::with_config(config);
    let journal = Journal::new();

    let flow = env
        .flow("import")
        .step(env.tasklet(
            "extract",
            ConcurrencyProbe::new(env.config.step_delay, &journal),
        ))
        .build()?;

    let outcome = env
        .run(Arc::new(env.job("import", flow)), run_parameters("orders.csv", 1))
        .await;
    assert!(matches!(outcome, Err(TestError::Timeout(_))));
    assert!(journal.entries().is_empty());
    Ok(())
}
