use anyhow::Result;
use batchflow_core::{
    flow::{RESTART_STEP_KEY, STOPPED_STEP_KEY},
    BatchStatus, CoreError, ExitStatus, JobExecution, StepExecution, TaskletStep,
    TransitionTarget,
};
use batchflow_test_utils::{
    assertions::{assert_job_outcome, assert_step_status, step_names},
    init_test_tracing, Journal, Outcome, ScriptedBody, TestEnvironment, TestError,
};
use batchflow_tests::run_parameters;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_stop_abandons_step_and_restart_resumes() -> Result<()> {
    init_test_tracing();
    let env = TestEnvironment::new();
    let journal = Journal::new();
    let params = run_parameters("ledger", 1);

    let flow = env
        .flow("settle")
        .step(env.tasklet(
            "reconcile",
            ScriptedBody::scripted(&journal, vec![Outcome::fail("mismatch")], Outcome::completed()),
        ))
        .step(env.tasklet("post", ScriptedBody::completing(&journal)))
        .transition(
            "reconcile",
            "FAILED",
            TransitionTarget::Stop {
                restart: Some("post".to_string()),
                abandon: true,
            },
        )
        .transition("reconcile", "*", TransitionTarget::to("post"))
        .build()?;
    let job = Arc::new(env.job("settle", flow));

    let first = env.run(job.clone(), params.clone()).await?;
    assert_job_outcome(&first, BatchStatus::Stopped, "STOPPED")?;
    assert_step_status(&first, "reconcile", BatchStatus::Abandoned)?;
    assert_eq!(
        first.execution_context.get(RESTART_STEP_KEY),
        Some(&json!("post"))
    );
    assert_eq!(
        first.execution_context.get(STOPPED_STEP_KEY),
        Some(&json!("reconcile"))
    );
    let stored = env
        .repository
        .get_last_step_execution(&first.job_instance, "reconcile")
        .await?
        .unwrap();
    assert_eq!(stored.status, BatchStatus::Abandoned);

    let second = env.run(job, params).await?;
    assert_job_outcome(&second, BatchStatus::Completed, "COMPLETED")?;
    assert_eq!(step_names(&second), vec!["post"]);
    assert_eq!(journal.entries(), vec!["reconcile", "post"]);
    assert_eq!(second.job_instance, first.job_instance);
    Ok(())
}

#[tokio::test]
async fn test_restart_skips_completed_steps() -> Result<()> {
    let env = TestEnvironment::new();
    let journal = Journal::new();
    let params = run_parameters("ledger", 1);

    let flow = env
        .flow("settle")
        .step(env.tasklet("extract", ScriptedBody::completing(&journal)))
        .step(env.tasklet(
            "load",
            ScriptedBody::scripted(&journal, vec![Outcome::fail("timeout")], Outcome::completed()),
        ))
        .next("extract", "load")
        .build()?;
    let job = Arc::new(env.job("settle", flow));

    let first = env.run(job.clone(), params.clone()).await?;
    assert_job_outcome(&first, BatchStatus::Failed, "FAILED")?;

    let second = env.run(job.clone(), params.clone()).await?;
    assert_job_outcome(&second, BatchStatus::Completed, "COMPLETED")?;
    assert_eq!(step_names(&second), vec!["load"]);
    assert_eq!(journal.entries(), vec!["extract", "load", "load"]);

    let third = env.run(job, params).await;
    assert!(matches!(
        third,
        Err(TestError::Core(CoreError::JobInstanceAlreadyComplete(_)))
    ));
    Ok(())
}

#[tokio::test]
async fn test_non_restartable_job_refused() -> Result<()> {
    let env = TestEnvironment::new();
    let journal = Journal::new();
    let params = run_parameters("ledger", 1);

    let flow = env
        .flow("settle")
        .step(env.tasklet("extract", ScriptedBody::failing(&journal, "offline")))
        .build()?;
    let job = Arc::new(env.job("settle", flow).restartable(false));

    let first = env.run(job.clone(), params.clone()).await?;
    assert_job_outcome(&first, BatchStatus::Failed, "FAILED")?;

    let second = env.run(job, params).await;
    assert!(matches!(second, Err(TestError::Core(CoreError::JobRestartError(_)))));
    assert_eq!(journal.count("extract"), 1);
    Ok(())
}

#[tokio::test]
async fn test_start_limit_fails_restart() -> Result<()> {
    let env = TestEnvironment::new();
    let journal = Journal::new();
    let params = run_parameters("ledger", 1);

    let limited = Arc::new(
        TaskletStep::new(
            "extract",
            Arc::new(ScriptedBody::failing(&journal, "offline")),
            env.repository.clone(),
        )
        .with_start_limit(1),
    );
    let flow = env.flow("settle").step(limited).build()?;
    let job = Arc::new(env.job("settle", flow));

    env.run(job.clone(), params.clone()).await?;
    let second = env.run(job, params).await?;

    assert_job_outcome(&second, BatchStatus::Failed, "FAILED")?;
    assert!(second
        .exit_status
        .exit_description()
        .contains("Maximum start limit exceeded"));
    assert_eq!(journal.count("extract"), 1);
    Ok(())
}

#[tokio::test]
async fn test_restart_with_nothing_left_is_noop() -> Result<()> {
    let env = TestEnvironment::new();
    let journal = Journal::new();
    let params = run_parameters("ledger", 1);

    let flow = env
        .flow("settle")
        .step(env.tasklet("extract", ScriptedBody::exiting(&journal, "HOLD")))
        .transition(
            "extract",
            "HOLD",
            TransitionTarget::Stop {
                restart: None,
                abandon: false,
            },
        )
        .transition("extract", "*", TransitionTarget::end())
        .build()?;
    let job = Arc::new(env.job("settle", flow));

    let first = env.run(job.clone(), params.clone()).await?;
    assert_job_outcome(&first, BatchStatus::Stopped, "STOPPED")?;
    assert_step_status(&first, "extract", BatchStatus::Completed)?;

    let second = env.run(job, params).await?;
    assert_eq!(second.status, BatchStatus::Completed);
    assert_eq!(second.exit_status.exit_code(), ExitStatus::NOOP);
    assert!(second.step_executions.is_empty());
    assert_eq!(journal.count("extract"), 1);
    Ok(())
}

#[tokio::test]
async fn test_decider_sees_skipped_step_on_restart() -> Result<()> {
    let env = TestEnvironment::new();
    let journal = Journal::new();
    let params = run_parameters("ledger", 1);

    let decider = |_job: &JobExecution, last: Option<&StepExecution>| -> batchflow_core::Result<ExitStatus> {
        Ok(ExitStatus::new(match last {
            Some(step) if step.status == BatchStatus::Completed => "GO",
            _ => "WAIT",
        }))
    };

    let flow = env
        .flow("settle")
        .step(env.tasklet("extract", ScriptedBody::completing(&journal)))
        .add_state(Arc::new(batchflow_core::flow::DecisionState::new(
            "gate",
            Arc::new(decider),
        )))
        .step(env.tasklet(
            "publish",
            ScriptedBody::scripted(&journal, vec![Outcome::fail("busy")], Outcome::completed()),
        ))
        .next("extract", "gate")
        .transition("gate", "GO", TransitionTarget::to("publish"))
        .transition("gate", "*", TransitionTarget::fail())
        .build()?;
    let job = Arc::new(env.job("settle", flow));

    env.run(job.clone(), params.clone()).await?;
    let second = env.run(job, params).await?;

    assert_job_outcome(&second, BatchStatus::Completed, "COMPLETED")?;
    assert_eq!(journal.entries(), vec!["extract", "publish", "publish"]);
    Ok(())
}

#[tokio::test]
async fn test_stop_reached_again_on_restart_completes() -> Result<()> {
    let env = TestEnvironment::new();
    let journal = Journal::new();
    let params = run_parameters("ledger", 1);

    let flow = env
        .flow("settle")
        .step(env.tasklet("extract", ScriptedBody::exiting(&journal, "PAUSE")))
        .step(env.tasklet("load", ScriptedBody::completing(&journal)))
        .transition(
            "extract",
            "PAUSE",
            TransitionTarget::Stop {
                restart: Some("load".to_string()),
                abandon: false,
            },
        )
        .transition("extract", "*", TransitionTarget::to("load"))
        .build()?;
    let job = Arc::new(env.job("settle", flow));

    let first = env.run(job.clone(), params.clone()).await?;
    assert_job_outcome(&first, BatchStatus::Stopped, "STOPPED")?;
    assert_eq!(journal.entries(), vec!["extract"]);

    // The skipped step reports PAUSE again and leads back to the stop.
    let second = env.run(job, params).await?;
    assert_job_outcome(&second, BatchStatus::Completed, "COMPLETED")?;
    assert_eq!(step_names(&second), vec!["load"]);
    assert_eq!(journal.entries(), vec!["extract", "load"]);
    Ok(())
}
