use anyhow::Result;
use batchflow_core::{
    flow::LAST_STEPS_KEY, BatchStatus, EngineConfig, TransitionTarget,
};
use batchflow_test_utils::{
    assertions::{assert_job_outcome, assert_step_status, step_names},
    init_test_tracing, ConcurrencyProbe, Journal, ScriptedBody, TestConfig, TestEnvironment,
};
use batchflow_tests::run_parameters;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_failed_branch_fails_split_and_resets_exit_code() -> Result<()> {
    init_test_tracing();
    let env = TestEnvironment::new();
    let journal = Journal::new();

    let left = env
        .flow("left")
        .step(env.tasklet("index", ScriptedBody::completing(&journal)))
        .transition(
            "index",
            "*",
            TransitionTarget::End {
                exit_code: "INDEXED".to_string(),
            },
        )
        .build()?;
    let right = env
        .flow("right")
        .step(env.tasklet("thumbnails", ScriptedBody::failing(&journal, "codec missing")))
        .build()?;

    let flow = env
        .flow("publish")
        .split("parallel", vec![Arc::new(left), Arc::new(right)], None)
        .step(env.tasklet("report", ScriptedBody::completing(&journal)))
        .next("parallel", "report")
        .build()?;

    let execution = env
        .run(Arc::new(env.job("publish", flow)), run_parameters("batch-7", 1))
        .await?;

    assert_eq!(journal.count("report"), 0);
    assert_eq!(step_names(&execution), vec!["index", "thumbnails"]);
    assert_step_status(&execution, "index", BatchStatus::Completed)?;
    assert_step_status(&execution, "thumbnails", BatchStatus::Failed)?;
    // The custom code of the left branch does not leak into the job.
    assert_job_outcome(&execution, BatchStatus::Failed, "FAILED")?;
    assert_eq!(
        execution.execution_context.get(LAST_STEPS_KEY),
        Some(&json!(["index", "thumbnails"]))
    );
    Ok(())
}

#[tokio::test]
async fn test_successful_split_continues_flow() -> Result<()> {
    let env = TestEnvironment::new();
    let journal = Journal::new();

    let branches = ["north", "south", "east"]
        .iter()
        .map(|name| {
            env.flow(name)
                .step(env.tasklet(name, ScriptedBody::completing(&journal)))
                .build()
                .map(Arc::new)
        })
        .collect::<batchflow_core::Result<Vec<_>>>()?;

    let flow = env
        .flow("collect")
        .split("regions", branches, None)
        .step(env.tasklet("merge", ScriptedBody::completing(&journal)))
        .next("regions", "merge")
        .build()?;

    let execution = env
        .run(Arc::new(env.job("collect", flow)), run_parameters("day-1", 1))
        .await?;

    assert_job_outcome(&execution, BatchStatus::Completed, "COMPLETED")?;
    assert_eq!(step_names(&execution), vec!["north", "south", "east", "merge"]);
    assert_eq!(journal.entries().last().map(String::as_str), Some("merge"));
    Ok(())
}

#[tokio::test]
async fn test_configured_split_concurrency_bound() -> Result<()> {
    let config = TestConfig::new(EngineConfig {
        split_max_concurrency: Some(1),
        ..EngineConfig::default()
    });
    let env = TestEnvironment::with_config(config);
    let journal = Journal::new();
    let probe = Arc::new(ConcurrencyProbe::new(env.config.step_delay, &journal));

    let branches = ["a", "b", "c"]
        .iter()
        .map(|name| {
            env.flow(name)
                .step(env.shared_tasklet(name, probe.clone()))
                .build()
                .map(Arc::new)
        })
        .collect::<batchflow_core::Result<Vec<_>>>()?;

    let flow = env.flow("serial").split("bounded", branches, None).build()?;
    let execution = env
        .run(Arc::new(env.job("serial", flow)), run_parameters("x", 1))
        .await?;

    assert_job_outcome(&execution, BatchStatus::Completed, "COMPLETED")?;
    assert_eq!(probe.peak(), 1);
    assert_eq!(journal.entries().len(), 3);
    Ok(())
}
