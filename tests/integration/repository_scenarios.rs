use anyhow::Result;
use batchflow_core::{BatchStatus, CoreError, ExitStatus};
use batchflow_test_utils::{init_test_tracing, TestEnvironment};
use batchflow_tests::run_parameters;

#[tokio::test]
async fn test_concurrent_updates_conflict() -> Result<()> {
    init_test_tracing();
    let env = TestEnvironment::new();
    let params = run_parameters("orders.csv", 1);

    let execution = env.repository.create_job_execution("import", &params).await?;
    let mut first = execution.clone();
    let mut second = execution;

    first.status = BatchStatus::Started;
    env.repository.update_job_execution(&mut first).await?;

    second.status = BatchStatus::Stopping;
    let result = env.repository.update_job_execution(&mut second).await;
    assert!(matches!(
        result,
        Err(CoreError::OptimisticLockingFailure { .. })
    ));

    let id = first.id.unwrap();
    let stored = env.provider.job_executions().row(id).unwrap();
    assert_eq!(stored.status, BatchStatus::Started);
    assert_eq!(stored.version, first.version);
    Ok(())
}

#[tokio::test]
async fn test_step_execution_conflict() -> Result<()> {
    let env = TestEnvironment::new();
    let job_execution = env
        .repository
        .create_job_execution("import", &run_parameters("orders.csv", 1))
        .await?;

    let mut step_execution = job_execution.create_step_execution("load");
    env.repository.add_step_execution(&mut step_execution).await?;
    let mut stale = step_execution.clone();

    step_execution.status = BatchStatus::Started;
    env.repository.update_step_execution(&mut step_execution).await?;

    stale.status = BatchStatus::Completed;
    let error = env
        .repository
        .update_step_execution(&mut stale)
        .await
        .unwrap_err();
    assert!(error.is_optimistic_locking_failure());
    Ok(())
}

#[tokio::test]
async fn test_duplicate_instance_rejected() -> Result<()> {
    let env = TestEnvironment::new();

    env.repository
        .create_job_instance("import", &run_parameters("orders.csv", 1))
        .await?;
    let result = env
        .repository
        .create_job_instance("import", &run_parameters("orders.csv", 2))
        .await;

    assert!(matches!(result, Err(CoreError::DuplicateJobInstance { .. })));
    assert!(
        env.repository
            .is_job_instance_exists("import", &run_parameters("orders.csv", 3))
            .await?
    );
    assert!(
        !env.repository
            .is_job_instance_exists("import", &run_parameters("returns.csv", 1))
            .await?
    );
    Ok(())
}

#[tokio::test]
async fn test_last_execution_and_history() -> Result<()> {
    let env = TestEnvironment::new();
    let params = run_parameters("orders.csv", 1);

    let mut first = env.repository.create_job_execution("import", &params).await?;
    first.status = BatchStatus::Failed;
    first.exit_status = ExitStatus::failed();
    env.repository.update_job_execution(&mut first).await?;

    let second = env.repository.create_job_execution("import", &params).await?;

    let last = env
        .repository
        .get_last_job_execution("import", &params)
        .await?
        .unwrap();
    assert_eq!(last.id, second.id);

    let history = env.repository.get_job_executions(&first.job_instance).await?;
    let ids: Vec<_> = history.iter().map(|execution| execution.id).collect();
    assert_eq!(ids, vec![second.id, first.id]);
    Ok(())
}
