use anyhow::Result;
use batchflow_core::{
    partition::{PartitionPlan, PartitionStatus, PartitionStepBuilder, GRID_SIZE_KEY},
    BatchStatus, ExecutionContext,
};
use batchflow_test_utils::{
    assertions::{assert_job_outcome, step},
    init_test_tracing,
    mocks::{MockAnalyzer, MockCollector, MockReducer},
    mockall::Sequence,
    ConcurrencyProbe, Journal, TestEnvironment,
};
use batchflow_tests::run_parameters;
use serde_json::json;
use std::sync::Arc;

fn plan(partitions: usize, threads: usize) -> PartitionPlan {
    let contexts = (0..partitions)
        .map(|i| {
            let mut context = ExecutionContext::new();
            context.put_long("offset", (i * 100) as i64);
            context
        })
        .collect();
    PartitionPlan::new(partitions)
        .with_threads(threads)
        .with_partition_contexts(contexts)
}

#[tokio::test]
async fn test_partitions_bounded_and_failure_isolated() -> Result<()> {
    init_test_tracing();
    let env = TestEnvironment::new();
    let journal = Journal::new();
    let probe = Arc::new(
        ConcurrencyProbe::new(env.config.step_delay, &journal).failing_on("load:partition2"),
    );
    let worker = env.shared_tasklet("load-worker", probe.clone());

    let mut collector = MockCollector::new();
    collector
        .expect_collect()
        .times(4)
        .returning(|partition| Ok(json!(partition.step_name)));
    let mut analyzer = MockAnalyzer::new();
    analyzer
        .expect_analyze_collector_data()
        .times(4)
        .returning(|_| Ok(()));
    analyzer
        .expect_analyze_status()
        .times(4)
        .returning(|_, _| Ok(()));
    let mut reducer = MockReducer::new();
    let mut sequence = Sequence::new();
    reducer
        .expect_begin_partitioned_step()
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|| Ok(()));
    reducer
        .expect_rollback_partitioned_step()
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|| Ok(()));
    reducer
        .expect_after_partitioned_step_completion()
        .withf(|status| *status == PartitionStatus::Rollback)
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_| Ok(()));
    reducer.expect_before_partitioned_step_completion().times(0);

    let manager = PartitionStepBuilder::new(
        "load",
        worker,
        Arc::new(plan(4, 2)),
        env.repository.clone(),
    )
    .collector(Arc::new(collector))
    .analyzer(Arc::new(analyzer))
    .reducer(Arc::new(reducer))
    .build();

    let flow = env.flow("ingest").step(Arc::new(manager)).build()?;
    let execution = env
        .run(Arc::new(env.job("ingest", flow)), run_parameters("2024-01", 1))
        .await?;

    assert_eq!(probe.peak(), 2);
    assert_eq!(journal.entries().len(), 4);
    assert_job_outcome(&execution, BatchStatus::Failed, "FAILED")?;

    let manager = step(&execution, "load")?;
    assert_eq!(manager.status, BatchStatus::Failed);
    assert_eq!(manager.execution_context.get_long(GRID_SIZE_KEY), Some(4));

    let instance = &execution.job_instance;
    for (index, expected) in [
        BatchStatus::Completed,
        BatchStatus::Completed,
        BatchStatus::Failed,
        BatchStatus::Completed,
    ]
    .into_iter()
    .enumerate()
    {
        let name = format!("load:partition{}", index);
        let partition = env
            .repository
            .get_last_step_execution(instance, &name)
            .await?
            .unwrap();
        assert_eq!(partition.status, expected, "{}", name);
        assert_eq!(partition.counters.write_count, 1);
        assert_eq!(
            partition.execution_context.get_long("offset"),
            Some((index * 100) as i64)
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_restart_reruns_only_failed_partitions() -> Result<()> {
    let env = TestEnvironment::new();
    let journal = Journal::new();
    let params = run_parameters("2024-02", 1);

    let failing = Arc::new(
        ConcurrencyProbe::new(env.config.step_delay, &journal).failing_on("load:partition1"),
    );
    let manager = PartitionStepBuilder::new(
        "load",
        env.shared_tasklet("load-worker", failing),
        Arc::new(plan(3, 3)),
        env.repository.clone(),
    )
    .build();
    let flow = env.flow("ingest").step(Arc::new(manager)).build()?;
    let first = env
        .run(Arc::new(env.job("ingest", flow)), params.clone())
        .await?;
    assert_job_outcome(&first, BatchStatus::Failed, "FAILED")?;
    assert_eq!(journal.entries().len(), 3);

    journal.clear();
    let healthy = Arc::new(ConcurrencyProbe::new(env.config.step_delay, &journal));
    // A different partition count is ignored: the grid size was recorded.
    let manager = PartitionStepBuilder::new(
        "load",
        env.shared_tasklet("load-worker", healthy),
        Arc::new(plan(5, 3)),
        env.repository.clone(),
    )
    .build();
    let flow = env.flow("ingest").step(Arc::new(manager)).build()?;
    let second = env
        .run(Arc::new(env.job("ingest", flow)), params)
        .await?;

    assert_job_outcome(&second, BatchStatus::Completed, "COMPLETED")?;
    assert_eq!(journal.entries(), vec!["load:partition1"]);
    let manager = step(&second, "load")?;
    assert_eq!(manager.counters.write_count, 1);
    assert_eq!(manager.execution_context.get_long(GRID_SIZE_KEY), Some(3));
    Ok(())
}

#[tokio::test]
async fn test_all_partitions_successful_commits() -> Result<()> {
    let env = TestEnvironment::new();
    let journal = Journal::new();

    let mut reducer = MockReducer::new();
    reducer
        .expect_begin_partitioned_step()
        .times(1)
        .returning(|| Ok(()));
    reducer
        .expect_before_partitioned_step_completion()
        .times(1)
        .returning(|| Ok(()));
    reducer
        .expect_after_partitioned_step_completion()
        .withf(|status| *status == PartitionStatus::Commit)
        .times(1)
        .returning(|_| Ok(()));
    reducer.expect_rollback_partitioned_step().times(0);

    let manager = PartitionStepBuilder::new(
        "load",
        env.tasklet("load-worker", ConcurrencyProbe::new(env.config.step_delay, &journal)),
        Arc::new(PartitionPlan::new(3)),
        env.repository.clone(),
    )
    .reducer(Arc::new(reducer))
    .build();

    let flow = env.flow("ingest").step(Arc::new(manager)).build()?;
    let execution = env
        .run(Arc::new(env.job("ingest", flow)), run_parameters("2024-03", 1))
        .await?;

    assert_job_outcome(&execution, BatchStatus::Completed, "COMPLETED")?;
    assert_eq!(step(&execution, "load")?.counters.write_count, 3);
    Ok(())
}
