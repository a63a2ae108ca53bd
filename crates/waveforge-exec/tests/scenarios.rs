//! End-to-end scenario tests for the Runner, exercising the literal scenarios listed in
//! the engine's testable-properties section: a sequential chain, a diamond, a matrix
//! fan-out, always-task cleanup after a failure, and retry-until-success.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use waveforge_core::model::{Task, TaskStatus, Workflow};
use waveforge_exec::{ExecutorDispatcher, NoopWebhookNotifier, OverallStatus, RunOptions, Runner};

fn task(id: &str, run: &str, deps: &[&str]) -> Task {
    Task {
        id: id.to_string(),
        name: None,
        run: run.to_string(),
        shell: None,
        working_directory: None,
        env: BTreeMap::new(),
        depends_on: deps.iter().map(|s| s.to_string()).collect(),
        condition: None,
        input: None,
        output: None,
        timeout_ms: Some(5_000),
        continue_on_error: false,
        retry_count: 0,
        retry_delay_ms: 0,
        matrix: None,
        execution_environment: None,
        matrix_values: None,
    }
}

fn workflow(tasks: Vec<Task>) -> Arc<Workflow> {
    Arc::new(Workflow {
        name: "scenario".into(),
        description: None,
        tasks,
        env: BTreeMap::new(),
        default_timeout_ms: 5_000,
        default_shell: None,
        webhooks: vec![],
        execution_environment: None,
        watch: None,
        max_parallelism: -1,
        stop_on_first_failure: false,
    })
}

async fn run(wf: Arc<Workflow>) -> (waveforge_exec::RunSummary, waveforge_exec::EventPublisher) {
    let dispatcher = ExecutorDispatcher::default();
    let notifier = NoopWebhookNotifier;
    let runner = Runner::new(&dispatcher, &notifier);
    runner
        .run(wf, RunOptions::default(), CancellationToken::new())
        .await
        .expect("run should build a valid plan")
}

/// Scenario 1: a,b,c chained by dependsOn. Three waves of one task each; overall
/// status succeeds.
#[tokio::test]
async fn sequential_chain_completes_in_order_and_succeeds() {
    let wf = workflow(vec![
        task("a", "echo a", &[]),
        task("b", "echo b", &["a"]),
        task("c", "echo c", &["b"]),
    ]);
    let mut task_rx = {
        let dispatcher = ExecutorDispatcher::default();
        let notifier = NoopWebhookNotifier;
        let runner = Runner::new(&dispatcher, &notifier);
        let (summary, publisher) = runner.run(wf, RunOptions::default(), CancellationToken::new()).await.unwrap();
        assert_eq!(summary.status, OverallStatus::Succeeded);
        assert_eq!(summary.results.len(), 3);
        assert_eq!(summary.results[0].task_id, "a");
        assert_eq!(summary.results[1].task_id, "b");
        assert_eq!(summary.results[2].task_id, "c");
        publisher.subscribe_tasks()
    };
    // channel already drained by the completed run; just assert it doesn't panic to read.
    assert!(task_rx.try_recv().is_err());
}

/// Scenario 2: a diamond dependency graph produces three waves, with the middle wave
/// holding both branch tasks.
#[tokio::test]
async fn diamond_produces_three_waves_and_succeeds() {
    let wf = workflow(vec![
        task("root", "echo root", &[]),
        task("l", "echo l", &["root"]),
        task("r", "echo r", &["root"]),
        task("join", "echo join", &["l", "r"]),
    ]);
    let (summary, _publisher) = run(wf).await;
    assert_eq!(summary.status, OverallStatus::Succeeded);
    assert_eq!(summary.results.len(), 4);
}

/// Scenario 3: matrix fan-out with per-axis fan-in — verified at the plan level since
/// the Runner only executes an already-expanded plan; matrix expansion itself is
/// covered in `waveforge-core`.
#[tokio::test]
async fn matrix_expanded_tasks_execute_with_rewritten_dependencies() {
    use waveforge_core::model::MatrixSpec;

    let dims = vec![("os".to_string(), vec!["ubuntu".to_string(), "macos".to_string()])];

    let mut build = task("build", "echo build ${{ matrix.os }}", &[]);
    build.matrix = Some(MatrixSpec { dimensions: dims.clone(), exclude: vec![], include: vec![] });

    let mut test = task("test", "echo test ${{ matrix.os }}", &["build"]);
    test.matrix = Some(MatrixSpec { dimensions: dims, exclude: vec![], include: vec![] });

    let wf = workflow(vec![build, test]);
    let (summary, _publisher) = run(wf).await;

    assert_eq!(summary.status, OverallStatus::Succeeded);
    let ids: Vec<&str> = summary.results.iter().map(|r| r.task_id.as_str()).collect();
    assert!(ids.contains(&"build-ubuntu"));
    assert!(ids.contains(&"build-macos"));
    assert!(ids.contains(&"test-ubuntu"));
    assert!(ids.contains(&"test-macos"));
}

/// Scenario 4: `main` fails, `cleanup` is `if: always()`; cleanup still runs and the
/// overall status is Failed.
#[tokio::test]
async fn always_task_runs_after_a_failing_task_and_overall_status_is_failed() {
    let mut cleanup = task("cleanup", "echo cleaned", &[]);
    cleanup.condition = Some("${{ always() }}".to_string());
    let wf = workflow(vec![task("main", "exit 1", &[]), cleanup]);

    let (summary, _publisher) = run(wf).await;

    assert_eq!(summary.status, OverallStatus::Failed);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 0);
    let cleanup_result = summary.results.iter().find(|r| r.task_id == "cleanup").unwrap();
    assert_eq!(cleanup_result.status, TaskStatus::Succeeded);
}

/// Scenario 5: a task that fails on its first attempt and succeeds on its second,
/// given `retryCount: 2`.
#[tokio::test]
async fn retrying_task_succeeds_on_second_attempt() {
    // A stamp file is created on the first attempt; its presence makes the second
    // attempt's shell invocation succeed.
    let dir = std::env::temp_dir().join(format!("waveforge-retry-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let stamp = dir.join("stamp");

    let mut flaky = task(
        "flaky",
        &format!("test -f {stamp:?} || (touch {stamp:?} && exit 1)", stamp = stamp.display()),
        &[],
    );
    flaky.retry_count = 2;
    flaky.retry_delay_ms = 10;

    let wf = workflow(vec![flaky]);
    let (summary, _publisher) = run(wf).await;

    assert_eq!(summary.status, OverallStatus::Succeeded);
    assert_eq!(summary.results[0].status, TaskStatus::Succeeded);

    std::fs::remove_dir_all(&dir).ok();
}
