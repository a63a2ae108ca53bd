//! Scheduling throughput benchmark: how fast the core pipeline (validate, cycle-check,
//! matrix-expand, level) turns a workflow document into an `ExecutionPlan` as task
//! count and matrix fan-out grow.

use std::collections::BTreeMap;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use waveforge_core::model::{MatrixSpec, Task, Workflow};

fn plain_task(id: &str, deps: &[String]) -> Task {
    Task {
        id: id.to_string(),
        name: None,
        run: "echo hi".to_string(),
        shell: None,
        working_directory: None,
        env: BTreeMap::new(),
        depends_on: deps.to_vec(),
        condition: None,
        input: None,
        output: None,
        timeout_ms: None,
        continue_on_error: false,
        retry_count: 0,
        retry_delay_ms: 0,
        matrix: None,
        execution_environment: None,
        matrix_values: None,
    }
}

/// A chain of `n` tasks, each depending on the previous one: worst case for the
/// leveling recursion's depth.
fn chain_workflow(n: usize) -> Workflow {
    let mut tasks = Vec::with_capacity(n);
    for i in 0..n {
        let id = format!("t{i}");
        let deps = if i == 0 { vec![] } else { vec![format!("t{}", i - 1)] };
        tasks.push(plain_task(&id, &deps));
    }
    Workflow {
        name: "chain".into(),
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
    }
}

/// One matrix task with `n` values on a single dimension: worst case for the matrix
/// expander's combination count.
fn matrix_workflow(n: usize) -> Workflow {
    let values: Vec<String> = (0..n).map(|i| format!("v{i}")).collect();
    let mut build = plain_task("build", &[]);
    build.matrix = Some(MatrixSpec {
        dimensions: vec![("lane".to_string(), values)],
        include: vec![],
        exclude: vec![],
    });
    Workflow {
        name: "matrix".into(),
        description: None,
        tasks: vec![build],
        env: BTreeMap::new(),
        default_timeout_ms: 5_000,
        default_shell: None,
        webhooks: vec![],
        execution_environment: None,
        watch: None,
        max_parallelism: -1,
        stop_on_first_failure: false,
    }
}

fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_execution_plan/chain");
    for size in [10, 100, 1_000] {
        group.throughput(Throughput::Elements(size as u64));
        let workflow = chain_workflow(size);
        group.bench_with_input(BenchmarkId::new("tasks", size), &workflow, |b, workflow| {
            b.iter(|| waveforge_core::build_execution_plan(workflow).unwrap());
        });
    }
    group.finish();
}

fn bench_matrix(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_execution_plan/matrix_fanout");
    for size in [10, 100, 1_000] {
        group.throughput(Throughput::Elements(size as u64));
        let workflow = matrix_workflow(size);
        group.bench_with_input(BenchmarkId::new("values", size), &workflow, |b, workflow| {
            b.iter(|| waveforge_core::build_execution_plan(workflow).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_chain, bench_matrix);
criterion_main!(benches);
