//! Runs the configured stages and iterations.

use s3perf_backend::BackendProvider;
use tokio::runtime::Handle;

use crate::config::{BenchmarkConfig, Stage};
use crate::driver::{Operation, Workload};
use crate::error::StageError;
use crate::payload::{KB, Payload};
use crate::report::{self, Metrics, StageSummary};
use crate::stage::run_stage;

/// Reports of a stage and of each of its iterations.
#[derive(Debug)]
pub struct StageOutcome {
    /// The kind of requests issued in this stage.
    pub operation: Operation,
    /// Aggregate over all iterations.
    pub summary: StageSummary,
    /// One summary per iteration, in order.
    pub iterations: Vec<StageSummary>,
}

/// Reports of all stages that ran.
#[derive(Debug, Default)]
pub struct BenchmarkSummary {
    /// Stage outcomes in execution order.
    pub stages: Vec<StageOutcome>,
}

impl BenchmarkSummary {
    /// Returns the outcome of the stage with the given operation, if it ran.
    pub fn stage(&self, operation: Operation) -> Option<&StageOutcome> {
        self.stages.iter().find(|stage| stage.operation == operation)
    }
}

/// Runs the benchmark described by `config`.
///
/// Uploads run before downloads, and cleanup runs last. Every stage is repeated `count` times,
/// except for cleanup which runs once. The first failing stage aborts the benchmark.
pub fn run(
    config: &BenchmarkConfig,
    provider: &BackendProvider,
    runtime: &Handle,
) -> Result<BenchmarkSummary, StageError> {
    let mut summary = BenchmarkSummary::default();

    if config.stage != Stage::Download {
        let outcome = run_iterations(config, Operation::Upload, config.count, provider, runtime)?;
        summary.stages.push(outcome);
    }

    if config.stage != Stage::Upload {
        let outcome =
            run_iterations(config, Operation::Download, config.count, provider, runtime)?;
        summary.stages.push(outcome);
    }

    if config.cleanup {
        let outcome = run_iterations(config, Operation::Cleanup, 1, provider, runtime)?;
        summary.stages.push(outcome);
    }

    Ok(summary)
}

fn run_iterations(
    config: &BenchmarkConfig,
    operation: Operation,
    count: usize,
    provider: &BackendProvider,
    runtime: &Handle,
) -> Result<StageOutcome, StageError> {
    let objects_per_iteration = (config.num_threads * config.num_objects) as u64;
    let obj_size_kb = config.obj_size_kb as u64;
    let mut iterations = Vec::with_capacity(count);

    let label = format!("{} stage", operation.label());
    let summary = report::measure(
        label,
        objects_per_iteration * count as u64,
        obj_size_kb,
        || {
            let mut metrics = Metrics::default();

            for iteration in 1..=count {
                let workload = match operation {
                    // Every upload iteration gets fresh contents.
                    Operation::Upload => Workload::Upload(Payload::generate(config.obj_size_kb)),
                    Operation::Download => Workload::Download {
                        object_size: config.obj_size_kb * KB,
                    },
                    Operation::Cleanup => Workload::Cleanup,
                };
                let plan = config.plan(workload);

                let label = format!("  [{iteration}] {}", operation.label());
                let iteration = report::measure(label, objects_per_iteration, obj_size_kb, || {
                    run_stage(&plan, provider, runtime)
                })?;

                metrics.merge(&iteration.metrics);
                iterations.push(iteration);
            }

            Ok(metrics)
        },
    )?;

    tracing::info!(
        stage = operation.label(),
        elapsed = ?summary.elapsed,
        objects = summary.total_objects,
        "stage completed"
    );

    Ok(StageOutcome {
        operation,
        summary,
        iterations,
    })
}
