//! Runs one iteration of a stage across all workers.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use s3perf_backend::BackendProvider;
use tokio::runtime::Handle;

use crate::abort::AbortSignal;
use crate::driver::{Driver, Workload};
use crate::error::StageError;
use crate::report::Metrics;

/// Everything the workers of a stage iteration need to know.
#[derive(Clone, Debug)]
pub struct StagePlan {
    /// What to do with every object.
    pub workload: Workload,
    /// Prefix of all object keys.
    pub prefix: String,
    /// Number of workers.
    pub num_threads: usize,
    /// Number of objects per worker.
    pub num_objects: usize,
    /// Maximum number of outstanding requests per worker.
    pub max_outstanding: usize,
    /// Upper bound for waiting on a worker's outstanding requests; unbounded if `None`.
    pub drain_timeout: Option<Duration>,
}

/// Runs the plan on `num_threads` worker threads and waits for all of them.
///
/// Every worker gets its own client from `provider` and issues its requests onto `runtime`. The
/// first error of any worker aborts all others and is returned once every worker has drained.
pub fn run_stage(
    plan: &StagePlan,
    provider: &BackendProvider,
    runtime: &Handle,
) -> Result<Metrics, StageError> {
    let abort = Arc::new(AbortSignal::new());

    let worker_metrics = thread::scope(|scope| {
        let mut workers = Vec::with_capacity(plan.num_threads);
        for worker in 0..plan.num_threads {
            let abort = &abort;
            let spawned = thread::Builder::new()
                .name(format!("worker-{worker}"))
                .spawn_scoped(scope, move || {
                    run_worker(worker, plan, provider, runtime, abort)
                });

            match spawned {
                Ok(handle) => workers.push((worker, handle)),
                Err(source) => {
                    abort.trigger(StageError::Spawn { worker, source });
                    break;
                }
            }
        }

        workers
            .into_iter()
            .filter_map(|(worker, handle)| match handle.join() {
                Ok(metrics) => Some(metrics),
                Err(_) => {
                    abort.trigger(StageError::WorkerPanicked { worker });
                    None
                }
            })
            .collect::<Vec<_>>()
    });

    if let Some(error) = abort.take_error() {
        return Err(error);
    }

    let mut metrics = Metrics::default();
    for worker in &worker_metrics {
        metrics.merge(worker);
    }
    Ok(metrics)
}

fn run_worker(
    worker: usize,
    plan: &StagePlan,
    provider: &BackendProvider,
    runtime: &Handle,
    abort: &Arc<AbortSignal>,
) -> Metrics {
    let backend = match provider.connect() {
        Ok(backend) => backend,
        Err(source) => {
            tracing::error!(
                worker,
                error = &source as &dyn std::error::Error,
                "failed to create client"
            );
            abort.trigger(StageError::Connect { worker, source });
            return Metrics::default();
        }
    };

    Driver::new(worker, plan, backend, runtime, abort).run()
}

#[cfg(test)]
mod tests {
    use s3perf_backend::InMemoryBackend;
    use tokio::runtime::Runtime;

    use super::*;
    use crate::payload::Payload;

    fn runtime() -> Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
    }

    fn plan(workload: Workload) -> StagePlan {
        StagePlan {
            workload,
            prefix: "obj/".into(),
            num_threads: 3,
            num_objects: 4,
            max_outstanding: 2,
            drain_timeout: None,
        }
    }

    #[test]
    fn every_worker_uploads_its_namespace() {
        let runtime = runtime();
        let store = InMemoryBackend::new();
        let provider = BackendProvider::Shared(Arc::new(store.clone()));

        let plan = plan(Workload::Upload(Payload::with_seed(1, 0)));
        let metrics = run_stage(&plan, &provider, runtime.handle()).unwrap();

        assert_eq!(metrics.completed, 12);
        assert_eq!(metrics.bytes, 12 * 1024);

        let mut expected: Vec<_> = (0..3)
            .flat_map(|w| (0..4).map(move |i| format!("obj/{w}_{i}")))
            .collect();
        expected.sort_unstable();
        assert_eq!(store.keys(), expected);
    }

    #[test]
    fn missing_objects_fail_the_stage() {
        let runtime = runtime();
        let provider = BackendProvider::Shared(Arc::new(InMemoryBackend::new()));

        let plan = plan(Workload::Download { object_size: 1024 });
        let error = run_stage(&plan, &provider, runtime.handle()).unwrap_err();

        assert!(matches!(error, StageError::Request(_)));
    }

    #[test]
    fn no_workers_is_a_no_op() {
        let runtime = runtime();
        let provider = BackendProvider::Shared(Arc::new(InMemoryBackend::new()));

        let mut plan = plan(Workload::Cleanup);
        plan.num_threads = 0;

        let metrics = run_stage(&plan, &provider, runtime.handle()).unwrap();
        assert_eq!(metrics.completed, 0);
    }
}
