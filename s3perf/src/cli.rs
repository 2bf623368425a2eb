//! Command line interface of the `s3perf` binary.

use std::path::PathBuf;

use anyhow::{Context, Result};
use argh::FromArgs;
use yansi::Condition;

use crate::config::{BackendKind, Config, Overrides, Stage};
use crate::{observability, runner};

/// Measures upload and download throughput against an S3 bucket.
#[derive(Debug, FromArgs)]
struct Args {
    /// path to the YAML configuration file
    #[argh(option, short = 'c')]
    config: Option<PathBuf>,

    /// name of the target bucket
    #[argh(option)]
    bucket_name: Option<String>,

    /// region of the target bucket
    #[argh(option)]
    region: Option<String>,

    /// custom S3-compatible endpoint
    #[argh(option)]
    endpoint: Option<String>,

    /// use path-style bucket addressing
    #[argh(switch)]
    path_style: bool,

    /// backend to benchmark: `s3` or `memory`
    #[argh(option)]
    backend: Option<BackendKind>,

    /// object key prefix; keys are `<prefix><thread_num>_<obj_num>`
    #[argh(option)]
    prefix: Option<String>,

    /// object size in kilobytes
    #[argh(option)]
    obj_size_kb: Option<usize>,

    /// number of worker threads
    #[argh(option)]
    num_threads: Option<usize>,

    /// number of objects per worker
    #[argh(option)]
    num_objects: Option<usize>,

    /// number of connections per worker
    #[argh(option)]
    num_connections: Option<usize>,

    /// number of outstanding requests per worker; 0 means `num_connections`
    #[argh(option)]
    num_outstanding_req: Option<i64>,

    /// stages to run: `upload`, `download` or `all`
    #[argh(option)]
    stage: Option<Stage>,

    /// number of times each stage is executed
    #[argh(option)]
    count: Option<usize>,

    /// delete all objects after the last stage
    #[argh(switch)]
    cleanup: bool,

    /// upper bound for a single request, e.g. `30s`
    #[argh(option)]
    request_timeout: Option<String>,

    /// upper bound for waiting on outstanding requests at the end of an iteration, e.g. `5m`
    #[argh(option)]
    drain_timeout: Option<String>,

    #[argh(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, FromArgs)]
#[argh(subcommand)]
enum Command {
    Version(VersionCommand),
}

/// print the s3perf version
#[derive(Default, Debug, FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCommand {}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            bucket_name: self.bucket_name.clone(),
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            path_style: self.path_style.then_some(true),
            request_timeout: self.request_timeout.clone(),
            backend: self.backend,
            prefix: self.prefix.clone(),
            obj_size_kb: self.obj_size_kb,
            num_threads: self.num_threads,
            num_objects: self.num_objects,
            num_connections: self.num_connections,
            num_outstanding_req: self.num_outstanding_req,
            stage: self.stage,
            count: self.count,
            cleanup: self.cleanup.then_some(true),
            drain_timeout: self.drain_timeout.clone(),
        }
    }
}

/// Bootstrap the runtime and run the benchmark.
pub fn execute() -> Result<()> {
    let args: Args = argh::from_env();

    // Special switch to just print the version and exit.
    if let Some(Command::Version(_)) = args.command {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    yansi::whenever(Condition::TTY_AND_COLOR);
    observability::init_tracing();

    let config = Config::load(args.config.as_deref(), &args.overrides())
        .context("failed to load configuration")?;
    let benchmark = config.benchmark()?;
    tracing::debug!(?config);

    // Completion handlers run on the runtime threads, drivers run on their own worker threads.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("completion")
        .enable_all()
        .worker_threads(config.runtime.completion_threads)
        .build()?;

    println!("{config}");

    let provider = config.backend_provider();
    let result = runner::run(&benchmark, &provider, runtime.handle());
    if let Err(ref error) = result {
        tracing::error!(
            error = error as &dyn std::error::Error,
            "benchmark aborted"
        );
    }

    result?;
    Ok(())
}
