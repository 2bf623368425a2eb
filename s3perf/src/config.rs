//! Configuration for the benchmark.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Command line flags
//! 2. Environment variables (prefixed with `S3PERF__`)
//! 3. YAML configuration file (specified via `-c` or `--config` flag)
//! 4. Defaults
//!
//! # Environment Variables
//!
//! Environment variables use `S3PERF__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `S3PERF__BUCKET_NAME=my-bucket` sets the target bucket
//! - `S3PERF__NUM_THREADS=8` sets the number of workers
//! - `S3PERF__RUNTIME__COMPLETION_THREADS=4` sets the size of the completion thread pool
//!
//! # YAML Configuration File
//!
//! ```yaml
//! bucket_name: my-bucket
//! region: eu-central-1
//! num_threads: 8
//! stage: upload
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bytesize::ByteSize;
use figment::providers::{Env, Format, Serialized, Yaml};
use s3perf_backend::{BackendProvider, InMemoryBackend, S3CompatibleConfig};
use secrecy::{CloneableSecret, ExposeSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::driver::Workload;
use crate::stage::StagePlan;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "S3PERF__";

/// Newtype around `String` that protects credentials from accidental logging. Use with
/// [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    /// Returns the secret in plain text.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// The stages to run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Only upload objects.
    Upload,
    /// Only download objects uploaded by an earlier run.
    Download,
    /// Upload, then download.
    #[default]
    All,
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upload" => Ok(Self::Upload),
            "download" => Ok(Self::Download),
            "all" => Ok(Self::All),
            other => Err(format!(
                "unknown stage `{other}`, expected `upload`, `download` or `all`"
            )),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::All => "all",
        })
    }
}

/// The object store to benchmark.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Amazon S3 or an S3-compatible service.
    #[default]
    S3,
    /// A store held in process memory, for dry runs of the request scheduler.
    Memory,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "s3" => Ok(Self::S3),
            "memory" => Ok(Self::Memory),
            other => Err(format!(
                "unknown backend `{other}`, expected `s3` or `memory`"
            )),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::S3 => "s3",
            Self::Memory => "memory",
        })
    }
}

/// Configuration of the async runtime that executes requests and their completion handlers.
///
/// Used in: [`Config::runtime`]
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Runtime {
    /// Number of runtime threads.
    ///
    /// # Default
    ///
    /// Defaults to the number of CPU cores on the host machine.
    ///
    /// # Environment Variable
    ///
    /// `S3PERF__RUNTIME__COMPLETION_THREADS`
    pub completion_threads: usize,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            completion_threads: num_cpus::get(),
        }
    }
}

/// Benchmark configuration.
///
/// See the [module docs](self) for how the sources are layered.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Name of the target bucket.
    pub bucket_name: String,

    /// Region of the target bucket.
    pub region: String,

    /// Custom S3-compatible endpoint, e.g. `http://localhost:9000` for MinIO.
    ///
    /// Defaults to the regional Amazon S3 endpoint.
    pub endpoint: Option<String>,

    /// Use path-style addressing, required by most self-hosted stores.
    pub path_style: bool,

    /// Upper bound for a single request. Unbounded if unset.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,

    /// Access key. When unset, credentials are resolved from `AWS_ACCESS_KEY_ID`, the AWS profile
    /// or instance metadata.
    pub access_key: Option<SecretBox<ConfigSecret>>,

    /// Secret key belonging to [`access_key`](Self::access_key).
    pub secret_key: Option<SecretBox<ConfigSecret>>,

    /// The object store to benchmark.
    pub backend: BackendKind,

    /// Prefix of all object keys. The final name is `<prefix><thread_num>_<obj_num>`.
    pub prefix: String,

    /// Object size in kilobytes.
    pub obj_size_kb: usize,

    /// Number of worker threads per stage.
    pub num_threads: usize,

    /// Number of objects per worker.
    pub num_objects: usize,

    /// Number of connections per worker. Caps the connections of each worker's S3 client.
    pub num_connections: usize,

    /// Number of outstanding requests per worker. `0` or less makes it equal to
    /// [`num_connections`](Self::num_connections).
    pub num_outstanding_req: i64,

    /// The stages to run.
    pub stage: Stage,

    /// Number of times each stage is executed.
    pub count: usize,

    /// Delete all objects after the last stage.
    pub cleanup: bool,

    /// Upper bound for waiting on a worker's outstanding requests at the end of an iteration.
    ///
    /// Unbounded if unset, so a request that never completes stalls the benchmark.
    #[serde(with = "humantime_serde")]
    pub drain_timeout: Option<Duration>,

    /// Configuration of the async runtime.
    pub runtime: Runtime,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bucket_name: "ltsstest".into(),
            region: "us-west-1".into(),
            endpoint: None,
            path_style: false,
            request_timeout: None,
            access_key: None,
            secret_key: None,
            backend: BackendKind::default(),
            prefix: "obj/".into(),
            obj_size_kb: 1024,
            num_threads: 1,
            num_objects: 100,
            num_connections: 25,
            num_outstanding_req: 0,
            stage: Stage::default(),
            count: 5,
            cleanup: false,
            drain_timeout: None,
            runtime: Runtime::default(),
        }
    }
}

/// Values set on the command line, overriding all other sources.
///
/// Durations are kept as strings and parsed together with the other sources.
#[derive(Debug, Default, Serialize)]
pub struct Overrides {
    /// Overrides [`Config::bucket_name`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,
    /// Overrides [`Config::region`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Overrides [`Config::endpoint`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Overrides [`Config::path_style`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_style: Option<bool>,
    /// Overrides [`Config::request_timeout`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<String>,
    /// Overrides [`Config::backend`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendKind>,
    /// Overrides [`Config::prefix`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Overrides [`Config::obj_size_kb`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub obj_size_kb: Option<usize>,
    /// Overrides [`Config::num_threads`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_threads: Option<usize>,
    /// Overrides [`Config::num_objects`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_objects: Option<usize>,
    /// Overrides [`Config::num_connections`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_connections: Option<usize>,
    /// Overrides [`Config::num_outstanding_req`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_outstanding_req: Option<i64>,
    /// Overrides [`Config::stage`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    /// Overrides [`Config::count`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    /// Overrides [`Config::cleanup`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<bool>,
    /// Overrides [`Config::drain_timeout`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drain_timeout: Option<String>,
}

/// A configuration value that cannot be used to run a benchmark.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid configuration: `{field}` {reason}")]
pub struct ConfigError {
    field: &'static str,
    reason: &'static str,
}

impl Config {
    /// Loads configuration from defaults, an optional YAML file, the environment and `overrides`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The YAML configuration file cannot be read or parsed
    /// - Environment variables or overrides contain invalid values
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(Serialized::defaults(overrides))
            .extract()?;

        Ok(config)
    }

    /// The number of outstanding requests each worker may have.
    ///
    /// A non-positive [`num_outstanding_req`](Self::num_outstanding_req) falls back to the number
    /// of connections.
    pub fn max_outstanding(&self) -> usize {
        match usize::try_from(self.num_outstanding_req) {
            Ok(0) | Err(_) => self.num_connections,
            Ok(max) => max,
        }
    }

    /// Validates the configuration and resolves it into the settings of a benchmark run.
    pub fn benchmark(&self) -> Result<BenchmarkConfig, ConfigError> {
        let at_least_one = |field, value: usize| match value {
            0 => Err(ConfigError {
                field,
                reason: "must be at least 1",
            }),
            _ => Ok(()),
        };

        at_least_one("num_threads", self.num_threads)?;
        at_least_one("num_connections", self.num_connections)?;
        at_least_one("count", self.count)?;
        at_least_one("runtime.completion_threads", self.runtime.completion_threads)?;

        if self.backend == BackendKind::S3 && self.bucket_name.is_empty() {
            return Err(ConfigError {
                field: "bucket_name",
                reason: "must not be empty",
            });
        }

        Ok(BenchmarkConfig {
            prefix: self.prefix.clone(),
            obj_size_kb: self.obj_size_kb,
            num_threads: self.num_threads,
            num_objects: self.num_objects,
            max_outstanding: self.max_outstanding(),
            stage: self.stage,
            count: self.count,
            cleanup: self.cleanup,
            drain_timeout: self.drain_timeout,
        })
    }

    /// Creates the provider of object store clients for the configured backend.
    pub fn backend_provider(&self) -> BackendProvider {
        match self.backend {
            BackendKind::S3 => BackendProvider::S3Compatible(S3CompatibleConfig {
                bucket: self.bucket_name.clone(),
                region: self.region.clone(),
                endpoint: self.endpoint.clone(),
                path_style: self.path_style,
                request_timeout: self.request_timeout,
                max_connections: self.num_connections,
                access_key: expose(&self.access_key),
                secret_key: expose(&self.secret_key),
                session_token: None,
            }),
            BackendKind::Memory => BackendProvider::Shared(Arc::new(InMemoryBackend::new())),
        }
    }
}

fn expose(secret: &Option<SecretBox<ConfigSecret>>) -> Option<String> {
    secret
        .as_ref()
        .map(|secret| secret.expose_secret().as_str().to_owned())
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let duration = |value: Option<Duration>| match value {
            Some(value) => format!("{value:?}"),
            None => "-".to_owned(),
        };
        let obj_size = ByteSize::kib(self.obj_size_kb as u64);

        writeln!(f, "Test configuration:")?;
        writeln!(f, "  backend = {}", self.backend)?;
        writeln!(f, "  bucket_name = {}", self.bucket_name)?;
        writeln!(f, "  region = {}", self.region)?;
        writeln!(f, "  endpoint = {}", self.endpoint.as_deref().unwrap_or("-"))?;
        writeln!(f, "  path_style = {}", self.path_style)?;
        writeln!(f, "  prefix = {}", self.prefix)?;
        writeln!(f, "  obj_size_kb = {} ({obj_size})", self.obj_size_kb)?;
        writeln!(f, "  num_threads = {}", self.num_threads)?;
        writeln!(f, "  num_objects = {}", self.num_objects)?;
        writeln!(f, "  num_connections = {}", self.num_connections)?;
        writeln!(
            f,
            "  num_outstanding_req = {} (effective: {})",
            self.num_outstanding_req,
            self.max_outstanding()
        )?;
        writeln!(f, "  stage = {}", self.stage)?;
        writeln!(f, "  count = {}", self.count)?;
        writeln!(f, "  cleanup = {}", self.cleanup)?;
        writeln!(f, "  request_timeout = {}", duration(self.request_timeout))?;
        writeln!(f, "  drain_timeout = {}", duration(self.drain_timeout))?;
        writeln!(
            f,
            "  completion_threads = {}",
            self.runtime.completion_threads
        )
    }
}

/// Validated settings of a benchmark run, see [`Config::benchmark`].
#[derive(Clone, Debug)]
pub struct BenchmarkConfig {
    /// Prefix of all object keys.
    pub prefix: String,
    /// Object size in kilobytes.
    pub obj_size_kb: usize,
    /// Number of workers per stage.
    pub num_threads: usize,
    /// Number of objects per worker.
    pub num_objects: usize,
    /// Effective number of outstanding requests per worker.
    pub max_outstanding: usize,
    /// The stages to run.
    pub stage: Stage,
    /// Number of iterations per stage.
    pub count: usize,
    /// Delete all objects after the last stage.
    pub cleanup: bool,
    /// Upper bound for draining a worker.
    pub drain_timeout: Option<Duration>,
}

impl BenchmarkConfig {
    /// Creates the plan for one iteration of a stage.
    pub fn plan(&self, workload: Workload) -> StagePlan {
        StagePlan {
            workload,
            prefix: self.prefix.clone(),
            num_threads: self.num_threads,
            num_objects: self.num_objects,
            max_outstanding: self.max_outstanding,
            drain_timeout: self.drain_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load(None, &Overrides::default()).unwrap();

            assert_eq!(config.bucket_name, "ltsstest");
            assert_eq!(config.region, "us-west-1");
            assert_eq!(config.prefix, "obj/");
            assert_eq!(config.obj_size_kb, 1024);
            assert_eq!(config.num_threads, 1);
            assert_eq!(config.num_objects, 100);
            assert_eq!(config.num_connections, 25);
            assert_eq!(config.stage, Stage::All);
            assert_eq!(config.count, 5);
            assert_eq!(config.backend, BackendKind::S3);
            assert!(!config.cleanup);
            assert_eq!(config.drain_timeout, None);
            assert_eq!(config.max_outstanding(), 25);

            Ok(())
        });
    }

    #[test]
    fn configurable_via_env() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("S3PERF__BUCKET_NAME", "bench");
            jail.set_env("S3PERF__NUM_THREADS", "8");
            jail.set_env("S3PERF__NUM_OUTSTANDING_REQ", "-1");
            jail.set_env("S3PERF__STAGE", "upload");
            jail.set_env("S3PERF__DRAIN_TIMEOUT", "30s");
            jail.set_env("S3PERF__RUNTIME__COMPLETION_THREADS", "3");
            jail.set_env("S3PERF__SECRET_KEY", "very-secret");

            let config = Config::load(None, &Overrides::default()).unwrap();

            assert_eq!(config.bucket_name, "bench");
            assert_eq!(config.num_threads, 8);
            assert_eq!(config.num_outstanding_req, -1);
            assert_eq!(config.stage, Stage::Upload);
            assert_eq!(config.drain_timeout, Some(Duration::from_secs(30)));
            assert_eq!(config.runtime.completion_threads, 3);
            assert_eq!(
                config.secret_key.as_ref().unwrap().expose_secret().as_str(),
                "very-secret"
            );

            Ok(())
        });
    }

    #[test]
    fn configured_with_yaml_env_and_overrides() {
        let mut tempfile = tempfile::NamedTempFile::new().unwrap();
        tempfile
            .write_all(
                br#"
            bucket_name: from-yaml
            region: eu-central-1
            endpoint: http://localhost:9000
            path_style: true
            num_objects: 10
            count: 2
            "#,
            )
            .unwrap();

        figment::Jail::expect_with(|jail| {
            jail.set_env("S3PERF__NUM_OBJECTS", "20");
            jail.set_env("S3PERF__COUNT", "3");

            let overrides = Overrides {
                count: Some(4),
                stage: Some(Stage::Download),
                drain_timeout: Some("500ms".into()),
                ..Default::default()
            };
            let config = Config::load(Some(tempfile.path()), &overrides).unwrap();

            assert_eq!(config.bucket_name, "from-yaml");
            assert_eq!(config.region, "eu-central-1");
            assert_eq!(config.endpoint.as_deref(), Some("http://localhost:9000"));
            assert!(config.path_style);
            assert_eq!(config.num_objects, 20);
            assert_eq!(config.count, 4);
            assert_eq!(config.stage, Stage::Download);
            assert_eq!(config.drain_timeout, Some(Duration::from_millis(500)));

            Ok(())
        });
    }

    #[test]
    fn rejects_unknown_stage() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("S3PERF__STAGE", "sideways");

            assert!(Config::load(None, &Overrides::default()).is_err());

            Ok(())
        });
    }

    #[test]
    fn non_positive_outstanding_falls_back_to_connections() {
        let mut config = Config {
            num_connections: 7,
            ..Default::default()
        };

        for value in [0, -1, -100] {
            config.num_outstanding_req = value;
            assert_eq!(config.max_outstanding(), 7);
            assert_eq!(config.benchmark().unwrap().max_outstanding, 7);
        }

        config.num_outstanding_req = 3;
        assert_eq!(config.benchmark().unwrap().max_outstanding, 3);
    }

    #[test]
    fn rejects_zero_workers() {
        let config = Config {
            num_threads: 0,
            ..Default::default()
        };

        let error = config.benchmark().unwrap_err();
        assert_eq!(
            error.to_string(),
            "invalid configuration: `num_threads` must be at least 1"
        );
    }

    #[test]
    fn connections_size_the_s3_client() {
        let config = Config {
            num_connections: 1,
            num_outstanding_req: 8,
            ..Default::default()
        };

        assert_eq!(config.benchmark().unwrap().max_outstanding, 8);
        match config.backend_provider() {
            BackendProvider::S3Compatible(s3) => assert_eq!(s3.max_connections, 1),
            other => panic!("unexpected provider {other:?}"),
        }
    }

    #[test]
    fn memory_backend_needs_no_bucket() {
        let config = Config {
            bucket_name: String::new(),
            backend: BackendKind::Memory,
            ..Default::default()
        };

        assert!(config.benchmark().is_ok());
        assert_eq!(config.backend_provider().name(), "in-memory");
    }

    #[test]
    fn display_lists_settings_without_secrets() {
        let config = Config {
            secret_key: Some(SecretBox::new(Box::new(ConfigSecret::from("very-secret")))),
            ..Default::default()
        };

        let printed = config.to_string();
        assert!(printed.starts_with("Test configuration:"));
        assert!(printed.contains("  bucket_name = ltsstest"));
        assert!(printed.contains("num_outstanding_req = 0 (effective: 25)"));
        assert!(!printed.contains("very-secret"));
        assert!(!format!("{config:?}").contains("very-secret"));
    }

    #[test]
    fn parses_stage_and_backend_names() {
        assert_eq!("upload".parse::<Stage>(), Ok(Stage::Upload));
        assert_eq!("all".parse::<Stage>(), Ok(Stage::All));
        assert!("both".parse::<Stage>().is_err());
        assert_eq!("memory".parse::<BackendKind>(), Ok(BackendKind::Memory));
    }
}
