use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use tokio::sync::{Semaphore, SemaphorePermit};

use super::Backend;
use crate::error::{BackendError, BackendResult};

/// Connection settings for an [`S3CompatibleBackend`].
#[derive(Clone, Default)]
pub struct S3CompatibleConfig {
    /// Name of the target bucket.
    pub bucket: String,
    /// Region of the bucket, used for request signing.
    pub region: String,
    /// Custom endpoint, e.g. `http://localhost:9000` for MinIO.
    ///
    /// Defaults to the regional Amazon S3 endpoint.
    pub endpoint: Option<String>,
    /// Use path-style instead of virtual-host-style addressing.
    pub path_style: bool,
    /// Upper bound for a single request.
    pub request_timeout: Option<Duration>,
    /// Maximum number of connections the client opens at the same time. `0` means unlimited.
    pub max_connections: usize,
    /// Access key. Resolved from the environment or profile when unset.
    pub access_key: Option<String>,
    /// Secret key. Resolved from the environment or profile when unset.
    pub secret_key: Option<String>,
    /// Optional session token for temporary credentials.
    pub session_token: Option<String>,
}

impl S3CompatibleConfig {
    fn endpoint(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://s3.{}.amazonaws.com", self.region),
        }
    }
}

impl fmt::Debug for S3CompatibleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3CompatibleConfig")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("path_style", &self.path_style)
            .field("request_timeout", &self.request_timeout)
            .field("max_connections", &self.max_connections)
            .finish_non_exhaustive()
    }
}

/// A client for Amazon S3 and S3-compatible stores, bound to a single bucket.
///
/// The HTTP client only opens a new connection when all pooled connections are busy. Every request
/// holds one of `max_connections` permits for its whole duration, which bounds the pool size.
pub struct S3CompatibleBackend {
    bucket: Box<Bucket>,
    connections: Semaphore,
    max_connections: usize,
}

impl S3CompatibleBackend {
    /// Creates a new client bound to the configured bucket.
    ///
    /// Fails if credentials cannot be resolved or the bucket handle cannot be built.
    pub fn new(config: &S3CompatibleConfig) -> BackendResult<Self> {
        let credentials = Credentials::new(
            config.access_key.as_deref(),
            config.secret_key.as_deref(),
            None,
            config.session_token.as_deref(),
            None,
        )?;

        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint(),
        };

        let mut bucket = Bucket::new(&config.bucket, region, credentials).map_err(|cause| {
            BackendError::S3 {
                context: format!("failed to create handle for bucket `{}`", config.bucket),
                cause,
            }
        })?;

        if config.path_style {
            bucket = bucket.with_path_style();
        }

        if let Some(request_timeout) = config.request_timeout {
            bucket = bucket
                .with_request_timeout(request_timeout)
                .map_err(|cause| BackendError::S3 {
                    context: "failed to set request timeout".to_owned(),
                    cause,
                })?;
        }

        let max_connections = match config.max_connections {
            0 => Semaphore::MAX_PERMITS,
            max => max,
        };

        Ok(Self {
            bucket,
            connections: Semaphore::new(max_connections),
            max_connections,
        })
    }

    /// The maximum number of simultaneous connections of this client.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    async fn connection(&self) -> BackendResult<SemaphorePermit<'_>> {
        self.connections
            .acquire()
            .await
            .map_err(|cause| BackendError::Generic {
                context: "connection pool closed".to_owned(),
                cause: Box::new(cause),
            })
    }
}

impl fmt::Debug for S3CompatibleBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Compatible")
            .field("bucket", &self.bucket.name())
            .field("endpoint", &self.bucket.host())
            .field("max_connections", &self.max_connections)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Backend for S3CompatibleBackend {
    fn name(&self) -> &'static str {
        "s3-compatible"
    }

    #[tracing::instrument(level = "trace", fields(%key), skip_all)]
    async fn put_object(&self, key: &str, body: Bytes) -> BackendResult<()> {
        tracing::trace!(len = body.len(), "Writing to s3_compatible backend");
        let _connection = self.connection().await?;

        self.bucket
            .put_object(key, &body)
            .await
            .map_err(|cause| BackendError::from_s3(key, "put", cause))?;

        Ok(())
    }

    #[tracing::instrument(level = "trace", fields(%key), skip_all)]
    async fn get_object(&self, key: &str) -> BackendResult<Bytes> {
        tracing::trace!("Reading from s3_compatible backend");
        let _connection = self.connection().await?;

        let response = self
            .bucket
            .get_object(key)
            .await
            .map_err(|cause| BackendError::from_s3(key, "get", cause))?;

        Ok(response.bytes().clone())
    }

    #[tracing::instrument(level = "trace", fields(%key), skip_all)]
    async fn delete_object(&self, key: &str) -> BackendResult<()> {
        tracing::trace!("Deleting from s3_compatible backend");
        let _connection = self.connection().await?;

        self.bucket
            .delete_object(key)
            .await
            .map_err(|cause| BackendError::from_s3(key, "delete", cause))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config(max_connections: usize) -> S3CompatibleConfig {
        S3CompatibleConfig {
            bucket: "ltsstest".into(),
            region: "us-west-1".into(),
            endpoint: Some("http://localhost:9000".into()),
            path_style: true,
            max_connections,
            access_key: Some("AKIAEXAMPLE".into()),
            secret_key: Some("very-secret".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn requests_wait_for_a_free_connection() {
        let backend = S3CompatibleBackend::new(&local_config(2)).unwrap();
        assert_eq!(backend.max_connections(), 2);

        let first = backend.connection().await.unwrap();
        let _second = backend.connection().await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(20), backend.connection()).await;
        assert!(blocked.is_err());

        drop(first);
        let freed = tokio::time::timeout(Duration::from_millis(20), backend.connection()).await;
        assert!(freed.is_ok());
    }

    #[test]
    fn zero_connections_means_unlimited() {
        let backend = S3CompatibleBackend::new(&local_config(0)).unwrap();
        assert_eq!(backend.max_connections(), Semaphore::MAX_PERMITS);
    }

    #[test]
    fn defaults_to_regional_endpoint() {
        let config = S3CompatibleConfig {
            bucket: "ltsstest".into(),
            region: "us-west-1".into(),
            ..Default::default()
        };
        assert_eq!(config.endpoint(), "https://s3.us-west-1.amazonaws.com");
    }

    #[test]
    fn debug_redacts_credentials() {
        let config = S3CompatibleConfig {
            bucket: "ltsstest".into(),
            region: "us-west-1".into(),
            access_key: Some("AKIAEXAMPLE".into()),
            secret_key: Some("very-secret".into()),
            ..Default::default()
        };

        let debug = format!("{config:?}");
        assert!(debug.contains("ltsstest"));
        assert!(!debug.contains("AKIAEXAMPLE"));
        assert!(!debug.contains("very-secret"));
    }
}
