use s3::creds::error::CredentialsError;
use s3::error::S3Error;
use thiserror::Error;

/// Errors returned by object store clients.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The requested object does not exist.
    #[error("object `{key}` not found")]
    NotFound {
        /// Key of the missing object.
        key: String,
    },

    /// The store answered with a non-successful HTTP status.
    #[error("unexpected status {status}: {message}")]
    Status {
        /// HTTP status code of the response.
        status: u16,
        /// Response body or reason returned by the store.
        message: String,
    },

    /// Credentials could not be resolved from the configuration or the environment.
    #[error("failed to resolve credentials: {0}")]
    Credentials(#[from] CredentialsError),

    /// Any other error emitted by the S3 client, such as transport or signing errors.
    #[error("s3 error: {context}")]
    S3 {
        /// What the client was doing when the error occurred.
        context: String,
        /// The underlying client error.
        #[source]
        cause: S3Error,
    },

    /// Any other error stemming from a backend implementation.
    #[error("storage backend error: {context}")]
    Generic {
        /// What the backend was doing when the error occurred.
        context: String,
        /// The underlying error.
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl BackendError {
    /// Maps an S3 client error for the given key, splitting out HTTP failures.
    pub(crate) fn from_s3(key: &str, context: &str, cause: S3Error) -> Self {
        match cause {
            S3Error::HttpFailWithBody(404, _) => Self::NotFound { key: key.to_owned() },
            S3Error::HttpFailWithBody(status, message) => Self::Status { status, message },
            cause => Self::S3 {
                context: format!("{context} `{key}`"),
                cause,
            },
        }
    }
}

/// Result type for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_split_out() {
        let err = BackendError::from_s3(
            "obj/0_1",
            "get",
            S3Error::HttpFailWithBody(404, "NoSuchKey".into()),
        );
        assert!(matches!(err, BackendError::NotFound { key } if key == "obj/0_1"));
    }

    #[test]
    fn other_statuses_keep_the_body() {
        let err = BackendError::from_s3(
            "obj/0_1",
            "put",
            S3Error::HttpFailWithBody(503, "SlowDown".into()),
        );
        assert_eq!(err.to_string(), "unexpected status 503: SlowDown");
    }
}
