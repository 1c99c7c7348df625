//! Error types for API calls.
//!
//! Two layers of errors live here. [`Error`] is what the request executor
//! produces: it keeps the underlying `reqwest` error or the raw response body
//! around for debugging. [`NormalizedError`] is what the resolver hands back to
//! callers: a stable, user-presentable message plus the optional status code
//! and parsed body of the failed response.
//!
//! Both carry an [`ErrorKind`] tag, decided once where the error is built.
//! Retry decisions consult the tag, never the error's origin type.

use crate::response::Body;
use http::StatusCode;
use std::time::Duration;

/// Message surfaced when the server cannot be reached at all.
pub const UNREACHABLE_MESSAGE: &str =
    "Unable to connect to server. Please check your internet connection and try again.";

/// Message surfaced when a request ran out of time on every attempt.
pub const TIMED_OUT_MESSAGE: &str = "Request timed out. Please check your connection and try again.";

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The connection could not be established.
    Network,
    /// An attempt exceeded its allotted time.
    Timeout,
    /// The connection broke while an attempt was in flight (body read, decode, redirect).
    Transport,
    /// The device reported that no network is available.
    Offline,
    /// The response body could not be decoded into the expected shape.
    Decode,
    /// The request itself was malformed: bad URL, header, or body.
    Programmer,
    /// Every attempt was used without a usable outcome.
    Exhausted,
    /// The server answered with a non-2xx status.
    Http,
    /// Every request of a batch failed.
    Batch,
}

impl ErrorKind {
    /// Returns `true` if a failure of this kind may succeed on another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Timeout)
    }
}

/// The executor-level error type.
///
/// # Examples
///
/// ```no_run
/// use rollcall::{Client, Error};
/// use rollcall::metadata::RequestMetadata;
/// use http::Method;
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// match client.execute(RequestMetadata::new(Method::GET, "/attendance/today")).await {
///     Ok(executed) => println!("status {}", executed.response.status()),
///     Err(Error::Timeout { after }) => eprintln!("gave up after {:?}", after),
///     Err(e) => eprintln!("request failed: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The connection could not be established (DNS failure, refused, unreachable).
    ///
    /// Not retried: a device without a route to the server will not grow one
    /// within the backoff window.
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The attempt did not complete within the policy timeout.
    #[error("Request timeout after {}ms", .after.as_millis())]
    Timeout {
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The connection failed after the request was dispatched.
    ///
    /// Not retried either; only [`Error::Timeout`] is.
    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The connectivity probe reported that the device is offline.
    #[error("No internet connection. Please check your network settings.")]
    NoConnection,

    /// Failed to deserialize the response body into the expected type.
    ///
    /// Preserves the raw body and the serde message for debugging.
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw response body that failed to deserialize
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// Invalid configuration was provided.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Failed to serialize the request body.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Every attempt was used and none produced a response or a final error.
    #[error("Request failed after {attempts} attempts")]
    MaxRetriesExceeded {
        /// The number of attempts made
        attempts: usize,
    },
}

impl Error {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network(_) => ErrorKind::Network,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Transport(_) => ErrorKind::Transport,
            Error::NoConnection => ErrorKind::Offline,
            Error::DeserializationFailed { .. } => ErrorKind::Decode,
            Error::ConfigurationError(_) => ErrorKind::Programmer,
            Error::SerializationFailed(_) => ErrorKind::Programmer,
            Error::InvalidUrl(_) => ErrorKind::Programmer,
            Error::MaxRetriesExceeded { .. } => ErrorKind::Exhausted,
        }
    }

    /// Returns `true` if this error is potentially retryable.
    ///
    /// Only timeouts are retried. Connection failures, dropped connections
    /// and malformed requests propagate immediately.
    ///
    /// # Examples
    ///
    /// ```
    /// use rollcall::Error;
    /// use std::time::Duration;
    ///
    /// assert!(Error::Timeout { after: Duration::from_secs(30) }.is_retryable());
    /// assert!(!Error::NoConnection.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::DeserializationFailed { status, .. } => Some(*status),
            Error::Network(e) | Error::Transport(e) => e.status(),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::DeserializationFailed { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            // reqwest does not expose the configured duration
            Error::Timeout {
                after: Duration::ZERO,
            }
        } else if error.is_builder() {
            Error::ConfigurationError(error.to_string())
        } else if error.is_connect() {
            Error::Network(error)
        } else {
            Error::Transport(error)
        }
    }
}

/// A specialized `Result` type for executor calls.
pub type Result<T> = std::result::Result<T, Error>;

/// The single error shape returned by the resolver.
///
/// Built exactly once, either from a non-2xx response or from an executor
/// [`Error`], and never modified afterwards.
///
/// # Examples
///
/// ```no_run
/// use rollcall::{Client, NormalizedError};
///
/// # async fn example() -> Result<(), NormalizedError> {
/// # let client = Client::builder().base_url("https://api.example.com")?.build()?;
/// match client.get::<serde_json::Value>("/departments").await {
///     Ok(response) => println!("{}", response.data),
///     Err(e) if e.status().map(|s| s.as_u16()) == Some(422) => {
///         eprintln!("fix the form: {}", e.message());
///     }
///     Err(e) => eprintln!("{}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug, Clone)]
#[error("{message}")]
pub struct NormalizedError {
    message: String,
    status: Option<StatusCode>,
    body: Option<Body>,
    kind: ErrorKind,
}

impl NormalizedError {
    /// Builds the error for a non-2xx response.
    pub(crate) fn from_response(message: String, status: StatusCode, body: Body) -> Self {
        Self {
            message,
            status: Some(status),
            body: Some(body),
            kind: ErrorKind::Http,
        }
    }

    /// Builds a message-only error of the given kind.
    pub(crate) fn with_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            body: None,
            kind,
        }
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The HTTP status of the failed response, if one was received.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// The parsed body of the failed response, if one was received.
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// The classification of the underlying failure.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<Error> for NormalizedError {
    fn from(error: Error) -> Self {
        let kind = error.kind();
        let message = match kind {
            ErrorKind::Network | ErrorKind::Transport => UNREACHABLE_MESSAGE.to_string(),
            ErrorKind::Timeout => TIMED_OUT_MESSAGE.to_string(),
            _ => error.to_string(),
        };
        Self {
            message,
            status: error.status(),
            body: None,
            kind,
        }
    }
}
