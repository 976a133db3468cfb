//! Error types for backend calls.
//!
//! Every failure of a call travels through the returned [`Result`]. HTTP error
//! statuses are deliberately not represented here: a 4xx or 5xx response is a
//! completed call and is inspected through [`crate::Response::class`].

use http::StatusCode;
use std::fmt;

/// The main error type for backend calls.
///
/// # Examples
///
/// ```no_run
/// use backend_request::{Client, Config, Error};
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::new(Config::new("USERS").with_url("https://api.example.com"))?;
///
/// match client.get("/users/1").await {
///     Ok(response) if response.class.error().is_some() => {
///         eprintln!("backend answered {}", response.status);
///     }
///     Ok(response) => println!("body: {:?}", response.body),
///     Err(e) if e.is_timeout() => eprintln!("backend timed out"),
///     Err(e) => eprintln!("call failed: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The transport could not complete the exchange (connection refused,
    /// DNS failure, timeout, broken body stream, ...).
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The composed request URL could not be parsed.
    #[error("Invalid URL '{url}': {source}")]
    InvalidUrl {
        /// The string that failed to parse
        url: String,
        /// The parser error
        #[source]
        source: url::ParseError,
    },

    /// Invalid configuration was provided, such as a malformed header or an
    /// unreadable configuration file.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The request body could not be encoded as JSON.
    #[error("Failed to serialize request body: {0}")]
    Serialization(#[source] serde_json::Error),

    /// [`crate::Response::json`] could not decode the body into the requested type.
    #[error("Failed to deserialize response (status {status}): {serde_error}. Raw response: {raw_response}")]
    DeserializationFailed {
        /// The raw response body
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code of the response
        status: StatusCode,
    },
}

impl Error {
    /// Returns `true` for transport timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Transport(e) if e.timeout)
    }

    /// Returns the transport error code (`ETIMEDOUT`, `ECONNREFUSED`, ...) if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::Transport(e) => Some(e.kind.code()),
            _ => None,
        }
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::DeserializationFailed { status, .. } => Some(*status),
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

/// Classification of transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connect or read timeout.
    Timeout,
    /// The connection could not be established.
    Connect,
    /// The redirect chain could not be followed.
    Redirect,
    /// The request or response body failed mid-stream.
    Body,
    /// Anything else.
    Other,
}

impl TransportErrorKind {
    /// The conventional socket error code for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            TransportErrorKind::Timeout => "ETIMEDOUT",
            TransportErrorKind::Connect => "ECONNREFUSED",
            TransportErrorKind::Redirect => "EREDIRECT",
            TransportErrorKind::Body => "EBODY",
            TransportErrorKind::Other => "EREQUEST",
        }
    }
}

/// A connection-level failure reported by a [`crate::Transport`].
#[derive(Debug)]
pub struct TransportError {
    /// What went wrong.
    pub kind: TransportErrorKind,
    /// Human readable description.
    pub message: String,
    /// Set by the pipeline for `ETIMEDOUT`-class failures.
    pub timeout: bool,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    /// Creates a transport error without an underlying cause.
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timeout: false,
            source: None,
        }
    }

    /// Attaches the underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The conventional socket error code.
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind.code())
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            TransportErrorKind::Timeout
        } else if e.is_connect() {
            TransportErrorKind::Connect
        } else if e.is_redirect() {
            TransportErrorKind::Redirect
        } else if e.is_body() || e.is_decode() {
            TransportErrorKind::Body
        } else {
            TransportErrorKind::Other
        };
        TransportError::new(kind, e.to_string()).with_source(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.into())
    }
}

/// A specialized `Result` type for backend calls.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_flag_drives_is_timeout() {
        let mut err = TransportError::new(TransportErrorKind::Timeout, "read timed out");
        assert_eq!(err.code(), "ETIMEDOUT");
        assert!(!Error::Transport(TransportError::new(TransportErrorKind::Timeout, "x")).is_timeout());

        err.timeout = true;
        let err = Error::Transport(err);
        assert!(err.is_timeout());
        assert_eq!(err.code(), Some("ETIMEDOUT"));
    }

    #[test]
    fn test_display_includes_code() {
        let err = TransportError::new(TransportErrorKind::Connect, "connection refused");
        assert_eq!(err.to_string(), "connection refused (ECONNREFUSED)");
    }
}
