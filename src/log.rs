//! Structured request logging.
//!
//! Every attempt builds a [`LogRecord`] and hands it to a [`RequestLogger`].
//! The logger decides which levels exist: a level for which
//! [`RequestLogger::enabled`] is `false` simply produces no output, and the
//! pipeline adapts what it records to the levels that are available (response
//! bodies are only captured when `DEBUG` is enabled).
//!
//! Unless a call or the process overrides it, records go to `tracing` through
//! [`TracingLogger`].

use crate::options::{Body, Json, RequestOptions};
use http::{HeaderMap, Method};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

pub use tracing::Level;

/// A sink for leveled, structured log calls.
///
/// Implementations must be safe to share between concurrent calls.
///
/// # Examples
///
/// ```
/// use backend_request::log::{Level, RequestLogger};
///
/// /// Prints errors only.
/// struct Stderr;
///
/// impl RequestLogger for Stderr {
///     fn enabled(&self, level: Level) -> bool {
///         level == Level::ERROR
///     }
///
///     fn log(&self, _level: Level, message: &str, data: &serde_json::Value) {
///         eprintln!("{} {}", message, data);
///     }
/// }
/// ```
pub trait RequestLogger: Send + Sync {
    /// Whether this sink accepts `level`.
    fn enabled(&self, level: Level) -> bool;

    /// Records `message` with structured `data`.
    fn log(&self, level: Level, message: &str, data: &Value);
}

/// Forwards to the `tracing` macros; levels follow the active subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl RequestLogger for TracingLogger {
    fn enabled(&self, level: Level) -> bool {
        if level == Level::ERROR {
            tracing::enabled!(Level::ERROR)
        } else if level == Level::WARN {
            tracing::enabled!(Level::WARN)
        } else if level == Level::INFO {
            tracing::enabled!(Level::INFO)
        } else if level == Level::DEBUG {
            tracing::enabled!(Level::DEBUG)
        } else {
            tracing::enabled!(Level::TRACE)
        }
    }

    fn log(&self, level: Level, message: &str, data: &Value) {
        if level == Level::ERROR {
            tracing::error!(data = %data, "{}", message);
        } else if level == Level::WARN {
            tracing::warn!(data = %data, "{}", message);
        } else if level == Level::INFO {
            tracing::info!(data = %data, "{}", message);
        } else if level == Level::DEBUG {
            tracing::debug!(data = %data, "{}", message);
        } else {
            tracing::trace!(data = %data, "{}", message);
        }
    }
}

static DEFAULT_LOGGER: OnceLock<Arc<dyn RequestLogger>> = OnceLock::new();

/// Installs the process-wide default logger.
///
/// Only the first call has an effect; later calls get their logger back.
pub fn set_default_logger(
    logger: Arc<dyn RequestLogger>,
) -> Result<(), Arc<dyn RequestLogger>> {
    DEFAULT_LOGGER.set(logger)
}

/// The process-wide default logger, [`TracingLogger`] unless replaced.
pub fn default_logger() -> Arc<dyn RequestLogger> {
    DEFAULT_LOGGER
        .get_or_init(|| Arc::new(TracingLogger))
        .clone()
}

/// Everything known about one attempt, logged under `internal_request`.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    /// Correlation id of the attempt.
    pub id: String,
    /// Backend name.
    pub backend: String,
    /// The request as the caller described it, before body encoding.
    pub options: RequestSnapshot,
    /// Epoch milliseconds when the attempt started.
    pub begin: u64,
    /// Epoch milliseconds when the attempt completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<u64>,
    /// `end - begin`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    /// What came back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseSnapshot>,
    /// The failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorSnapshot>,
}

impl LogRecord {
    /// Wraps the record the way it appears in log data.
    pub fn to_data(&self) -> Value {
        let mut data = Map::new();
        data.insert(
            "internal_request".to_string(),
            serde_json::to_value(self).unwrap_or(Value::Null),
        );
        Value::Object(data)
    }
}

/// Request half of a [`LogRecord`].
#[derive(Debug, Clone, Serialize)]
pub struct RequestSnapshot {
    /// HTTP method.
    pub method: String,
    /// Fully composed URL.
    pub uri: String,
    /// Request headers after merging.
    pub headers: BTreeMap<String, String>,
    /// Request body before encoding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// JSON handling requested by the call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
    /// Per-attempt timeout in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl RequestSnapshot {
    /// Captures the merged options of an attempt.
    pub fn capture(method: &Method, uri: &str, options: &RequestOptions) -> Self {
        Self {
            method: method.to_string(),
            uri: uri.to_string(),
            headers: header_map(&options.headers),
            body: options.body.as_ref().map(body_snippet),
            json: options.json.as_ref().map(|json| match json {
                Json::Flag(flag) => Value::Bool(*flag),
                Json::Value(value) => value.clone(),
            }),
            timeout: options.timeout.map(|t| t.as_millis() as u64),
        }
    }
}

/// Response half of a [`LogRecord`].
#[derive(Debug, Clone, Serialize)]
pub struct ResponseSnapshot {
    /// HTTP status code.
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// Response headers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    /// Response body, only captured at debug verbosity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Error half of a [`LogRecord`].
#[derive(Debug, Clone, Serialize)]
pub struct ErrorSnapshot {
    /// Error message.
    pub message: String,
    /// Transport error code, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Set for transport timeouts.
    pub timeout: bool,
}

impl From<&crate::Error> for ErrorSnapshot {
    fn from(e: &crate::Error) -> Self {
        Self {
            message: e.to_string(),
            code: e.code().map(str::to_string),
            timeout: e.is_timeout(),
        }
    }
}

/// Loggable form of a body; binary content is reduced to its length.
pub fn body_snippet(body: &Body) -> Value {
    match body {
        Body::Text(s) => Value::String(s.clone()),
        Body::Json(v) => v.clone(),
        Body::Bytes(b) => Value::String(format!("[Buffer][length:{}]", b.len())),
    }
}

/// Header map as printable name/value pairs.
pub fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}
