//! Per-call request options and the rules for merging them with defaults.

use crate::log::RequestLogger;
use crate::retry::RetryPolicy;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// The request target as supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// An absolute URL, or a fragment to append to the backend base URL.
    Text(String),
    /// An already parsed absolute URL.
    Url(Url),
    /// A URL given by its components.
    Parts(UrlParts),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Text(s) => f.write_str(s),
            Target::Url(u) => f.write_str(u.as_str()),
            Target::Parts(p) => write!(f, "{:?}", p),
        }
    }
}

/// A URL described by its components.
///
/// Leaving out `scheme` and `host` describes a relative target which is
/// composed with the backend base URL like any other fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UrlParts {
    /// `http` or `https`.
    pub scheme: Option<String>,
    /// `user` or `user:password`.
    pub auth: Option<String>,
    /// Host name or address.
    pub host: Option<String>,
    /// Port.
    pub port: Option<u16>,
    /// Path, with or without a leading `/`.
    pub path: Option<String>,
    /// Query string without the leading `?`.
    pub query: Option<String>,
}

impl UrlParts {
    /// Renders the components as a URL string.
    ///
    /// # Errors
    ///
    /// Fails when the components cannot describe a URL: a scheme without a
    /// host, or a host, port or credentials without a scheme.
    pub fn format(&self) -> Result<String, String> {
        let mut out = String::new();
        match (&self.scheme, &self.host) {
            (Some(scheme), Some(host)) => {
                out.push_str(scheme.trim_end_matches("://").trim_end_matches(':'));
                out.push_str("://");
                if let Some(auth) = &self.auth {
                    out.push_str(auth);
                    out.push('@');
                }
                out.push_str(host);
                if let Some(port) = self.port {
                    out.push(':');
                    out.push_str(&port.to_string());
                }
            }
            (Some(scheme), None) => return Err(format!("scheme '{}' without a host", scheme)),
            (None, Some(host)) => return Err(format!("host '{}' without a scheme", host)),
            (None, None) if self.port.is_some() || self.auth.is_some() => {
                return Err("port or credentials without a host".to_string())
            }
            (None, None) => {}
        }
        out.push_str(&self.relative());
        Ok(out)
    }

    /// Path and query only.
    pub fn relative(&self) -> String {
        let mut out = String::new();
        if let Some(path) = &self.path {
            if self.host.is_some() && !path.starts_with('/') {
                out.push('/');
            }
            out.push_str(path);
        }
        if let Some(query) = &self.query {
            out.push('?');
            out.push_str(query.trim_start_matches('?'));
        }
        out
    }
}

/// A request or response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Text, possibly JSON that has not been parsed (yet).
    Text(String),
    /// A structured value. For requests it is serialized before sending,
    /// for responses it is the parsed JSON body.
    Json(serde_json::Value),
    /// Binary content.
    Bytes(Bytes),
}

impl Default for Body {
    fn default() -> Self {
        Body::Text(String::new())
    }
}

impl Body {
    /// Returns `true` for an empty text or binary body.
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Text(s) => s.is_empty(),
            Body::Bytes(b) => b.is_empty(),
            Body::Json(_) => false,
        }
    }

    /// Returns the body as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the parsed JSON value, if the body was parsed.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Body::Json(v) => Some(v),
            _ => None,
        }
    }

    /// Turns raw transport bytes into a body: UTF-8 content becomes text.
    pub fn from_bytes(bytes: Bytes) -> Self {
        match std::str::from_utf8(&bytes) {
            Ok(text) => Body::Text(text.to_string()),
            Err(_) => Body::Bytes(bytes),
        }
    }

    /// Wire representation of the body.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Body::Text(s) => Bytes::from(s.clone()),
            Body::Json(v) => Bytes::from(v.to_string()),
            Body::Bytes(b) => b.clone(),
        }
    }
}

impl From<&str> for Body {
    fn from(s: &str) -> Self {
        Body::Text(s.to_string())
    }
}

impl From<String> for Body {
    fn from(s: String) -> Self {
        Body::Text(s)
    }
}

impl From<serde_json::Value> for Body {
    fn from(v: serde_json::Value) -> Self {
        Body::Json(v)
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Self {
        Body::Bytes(b)
    }
}

/// JSON handling for a call.
#[derive(Debug, Clone, PartialEq)]
pub enum Json {
    /// Turn JSON handling on or off.
    Flag(bool),
    /// Send this value as the JSON body, replacing any other body.
    Value(serde_json::Value),
}

impl From<bool> for Json {
    fn from(flag: bool) -> Self {
        Json::Flag(flag)
    }
}

/// Options for one backend call.
///
/// Every field is optional: unset fields are filled from the caller defaults
/// given to [`crate::ClientBuilder::default_options`] and then from the
/// backend's [`crate::Config::request`]. A bare URL converts into options
/// with only the target set.
///
/// # Examples
///
/// ```
/// use backend_request::RequestOptions;
/// use std::time::Duration;
///
/// let options = RequestOptions::from("/items")
///     .with_header("x-tenant", "acme")
///     .unwrap()
///     .with_json(serde_json::json!({"name": "abc"}))
///     .with_timeout(Duration::from_secs(5));
/// assert!(options.json.is_some());
/// ```
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// HTTP method, `GET` when unset.
    pub method: Option<Method>,
    /// Request target.
    pub uri: Option<Target>,
    /// Headers; merged per header with the defaults.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Option<Body>,
    /// JSON handling; enabled when unset.
    pub json: Option<Json>,
    /// Transport timeout for a single attempt.
    pub timeout: Option<Duration>,
    /// Idle connections kept in the pool per host. Concurrent connections
    /// are not capped.
    pub max_sockets: Option<usize>,
    /// Follow redirects of GET and HEAD requests.
    pub follow_redirect: Option<bool>,
    /// Follow redirects of all other methods too.
    pub follow_all_redirects: Option<bool>,
    /// Remember cookies between calls; off when unset.
    pub jar: Option<bool>,
    /// Retry policy overlaying the backend policy.
    pub retry: Option<RetryPolicy>,
    /// Logger for this call, the process-wide default when unset.
    pub log: Option<Arc<dyn RequestLogger>>,
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .field("json", &self.json)
            .field("timeout", &self.timeout)
            .field("max_sockets", &self.max_sockets)
            .field("follow_redirect", &self.follow_redirect)
            .field("follow_all_redirects", &self.follow_all_redirects)
            .field("jar", &self.jar)
            .field("retry", &self.retry)
            .field("log", &self.log.as_ref().map(|_| "<logger>"))
            .finish()
    }
}

impl RequestOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets the target.
    pub fn with_uri(mut self, uri: impl Into<Target>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Adds a header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self, crate::Error> {
        let name = HeaderName::try_from(name.as_ref()).map_err(|e| {
            crate::Error::Configuration(format!("Invalid header name: {}", e))
        })?;
        let value = HeaderValue::try_from(value.as_ref()).map_err(|e| {
            crate::Error::Configuration(format!("Invalid header value: {}", e))
        })?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sends `value` as the JSON body.
    pub fn with_json(mut self, value: serde_json::Value) -> Self {
        self.json = Some(Json::Value(value));
        self
    }

    /// Turns JSON handling on or off.
    pub fn with_json_flag(mut self, enabled: bool) -> Self {
        self.json = Some(Json::Flag(enabled));
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the retry policy for this call.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Routes this call's log lines to `log`.
    pub fn with_logger(mut self, log: Arc<dyn RequestLogger>) -> Self {
        self.log = Some(log);
        self
    }

    /// Fills every unset field of `self` from `lower`.
    ///
    /// Headers are merged per header; a header set on `self` wins with all
    /// of its values.
    pub fn or(mut self, lower: &RequestOptions) -> Self {
        let mut headers = lower.headers.clone();
        for name in self.headers.keys() {
            headers.remove(name);
            for value in self.headers.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        self.headers = headers;

        self.method = self.method.or_else(|| lower.method.clone());
        self.uri = self.uri.or_else(|| lower.uri.clone());
        self.body = self.body.or_else(|| lower.body.clone());
        self.json = self.json.or_else(|| lower.json.clone());
        self.timeout = self.timeout.or(lower.timeout);
        self.max_sockets = self.max_sockets.or(lower.max_sockets);
        self.follow_redirect = self.follow_redirect.or(lower.follow_redirect);
        self.follow_all_redirects = self.follow_all_redirects.or(lower.follow_all_redirects);
        self.jar = self.jar.or(lower.jar);
        self.retry = self.retry.or_else(|| lower.retry.clone());
        self.log = self.log.or_else(|| lower.log.clone());
        self
    }

    /// Three-way merge: `call` over `defaults` over `config`.
    pub fn merge(
        config: &RequestOptions,
        defaults: &RequestOptions,
        call: RequestOptions,
    ) -> RequestOptions {
        call.or(&defaults.clone().or(config))
    }
}

/// Removes from `call` every header that `configured` also sets.
///
/// Header names compare case-insensitively, so configured headers always win
/// and are never sent twice under different spellings.
pub fn reconcile_headers(call: &mut HeaderMap, configured: &HeaderMap) {
    for name in configured.keys() {
        call.remove(name);
    }
}

impl From<&str> for Target {
    fn from(s: &str) -> Self {
        Target::Text(s.to_string())
    }
}

impl From<String> for Target {
    fn from(s: String) -> Self {
        Target::Text(s)
    }
}

impl From<Url> for Target {
    fn from(u: Url) -> Self {
        Target::Url(u)
    }
}

impl From<UrlParts> for Target {
    fn from(p: UrlParts) -> Self {
        Target::Parts(p)
    }
}

impl From<Target> for RequestOptions {
    fn from(target: Target) -> Self {
        RequestOptions::new().with_uri(target)
    }
}

impl From<&str> for RequestOptions {
    fn from(s: &str) -> Self {
        RequestOptions::new().with_uri(s)
    }
}

impl From<String> for RequestOptions {
    fn from(s: String) -> Self {
        RequestOptions::new().with_uri(s)
    }
}

impl From<Url> for RequestOptions {
    fn from(u: Url) -> Self {
        RequestOptions::new().with_uri(u)
    }
}

impl From<UrlParts> for RequestOptions {
    fn from(p: UrlParts) -> Self {
        RequestOptions::new().with_uri(p)
    }
}
