//! Backend configuration.
//!
//! A [`Config`] describes one backend: its name in logs, base URL, correlation
//! header, default request options, retry policy and credentials. It can be
//! built in code or loaded from JSON:
//!
//! ```json
//! {
//!   "name": "MYSERVER",
//!   "url": "http://myserver:28080/prefix",
//!   "example": "/",
//!   "idHeader": "x-reqid",
//!   "request": {
//!     "timeout": 65000,
//!     "maxSockets": 128,
//!     "followRedirect": false,
//!     "json": true,
//!     "headers": { "x-powered-by": "backend-request" }
//!   },
//!   "retry": { "retries": 3, "factor": 2, "minTimeout": 300, "maxTimeout": 6000, "randomize": true },
//!   "environments": {
//!     "development": { "url": "http://localhost:28080" }
//!   }
//! }
//! ```
//!
//! Durations are milliseconds and `auth` is `"user:password"`. Sections under
//! `environments` are merged over the top-level settings when selected.

use crate::options::{Json, RequestOptions};
use crate::retry::RetryPolicy;
use crate::{Error, Result};
use http::{HeaderName, HeaderValue, Method};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Name used for backends that do not set one.
pub const DEFAULT_NAME: &str = "BACKEND";

/// Settings shared by every call of one client.
///
/// # Examples
///
/// ```
/// use backend_request::{Config, RequestOptions, RetryPolicy};
/// use std::time::Duration;
///
/// let config = Config::new("MYSERVER")
///     .with_url("http://myserver:28080/prefix")
///     .with_id_header("x-reqid")
///     .unwrap()
///     .with_request(RequestOptions::new().with_timeout(Duration::from_secs(65)))
///     .with_retry(RetryPolicy::new().retries(3));
/// assert_eq!(config.name, "MYSERVER");
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend name, prefixed to every log message.
    pub name: String,
    /// Base URL that relative targets are appended to.
    pub url: Option<String>,
    /// Example target shown by the command line usage text.
    pub example: Option<String>,
    /// Header that carries the correlation id.
    pub id_header: Option<HeaderName>,
    /// Default request options.
    pub request: RequestOptions,
    /// Backend retry policy.
    pub retry: Option<RetryPolicy>,
    /// Credentials attached to URLs that carry none.
    pub auth: Option<Credentials>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_NAME)
    }
}

impl Config {
    /// Creates a configuration with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
            example: None,
            id_header: None,
            request: RequestOptions::default(),
            retry: None,
            auth: None,
        }
    }

    /// Sets the base URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the example target.
    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = Some(example.into());
        self
    }

    /// Sets the correlation id header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name is invalid.
    pub fn with_id_header(mut self, name: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
        self.id_header = Some(name);
        Ok(self)
    }

    /// Sets the default request options.
    pub fn with_request(mut self, request: RequestOptions) -> Self {
        self.request = request;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets the default credentials.
    pub fn with_auth(mut self, auth: Credentials) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Parses a JSON configuration, optionally selecting an environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for malformed JSON, unknown
    /// environments and invalid header names or values.
    pub fn from_json(text: &str, environment: Option<&str>) -> Result<Self> {
        let mut document: Value = serde_json::from_str(text)
            .map_err(|e| Error::Configuration(format!("Invalid configuration: {}", e)))?;

        let sections = document
            .as_object_mut()
            .and_then(|map| map.remove("environments"));

        if let Some(environment) = environment {
            let section = sections
                .as_ref()
                .and_then(|s| s.get(environment))
                .ok_or_else(|| {
                    Error::Configuration(format!("Unknown environment '{}'", environment))
                })?;
            merge_json(&mut document, section);
        }

        let raw: RawConfig = serde_json::from_value(document)
            .map_err(|e| Error::Configuration(format!("Invalid configuration: {}", e)))?;
        raw.try_into()
    }

    /// Reads a JSON configuration file, optionally selecting an environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>, environment: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&text, environment)
    }
}

/// Basic-auth credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password, if any.
    pub password: Option<String>,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    /// Parses `user` or `user:password`.
    pub fn parse(auth: &str) -> Self {
        match auth.split_once(':') {
            Some((username, password)) => Self::new(username, Some(password.to_string())),
            None => Self::new(auth, None),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn merge_json(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    name: Option<String>,
    url: Option<String>,
    example: Option<String>,
    #[serde(alias = "id_header")]
    id_header: Option<String>,
    request: Option<RawRequest>,
    retry: Option<RawRetry>,
    auth: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequest {
    method: Option<String>,
    timeout: Option<u64>,
    max_sockets: Option<usize>,
    follow_redirect: Option<bool>,
    follow_all_redirects: Option<bool>,
    jar: Option<bool>,
    json: Option<Value>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRetry {
    retries: Option<u32>,
    factor: Option<f64>,
    min_timeout: Option<u64>,
    max_timeout: Option<u64>,
    randomize: Option<bool>,
}

impl TryFrom<RawConfig> for Config {
    type Error = Error;

    fn try_from(raw: RawConfig) -> Result<Self> {
        let mut config = Config::new(raw.name.unwrap_or_else(|| DEFAULT_NAME.to_string()));
        config.url = raw.url;
        config.example = raw.example;
        if let Some(name) = raw.id_header.filter(|n| !n.is_empty()) {
            config = config.with_id_header(name)?;
        }
        if let Some(request) = raw.request {
            config.request = request.try_into()?;
        }
        config.retry = raw.retry.map(RetryPolicy::from);
        config.auth = raw.auth.as_deref().map(Credentials::parse);
        Ok(config)
    }
}

impl TryFrom<RawRequest> for RequestOptions {
    type Error = Error;

    fn try_from(raw: RawRequest) -> Result<Self> {
        let mut options = RequestOptions::new();
        if let Some(method) = raw.method {
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map_err(|e| Error::Configuration(format!("Invalid method: {}", e)))?;
            options.method = Some(method);
        }
        options.timeout = raw.timeout.map(Duration::from_millis);
        options.max_sockets = raw.max_sockets;
        options.follow_redirect = raw.follow_redirect;
        options.follow_all_redirects = raw.follow_all_redirects;
        options.jar = raw.jar;
        options.json = raw.json.map(|json| match json {
            Value::Bool(flag) => Json::Flag(flag),
            value => Json::Value(value),
        });
        for (name, value) in raw.headers {
            let name = HeaderName::try_from(name.as_str())
                .map_err(|e| Error::Configuration(format!("Invalid header name: {}", e)))?;
            let value = HeaderValue::try_from(value.as_str())
                .map_err(|e| Error::Configuration(format!("Invalid header value: {}", e)))?;
            options.headers.insert(name, value);
        }
        Ok(options)
    }
}

impl From<RawRetry> for RetryPolicy {
    fn from(raw: RawRetry) -> Self {
        RetryPolicy {
            retries: raw.retries,
            factor: raw.factor,
            min_timeout: raw.min_timeout.map(Duration::from_millis),
            max_timeout: raw.max_timeout.map(Duration::from_millis),
            randomize: raw.randomize,
            test: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE: &str = r#"{
        "name": "MYSERVER",
        "url": "http://myserver:28080/prefix",
        "example": "/",
        "id_header": "x-reqid",
        "auth": "name:secret",
        "request": {
            "timeout": 65000,
            "maxSockets": 128,
            "followRedirect": false,
            "followAllRedirects": false,
            "jar": false,
            "json": true,
            "headers": { "x-reqid": "", "x-powered-by": "backend-request" }
        },
        "retry": { "retries": 0, "factor": 2, "minTimeout": 300, "maxTimeout": 6000, "randomize": true },
        "environments": {
            "development": { "url": "http://localhost:28080", "retry": { "retries": 2 } },
            "production": {}
        }
    }"#;

    #[test]
    fn test_load_generic_settings() {
        let config = Config::from_json(FILE, None).unwrap();

        assert_eq!(config.name, "MYSERVER");
        assert_eq!(config.url.as_deref(), Some("http://myserver:28080/prefix"));
        assert_eq!(config.example.as_deref(), Some("/"));
        assert_eq!(config.id_header.as_ref().unwrap().as_str(), "x-reqid");
        assert_eq!(config.auth, Some(Credentials::new("name", Some("secret".to_string()))));
        assert_eq!(config.request.timeout, Some(Duration::from_millis(65000)));
        assert_eq!(config.request.max_sockets, Some(128));
        assert_eq!(config.request.follow_redirect, Some(false));
        assert_eq!(config.request.json, Some(Json::Flag(true)));
        assert_eq!(config.request.headers["x-powered-by"], "backend-request");

        let retry = config.retry.unwrap();
        assert_eq!(retry.retries, Some(0));
        assert_eq!(retry.min_timeout, Some(Duration::from_millis(300)));
        assert_eq!(retry.max_timeout, Some(Duration::from_millis(6000)));
        assert_eq!(retry.randomize, Some(true));
    }

    #[test]
    fn test_environment_overlays_generic_settings() {
        let config = Config::from_json(FILE, Some("development")).unwrap();

        assert_eq!(config.url.as_deref(), Some("http://localhost:28080"));
        let retry = config.retry.unwrap();
        assert_eq!(retry.retries, Some(2));
        assert_eq!(retry.factor, Some(2.0));

        let production = Config::from_json(FILE, Some("production")).unwrap();
        assert_eq!(production.url.as_deref(), Some("http://myserver:28080/prefix"));
    }

    #[test]
    fn test_unknown_environment_is_rejected() {
        let err = Config::from_json(FILE, Some("staging")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_minimal_config_uses_default_name() {
        let config = Config::from_json("{}", None).unwrap();
        assert_eq!(config.name, DEFAULT_NAME);
        assert!(config.retry.is_none());
        assert!(config.id_header.is_none());
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let err = Config::from_json(r#"{"request": {"headers": {"bad header": "x"}}}"#, None)
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_credentials_parse() {
        assert_eq!(Credentials::parse("user"), Credentials::new("user", None));
        assert_eq!(
            Credentials::parse("user:pa:ss"),
            Credentials::new("user", Some("pa:ss".to_string()))
        );
        assert!(!format!("{:?}", Credentials::parse("u:secret")).contains("secret"));
    }
}
