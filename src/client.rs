//! Backend clients and the request pipeline.
//!
//! The [`Client`] type is the main entry point for calling a backend.
//! Every call runs through the same steps:
//!
//! 1. headers the backend configures are dropped from the call's headers,
//! 2. call options are merged over the client defaults and the backend
//!    defaults,
//! 3. the target is composed with the backend base URL,
//! 4. a correlation id is generated and appended to the id header,
//! 5. the body is encoded as JSON,
//! 6. the transport is invoked, retrying per policy,
//! 7. the response is classified and its body parsed,
//! 8. one terminal log line is written per attempt.

use crate::codec::{decode_response, encode_request};
use crate::compose::resolve_url;
use crate::config::Config;
use crate::error::TransportErrorKind;
use crate::id::{epoch_millis, next_id, stamp_id};
use crate::log::{
    body_snippet, default_logger, header_map, ErrorSnapshot, Level, LogRecord, RequestLogger,
    RequestSnapshot, ResponseSnapshot,
};
use crate::options::{reconcile_headers, Body, RequestOptions};
use crate::retry::{RetryOperation, RetryPolicy};
use crate::transport::{PreparedRequest, ReqwestTransport, Transport};
use crate::{Error, Response, Result};
use http::Method;
use reqwest::cookie::Jar;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use url::Url;

/// A preconfigured client for one backend.
///
/// The client is cheap to clone and designed to be shared: the configuration
/// is read-only and every call keeps its own state.
///
/// # Examples
///
/// ```no_run
/// use backend_request::{Client, Config, RequestOptions, RetryPolicy};
/// use serde_json::json;
///
/// # async fn example() -> Result<(), backend_request::Error> {
/// let config = Config::new("MYSERVER")
///     .with_url("http://myserver:28080/prefix")
///     .with_id_header("x-reqid")?
///     .with_retry(RetryPolicy::new().retries(2));
/// let client = Client::new(config)?;
///
/// // GET http://myserver:28080/prefix/items/1
/// let item = client.get("/items/1").await?;
/// println!("{} took {:?}", item.status, item.latency);
///
/// // POST http://myserver:28080/prefix/items with a JSON body
/// let created = client
///     .post(RequestOptions::from("/items").with_json(json!({"name": "abc"})))
///     .await?;
/// if let Some(code) = created.class.error() {
///     eprintln!("create failed with {}", code);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: Config,
    defaults: RequestOptions,
    transport: Arc<dyn Transport>,
}

impl Client {
    /// Creates a client for `config` with the default transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Client> {
        ClientBuilder::new(config).build()
    }

    /// Creates a `ClientBuilder` for `config`.
    pub fn builder(config: Config) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// The backend configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The cookie jar shared by calls made with `jar` set, if the transport
    /// keeps one.
    pub fn jar(&self) -> Option<Arc<Jar>> {
        self.inner.transport.cookie_jar()
    }

    /// Stores a `Set-Cookie` style `cookie` for `url` in the cookie jar.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the transport keeps no cookie jar.
    pub fn add_cookie(&self, cookie: &str, url: &Url) -> Result<()> {
        let jar = self.jar().ok_or_else(|| {
            Error::Configuration("The transport keeps no cookie jar".to_string())
        })?;
        jar.add_cookie_str(cookie, url);
        Ok(())
    }

    /// Calls the backend with the method given in the options (`GET` when
    /// none is set anywhere).
    pub async fn request(&self, options: impl Into<RequestOptions>) -> Result<Response> {
        self.call(None, options.into()).await
    }

    /// Makes a GET request.
    pub async fn get(&self, options: impl Into<RequestOptions>) -> Result<Response> {
        self.call(Some(Method::GET), options.into()).await
    }

    /// Makes a POST request.
    pub async fn post(&self, options: impl Into<RequestOptions>) -> Result<Response> {
        self.call(Some(Method::POST), options.into()).await
    }

    /// Makes a PUT request.
    pub async fn put(&self, options: impl Into<RequestOptions>) -> Result<Response> {
        self.call(Some(Method::PUT), options.into()).await
    }

    /// Makes a PATCH request.
    pub async fn patch(&self, options: impl Into<RequestOptions>) -> Result<Response> {
        self.call(Some(Method::PATCH), options.into()).await
    }

    /// Makes a HEAD request.
    pub async fn head(&self, options: impl Into<RequestOptions>) -> Result<Response> {
        self.call(Some(Method::HEAD), options.into()).await
    }

    /// Makes a DELETE request.
    pub async fn delete(&self, options: impl Into<RequestOptions>) -> Result<Response> {
        self.call(Some(Method::DELETE), options.into()).await
    }

    /// Runs a call, retrying it when a policy applies.
    async fn call(&self, method: Option<Method>, mut options: RequestOptions) -> Result<Response> {
        if method.is_some() {
            options.method = method;
        }

        // the logger travels next to the options, never through a merge
        let log = options
            .log
            .take()
            .or_else(|| self.inner.defaults.log.clone())
            .or_else(|| self.inner.config.request.log.clone())
            .unwrap_or_else(default_logger);

        let call_policy = options.retry.as_ref().or(self.inner.defaults.retry.as_ref());
        let Some(policy) = RetryPolicy::merged(call_policy, self.inner.config.retry.as_ref()) else {
            return self.attempt(options, &log).await;
        };

        let test = policy.test.clone();
        let mut operation = RetryOperation::new(policy.resolve());

        loop {
            let attempt = operation.attempt();
            if attempt > 1 && log.enabled(Level::DEBUG) {
                log.log(Level::DEBUG, "attempt", &json!({ "attempt": attempt }));
            }

            let mut outcome = self.attempt(options.clone(), &log).await;
            if let Ok(response) = &mut outcome {
                response.attempts = attempt;
            }

            let should_retry = match &test {
                Some(test) => test.should_retry(outcome.as_ref().err(), outcome.as_ref().ok()),
                None => outcome.is_err(),
            };

            match operation.retry(should_retry) {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return outcome,
            }
        }
    }

    /// One decorated transport invocation.
    async fn attempt(
        &self,
        mut call: RequestOptions,
        log: &Arc<dyn RequestLogger>,
    ) -> Result<Response> {
        let config = &self.inner.config;
        let backend = config.name.as_str();

        reconcile_headers(&mut call.headers, &config.request.headers);
        let mut options = RequestOptions::merge(&config.request, &self.inner.defaults, call);
        let method = options.method.clone().unwrap_or(Method::GET);

        let url = resolve_url(options.uri.as_ref(), config, log.as_ref());
        let id = next_id();
        let stamped = stamp_id(&mut options.headers, config.id_header.as_ref(), &id);

        let uri = match &url {
            Ok(url) => loggable_url(url),
            Err(_) => options.uri.as_ref().map(|u| u.to_string()).unwrap_or_default(),
        };
        let mut record = LogRecord {
            id: id.clone(),
            backend: backend.to_string(),
            options: RequestSnapshot::capture(&method, &uri, &options),
            begin: epoch_millis(),
            end: None,
            duration: None,
            response: None,
            error: None,
        };

        let url = match url.and_then(|url| stamped.map(|_| url)) {
            Ok(url) => url,
            Err(e) => return Err(fail(&mut record, e, log.as_ref())),
        };

        let encoding = match encode_request(&mut options) {
            Ok(encoding) => encoding,
            Err(e) => return Err(fail(&mut record, e, log.as_ref())),
        };
        if encoding.replaced_body && log.enabled(Level::WARN) {
            log.log(
                Level::WARN,
                &format!("{} request: json value replaced the request body", backend),
                &json!({ "id": id }),
            );
        }

        let jar = *options.jar.get_or_insert(false);

        record.begin = epoch_millis();
        let started = Instant::now();
        if log.enabled(Level::DEBUG) {
            log.log(
                Level::DEBUG,
                &format!("{} request begin", backend),
                &record.to_data(),
            );
        }

        let request = PreparedRequest {
            method,
            url: url.clone(),
            body: options.body.as_ref().map(Body::to_bytes),
            headers: options.headers,
            timeout: options.timeout,
            follow_redirect: options.follow_redirect.unwrap_or(true),
            follow_all_redirects: options.follow_all_redirects.unwrap_or(false),
            jar,
        };
        let outcome = self.inner.transport.send(request).await;

        let end = epoch_millis();
        record.end = Some(end);
        record.duration = Some(end.saturating_sub(record.begin));
        let debug = log.enabled(Level::DEBUG);

        let outcome = match outcome {
            Ok(raw) => {
                let mut response =
                    Response::new(raw.status, raw.headers, Body::from_bytes(raw.body));
                response.url = Some(url);
                response.id = id;
                response.latency = started.elapsed();

                if encoding.active {
                    if let Err(e) = decode_response(&mut response.body) {
                        if log.enabled(Level::ERROR) {
                            log.log(
                                Level::ERROR,
                                "Backend request: could not parse response as JSON",
                                &json!({
                                    "body": response.text(),
                                    "error": e.to_string(),
                                    "backend": backend,
                                }),
                            );
                        }
                    }
                }

                record.response = Some(ResponseSnapshot {
                    status_code: response.status.as_u16(),
                    headers: Some(header_map(&response.headers)),
                    body: (debug && !response.body.is_empty())
                        .then(|| body_snippet(&response.body)),
                });
                Ok(response)
            }
            Err(mut e) => {
                if e.kind == TransportErrorKind::Timeout {
                    e.timeout = true;
                }
                let e = Error::Transport(e);
                record.error = Some(ErrorSnapshot::from(&e));
                Err(e)
            }
        };

        let failed = match &outcome {
            Ok(response) => response.status.as_u16() >= 400,
            Err(_) => true,
        };
        if failed {
            if log.enabled(Level::ERROR) {
                log.log(Level::ERROR, &format!("{} request", backend), &record.to_data());
            }
        } else if debug {
            log.log(Level::DEBUG, &format!("{} request end", backend), &record.to_data());
        } else if log.enabled(Level::INFO) {
            log.log(Level::INFO, &format!("{} request", backend), &record.to_data());
        }

        outcome
    }
}

/// Logs an attempt that failed before reaching the transport.
fn fail(record: &mut LogRecord, error: Error, log: &dyn RequestLogger) -> Error {
    let end = epoch_millis();
    record.end = Some(end);
    record.duration = Some(end.saturating_sub(record.begin));
    record.error = Some(ErrorSnapshot::from(&error));
    if log.enabled(Level::ERROR) {
        log.log(Level::ERROR, &format!("{} request", record.backend), &record.to_data());
    }
    error
}

fn loggable_url(url: &Url) -> String {
    let mut url = url.clone();
    if url.password().is_some() {
        let _ = url.set_password(Some("***"));
    }
    url.to_string()
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use backend_request::{ClientBuilder, Config, RequestOptions};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), backend_request::Error> {
/// let client = ClientBuilder::new(Config::new("MYSERVER").with_url("http://myserver:28080"))
///     .default_options(
///         RequestOptions::new()
///             .with_timeout(Duration::from_secs(5))
///             .with_header("User-Agent", "my-app/1.0")?,
///     )
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    config: Config,
    defaults: RequestOptions,
    transport: Option<Arc<dyn Transport>>,
    jar: Option<Arc<Jar>>,
}

impl ClientBuilder {
    /// Creates a builder for `config`.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            defaults: RequestOptions::default(),
            transport: None,
            jar: None,
        }
    }

    /// Sets options applied to every call, between the call's own options
    /// and the backend defaults.
    pub fn default_options(mut self, options: RequestOptions) -> Self {
        self.defaults = options;
        self
    }

    /// Routes log lines of every call to `logger` unless a call overrides it.
    pub fn logger(mut self, logger: Arc<dyn RequestLogger>) -> Self {
        self.defaults.log = Some(logger);
        self
    }

    /// Replaces the default `reqwest` transport.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Keeps cookies of the default transport in `jar`, e.g. to share them
    /// between clients.
    pub fn jar(mut self, jar: Arc<Jar>) -> Self {
        self.jar = Some(jar);
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if the default transport cannot be built.
    pub fn build(self) -> Result<Client> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let sizing = self.defaults.clone().or(&self.config.request);
                let jar = self.jar.unwrap_or_default();
                Arc::new(ReqwestTransport::with_jar(&sizing, jar)?)
            }
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                config: self.config,
                defaults: self.defaults,
                transport,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
