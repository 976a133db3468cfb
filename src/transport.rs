//! The socket-level side of a call.
//!
//! The pipeline hands a fully decorated [`PreparedRequest`] to a [`Transport`]
//! and gets back the raw status, headers and body, or a [`TransportError`].
//! [`ReqwestTransport`] is the default; tests and embedders can plug in their
//! own.

use crate::error::TransportError;
use crate::options::RequestOptions;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use reqwest::cookie::Jar;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Redirects followed before giving up.
pub const MAX_REDIRECTS: usize = 10;

/// A request ready to go on the wire.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL, possibly with credentials.
    pub url: Url,
    /// Final headers.
    pub headers: HeaderMap,
    /// Encoded body.
    pub body: Option<Bytes>,
    /// Per-attempt timeout.
    pub timeout: Option<Duration>,
    /// Follow redirects of GET and HEAD requests.
    pub follow_redirect: bool,
    /// Follow redirects of every other method.
    pub follow_all_redirects: bool,
    /// Send and store cookies through the transport's cookie jar.
    pub jar: bool,
}

impl PreparedRequest {
    /// Whether a redirect answer to this request should be followed.
    pub fn follows_redirects(&self) -> bool {
        if self.method == Method::GET || self.method == Method::HEAD {
            self.follow_redirect
        } else {
            self.follow_all_redirects
        }
    }
}

/// A raw answer from the backend.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Undecoded body.
    pub body: Bytes,
}

/// Performs one HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and waits for the complete response.
    async fn send(&self, request: PreparedRequest) -> std::result::Result<RawResponse, TransportError>;

    /// The cookie jar used for requests with `jar` set, if the transport
    /// keeps one.
    fn cookie_jar(&self) -> Option<Arc<Jar>> {
        None
    }
}

/// [`Transport`] backed by `reqwest`.
///
/// Redirect handling and cookie storage are fixed per `reqwest::Client`, so
/// four clients share the pool settings: following or returning redirects,
/// each with and without the cookie jar. Requests with `jar` set read and
/// update the one jar of the transport.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    following: reqwest::Client,
    manual: reqwest::Client,
    following_jar: reqwest::Client,
    manual_jar: reqwest::Client,
    jar: Arc<Jar>,
}

impl ReqwestTransport {
    /// Creates a transport with default pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Self::from_options(&RequestOptions::default())
    }

    /// Creates a transport sized by the backend defaults (`max_sockets`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the HTTP client cannot be built.
    pub fn from_options(defaults: &RequestOptions) -> Result<Self> {
        Self::with_jar(defaults, Arc::new(Jar::default()))
    }

    /// Like [`ReqwestTransport::from_options`], keeping cookies in `jar`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the HTTP client cannot be built.
    pub fn with_jar(defaults: &RequestOptions, jar: Arc<Jar>) -> Result<Self> {
        let build = |policy: reqwest::redirect::Policy, cookies: Option<&Arc<Jar>>| {
            let mut builder = reqwest::Client::builder().redirect(policy);
            if let Some(max) = defaults.max_sockets {
                builder = builder.pool_max_idle_per_host(max);
            }
            if let Some(jar) = cookies {
                builder = builder.cookie_provider(jar.clone());
            }
            builder.build().map_err(|e| {
                Error::Configuration(format!("Failed to build HTTP client: {}", e))
            })
        };
        let limited = || reqwest::redirect::Policy::limited(MAX_REDIRECTS);
        let none = reqwest::redirect::Policy::none;
        Ok(Self {
            following: build(limited(), None)?,
            manual: build(none(), None)?,
            following_jar: build(limited(), Some(&jar))?,
            manual_jar: build(none(), Some(&jar))?,
            jar,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: PreparedRequest) -> std::result::Result<RawResponse, TransportError> {
        let client = match (request.follows_redirects(), request.jar) {
            (true, false) => &self.following,
            (false, false) => &self.manual,
            (true, true) => &self.following_jar,
            (false, true) => &self.manual_jar,
        };

        let mut builder = client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    fn cookie_jar(&self) -> Option<Arc<Jar>> {
        Some(self.jar.clone())
    }
}
