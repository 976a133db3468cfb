//! # backend-request - preconfigured backend HTTP clients
//!
//! A [`Client`] wraps an HTTP transport with everything a service needs when it
//! talks to another service: a base URL and default options per backend,
//! a correlation id header, retries with exponential backoff, JSON bodies that
//! tolerate misbehaving backends, and one structured log line per request.
//!
//! ## Quick Start
//!
//! ```no_run
//! use backend_request::{Client, Config, RequestOptions, RetryPolicy};
//! use serde::Deserialize;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! #[derive(Deserialize)]
//! struct Item {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), backend_request::Error> {
//!     let config = Config::new("MYSERVER")
//!         .with_url("http://myserver:28080/prefix")
//!         .with_id_header("x-reqid")?
//!         .with_request(RequestOptions::new().with_timeout(Duration::from_secs(65)))
//!         .with_retry(
//!             RetryPolicy::new()
//!                 .retries(3)
//!                 .min_timeout(Duration::from_millis(300))
//!                 .max_timeout(Duration::from_secs(6))
//!                 .randomize(true),
//!         );
//!     let client = Client::new(config)?;
//!
//!     // POST http://myserver:28080/prefix/items
//!     let response = client
//!         .post(RequestOptions::from("/items").with_json(json!({"name": "abc"})))
//!         .await?;
//!
//!     if response.class.success().is_some() {
//!         let item: Item = response.json()?;
//!         println!("created {} ({})", item.id, item.name);
//!     } else if response.class.client_error().is_some() {
//!         eprintln!("rejected: {:?}", response.body);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Logging
//!
//! Each attempt produces one terminal log line: at `ERROR` when the transport
//! failed or the backend answered with a status of 400 or more, otherwise at
//! `DEBUG` (with the response body) or, when debug is off, at `INFO`. With
//! debug enabled a `begin` line precedes it. Lines go to `tracing` unless a
//! [`RequestLogger`] is installed per call, per client, or process-wide with
//! [`log::set_default_logger`].
//!
//! ## Retries
//!
//! Without a [`RetryPolicy`] on the backend or the call, a call is attempted
//! exactly once. With one, failed attempts are repeated after exponentially
//! growing delays. What counts as failed is decided by the policy's
//! [`RetryPredicate`]; by default any transport error.

mod client;
pub mod codec;
pub mod compose;
pub mod config;
mod error;
pub mod id;
pub mod log;
pub mod options;
mod response;
pub mod retry;
pub mod transport;

pub use client::{Client, ClientBuilder};
pub use config::{Config, Credentials};
pub use error::{Error, Result, TransportError, TransportErrorKind};
pub use log::RequestLogger;
pub use options::{Body, Json, RequestOptions, Target, UrlParts};
pub use response::{classify, Classification, Response};
pub use retry::{RetryPolicy, RetryPredicate};
pub use reqwest::cookie::Jar;
pub use transport::{PreparedRequest, RawResponse, ReqwestTransport, Transport};
