//! Responses and status classification.
//!
//! A [`Response`] is returned for every completed exchange, including 4xx and
//! 5xx answers. Use [`Response::class`] to branch on the status:
//!
//! ```no_run
//! use backend_request::{Client, Config};
//!
//! # async fn example() -> Result<(), backend_request::Error> {
//! let client = Client::new(Config::new("ITEMS").with_url("https://api.example.com"))?;
//! let response = client.get("/items/1").await?;
//!
//! if response.class.success().is_some() {
//!     println!("item: {:?}", response.body);
//! } else if let Some(code) = response.class.server_error() {
//!     eprintln!("backend failed with {}", code);
//! }
//! # Ok(())
//! # }
//! ```

use crate::options::Body;
use crate::{Error, Result};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// Status range predicates for one status code.
///
/// Every predicate returns `Some(code)` when the status falls in its range
/// and `None` otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    code: u16,
}

/// Classifies a status code.
///
/// # Examples
///
/// ```
/// use backend_request::classify;
/// use http::StatusCode;
///
/// let class = classify(StatusCode::SERVICE_UNAVAILABLE);
/// assert_eq!(class.error(), Some(503));
/// assert_eq!(class.server_error(), Some(503));
/// assert_eq!(class.client_error(), None);
/// assert_eq!(class.success(), None);
/// ```
pub fn classify(status: StatusCode) -> Classification {
    Classification {
        code: status.as_u16(),
    }
}

impl Classification {
    fn within(&self, low: u16, high: u16) -> Option<u16> {
        (low..=high).contains(&self.code).then_some(self.code)
    }

    fn exactly(&self, code: u16) -> Option<u16> {
        (self.code == code).then_some(self.code)
    }

    /// 200 to 299.
    pub fn success(&self) -> Option<u16> {
        self.within(200, 299)
    }

    /// 300 to 399.
    pub fn redirect(&self) -> Option<u16> {
        self.within(300, 399)
    }

    /// 400 and above.
    pub fn error(&self) -> Option<u16> {
        self.within(400, u16::MAX)
    }

    /// 400 to 499.
    pub fn client_error(&self) -> Option<u16> {
        self.within(400, 499)
    }

    /// 500 to 599.
    pub fn server_error(&self) -> Option<u16> {
        self.within(500, 599)
    }

    /// 429.
    #[deprecated(note = "use `client_error` or compare the status")]
    pub fn too_many(&self) -> Option<u16> {
        self.exactly(429)
    }

    /// 404.
    #[deprecated(note = "use `client_error` or compare the status")]
    pub fn not_found(&self) -> Option<u16> {
        self.exactly(404)
    }

    /// 410.
    #[deprecated(note = "use `client_error` or compare the status")]
    pub fn gone(&self) -> Option<u16> {
        self.exactly(410)
    }
}

/// A completed exchange with a backend.
///
/// The body is parsed JSON when JSON handling was on and the content looked
/// like JSON; otherwise it is the raw text (or bytes, for binary content).
/// A body that looked like JSON but failed to parse stays raw text.
#[derive(Debug, Clone)]
pub struct Response {
    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// Status range predicates for [`Response::status`].
    pub class: Classification,

    /// The response headers.
    pub headers: HeaderMap,

    /// The response body; empty text when the backend sent nothing.
    pub body: Body,

    /// The URL the request was sent to.
    pub url: Option<Url>,

    /// Correlation id of the attempt that produced this response.
    pub id: String,

    /// Time from the start of the attempt to its completion.
    pub latency: Duration,

    /// The number of attempts made to complete this call.
    pub attempts: usize,
}

impl Response {
    /// Creates a response for a completed attempt.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Body) -> Self {
        Self {
            status,
            class: classify(status),
            headers,
            body,
            url: None,
            id: String::new(),
            latency: Duration::ZERO,
            attempts: 1,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_status(status: StatusCode) -> Self {
        Self::new(status, HeaderMap::new(), Body::default())
    }

    /// Returns `true` if the call required retries.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a reference to a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Decodes the body into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeserializationFailed`] with the raw body when the
    /// body does not decode as `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let decoded = match &self.body {
            Body::Json(value) => serde_json::from_value(value.clone()),
            Body::Text(text) => serde_json::from_str(text),
            Body::Bytes(bytes) => serde_json::from_slice(bytes),
        };
        decoded.map_err(|e| {
            tracing::error!(
                error = %e,
                status = self.status.as_u16(),
                "Failed to deserialize response"
            );
            Error::DeserializationFailed {
                raw_response: self.text(),
                serde_error: e.to_string(),
                status: self.status,
            }
        })
    }

    /// The body as text; parsed JSON is re-serialized.
    pub fn text(&self) -> String {
        match &self.body {
            Body::Text(text) => text.clone(),
            Body::Json(value) => value.to_string(),
            Body::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_success_range() {
        for code in 100..=999 {
            let class = classify(StatusCode::from_u16(code).unwrap());
            let expected = (200..=299).contains(&code).then_some(code);
            assert_eq!(class.success(), expected, "status {}", code);
        }
    }

    #[test]
    fn test_server_errors() {
        for code in 500..=599 {
            let class = classify(StatusCode::from_u16(code).unwrap());
            assert_eq!(class.error(), Some(code));
            assert_eq!(class.server_error(), Some(code));
            assert_eq!(class.client_error(), None);
        }
        assert_eq!(classify(StatusCode::from_u16(600).unwrap()).error(), Some(600));
        assert_eq!(classify(StatusCode::from_u16(600).unwrap()).server_error(), None);
    }

    #[test]
    fn test_client_errors_and_redirects() {
        let class = classify(StatusCode::NOT_FOUND);
        assert_eq!(class.client_error(), Some(404));
        assert_eq!(class.error(), Some(404));
        assert_eq!(class.redirect(), None);

        let class = classify(StatusCode::MOVED_PERMANENTLY);
        assert_eq!(class.redirect(), Some(301));
        assert_eq!(class.error(), None);
    }

    #[test]
    #[allow(deprecated)]
    fn test_single_code_helpers() {
        assert_eq!(classify(StatusCode::TOO_MANY_REQUESTS).too_many(), Some(429));
        assert_eq!(classify(StatusCode::NOT_FOUND).not_found(), Some(404));
        assert_eq!(classify(StatusCode::GONE).gone(), Some(410));
        assert_eq!(classify(StatusCode::OK).gone(), None);
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
    }

    #[test]
    fn test_typed_json() {
        let response = Response::new(StatusCode::OK, HeaderMap::new(), Body::Json(json!({"id": 7})));
        assert_eq!(response.json::<Item>().unwrap(), Item { id: 7 });

        let response = Response::new(StatusCode::OK, HeaderMap::new(), Body::from("{not json"));
        match response.json::<Item>() {
            Err(Error::DeserializationFailed { raw_response, .. }) => {
                assert_eq!(raw_response, "{not json");
            }
            other => panic!("Expected DeserializationFailed, got {:?}", other),
        }
    }
}
