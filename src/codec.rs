//! JSON body handling.
//!
//! Request bodies are encoded here instead of by the transport so that the
//! `Accept` and `Content-Type` headers are always spelled the same way.
//! Response bodies are parsed by sniffing the content rather than trusting
//! the response `Content-Type`: backends routinely label JSON as text and
//! text as JSON.

use crate::options::{Body, Json, RequestOptions};
use crate::{Error, Result};
use http::header::{ACCEPT, CONTENT_TYPE};
use http::HeaderValue;

fn application_json() -> HeaderValue {
    HeaderValue::from_static("application/json")
}

/// What [`encode_request`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Encoding {
    /// JSON handling is active; the response should be parsed too.
    pub active: bool,
    /// A [`Json::Value`] replaced a body the caller had also set.
    pub replaced_body: bool,
}

/// Encodes the request body as JSON when JSON handling is on.
///
/// JSON handling is on unless the call turned it off. A structured body is
/// serialized; a [`Json::Value`] becomes the body, whatever body was set
/// before. The JSON flag is switched off afterwards since the body is now
/// final.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if a value cannot be serialized.
pub fn encode_request(options: &mut RequestOptions) -> Result<Encoding> {
    let json = options.json.take().unwrap_or(Json::Flag(true));
    let mut encoding = Encoding::default();

    match json {
        Json::Flag(false) => {}
        Json::Flag(true) => {
            encoding.active = true;
            if let Some(Body::Json(value)) = &options.body {
                let text = serde_json::to_string(value).map_err(Error::Serialization)?;
                options.body = Some(Body::Text(text));
            }
        }
        Json::Value(value) => {
            encoding.active = true;
            encoding.replaced_body = options.body.is_some();
            let text = serde_json::to_string(&value).map_err(Error::Serialization)?;
            options.body = Some(Body::Text(text));
        }
    }

    if encoding.active {
        options.headers.insert(ACCEPT, application_json());
        if options.body.as_ref().is_some_and(|b| !b.is_empty()) {
            options.headers.insert(CONTENT_TYPE, application_json());
        }
    }
    options.json = Some(Json::Flag(false));

    Ok(encoding)
}

/// Parses a text body that looks like JSON in place.
///
/// Returns `Ok(true)` when the body was replaced by the parsed value. On a
/// parse error the body is left untouched.
///
/// # Errors
///
/// Returns the parser error for bodies that start like JSON but are not.
pub fn decode_response(body: &mut Body) -> std::result::Result<bool, serde_json::Error> {
    let Body::Text(text) = body else {
        return Ok(false);
    };
    if !looks_like_json(text) {
        return Ok(false);
    }
    let value = serde_json::from_str(text)?;
    *body = Body::Json(value);
    Ok(true)
}

// Only a leading `{` or `[` counts; braces later in a text body do not
// trigger a parse attempt.
fn looks_like_json(text: &str) -> bool {
    matches!(text.trim_start().chars().next(), Some('{') | Some('['))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_body_is_serialized() {
        let mut options = RequestOptions::from("/x").with_body(json!({"a": 1}));
        let encoding = encode_request(&mut options).unwrap();

        assert!(encoding.active);
        assert!(!encoding.replaced_body);
        assert_eq!(options.body, Some(Body::Text("{\"a\":1}".to_string())));
        assert_eq!(options.headers[ACCEPT], "application/json");
        assert_eq!(options.headers[CONTENT_TYPE], "application/json");
        assert_eq!(options.json, Some(Json::Flag(false)));
    }

    #[test]
    fn test_no_body_sets_accept_only() {
        let mut options = RequestOptions::from("/x");
        let encoding = encode_request(&mut options).unwrap();

        assert!(encoding.active);
        assert_eq!(options.headers[ACCEPT], "application/json");
        assert!(options.headers.get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn test_json_value_overrides_body() {
        let mut options = RequestOptions::from("/x")
            .with_body("plain text")
            .with_json(json!({"name": "abc"}));
        let encoding = encode_request(&mut options).unwrap();

        assert!(encoding.replaced_body);
        assert_eq!(
            options.body,
            Some(Body::Text("{\"name\":\"abc\"}".to_string()))
        );
    }

    #[test]
    fn test_disabled_json_leaves_request_alone() {
        let mut options = RequestOptions::from("/x")
            .with_body(json!({"a": 1}))
            .with_json_flag(false);
        let encoding = encode_request(&mut options).unwrap();

        assert!(!encoding.active);
        assert_eq!(options.body, Some(Body::Json(json!({"a": 1}))));
        assert!(options.headers.is_empty());
    }

    #[test]
    fn test_round_trip_through_response_path() {
        let mut options = RequestOptions::from("/x").with_body(json!({"a": 1}));
        encode_request(&mut options).unwrap();

        let mut body = options.body.unwrap();
        assert!(decode_response(&mut body).unwrap());
        assert_eq!(body, Body::Json(json!({"a": 1})));
    }

    #[test]
    fn test_decode_sniffs_leading_whitespace() {
        let mut body = Body::Text("  \n[1, 2]".to_string());
        assert!(decode_response(&mut body).unwrap());
        assert_eq!(body, Body::Json(json!([1, 2])));

        let mut body = Body::Text("<xml/>".to_string());
        assert!(!decode_response(&mut body).unwrap());
        assert_eq!(body, Body::Text("<xml/>".to_string()));
    }

    #[test]
    fn test_malformed_json_keeps_raw_body() {
        let mut body = Body::Text("{not json".to_string());
        assert!(decode_response(&mut body).is_err());
        assert_eq!(body, Body::Text("{not json".to_string()));
    }

    #[test]
    fn test_braces_after_text_are_not_parsed() {
        let mut body = Body::Text("status: {\"ok\": true}".to_string());
        assert!(!decode_response(&mut body).unwrap());
        assert_eq!(body, Body::Text("status: {\"ok\": true}".to_string()));
    }
}
