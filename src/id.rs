//! Correlation ids.
//!
//! An id is the current epoch-millisecond timestamp in base 36, left padded
//! with `0` to [`ID_WIDTH`] characters. Ids sort lexicographically in issue
//! order, which keeps client and backend log entries easy to line up.

use crate::{Error, Result};
use http::{HeaderMap, HeaderName, HeaderValue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Width of every correlation id.
pub const ID_WIDTH: usize = 15;

const ALPHABET: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

static LAST_MILLIS: AtomicU64 = AtomicU64::new(0);

/// Returns a fresh correlation id.
///
/// Ids never go backwards within the process, even if the wall clock does.
pub fn next_id() -> String {
    let now = epoch_millis();
    let previous = LAST_MILLIS.fetch_max(now, Ordering::Relaxed);
    format_id(now.max(previous))
}

/// Milliseconds since the Unix epoch.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Formats a millisecond timestamp as a correlation id.
///
/// # Examples
///
/// ```
/// use backend_request::id::format_id;
///
/// assert_eq!(format_id(0), "000000000000000");
/// assert_eq!(format_id(35), "00000000000000z");
/// ```
pub fn format_id(millis: u64) -> String {
    let mut digits = Vec::with_capacity(ID_WIDTH);
    let mut rest = millis;
    loop {
        digits.push(ALPHABET[(rest % 36) as usize]);
        rest /= 36;
        if rest == 0 {
            break;
        }
    }
    while digits.len() < ID_WIDTH {
        digits.push(b'0');
    }
    digits.reverse();
    // base 36 of a u64 never exceeds 13 digits
    String::from_utf8(digits).unwrap_or_default()
}

/// Appends `id` to `header`, when one is configured.
///
/// An existing value is kept as a prefix so that an id received from an
/// upstream caller and the id of this hop end up side by side.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if the combined value is not a valid
/// header value.
pub fn stamp_id(headers: &mut HeaderMap, header: Option<&HeaderName>, id: &str) -> Result<()> {
    if let Some(name) = header {
        let mut value = headers
            .get(name)
            .map(|v| v.as_bytes().to_vec())
            .unwrap_or_default();
        value.extend_from_slice(id.as_bytes());
        let value = HeaderValue::from_bytes(&value).map_err(|e| {
            Error::Configuration(format!("Invalid value for header {}: {}", name, e))
        })?;
        headers.insert(name.clone(), value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_fixed_width_base36() {
        for _ in 0..100 {
            let id = next_id();
            assert_eq!(id.len(), ID_WIDTH);
            assert!(id.bytes().all(|b| ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_ids_do_not_decrease() {
        let mut previous = next_id();
        for _ in 0..1000 {
            let id = next_id();
            assert!(id >= previous, "{} < {}", id, previous);
            previous = id;
        }
    }

    #[test]
    fn test_format_id() {
        assert_eq!(format_id(36), "000000000000010");
        assert_eq!(format_id(1_400_000_000_000), "0000000hv5fupkw");
        assert_eq!(format_id(u64::MAX).len(), ID_WIDTH);
    }

    #[test]
    fn test_stamp_id_appends_to_existing_header() {
        let name = HeaderName::from_static("x-reqid");
        let mut headers = HeaderMap::new();
        headers.insert(name.clone(), HeaderValue::from_static("upstream-"));

        let id = next_id();
        stamp_id(&mut headers, Some(&name), &id).unwrap();

        assert_eq!(
            headers.get(&name).unwrap().to_str().unwrap(),
            format!("upstream-{}", id)
        );
    }

    #[test]
    fn test_stamp_id_without_header_leaves_headers_alone() {
        let mut headers = HeaderMap::new();
        stamp_id(&mut headers, None, &next_id()).unwrap();
        assert!(headers.is_empty());
    }
}
