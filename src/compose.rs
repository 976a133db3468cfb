//! URL composition.
//!
//! A call names its target either absolutely or as a fragment of the backend's
//! base URL. Fragments are glued to the base with exactly one separator:
//!
//! | base                  | fragment  | result                      |
//! |-----------------------|-----------|-----------------------------|
//! | `http://x`            | `/y`      | `http://x/y`                |
//! | `http://x/`           | `/y`      | `http://x/y`                |
//! | `http://x`            | `y`       | `http://x/y`                |
//! | `http://x/search`     | `?q=1`    | `http://x/search?q=1`       |
//! | `http://x?a=1`        | `b=2`     | `http://x?a=1&b=2`          |

use crate::config::Config;
use crate::log::{Level, RequestLogger};
use crate::options::Target;
use crate::{Error, Result};
use serde_json::json;
use url::Url;

/// Joins `fragment` onto `base`.
///
/// Fragments that already start with `http`, and empty fragments, are
/// returned unchanged.
///
/// # Examples
///
/// ```
/// use backend_request::compose::compose;
///
/// assert_eq!(compose("http://x", "/y"), "http://x/y");
/// assert_eq!(compose("http://x/", "/y"), "http://x/y");
/// assert_eq!(compose("http://x?a=1", "b=2"), "http://x?a=1&b=2");
/// assert_eq!(compose("http://x", "https://other/z"), "https://other/z");
/// ```
pub fn compose(base: &str, fragment: &str) -> String {
    if fragment.is_empty() || fragment.starts_with("http") {
        return fragment.to_string();
    }

    let first = fragment.chars().next();
    let last = base.chars().last();

    let joined = if base.contains('?') {
        // only parameters can follow
        if first == Some('&') {
            fragment.to_string()
        } else {
            format!("&{}", fragment)
        }
    } else if first == Some('?') || last == Some('?') {
        single_separator(fragment, first, last, '?')
    } else if first == Some('/') || last == Some('/') {
        single_separator(fragment, first, last, '/')
    } else {
        format!("/{}", fragment)
    };

    format!("{}{}", base, joined)
}

fn single_separator(fragment: &str, first: Option<char>, last: Option<char>, sep: char) -> String {
    if first == Some(sep) && last == Some(sep) {
        fragment[sep.len_utf8()..].to_string()
    } else {
        fragment.to_string()
    }
}

/// Resolves a call target against the backend configuration.
///
/// Structured targets that cannot be rendered are logged and reduced to their
/// relative part. Credentials from [`Config::auth`] are attached when the URL
/// carries none.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] when the composed string is not a valid
/// absolute URL (this includes a missing or empty target).
pub fn resolve_url(
    target: Option<&Target>,
    config: &Config,
    log: &dyn RequestLogger,
) -> Result<Url> {
    let fragment = match target {
        None => String::new(),
        Some(Target::Text(s)) => s.clone(),
        Some(Target::Url(u)) => u.to_string(),
        Some(Target::Parts(parts)) => match parts.format() {
            Ok(s) => s,
            Err(reason) => {
                if log.enabled(Level::ERROR) {
                    log.log(
                        Level::ERROR,
                        &format!("{} request: could not convert url object to url", config.name),
                        &json!({ "url": format!("{:?}", parts), "error": reason }),
                    );
                }
                parts.relative()
            }
        },
    };

    let composed = compose(config.url.as_deref().unwrap_or(""), &fragment);
    let mut url = Url::parse(&composed).map_err(|source| Error::InvalidUrl {
        url: composed.clone(),
        source,
    })?;

    if let Some(auth) = &config.auth {
        if url.username().is_empty() && url.password().is_none() {
            url.set_username(&auth.username)
                .and_then(|_| url.set_password(auth.password.as_deref()))
                .map_err(|_| {
                    Error::Configuration(format!("Cannot attach credentials to {}", composed))
                })?;
        }
    }

    Ok(url)
}
