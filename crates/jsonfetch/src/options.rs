//! Request option normalization
//!
//! Turns loose [`RequestOptions`] into transport-ready
//! [`NormalizedOptions`]. Only known fields are copied.
//!
//! Header precedence, lowest first:
//! 1. defaults (`Accept: application/json`)
//! 2. caller headers
//! 3. computed headers (`Content-Type: application/json` when a body is set)

use crate::types::{NormalizedOptions, RequestOptions};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};

/// JSON media type used for `Accept` and `Content-Type`
pub const APPLICATION_JSON: &str = "application/json";

/// Normalize caller options into transport options
pub fn normalize(options: &RequestOptions) -> NormalizedOptions {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));

    if let Some(ref caller) = options.headers {
        for name in caller.keys() {
            headers.remove(name);
            for value in caller.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }
    }

    let body = options.body.as_ref().map(|value| value.to_string());
    if body.is_some() {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    }

    NormalizedOptions {
        headers,
        body,
        credentials: options.credentials.unwrap_or_default(),
        method: options.method.clone(),
        cache: options.cache.clone(),
        integrity: options.integrity.clone(),
        mode: options.mode.clone(),
        redirect: options.redirect,
        referrer: options.referrer.clone(),
        referrer_policy: options.referrer_policy.clone(),
        timeout: options.timeout,
    }
}
