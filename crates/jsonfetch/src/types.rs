//! Core types for jsonfetch

use crate::retry::RetryPolicy;
use crate::transport::{TransportError, TransportResponse};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Predicate deciding whether another attempt should be made
pub type ShouldRetry = Arc<dyn Fn(ResponseOrError<'_>) -> bool + Send + Sync>;

/// Callback invoked before every transport call
pub type OnRequestStart = Arc<dyn Fn(&RequestStartEvent<'_>) + Send + Sync>;

/// Callback invoked after every transport call
pub type OnRequestEnd = Arc<dyn Fn(&RequestEndEvent<'_>) + Send + Sync>;

/// Credentials mode of the request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Credentials {
    /// Always send credentials
    #[default]
    Include,
    /// Only send credentials to the same origin
    SameOrigin,
    /// Never send credentials
    Omit,
}

impl FromStr for Credentials {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "include" => Ok(Credentials::Include),
            "same-origin" => Ok(Credentials::SameOrigin),
            "omit" => Ok(Credentials::Omit),
            _ => Err("Invalid credentials: must be include, same-origin or omit".to_string()),
        }
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Include => write!(f, "include"),
            Credentials::SameOrigin => write!(f, "same-origin"),
            Credentials::Omit => write!(f, "omit"),
        }
    }
}

/// How the transport treats redirect responses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectMode {
    /// Follow redirects
    #[default]
    Follow,
    /// Fail the request on a redirect
    Error,
    /// Return the redirect response as-is
    Manual,
}

impl FromStr for RedirectMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "follow" => Ok(RedirectMode::Follow),
            "error" => Ok(RedirectMode::Error),
            "manual" => Ok(RedirectMode::Manual),
            _ => Err("Invalid redirect: must be follow, error or manual".to_string()),
        }
    }
}

impl fmt::Display for RedirectMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RedirectMode::Follow => write!(f, "follow"),
            RedirectMode::Error => write!(f, "error"),
            RedirectMode::Manual => write!(f, "manual"),
        }
    }
}

/// Caller-supplied request options
///
/// Every field is optional. Absent fields fall back to the transport
/// defaults, except `credentials` (defaults to `include`), `retry`
/// (defaults to zero retries) and `should_retry` (defaults to never).
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// Structured body, serialized to JSON before sending
    pub body: Option<serde_json::Value>,
    /// Request headers
    pub headers: Option<HeaderMap>,
    /// Credentials mode
    pub credentials: Option<Credentials>,
    /// HTTP method (transport default is GET)
    pub method: Option<Method>,
    /// Cache directive
    pub cache: Option<String>,
    /// Subresource integrity metadata
    pub integrity: Option<String>,
    /// Request mode
    pub mode: Option<String>,
    /// Redirect handling
    pub redirect: Option<RedirectMode>,
    /// Referrer URL
    pub referrer: Option<String>,
    /// Referrer policy
    pub referrer_policy: Option<String>,
    /// Per-attempt timeout, enforced by the transport
    pub timeout: Option<Duration>,
    /// Statuses considered successful
    pub expected_statuses: Option<Vec<u16>>,
    /// Retry predicate over the response or the transport error
    pub should_retry: Option<ShouldRetry>,
    /// Backoff policy handed to the retry scheduler
    pub retry: Option<RetryPolicy>,
    /// Called before every attempt
    pub on_request_start: Option<OnRequestStart>,
    /// Called after a transport error or an accepted response
    ///
    /// Responses the retry predicate sends back for another attempt are not reported.
    pub on_request_end: Option<OnRequestEnd>,
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("body", &self.body)
            .field("headers", &self.headers.as_ref().map(|h| h.len()))
            .field("credentials", &self.credentials)
            .field("method", &self.method)
            .field("cache", &self.cache)
            .field("integrity", &self.integrity)
            .field("mode", &self.mode)
            .field("redirect", &self.redirect)
            .field("referrer", &self.referrer)
            .field("referrer_policy", &self.referrer_policy)
            .field("timeout", &self.timeout)
            .field("expected_statuses", &self.expected_statuses)
            .field("should_retry", &self.should_retry.is_some())
            .field("retry", &self.retry)
            .field("on_request_start", &self.on_request_start.is_some())
            .field("on_request_end", &self.on_request_end.is_some())
            .finish()
    }
}

impl RequestOptions {
    /// Create empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the JSON body
    pub fn body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Add a header, keeping earlier values for the same name
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers
            .get_or_insert_with(HeaderMap::new)
            .append(name, value);
        self
    }

    /// Replace all headers
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Set the credentials mode
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the HTTP method
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Set the cache directive
    pub fn cache(mut self, cache: impl Into<String>) -> Self {
        self.cache = Some(cache.into());
        self
    }

    /// Set the integrity metadata
    pub fn integrity(mut self, integrity: impl Into<String>) -> Self {
        self.integrity = Some(integrity.into());
        self
    }

    /// Set the request mode
    pub fn mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    /// Set redirect handling
    pub fn redirect(mut self, redirect: RedirectMode) -> Self {
        self.redirect = Some(redirect);
        self
    }

    /// Set the referrer
    pub fn referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    /// Set the referrer policy
    pub fn referrer_policy(mut self, policy: impl Into<String>) -> Self {
        self.referrer_policy = Some(policy.into());
        self
    }

    /// Set the per-attempt timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the statuses considered successful
    pub fn expected_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.expected_statuses = Some(statuses.into_iter().collect());
        self
    }

    /// Set the retry predicate
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(ResponseOrError<'_>) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    /// Set the retry policy
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Set the request-start callback
    pub fn on_request_start<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RequestStartEvent<'_>) + Send + Sync + 'static,
    {
        self.on_request_start = Some(Arc::new(hook));
        self
    }

    /// Set the request-end callback
    pub fn on_request_end<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RequestEndEvent<'_>) + Send + Sync + 'static,
    {
        self.on_request_end = Some(Arc::new(hook));
        self
    }
}

/// Transport-ready request options produced by [`normalize`](crate::normalize)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedOptions {
    /// Merged headers
    pub headers: HeaderMap,
    /// Serialized JSON body
    pub body: Option<String>,
    /// Credentials mode, always explicit
    pub credentials: Credentials,
    pub method: Option<Method>,
    pub cache: Option<String>,
    pub integrity: Option<String>,
    pub mode: Option<String>,
    pub redirect: Option<RedirectMode>,
    pub referrer: Option<String>,
    pub referrer_policy: Option<String>,
    pub timeout: Option<Duration>,
}

/// Outcome of a single transport call, as seen by retry predicates
#[derive(Debug, Clone, Copy)]
pub enum ResponseOrError<'a> {
    /// The transport produced a response
    Response(&'a TransportResponse),
    /// The transport failed
    Error(&'a TransportError),
}

impl<'a> ResponseOrError<'a> {
    /// Status code, if this is a response
    pub fn status(&self) -> Option<u16> {
        match self {
            ResponseOrError::Response(response) => Some(response.status),
            ResponseOrError::Error(_) => None,
        }
    }

    /// Transport error, if the attempt failed
    pub fn error(&self) -> Option<&'a TransportError> {
        match self {
            ResponseOrError::Response(_) => None,
            ResponseOrError::Error(err) => Some(err),
        }
    }
}

/// Payload of the request-start callback
#[derive(Debug, Clone, Copy)]
pub struct RequestStartEvent<'a> {
    pub url: &'a str,
    /// 1-based attempt number
    pub attempt_number: u32,
    pub options: &'a NormalizedOptions,
}

/// Payload of the request-end callback
#[derive(Debug, Clone, Copy)]
pub struct RequestEndEvent<'a> {
    pub url: &'a str,
    /// 1-based attempt number
    pub attempt_number: u32,
    /// Response or transport error of this attempt
    pub outcome: ResponseOrError<'a>,
    pub options: &'a NormalizedOptions,
}

impl RequestEndEvent<'_> {
    /// Response status, if the attempt produced a response
    pub fn status(&self) -> Option<u16> {
        self.outcome.status()
    }

    /// Transport error, if the attempt failed
    pub fn error(&self) -> Option<&TransportError> {
        self.outcome.error()
    }
}

/// Successful response
#[derive(Debug, Clone)]
pub struct JsonFetchResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    /// Raw body text, always present
    pub text: String,
    /// Parsed JSON body, only for `application/json` responses
    pub body: Option<serde_json::Value>,
}

impl JsonFetchResponse {
    /// Deserialize the parsed body into `T`
    ///
    /// A missing body deserializes from `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.clone().unwrap_or(serde_json::Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::ACCEPT;

    #[test]
    fn test_credentials_from_str() {
        assert_eq!(
            Credentials::from_str("include").unwrap(),
            Credentials::Include
        );
        assert_eq!(
            Credentials::from_str("Same-Origin").unwrap(),
            Credentials::SameOrigin
        );
        assert_eq!(Credentials::from_str("omit").unwrap(), Credentials::Omit);
        assert!(Credentials::from_str("always").is_err());
    }

    #[test]
    fn test_credentials_serialization() {
        let json = serde_json::to_string(&Credentials::SameOrigin).unwrap();
        assert_eq!(json, "\"same-origin\"");
        assert_eq!(Credentials::SameOrigin.to_string(), "same-origin");
    }

    #[test]
    fn test_redirect_mode_from_str() {
        assert_eq!(
            RedirectMode::from_str("FOLLOW").unwrap(),
            RedirectMode::Follow
        );
        assert_eq!(RedirectMode::from_str("error").unwrap(), RedirectMode::Error);
        assert_eq!(
            RedirectMode::from_str("manual").unwrap(),
            RedirectMode::Manual
        );
        assert!(RedirectMode::from_str("skip").is_err());
    }

    #[test]
    fn test_options_builder() {
        let options = RequestOptions::new()
            .method(Method::POST)
            .body(serde_json::json!({"name": "apple"}))
            .header(ACCEPT, HeaderValue::from_static("text/plain"))
            .expected_statuses([201])
            .timeout(Duration::from_secs(5));

        assert_eq!(options.method, Some(Method::POST));
        assert_eq!(options.expected_statuses, Some(vec![201]));
        assert_eq!(options.timeout, Some(Duration::from_secs(5)));
        assert_eq!(options.headers.unwrap()[ACCEPT], "text/plain");
    }

    #[test]
    fn test_options_debug_hides_header_values() {
        let options = RequestOptions::new()
            .header(
                reqwest::header::AUTHORIZATION,
                HeaderValue::from_static("Bearer secret"),
            )
            .should_retry(|_| true);
        let debug = format!("{:?}", options);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("should_retry: true"));
    }

    #[test]
    fn test_response_json() {
        #[derive(Deserialize)]
        struct Product {
            name: String,
        }

        let response = JsonFetchResponse {
            status: 200,
            status_text: "OK".to_string(),
            headers: HeaderMap::new(),
            text: r#"{"name":"apple"}"#.to_string(),
            body: Some(serde_json::json!({"name": "apple"})),
        };
        let product: Product = response.json().unwrap();
        assert_eq!(product.name, "apple");

        let empty = JsonFetchResponse {
            body: None,
            ..response
        };
        let missing: Option<Product> = empty.json().unwrap();
        assert!(missing.is_none());
    }
}
