//! Error types for jsonfetch

use crate::retry::RetryPolicy;
use crate::transport::TransportError;
use crate::types::{Credentials, JsonFetchResponse, RedirectMode, RequestOptions};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Name of transport and retry failures
pub const FETCH_ERROR: &str = "FetchError";

/// Name of status assertion failures
pub const FETCH_UNEXPECTED_STATUS_ERROR: &str = "FetchUnexpectedStatusError";

/// Name of body decode failures
pub const SYNTAX_ERROR: &str = "SyntaxError";

/// Request context attached to every error
///
/// Headers are never included: they may carry credentials.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRequest {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    pub credentials: Credentials,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<RedirectMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_statuses: Option<Vec<u16>>,
    /// Effective retry policy
    pub retry: RetryPolicy,
}

impl ErrorRequest {
    /// Describe a request without its headers
    pub fn new(url: &str, options: &RequestOptions, retry: RetryPolicy) -> Self {
        Self {
            url: url.to_string(),
            method: options.method.as_ref().map(|m| m.to_string()),
            body: options.body.clone(),
            credentials: options.credentials.unwrap_or_default(),
            cache: options.cache.clone(),
            integrity: options.integrity.clone(),
            mode: options.mode.clone(),
            redirect: options.redirect,
            referrer: options.referrer.clone(),
            referrer_policy: options.referrer_policy.clone(),
            timeout: options.timeout,
            expected_statuses: options.expected_statuses.clone(),
            retry,
        }
    }
}

/// Response context attached to errors that saw a response
///
/// Headers are never included: they may carry credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub status_text: String,
    pub text: String,
}

impl From<&JsonFetchResponse> for ErrorResponse {
    fn from(response: &JsonFetchResponse) -> Self {
        Self {
            status: response.status,
            status_text: response.status_text.clone(),
            text: response.text.clone(),
        }
    }
}

/// Errors returned by [`json_fetch`](crate::json_fetch)
#[derive(Debug, Error)]
pub enum FetchError {
    /// The transport failed and no retry was left or wanted
    #[error("{source}")]
    Transport {
        #[source]
        source: TransportError,
        /// Attempts made before the failing one
        retry_count: u32,
        request: Box<ErrorRequest>,
    },

    /// Every attempt produced a response the retry predicate rejected
    #[error("Retries exhausted after {} attempts", .retry_count + 1)]
    RetriesExhausted {
        /// Attempts made before the last one
        retry_count: u32,
        request: Box<ErrorRequest>,
    },

    /// The response status is not among the expected ones
    #[error("Unexpected fetch response status {}", .response.status)]
    UnexpectedStatus {
        response: Box<JsonFetchResponse>,
        request: Box<ErrorRequest>,
    },

    /// The response claims JSON but its body does not parse
    #[error("{source}")]
    JsonParse {
        #[source]
        source: serde_json::Error,
        response: ErrorResponse,
        request: Box<ErrorRequest>,
    },
}

impl FetchError {
    /// Discriminator of the error family
    pub fn name(&self) -> &'static str {
        match self {
            FetchError::Transport { .. } | FetchError::RetriesExhausted { .. } => FETCH_ERROR,
            FetchError::UnexpectedStatus { .. } => FETCH_UNEXPECTED_STATUS_ERROR,
            FetchError::JsonParse { .. } => SYNTAX_ERROR,
        }
    }

    /// Request context, without headers
    pub fn request(&self) -> &ErrorRequest {
        match self {
            FetchError::Transport { request, .. }
            | FetchError::RetriesExhausted { request, .. }
            | FetchError::UnexpectedStatus { request, .. }
            | FetchError::JsonParse { request, .. } => request,
        }
    }

    /// Response context, without headers, if a response was accepted
    pub fn response(&self) -> Option<ErrorResponse> {
        match self {
            FetchError::UnexpectedStatus { response, .. } => Some(ErrorResponse::from(&**response)),
            FetchError::JsonParse { response, .. } => Some(response.clone()),
            FetchError::Transport { .. } | FetchError::RetriesExhausted { .. } => None,
        }
    }

    /// Attempts made before the failing one, for retry-loop failures
    pub fn retry_count(&self) -> Option<u32> {
        match self {
            FetchError::Transport { retry_count, .. }
            | FetchError::RetriesExhausted { retry_count, .. } => Some(*retry_count),
            FetchError::UnexpectedStatus { .. } | FetchError::JsonParse { .. } => None,
        }
    }

    /// Full response for status assertion failures
    pub fn unexpected_response(&self) -> Option<&JsonFetchResponse> {
        match self {
            FetchError::UnexpectedStatus { response, .. } => Some(&**response),
            _ => None,
        }
    }
}
