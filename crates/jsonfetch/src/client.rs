//! Retry-orchestrated JSON fetch
//!
//! Control flow: normalize the options once, run the retry loop over the
//! transport, then read and classify the accepted response. Every failure
//! leaves through a single enrichment step that attaches request context.

use crate::error::{ErrorRequest, ErrorResponse, FetchError};
use crate::options::normalize;
use crate::retry::{retry, Attempt, RetryError, RetryPolicy};
use crate::transport::{ReqwestTransport, Transport, TransportError, TransportResponse};
use crate::types::{
    JsonFetchResponse, NormalizedOptions, RequestEndEvent, RequestOptions, RequestStartEvent,
    ResponseOrError, ShouldRetry,
};
use std::sync::Arc;
use tracing::debug;

/// Fetch a URL and decode its JSON response
///
/// Uses a fresh [`ReqwestTransport`] and the built-in defaults
/// (no retries, never retry). For a reusable client, use [`JsonFetch`].
pub async fn json_fetch(
    url: &str,
    options: RequestOptions,
) -> Result<JsonFetchResponse, FetchError> {
    let client = match JsonFetch::builder().build() {
        Ok(client) => client,
        Err(source) => {
            let policy = options.retry.unwrap_or_default();
            let failure = Failure::Transport {
                source,
                retry_count: 0,
            };
            return Err(failure.with_request(ErrorRequest::new(url, &options, policy)));
        }
    };
    client.request(url, options).await
}

fn never_retry(_: ResponseOrError<'_>) -> bool {
    false
}

fn default_should_retry() -> ShouldRetry {
    Arc::new(never_retry)
}

/// Failure before request context is attached
#[derive(Debug)]
enum Failure {
    Transport {
        source: TransportError,
        retry_count: u32,
    },
    RetriesExhausted {
        retry_count: u32,
    },
    UnexpectedStatus(JsonFetchResponse),
    JsonParse {
        source: serde_json::Error,
        response: ErrorResponse,
    },
}

impl Failure {
    fn with_request(self, request: ErrorRequest) -> FetchError {
        let request = Box::new(request);
        match self {
            Failure::Transport {
                source,
                retry_count,
            } => FetchError::Transport {
                source,
                retry_count,
                request,
            },
            Failure::RetriesExhausted { retry_count } => FetchError::RetriesExhausted {
                retry_count,
                request,
            },
            Failure::UnexpectedStatus(response) => FetchError::UnexpectedStatus {
                response: Box::new(response),
                request,
            },
            Failure::JsonParse { source, response } => FetchError::JsonParse {
                source,
                response,
                request,
            },
        }
    }
}

/// Builder for [`JsonFetch`]
#[derive(Default)]
pub struct JsonFetchBuilder {
    transport: Option<Arc<dyn Transport>>,
    retry: RetryPolicy,
    should_retry: Option<ShouldRetry>,
}

impl JsonFetchBuilder {
    /// Create a builder with the built-in defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom transport instead of [`ReqwestTransport`]
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Retry policy for requests that do not set their own
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Retry predicate for requests that do not set their own
    pub fn should_retry<F>(mut self, predicate: F) -> Self
    where
        F: Fn(ResponseOrError<'_>) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(predicate));
        self
    }

    /// Build the client
    ///
    /// Fails only if the default reqwest transport cannot be created.
    pub fn build(self) -> Result<JsonFetch, TransportError> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };

        Ok(JsonFetch {
            transport,
            retry: self.retry,
            should_retry: self.should_retry.unwrap_or_else(default_should_retry),
        })
    }
}

/// Reusable JSON fetch client
///
/// Holds no per-request state; concurrent calls are independent.
#[derive(Clone)]
pub struct JsonFetch {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    should_retry: ShouldRetry,
}

impl JsonFetch {
    /// Create a client builder
    pub fn builder() -> JsonFetchBuilder {
        JsonFetchBuilder::new()
    }

    /// Fetch a URL, retrying per the options, and decode the response
    pub async fn request(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<JsonFetchResponse, FetchError> {
        let policy = options.retry.unwrap_or(self.retry);

        match self.execute(url, &options, &policy).await {
            Ok(response) => Ok(response),
            Err(failure) => {
                let err = failure.with_request(ErrorRequest::new(url, &options, policy));
                debug!(url, name = err.name(), error = %err, "Fetch failed");
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        url: &str,
        options: &RequestOptions,
        policy: &RetryPolicy,
    ) -> Result<JsonFetchResponse, Failure> {
        let normalized = normalize(options);
        let normalized = &normalized;
        let should_retry = options.should_retry.as_ref().unwrap_or(&self.should_retry);

        let outcome = retry(policy, move |attempt_number| {
            self.attempt(url, normalized, options, should_retry, attempt_number)
        })
        .await;

        let (mut response, attempt_number) = match outcome {
            Ok(accepted) => accepted,
            Err(RetryError::Failed(failure))
            | Err(RetryError::Exhausted {
                last: Some(failure),
                ..
            }) => return Err(failure),
            Err(RetryError::Exhausted {
                attempts,
                last: None,
            }) => {
                return Err(Failure::RetriesExhausted {
                    retry_count: attempts - 1,
                })
            }
        };

        let is_json = response.is_json();
        let status = response.status;
        let status_text = std::mem::take(&mut response.status_text);
        let headers = std::mem::take(&mut response.headers);
        let text = response.text().await.map_err(|source| Failure::Transport {
            source,
            retry_count: attempt_number - 1,
        })?;

        let body = if is_json {
            match serde_json::from_str(&text) {
                Ok(value) => Some(value),
                Err(source) => {
                    return Err(Failure::JsonParse {
                        source,
                        response: ErrorResponse {
                            status,
                            status_text,
                            text,
                        },
                    })
                }
            }
        } else {
            None
        };

        let response = JsonFetchResponse {
            status,
            status_text,
            headers,
            text,
            body,
        };

        if let Some(ref expected) = options.expected_statuses {
            if !expected.is_empty() && !expected.contains(&response.status) {
                return Err(Failure::UnexpectedStatus(response));
            }
        }

        Ok(response)
    }

    async fn attempt(
        &self,
        url: &str,
        options: &NormalizedOptions,
        hooks: &RequestOptions,
        should_retry: &ShouldRetry,
        attempt_number: u32,
    ) -> Attempt<(TransportResponse, u32), Failure> {
        if let Some(ref on_start) = hooks.on_request_start {
            on_start(&RequestStartEvent {
                url,
                attempt_number,
                options,
            });
        }

        debug!(url, attempt = attempt_number, "Sending request");

        match self.transport.send(url, options).await {
            Ok(response) => {
                debug!(url, attempt = attempt_number, status = response.status, "Received response");
                // the end hook only sees the response that is accepted
                if should_retry(ResponseOrError::Response(&response)) {
                    return Attempt::Retry(None);
                }
                if let Some(ref on_end) = hooks.on_request_end {
                    on_end(&RequestEndEvent {
                        url,
                        attempt_number,
                        outcome: ResponseOrError::Response(&response),
                        options,
                    });
                }

                Attempt::Success((response, attempt_number))
            }
            Err(source) => {
                debug!(url, attempt = attempt_number, error = %source, "Transport failed");
                if let Some(ref on_end) = hooks.on_request_end {
                    on_end(&RequestEndEvent {
                        url,
                        attempt_number,
                        outcome: ResponseOrError::Error(&source),
                        options,
                    });
                }
                let retry = should_retry(ResponseOrError::Error(&source));
                let failure = Failure::Transport {
                    source,
                    retry_count: attempt_number - 1,
                };

                if retry {
                    Attempt::Retry(Some(failure))
                } else {
                    Attempt::Fail(failure)
                }
            }
        }
    }
}
