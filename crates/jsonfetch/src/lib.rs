//! jsonfetch - resilient JSON-over-HTTP requests
//!
//! Issues an HTTP request, retries it according to a caller-supplied
//! predicate and backoff policy, parses `application/json` bodies, and
//! reports failures as structured [`FetchError`]s.
//!
//! ## Request flow
//!
//! 1. Options are normalized once ([`normalize`]): JSON body and headers,
//!    `Accept: application/json`, credentials defaulted to `include`.
//! 2. The retry loop ([`retry::retry`]) calls the [`Transport`] until the
//!    retry predicate accepts a response, a transport error is not
//!    retryable, or attempts run out.
//! 3. The accepted body is read once, parsed when the response is JSON, and
//!    checked against the expected statuses.
//!
//! Errors carry the request (never its headers) and, when a response was
//! accepted, its status and text.
//!
//! ```no_run
//! use jsonfetch::{json_fetch, retriers, RequestOptions, RetryPolicy};
//!
//! # async fn run() -> Result<(), jsonfetch::FetchError> {
//! let options = RequestOptions::new()
//!     .expected_statuses([200])
//!     .should_retry(retriers::is_5xx)
//!     .retry(RetryPolicy::with_retries(3));
//! let response = json_fetch("https://api.example.com/products/1234", options).await?;
//! println!("{:?}", response.body);
//! # Ok(())
//! # }
//! ```

pub mod client;
mod error;
mod options;
pub mod retriers;
pub mod retry;
pub mod transport;
mod types;

pub use client::{json_fetch, JsonFetch, JsonFetchBuilder};
pub use error::{
    ErrorRequest, ErrorResponse, FetchError, FETCH_ERROR, FETCH_UNEXPECTED_STATUS_ERROR,
    SYNTAX_ERROR,
};
pub use options::{normalize, APPLICATION_JSON};
pub use retry::RetryPolicy;
pub use transport::{ReqwestTransport, Transport, TransportError, TransportResponse};
pub use types::{
    Credentials, JsonFetchResponse, NormalizedOptions, OnRequestEnd, OnRequestStart,
    RedirectMode, RequestEndEvent, RequestOptions, RequestStartEvent, ResponseOrError,
    ShouldRetry,
};

/// Default User-Agent string
pub const DEFAULT_USER_AGENT: &str = concat!("jsonfetch/", env!("CARGO_PKG_VERSION"));
