//! HTTP transport
//!
//! Design: the engine talks to the network only through [`Transport`].
//! A transport performs exactly one request per `send()` call and hands
//! back the status line and headers with the body still unread.
//! [`ReqwestTransport`] is the default implementation.

use crate::types::{NormalizedOptions, RedirectMode};
use crate::DEFAULT_USER_AGENT;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, REFERER};
use reqwest::{redirect, Client, Method, StatusCode};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Errors raised by a transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to build HTTP client
    #[error("Failed to create HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    /// Failed to connect to server
    #[error("Failed to connect to server")]
    Connect(#[source] reqwest::Error),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,

    /// Redirect received while redirects are disallowed
    #[error("Unexpected redirect with status {status}")]
    Redirect { status: u16 },

    /// The request could not be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Any other failure, message kept verbatim
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create an error from a reqwest error
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() {
            TransportError::Connect(err)
        } else if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// Response returned by a transport, body not yet read
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HeaderMap,
    body: BoxStream<'static, Result<Bytes, TransportError>>,
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("status_text", &self.status_text)
            .field("headers", &self.headers.len())
            .finish_non_exhaustive()
    }
}

impl TransportResponse {
    /// Create a response around a body stream
    pub fn new<S>(status: u16, status_text: impl Into<String>, headers: HeaderMap, body: S) -> Self
    where
        S: Stream<Item = Result<Bytes, TransportError>> + Send + 'static,
    {
        Self {
            status,
            status_text: status_text.into(),
            headers,
            body: body.boxed(),
        }
    }

    /// Create a response with an in-memory body and the canonical status text
    pub fn from_bytes(status: u16, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let status_text = StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("");
        let body = body.into();
        Self::new(status, status_text, headers, stream::once(async move { Ok(body) }))
    }

    /// Content-Type header value
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// True if the Content-Type mentions `application/json`, parameters allowed
    pub fn is_json(&self) -> bool {
        self.content_type()
            .map(|ct| ct.to_lowercase().contains("application/json"))
            .unwrap_or(false)
    }

    /// Read the whole body as UTF-8 text, dropping a leading byte order mark
    pub async fn text(mut self) -> Result<String, TransportError> {
        let mut body = Vec::new();
        while let Some(chunk) = self.body.next().await {
            body.extend_from_slice(&chunk?);
        }
        let body = body.strip_prefix(UTF8_BOM).unwrap_or(&body);
        Ok(String::from_utf8_lossy(body).into_owned())
    }
}

/// Performs a single HTTP request
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and return the response with an unread body
    ///
    /// Fails only when no response was obtained.
    async fn send(
        &self,
        url: &str,
        options: &NormalizedOptions,
    ) -> Result<TransportResponse, TransportError>;
}

/// Transport backed by a reqwest client
///
/// Honors `method`, headers, body, `timeout`, `referrer` and `redirect`.
/// Browser-only directives (`cache`, `integrity`, `mode`,
/// `referrer_policy`, `credentials`) are ignored.
///
/// The no-redirect client is built on first use by a `manual` or `error`
/// request and shared by clones.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    no_redirect: Arc<OnceCell<Client>>,
}

impl ReqwestTransport {
    /// Create a transport with the default client
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(TransportError::ClientBuild)?;

        Ok(Self {
            client,
            no_redirect: Arc::new(OnceCell::new()),
        })
    }

    /// Use a preconfigured client for every request
    ///
    /// Without [`no_redirect_client`](Self::no_redirect_client), the
    /// `manual` and `error` redirect modes fall back to this client's own
    /// redirect policy.
    pub fn with_client(client: Client) -> Self {
        Self {
            no_redirect: Arc::new(OnceCell::new_with(Some(client.clone()))),
            client,
        }
    }

    /// Client used for the `manual` and `error` redirect modes
    pub fn no_redirect_client(mut self, client: Client) -> Self {
        self.no_redirect = Arc::new(OnceCell::new_with(Some(client)));
        self
    }

    async fn client_for(&self, mode: RedirectMode) -> Result<&Client, TransportError> {
        match mode {
            RedirectMode::Follow => Ok(&self.client),
            RedirectMode::Error | RedirectMode::Manual => {
                self.no_redirect
                    .get_or_try_init(|| async {
                        Client::builder()
                            .user_agent(DEFAULT_USER_AGENT)
                            .redirect(redirect::Policy::none())
                            .build()
                            .map_err(TransportError::ClientBuild)
                    })
                    .await
            }
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        url: &str,
        options: &NormalizedOptions,
    ) -> Result<TransportResponse, TransportError> {
        let redirect = options.redirect.unwrap_or_default();
        let method = options.method.clone().unwrap_or(Method::GET);

        let mut headers = options.headers.clone();
        if let Some(ref referrer) = options.referrer {
            if !headers.contains_key(REFERER) {
                let value = HeaderValue::from_str(referrer)
                    .map_err(|_| TransportError::InvalidRequest("invalid referrer".to_string()))?;
                headers.insert(REFERER, value);
            }
        }

        let client = self.client_for(redirect).await?;
        let mut request = client.request(method, url).headers(headers);
        if let Some(ref body) = options.body {
            request = request.body(body.clone());
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(TransportError::from_reqwest)?;

        let status = response.status();
        if redirect == RedirectMode::Error && status.is_redirection() {
            return Err(TransportError::Redirect {
                status: status.as_u16(),
            });
        }

        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from_reqwest));

        Ok(TransportResponse::new(
            status.as_u16(),
            status.canonical_reason().unwrap_or(""),
            headers,
            body,
        ))
    }
}
