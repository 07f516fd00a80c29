//! jsonfetch CLI - fetch JSON over HTTP with retries from the command line

use clap::{Parser, ValueEnum};
use jsonfetch::{
    retriers, Credentials, FetchError, JsonFetchResponse, RedirectMode, RequestOptions,
    ResponseOrError, RetryPolicy,
};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Method;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Status, headers and body as JSON
    #[default]
    Json,
    /// Response body only
    Body,
}

/// Conditions that trigger a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RetryOn {
    /// 503 and 504 responses
    #[value(name = "5xx")]
    ServerError,
    /// Connection failures and timeouts
    Network,
}

/// jsonfetch - resilient JSON-over-HTTP requests
#[derive(Parser, Debug)]
#[command(name = "jsonfetch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// URL to fetch
    url: String,

    /// HTTP method
    #[arg(long, short = 'X', default_value = "GET")]
    method: String,

    /// JSON request body
    #[arg(long, short = 'd')]
    data: Option<String>,

    /// Request header as 'Name: value' (repeatable)
    #[arg(long = "header", short = 'H')]
    headers: Vec<String>,

    /// Credentials mode: include, same-origin or omit
    #[arg(long)]
    credentials: Option<Credentials>,

    /// Redirect handling: follow, error or manual
    #[arg(long)]
    redirect: Option<RedirectMode>,

    /// Per-attempt timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Expected response status (repeatable)
    #[arg(long = "expect-status")]
    expect_status: Vec<u16>,

    /// Retries after the first attempt
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Backoff growth factor
    #[arg(long, default_value_t = 2.0)]
    factor: f64,

    /// Delay before the first retry in milliseconds
    #[arg(long, default_value_t = 1000)]
    min_timeout_ms: u64,

    /// Upper bound for any retry delay in milliseconds
    #[arg(long)]
    max_timeout_ms: Option<u64>,

    /// Scale each retry delay by a random factor between 1 and 2
    #[arg(long)]
    randomize: bool,

    /// Retry condition (repeatable)
    #[arg(long = "retry-on", value_enum)]
    retry_on: Vec<RetryOn>,

    /// Output format
    #[arg(long, short, value_enum, default_value = "json")]
    output: OutputFormat,
}

/// Printable view of a successful response
#[derive(Debug, Serialize)]
struct ResponseOutput<'a> {
    status: u16,
    status_text: &'a str,
    headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let options = match build_options(&cli) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    tracing::debug!(url = %cli.url, retries = cli.retries, "Fetching");

    match jsonfetch::json_fetch(&cli.url, options).await {
        Ok(response) => writeln_safe(&format_response(&response, cli.output)),
        Err(e) => {
            eprintln!("{}", format_error(&e));
            std::process::exit(1);
        }
    }
}

/// Translate command line flags into request options
fn build_options(cli: &Cli) -> Result<RequestOptions, String> {
    let method = Method::from_bytes(cli.method.to_uppercase().as_bytes())
        .map_err(|_| format!("Invalid method: {}", cli.method))?;

    let mut options = RequestOptions::new().method(method);

    if let Some(ref data) = cli.data {
        let body: serde_json::Value =
            serde_json::from_str(data).map_err(|e| format!("Invalid JSON body: {}", e))?;
        options = options.body(body);
    }

    for raw in &cli.headers {
        let (name, value) = parse_header(raw)?;
        options = options.header(name, value);
    }

    if let Some(credentials) = cli.credentials {
        options = options.credentials(credentials);
    }
    if let Some(redirect) = cli.redirect {
        options = options.redirect(redirect);
    }
    if let Some(ms) = cli.timeout_ms {
        options = options.timeout(Duration::from_millis(ms));
    }
    if !cli.expect_status.is_empty() {
        options = options.expected_statuses(cli.expect_status.iter().copied());
    }

    options = options.retry(RetryPolicy {
        retries: cli.retries,
        factor: cli.factor,
        min_timeout: Duration::from_millis(cli.min_timeout_ms),
        max_timeout: cli.max_timeout_ms.map(Duration::from_millis),
        randomize: cli.randomize,
    });

    if !cli.retry_on.is_empty() {
        let retry_on = cli.retry_on.clone();
        options = options.should_retry(move |candidate| should_retry(&retry_on, candidate));
    }

    Ok(options)
}

fn should_retry(retry_on: &[RetryOn], candidate: ResponseOrError<'_>) -> bool {
    retry_on.iter().any(|condition| match condition {
        RetryOn::ServerError => retriers::is_5xx(candidate),
        RetryOn::Network => retriers::is_network_error(candidate),
    })
}

/// Parse a 'Name: value' header argument
fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("Invalid header (expected 'Name: value'): {}", raw))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|_| format!("Invalid header name: {}", name.trim()))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|_| format!("Invalid header value for {}", name))?;
    Ok((name, value))
}

/// Format a successful response
fn format_response(response: &JsonFetchResponse, output: OutputFormat) -> String {
    match output {
        OutputFormat::Body => match response.body {
            Some(ref body) => {
                serde_json::to_string_pretty(body).unwrap_or_else(|_| response.text.clone())
            }
            None => response.text.clone(),
        },
        OutputFormat::Json => {
            let headers = response
                .headers
                .iter()
                .map(|(name, value)| {
                    (
                        name.to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect();
            let view = ResponseOutput {
                status: response.status,
                status_text: &response.status_text,
                headers,
                body: response.body.as_ref(),
                text: if response.body.is_none() {
                    Some(&response.text)
                } else {
                    None
                },
            };
            serde_json::to_string_pretty(&view).unwrap_or_else(|e| {
                eprintln!("Error serializing response: {}", e);
                std::process::exit(1);
            })
        }
    }
}

/// Format an error with its sanitized request and response context
fn format_error(err: &FetchError) -> String {
    let mut report = serde_json::json!({
        "name": err.name(),
        "message": err.to_string(),
        "request": err.request(),
    });
    if let Some(response) = err.response() {
        report["response"] = serde_json::json!(response);
    }
    if let Some(retry_count) = err.retry_count() {
        report["retry_count"] = serde_json::json!(retry_count);
    }
    serde_json::to_string_pretty(&report).unwrap_or_else(|_| err.to_string())
}

/// Write to stdout, exit silently on broken pipe
fn writeln_safe(s: &str) {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    if let Err(e) = writeln!(handle, "{}", s) {
        if e.kind() == io::ErrorKind::BrokenPipe {
            std::process::exit(0);
        }
        eprintln!("Error writing to stdout: {}", e);
        std::process::exit(1);
    }
}
