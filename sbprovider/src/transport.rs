//! HTTP transport trait and reqwest-based implementation shared by every
//! adapter family.

use std::pin::Pin;
use std::time::Duration;

use async_stream::stream;
use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::Value;

use crate::{ProviderError, ProviderFuture};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    pub retry_after: Option<Duration>,
}

impl HttpResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Success body, or the classified error for a non-2xx status.
    pub fn into_result(self) -> Result<String, ProviderError> {
        if self.is_success() {
            Ok(self.body)
        } else {
            let message = extract_error_message(&self.body)
                .unwrap_or_else(|| format!("request failed with status {}", self.status));
            Err(classify_http_status(self.status, message, self.retry_after))
        }
    }
}

pub type LineStream<'a> = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send + 'a>>;

pub trait Transport: Send + Sync {
    fn post<'a>(
        &'a self,
        url: String,
        headers: Vec<(String, String)>,
        body: Value,
    ) -> ProviderFuture<'a, Result<HttpResponse, ProviderError>>;

    /// Opens a line-oriented streaming call. Fails with a classified error on
    /// a non-2xx status; on success yields each non-empty line as it
    /// arrives. Dropping the stream closes the connection.
    fn post_stream<'a>(
        &'a self,
        url: String,
        headers: Vec<(String, String)>,
        body: Value,
    ) -> ProviderFuture<'a, Result<LineStream<'a>, ProviderError>>;
}

/// Maps an HTTP status to the error taxonomy. Only 429 and the four
/// transient 5xx statuses are retryable; any other 4xx fails immediately.
pub fn classify_http_status(
    status: u16,
    message: String,
    retry_after: Option<Duration>,
) -> ProviderError {
    let error = match status {
        401 | 403 => ProviderError::authentication(message),
        408 => ProviderError::timeout(message),
        429 => ProviderError::rate_limited(message),
        500 | 502 | 503 | 504 => ProviderError::unavailable(message),
        400..=499 => ProviderError::invalid_request(message),
        _ => ProviderError::other(message),
    };

    match retry_after {
        Some(delay) if error.retryable => error.with_retry_after(delay),
        _ => error,
    }
}

/// Pulls a human-readable message out of the common error envelope shapes:
/// `{"error": {"message": ...}}`, `{"error": "..."}`, `{"message": "..."}`.
/// Backends disagree, so the shapes are tried in order.
pub fn extract_error_message(body: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(body).ok()?;

    if let Some(message) = parsed
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
    {
        return Some(message.to_string());
    }

    if let Some(message) = parsed.get("error").and_then(Value::as_str) {
        return Some(message.to_string());
    }

    parsed
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client with the per-attempt timeout the adapter's config asks for.
    /// The timeout bounds each individual attempt, not the retry sequence.
    pub fn with_timeout(timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProviderError::transport(err.to_string()))?;
        Ok(Self::new(client))
    }

    fn apply_headers(
        &self,
        mut builder: reqwest::RequestBuilder,
        headers: &[(String, String)],
    ) -> reqwest::RequestBuilder {
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        builder
    }

    async fn send(
        &self,
        url: String,
        headers: Vec<(String, String)>,
        body: Value,
    ) -> Result<reqwest::Response, ProviderError> {
        let builder = self.client.post(url).json(&body);
        self.apply_headers(builder, &headers)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    ProviderError::timeout(err.to_string())
                } else {
                    ProviderError::transport(err.to_string())
                }
            })
    }
}

fn retry_after_header(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

impl Transport for HttpTransport {
    fn post<'a>(
        &'a self,
        url: String,
        headers: Vec<(String, String)>,
        body: Value,
    ) -> ProviderFuture<'a, Result<HttpResponse, ProviderError>> {
        Box::pin(async move {
            let response = self.send(url, headers, body).await?;
            let status = response.status().as_u16();
            let retry_after = retry_after_header(&response);
            let body = response
                .text()
                .await
                .map_err(|err| ProviderError::transport(err.to_string()))?;

            Ok(HttpResponse {
                status,
                body,
                retry_after,
            })
        })
    }

    fn post_stream<'a>(
        &'a self,
        url: String,
        headers: Vec<(String, String)>,
        body: Value,
    ) -> ProviderFuture<'a, Result<LineStream<'a>, ProviderError>> {
        Box::pin(async move {
            let response = self.send(url, headers, body).await?;
            let status = response.status().as_u16();

            if !(200..300).contains(&status) {
                let retry_after = retry_after_header(&response);
                let body = response.text().await.unwrap_or_default();
                let message = extract_error_message(&body)
                    .unwrap_or_else(|| format!("request failed with status {status}"));
                return Err(classify_http_status(status, message, retry_after));
            }

            let lines = stream! {
                let mut chunks = response.bytes_stream();
                let mut buffer = String::new();

                while let Some(item) = chunks.next().await {
                    let bytes = match item {
                        Ok(bytes) => bytes,
                        Err(err) => {
                            yield Err(ProviderError::transport(err.to_string()));
                            return;
                        }
                    };

                    match std::str::from_utf8(&bytes) {
                        Ok(text) => buffer.push_str(text),
                        Err(err) => {
                            yield Err(ProviderError::transport(err.to_string()));
                            return;
                        }
                    }

                    while let Some(newline_index) = buffer.find('\n') {
                        let line = buffer.drain(..=newline_index).collect::<String>();
                        let line = line.trim();
                        if !line.is_empty() {
                            yield Ok(line.to_string());
                        }
                    }
                }

                let tail = buffer.trim();
                if !tail.is_empty() {
                    yield Ok(tail.to_string());
                }
            };

            Ok(Box::pin(lines) as LineStream<'a>)
        })
    }
}
