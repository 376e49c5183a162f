//! HTTP plumbing shared by the network providers.
//!
//! Client construction, status-code mapping, and a line splitter for
//! server-sent event bodies that arrive in arbitrary byte chunks.

use std::time::Duration;

use botrelay_core::error::ProviderError;
use tracing::warn;

/// Build a client with a request timeout.
///
/// Falls back to a default client if the builder rejects the settings.
pub(crate) fn client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "HTTP client builder failed, using defaults");
            reqwest::Client::new()
        })
}

/// Map a non-success response into a [`ProviderError`].
pub(crate) async fn error_for_status(
    provider: &str,
    response: reqwest::Response,
) -> ProviderError {
    let status = response.status().as_u16();
    match status {
        429 => {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(5);
            ProviderError::RateLimited { retry_after_secs }
        }
        401 | 403 => ProviderError::AuthenticationFailed(format!(
            "{provider} rejected the API key (status {status})"
        )),
        _ => {
            let body = response.text().await.unwrap_or_default();
            warn!(provider, status, body = %body, "Provider returned error");
            ProviderError::ApiError {
                status_code: status,
                message: body,
            }
        }
    }
}

/// Map a transport failure.
pub(crate) fn network_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// One parsed line of an SSE body.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SseLine {
    Event(String),
    Data(String),
}

/// Accumulates raw bytes and yields complete SSE lines.
///
/// Bytes are decoded one whole line at a time, so a multi-byte character
/// split across network chunks survives intact.
#[derive(Default)]
pub(crate) struct SseLines {
    buffer: Vec<u8>,
}

impl SseLines {
    /// Feed bytes; returns every line completed by them.
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<SseLine> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(end) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if let Some(event) = line.strip_prefix("event:") {
                lines.push(SseLine::Event(event.trim().to_string()));
            } else if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    lines.push(SseLine::Data(data.to_string()));
                }
            }
        }
        lines
    }
}
