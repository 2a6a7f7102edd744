//! Shared HTTP plumbing for the provider adapters.
//!
//! One attempt per request, no retries. Failures are classified uniformly:
//! network vs timeout vs non-2xx status, so callers can layer their own
//! policy on top without the transport knowing about it.

use std::time::Duration;

use log::{debug, warn};

use super::provider::ProviderError;

/// Deadline for a full chat turn, including stream consumption.
pub const CHAT_TIMEOUT: Duration = Duration::from_secs(60);

/// Maps a reqwest error to the matching transport failure kind.
pub fn classify(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Sends a prepared request and checks the status. Returns the response
/// ready for body consumption, or a classified failure.
pub async fn send(builder: reqwest::RequestBuilder) -> Result<reqwest::Response, ProviderError> {
    let response = builder.send().await.map_err(classify)?;

    debug!("response status: {}", response.status());

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let err_body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        warn!("API error: {} - {}", status, err_body);
        return Err(ProviderError::Api {
            status,
            message: err_body,
        });
    }

    Ok(response)
}

/// Reads Server-Sent-Events frames off a response body.
///
/// Bytes arrive in arbitrary chunks; this buffers until a full line is
/// available and yields the payload of each `data: ` line in order. Event
/// boundaries never align with chunk boundaries, so nothing downstream may
/// assume a chunk holds a complete JSON object.
pub struct SseReader {
    response: reqwest::Response,
    /// Raw bytes, decoded only one complete line at a time. A multi-byte
    /// UTF-8 sequence can straddle a network chunk boundary, but never a
    /// newline, so per-line decoding cannot split a character.
    buffer: Vec<u8>,
}

impl SseReader {
    pub fn new(response: reqwest::Response) -> Self {
        SseReader {
            response,
            buffer: Vec::new(),
        }
    }

    /// Returns the next `data: ` payload, or `None` once the body ends.
    pub async fn next_data(&mut self) -> Result<Option<String>, ProviderError> {
        loop {
            // Drain complete lines already buffered.
            while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..pos + 1).collect();
                let line = String::from_utf8_lossy(&line[..pos]);
                let line = line.trim();

                if let Some(data) = line.strip_prefix("data: ") {
                    return Ok(Some(data.to_string()));
                }
                // `event: ` lines and blanks are skipped; every provider we
                // talk to repeats the event type inside the JSON payload.
            }

            match self.response.chunk().await.map_err(classify)? {
                Some(chunk) => {
                    debug!("raw chunk received: {} bytes", chunk.len());
                    self.buffer.extend_from_slice(&chunk);
                }
                None => return Ok(None),
            }
        }
    }
}
