//! HTTP Transport
//!
//! [`Transport`] over reqwest. Posts the request body as JSON and hands the
//! response body back as a chunk stream.
//!
//! Only the connect phase has a timeout: analysis and research responses
//! stay open for minutes, and bounding them is the caller's decision.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};

use super::traits::{ByteStream, StreamRequest, Transport, TransportError};
use crate::config::StreamConfig;

/// Content type of event-stream responses
const EVENT_STREAM: &str = "text/event-stream";

/// reqwest-backed transport
#[derive(Clone, Debug)]
pub struct HttpTransport {
    /// Backend base address, without trailing slash
    base_url: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport for a base address
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidRequest`] if the HTTP client cannot be
    /// built.
    pub fn new(base_url: impl Into<String>, connect_timeout: Duration) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    /// Create from a loaded [`StreamConfig`]
    ///
    /// # Errors
    ///
    /// Same as [`HttpTransport::new`].
    pub fn from_config(config: &StreamConfig) -> Result<Self, TransportError> {
        Self::new(config.base_url.clone(), config.connect_timeout)
    }

    /// The configured base address
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for a request path
    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &str {
        "http"
    }

    async fn open(&self, request: &StreamRequest) -> Result<ByteStream, TransportError> {
        let url = self.url(&request.path);
        tracing::debug!(url = %url, "Opening stream");

        let response = self
            .http_client
            .post(&url)
            .header(ACCEPT, EVENT_STREAM)
            .header(CACHE_CONTROL, "no-cache")
            .json(&request.body)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        // Check for HTTP errors
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| TransportError::Read(e.to_string())));

        Ok(Box::pin(stream))
    }
}
