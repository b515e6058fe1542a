//! Transport Traits
//!
//! The boundary between the streaming core and whatever opens the HTTP
//! request. A transport turns a [`StreamRequest`] into a [`ByteStream`] of
//! raw body chunks.
//!
//! # Cancellation
//!
//! The session races every pending read against its cancellation token and
//! drops the stream when the token fires. Implementations must release the
//! underlying request when their stream is dropped.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use thiserror::Error;

/// Successive raw body chunks, ending at end-of-body
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Description of one streaming request
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StreamRequest {
    /// Path relative to the backend base address
    pub path: String,
    /// JSON request body
    pub body: serde_json::Value,
}

impl StreamRequest {
    /// Create a request for a path with a JSON body
    pub fn new(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            path: path.into(),
            body,
        }
    }

    /// Create a request with an empty JSON object as body
    pub fn empty(path: impl Into<String>) -> Self {
        Self::new(path, serde_json::json!({}))
    }
}

/// Errors from the transport collaborator
///
/// Always fatal to the session that hit them.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Could not reach the backend
    #[error("connection failed: {0}")]
    Connect(String),

    /// Backend answered with a non-success status
    #[error("backend returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body text
        body: String,
    },

    /// Reading the response body failed mid-stream
    #[error("reading response failed: {0}")]
    Read(String),

    /// The transport could not build the request
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Opens streaming responses
///
/// Implement this trait to plug a different HTTP stack (or an in-process
/// source) under the streaming core.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for logs
    fn name(&self) -> &str;

    /// Open the request and return its body as a chunk stream
    ///
    /// Resolves once response headers have arrived.
    async fn open(&self, request: &StreamRequest) -> Result<ByteStream, TransportError>;
}
