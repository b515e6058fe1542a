//! Stream Client
//!
//! Consumer-facing entry point: pairs a [`Transport`] with a [`StreamConfig`]
//! and opens sessions with the configured per-variant options.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::StreamConfig;
use crate::protocol::ProtocolVariant;
use crate::streaming::{
    AnalysisCallbacks, AnalysisHandler, ResearchCallbacks, ResearchHandler, SessionHandle,
    SessionHandler, StreamSession,
};
use crate::transport::{HttpTransport, StreamRequest, Transport, TransportError};

/// Body of a staged research request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchRequest {
    /// Research question
    pub query: String,
    /// How many search hits to collect
    #[serde(default = "default_max_sources")]
    pub max_sources: u32,
    /// How many of those to fetch and read
    #[serde(default = "default_max_scrape")]
    pub max_scrape: u32,
}

fn default_max_sources() -> u32 {
    20
}

fn default_max_scrape() -> u32 {
    10
}

impl ResearchRequest {
    /// Request with default source limits
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_sources: default_max_sources(),
            max_scrape: default_max_scrape(),
        }
    }

    /// Build the streaming request for `path`
    #[must_use]
    pub fn to_stream_request(&self, path: &str) -> StreamRequest {
        StreamRequest::new(
            path,
            serde_json::json!({
                "query": self.query,
                "max_sources": self.max_sources,
                "max_scrape": self.max_scrape,
            }),
        )
    }
}

/// Opens streaming sessions against one backend
#[derive(Clone)]
pub struct StreamClient {
    transport: Arc<dyn Transport>,
    config: StreamConfig,
}

impl std::fmt::Debug for StreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClient")
            .field("transport", &self.transport.name())
            .field("config", &self.config)
            .finish()
    }
}

impl StreamClient {
    /// Client over any transport
    pub fn new(transport: Arc<dyn Transport>, config: StreamConfig) -> Self {
        Self { transport, config }
    }

    /// Client over HTTP to the configured backend
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: StreamConfig) -> Result<Self, TransportError> {
        let transport = HttpTransport::from_config(&config)?;
        Ok(Self::new(Arc::new(transport), config))
    }

    /// The configuration sessions are opened with
    #[must_use]
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Open a session with a generic handler
    ///
    /// Returns at once; streaming starts on a spawned task.
    pub fn open<H: SessionHandler>(
        &self,
        request: StreamRequest,
        variant: ProtocolVariant,
        handler: H,
    ) -> SessionHandle {
        tracing::debug!(variant = %variant, path = %request.path, "Opening session");
        StreamSession::open(
            Arc::clone(&self.transport),
            request,
            variant,
            handler,
            self.config.session_options(variant),
        )
    }

    /// Open a simple analysis stream
    ///
    /// `request` carries the analysis endpoint and its payload.
    pub fn open_simple_analysis_stream<H: AnalysisHandler>(
        &self,
        request: StreamRequest,
        handler: H,
    ) -> SessionHandle {
        self.open(
            request,
            ProtocolVariant::SimpleAnalysis,
            AnalysisCallbacks::new(handler),
        )
    }

    /// Open a staged research stream on the configured research path
    pub fn open_staged_research_stream<H: ResearchHandler>(
        &self,
        request: &ResearchRequest,
        handler: H,
    ) -> SessionHandle {
        self.open(
            request.to_stream_request(&self.config.research_path),
            ProtocolVariant::StagedResearch,
            ResearchCallbacks::new(handler),
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::protocol::{Impact, ResearchEvent};
    use crate::streaming::{StreamError, Terminal};
    use crate::transport::ScriptedTransport;

    #[test]
    fn test_research_request_defaults() {
        let request: ResearchRequest = serde_json::from_str(r#"{"query":"rates"}"#).unwrap();
        assert_eq!(request, ResearchRequest::new("rates"));
        assert_eq!(request.max_sources, 20);
        assert_eq!(request.max_scrape, 10);

        let stream_request = request.to_stream_request("/api/agent/research/stream");
        assert_eq!(stream_request.path, "/api/agent/research/stream");
        assert_eq!(
            stream_request.body,
            serde_json::json!({"query": "rates", "max_sources": 20, "max_scrape": 10})
        );
    }

    #[derive(Default)]
    struct Research {
        events: Vec<ResearchEvent>,
        errors: Vec<String>,
    }

    struct Shared(Arc<parking_lot::Mutex<Research>>);

    impl ResearchHandler for Shared {
        fn on_event(&mut self, event: ResearchEvent) {
            self.0.lock().events.push(event);
        }

        fn on_error(&mut self, error: &StreamError) {
            self.0.lock().errors.push(error.to_string());
        }
    }

    #[tokio::test]
    async fn test_research_stream_uses_configured_path() {
        let transport = Arc::new(ScriptedTransport::from_chunks([
            "data: {\"type\":\"research_start\"}\n\n",
            "data: {\"type\":\"research_complete\"}\n\n",
        ]));
        let client = StreamClient::new(transport.clone(), StreamConfig::default());
        let seen = Arc::new(parking_lot::Mutex::new(Research::default()));

        let handle = client
            .open_staged_research_stream(&ResearchRequest::new("rates"), Shared(seen.clone()));
        let outcome = handle.wait().await.unwrap();

        assert_eq!(outcome.terminal, Terminal::Completed);
        assert_eq!(
            seen.lock().events,
            vec![ResearchEvent::Started, ResearchEvent::Completed]
        );
        assert!(seen.lock().errors.is_empty());
        assert_eq!(
            transport.requests()[0].path,
            "/api/agent/research/stream"
        );
    }

    struct Analysis(Arc<parking_lot::Mutex<Vec<String>>>);

    impl AnalysisHandler for Analysis {
        fn on_chunk(&mut self, text: &str) {
            self.0.lock().push(text.to_string());
        }

        fn on_done(&mut self, impact: Impact, analysis_text: &str) {
            self.0.lock().push(format!("{impact}|{analysis_text}"));
        }

        fn on_error(&mut self, error: &StreamError) {
            self.0.lock().push(format!("error: {error}"));
        }

        fn on_completed(&mut self) {
            self.0.lock().push("completed".to_string());
        }
    }

    #[tokio::test]
    async fn test_analysis_stream() {
        let transport = Arc::new(ScriptedTransport::from_chunks([
            "data: {\"content\":\"Hel\"}\n\ndata: {\"content\":\"lo\"}\n\n",
            "data: {\"done\":true,\"impact\":\"positive\",\"analysis\":\"Hello\"}\n\n",
        ]));
        let client = StreamClient::new(transport, StreamConfig::default());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let handle = client.open_simple_analysis_stream(
            StreamRequest::new("/api/news/analyze", serde_json::json!({"id": 1})),
            Analysis(seen.clone()),
        );
        handle.wait().await.unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                "Hel".to_string(),
                "lo".to_string(),
                "positive|Hello".to_string(),
                "completed".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_analysis_stream_ending_without_done() {
        let transport = Arc::new(ScriptedTransport::from_chunks([
            "data: {\"content\":\"partial\"}\n\n",
        ]));
        let client = StreamClient::new(transport, StreamConfig::default());
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let handle = client.open_simple_analysis_stream(
            StreamRequest::new("/api/news/analyze", serde_json::json!({"id": 1})),
            Analysis(seen.clone()),
        );
        let outcome = handle.wait().await.unwrap();

        assert_eq!(outcome.terminal, Terminal::Completed);
        assert_eq!(
            *seen.lock(),
            vec!["partial".to_string(), "completed".to_string()]
        );
    }
}
