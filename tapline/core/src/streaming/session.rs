//! Stream Session Implementation
//!
//! One session per streaming request. The session task owns the decoder, the
//! router and the handler; the caller keeps a [`SessionHandle`] to cancel it
//! or wait for its outcome.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::handler::SessionHandler;
use crate::protocol::{
    DecodeError, EventRouter, FrameDecoder, ProtocolVariant, RouteError, MAX_FRAME_SIZE,
};
use crate::transport::{StreamRequest, Transport, TransportError};

// ============================================================================
// Identity and State
// ============================================================================

/// Unique session identifier (`stream_<uuid>`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new unique session ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("stream_{}", Uuid::new_v4()))
    }

    /// The ID as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a session
///
/// `Completed`, `Errored` and `Cancelled` are sinks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Created, request not yet sent
    Idle,
    /// Response headers received
    Open,
    /// At least one body chunk received
    Streaming,
    /// Ended successfully
    Completed,
    /// Ended with an error
    Errored,
    /// Ended by the caller
    Cancelled,
}

impl SessionState {
    /// Whether no further transition is possible
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Errored | Self::Cancelled)
    }
}

// ============================================================================
// Options
// ============================================================================

/// What end-of-body without a terminal event means
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndOfBodyPolicy {
    /// Treat it as an implicit success
    Complete,
    /// Treat it as truncation ([`StreamError::Truncated`])
    Fail,
}

impl EndOfBodyPolicy {
    /// Built-in policy for a variant
    #[must_use]
    pub fn for_variant(variant: ProtocolVariant) -> Self {
        match variant {
            ProtocolVariant::SimpleAnalysis => Self::Complete,
            ProtocolVariant::StagedResearch => Self::Fail,
        }
    }
}

impl FromStr for EndOfBodyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "complete" => Ok(Self::Complete),
            "fail" => Ok(Self::Fail),
            other => Err(format!("unknown end-of-body policy `{other}`")),
        }
    }
}

/// Per-session settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    /// Largest partial frame the decoder buffers
    pub max_frame_bytes: usize,
    /// End-of-body handling
    pub end_of_body: EndOfBodyPolicy,
}

impl SessionOptions {
    /// Built-in options for a variant
    #[must_use]
    pub fn for_variant(variant: ProtocolVariant) -> Self {
        Self {
            max_frame_bytes: MAX_FRAME_SIZE,
            end_of_body: EndOfBodyPolicy::for_variant(variant),
        }
    }
}

// ============================================================================
// Errors and Outcome
// ============================================================================

/// Why a session ended with an error
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StreamError {
    /// The transport failed to open or read the body
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The backend sent an error event
    #[error("{message}")]
    Protocol {
        /// Backend message
        message: String,
    },

    /// The body ended before a terminal event
    #[error("stream ended before the final event")]
    Truncated,

    /// A frame grew past the configured limit
    #[error("frame exceeds {limit} bytes")]
    FrameTooLarge {
        /// Configured limit in bytes
        limit: usize,
    },
}

impl From<DecodeError> for StreamError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::FrameTooLarge { limit } => Self::FrameTooLarge { limit },
        }
    }
}

/// How a session ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Terminal {
    /// `on_completed` was called
    Completed,
    /// `on_error` was called with this error
    Errored(StreamError),
    /// `on_cancelled` was called
    Cancelled,
}

impl Terminal {
    fn state(&self) -> SessionState {
        match self {
            Self::Completed => SessionState::Completed,
            Self::Errored(_) => SessionState::Errored,
            Self::Cancelled => SessionState::Cancelled,
        }
    }
}

/// Counters for one session
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Body bytes received
    pub bytes_received: u64,
    /// Frames split off the body
    pub frames_decoded: u64,
    /// Events passed to the handler
    pub events_dispatched: u64,
    /// Frames skipped as malformed
    pub malformed_frames: u64,
    /// Frames with an unknown event kind
    pub unknown_events: u64,
    /// Frames refused after the terminal event
    pub refused_frames: u64,
    /// Partial frame bytes discarded at end-of-body
    pub truncated_bytes: usize,
    /// Time from open to termination
    pub elapsed: Duration,
}

/// Result of a finished session
#[derive(Clone, Debug)]
pub struct SessionOutcome {
    /// Session that finished
    pub id: SessionId,
    /// How it ended
    pub terminal: Terminal,
    /// Final counters
    pub stats: SessionStats,
}

// ============================================================================
// Handle
// ============================================================================

/// Cancels one session; cheap to clone and hand to callbacks
#[derive(Clone, Debug)]
pub struct Canceller(CancellationToken);

impl Canceller {
    /// Request cancellation; no-op if already cancelled or finished
    pub fn cancel(&self) {
        self.0.cancel();
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Caller side of a running session
///
/// Dropping the handle detaches the session; it keeps running and still
/// reports through its handler.
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    variant: ProtocolVariant,
    token: CancellationToken,
    state: watch::Receiver<SessionState>,
    task: JoinHandle<SessionOutcome>,
}

impl SessionHandle {
    /// Session ID
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Protocol variant of the session
    #[must_use]
    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    /// Request cancellation
    ///
    /// Idempotent, and a no-op once the session has finished.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// A clonable cancel trigger for this session
    #[must_use]
    pub fn canceller(&self) -> Canceller {
        Canceller(self.token.clone())
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state transition
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Whether the session task has exited
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to end
    ///
    /// # Errors
    ///
    /// Returns the [`JoinError`] if a handler callback panicked.
    pub async fn wait(self) -> Result<SessionOutcome, JoinError> {
        self.task.await
    }
}

// ============================================================================
// Session
// ============================================================================

/// One step of the read loop
enum Step {
    Chunk(bytes::Bytes),
    Failed(TransportError),
    EndOfBody,
    Cancelled,
}

/// The session task
pub struct StreamSession<H> {
    id: SessionId,
    variant: ProtocolVariant,
    options: SessionOptions,
    token: CancellationToken,
    state_tx: watch::Sender<SessionState>,
    decoder: FrameDecoder,
    router: EventRouter,
    handler: H,
    stats: SessionStats,
}

impl<H: SessionHandler> StreamSession<H> {
    /// Start a session on the current tokio runtime
    ///
    /// Returns immediately; the request is sent from the spawned task. The
    /// handler receives events in frame order and exactly one of
    /// `on_completed`, `on_error` or `on_cancelled`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn open(
        transport: Arc<dyn Transport>,
        request: StreamRequest,
        variant: ProtocolVariant,
        handler: H,
        options: SessionOptions,
    ) -> SessionHandle {
        let id = SessionId::new();
        let token = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);

        let session = Self {
            id: id.clone(),
            variant,
            options,
            token: token.clone(),
            state_tx,
            decoder: FrameDecoder::with_max_frame_bytes(options.max_frame_bytes),
            router: EventRouter::new(variant),
            handler,
            stats: SessionStats::default(),
        };

        let span = tracing::info_span!(
            "stream_session",
            session_id = %id,
            variant = %variant,
        );
        let task = tokio::spawn(session.run(transport, request).instrument(span));

        SessionHandle {
            id,
            variant,
            token,
            state: state_rx,
            task,
        }
    }

    async fn run(mut self, transport: Arc<dyn Transport>, request: StreamRequest) -> SessionOutcome {
        let started = Instant::now();
        tracing::debug!(transport = transport.name(), path = %request.path, "Session starting");

        let terminal = self.drive(transport.as_ref(), &request).await;
        self.stats.elapsed = started.elapsed();
        self.finish(terminal)
    }

    /// Read loop; returns how the session ended
    async fn drive(&mut self, transport: &dyn Transport, request: &StreamRequest) -> Terminal {
        let token = self.token.clone();

        let opened = tokio::select! {
            biased;
            () = token.cancelled() => return Terminal::Cancelled,
            result = transport.open(request) => result,
        };
        let mut body = match opened {
            Ok(body) => body,
            Err(e) => return Terminal::Errored(e.into()),
        };
        self.set_state(SessionState::Open);

        loop {
            let step = tokio::select! {
                biased;
                () = token.cancelled() => Step::Cancelled,
                next = body.next() => match next {
                    Some(Ok(chunk)) => Step::Chunk(chunk),
                    Some(Err(e)) => Step::Failed(e),
                    None => Step::EndOfBody,
                },
            };

            match step {
                Step::Chunk(chunk) => {
                    if let Some(terminal) = self.on_chunk(&chunk) {
                        return terminal;
                    }
                }
                Step::Failed(e) => return Terminal::Errored(e.into()),
                Step::EndOfBody => return self.on_end_of_body(),
                Step::Cancelled => return Terminal::Cancelled,
            }
        }
    }

    /// Decode a chunk and dispatch every frame it completes
    fn on_chunk(&mut self, chunk: &[u8]) -> Option<Terminal> {
        self.stats.bytes_received += chunk.len() as u64;
        if *self.state_tx.borrow() == SessionState::Open {
            self.set_state(SessionState::Streaming);
        }

        self.decoder.push(chunk);

        while let Some(next) = self.decoder.next_frame() {
            // A callback may have cancelled us
            if self.token.is_cancelled() {
                return Some(Terminal::Cancelled);
            }
            let frame = match next {
                Ok(frame) => frame,
                Err(e) => return Some(Terminal::Errored(e.into())),
            };
            self.stats.frames_decoded += 1;
            if let Some(terminal) = self.dispatch(&frame.payload) {
                return Some(terminal);
            }
        }
        None
    }

    /// Route one payload and hand the result to the handler
    fn dispatch(&mut self, payload: &str) -> Option<Terminal> {
        match self.router.route(payload) {
            Ok(event) => {
                if let Some(message) = event.error_message() {
                    return Some(Terminal::Errored(StreamError::Protocol {
                        message: message.to_string(),
                    }));
                }
                let terminal = event.is_terminal();
                self.stats.events_dispatched += 1;
                self.handler.on_event(event);
                terminal.then_some(Terminal::Completed)
            }
            Err(RouteError::Malformed { reason }) => {
                self.stats.malformed_frames += 1;
                tracing::warn!(reason = %reason, bytes = payload.len(), "Skipping malformed frame");
                None
            }
            Err(RouteError::UnknownEvent { kind }) => {
                self.stats.unknown_events += 1;
                tracing::debug!(kind = %kind, "Unknown event kind");
                self.handler.on_unknown_event(&kind, payload);
                None
            }
            Err(RouteError::AfterTerminal) => {
                self.stats.refused_frames += 1;
                tracing::warn!("Frame after terminal event refused");
                None
            }
        }
    }

    fn on_end_of_body(&mut self) -> Terminal {
        if let Some(bytes) = self.decoder.finish() {
            self.stats.truncated_bytes = bytes;
            tracing::warn!(bytes, "Discarding partial frame at end of body");
        }

        match self.options.end_of_body {
            EndOfBodyPolicy::Complete => Terminal::Completed,
            EndOfBodyPolicy::Fail => Terminal::Errored(StreamError::Truncated),
        }
    }

    /// Deliver the single terminal callback, then publish the final state
    fn finish(mut self, terminal: Terminal) -> SessionOutcome {
        match &terminal {
            Terminal::Completed => {
                tracing::info!(events = self.stats.events_dispatched, "Session completed");
                self.handler.on_completed();
            }
            Terminal::Errored(e) => {
                tracing::warn!(error = %e, "Session failed");
                self.handler.on_error(e);
            }
            Terminal::Cancelled => {
                tracing::info!("Session cancelled");
                self.handler.on_cancelled();
            }
        }
        self.set_state(terminal.state());

        SessionOutcome {
            id: self.id,
            terminal,
            stats: self.stats,
        }
    }

    fn set_state(&self, state: SessionState) {
        // No receivers left is fine
        self.state_tx.send_replace(state);
        tracing::trace!(state = ?state, variant = %self.variant, "State transition");
    }
}
