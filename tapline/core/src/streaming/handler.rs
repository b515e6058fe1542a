//! Session Handlers
//!
//! Callbacks a session drives. All callbacks run on the session task, one at
//! a time, in frame order. Every session calls exactly one of
//! `on_completed`, `on_error` or `on_cancelled`, and nothing after it.
//!
//! [`SessionHandler`] is the generic form. [`AnalysisHandler`] and
//! [`ResearchHandler`] are narrower per-variant forms, adapted by
//! [`AnalysisCallbacks`] and [`ResearchCallbacks`]. [`ChannelHandler`]
//! forwards everything into an mpsc channel for async consumers.

use tokio::sync::mpsc;

use super::session::StreamError;
use crate::protocol::{AnalysisEvent, DomainEvent, Impact, ResearchEvent};

/// Generic session callbacks
///
/// Error events from the backend arrive through [`SessionHandler::on_error`]
/// as [`StreamError::Protocol`], never through `on_event`.
pub trait SessionHandler: Send + 'static {
    /// A routed event, including the final `Done`/`Completed`
    fn on_event(&mut self, event: DomainEvent);

    /// A frame whose event kind is not known
    fn on_unknown_event(&mut self, kind: &str, payload: &str) {
        let _ = (kind, payload);
    }

    /// The session ended successfully
    fn on_completed(&mut self);

    /// The session ended with an error
    fn on_error(&mut self, error: &StreamError);

    /// The session was cancelled
    fn on_cancelled(&mut self) {}
}

// ============================================================================
// Simple Analysis
// ============================================================================

/// Callbacks for a [`ProtocolVariant::SimpleAnalysis`](crate::protocol::ProtocolVariant) session
pub trait AnalysisHandler: Send + 'static {
    /// Incremental analysis text
    fn on_chunk(&mut self, text: &str);

    /// The backend's done frame
    fn on_done(&mut self, impact: Impact, analysis_text: &str);

    /// Analysis failed
    fn on_error(&mut self, error: &StreamError);

    /// The session ended successfully
    ///
    /// Follows `on_done`, or stands alone when the body ends without a done
    /// frame under [`EndOfBodyPolicy::Complete`](super::EndOfBodyPolicy).
    fn on_completed(&mut self) {}

    /// Analysis cancelled by the caller
    fn on_cancelled(&mut self) {}
}

/// Adapts an [`AnalysisHandler`] to [`SessionHandler`]
pub struct AnalysisCallbacks<H> {
    inner: H,
}

impl<H: AnalysisHandler> AnalysisCallbacks<H> {
    /// Wrap a handler
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    /// Unwrap the handler
    pub fn into_inner(self) -> H {
        self.inner
    }
}

impl<H: AnalysisHandler> SessionHandler for AnalysisCallbacks<H> {
    fn on_event(&mut self, event: DomainEvent) {
        match event {
            DomainEvent::Analysis(AnalysisEvent::Chunk { text }) => self.inner.on_chunk(&text),
            DomainEvent::Analysis(AnalysisEvent::Done {
                impact,
                analysis_text,
            }) => self.inner.on_done(impact, &analysis_text),
            other => tracing::debug!(event = ?other, "Ignoring event outside analysis protocol"),
        }
    }

    fn on_completed(&mut self) {
        self.inner.on_completed();
    }

    fn on_error(&mut self, error: &StreamError) {
        self.inner.on_error(error);
    }

    fn on_cancelled(&mut self) {
        self.inner.on_cancelled();
    }
}

// ============================================================================
// Staged Research
// ============================================================================

/// Callbacks for a [`ProtocolVariant::StagedResearch`](crate::protocol::ProtocolVariant) session
pub trait ResearchHandler: Send + 'static {
    /// A typed research event, including the final `Completed`
    fn on_event(&mut self, event: ResearchEvent);

    /// Research failed
    fn on_error(&mut self, error: &StreamError);

    /// A frame whose `type` is not known
    fn on_unknown_event(&mut self, kind: &str, payload: &str) {
        let _ = (kind, payload);
    }

    /// Research ended successfully
    fn on_completed(&mut self) {}

    /// Research cancelled by the caller
    fn on_cancelled(&mut self) {}
}

/// Adapts a [`ResearchHandler`] to [`SessionHandler`]
pub struct ResearchCallbacks<H> {
    inner: H,
}

impl<H: ResearchHandler> ResearchCallbacks<H> {
    /// Wrap a handler
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    /// Unwrap the handler
    pub fn into_inner(self) -> H {
        self.inner
    }
}

impl<H: ResearchHandler> SessionHandler for ResearchCallbacks<H> {
    fn on_event(&mut self, event: DomainEvent) {
        match event {
            DomainEvent::Research(event) => self.inner.on_event(event),
            other => tracing::debug!(event = ?other, "Ignoring event outside research protocol"),
        }
    }

    fn on_unknown_event(&mut self, kind: &str, payload: &str) {
        self.inner.on_unknown_event(kind, payload);
    }

    fn on_completed(&mut self) {
        self.inner.on_completed();
    }

    fn on_error(&mut self, error: &StreamError) {
        self.inner.on_error(error);
    }

    fn on_cancelled(&mut self) {
        self.inner.on_cancelled();
    }
}

// ============================================================================
// Channel
// ============================================================================

/// Everything a session reports, as a value
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionUpdate {
    /// A routed event
    Event(DomainEvent),
    /// A frame with an unknown event kind
    Unknown {
        /// The unrecognised discriminator
        kind: String,
        /// Raw payload
        payload: String,
    },
    /// Ended successfully
    Completed,
    /// Ended with an error
    Failed(StreamError),
    /// Ended by the caller
    Cancelled,
}

impl SessionUpdate {
    /// Whether this is the last update of a session
    #[must_use]
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_) | Self::Cancelled)
    }
}

/// Forwards every callback into an unbounded channel
///
/// Unbounded so the session never waits on a slow consumer.
#[derive(Clone, Debug)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<SessionUpdate>,
}

impl ChannelHandler {
    /// Create a handler and the receiver for its updates
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, update: SessionUpdate) {
        if self.tx.send(update).is_err() {
            tracing::trace!("Update receiver dropped");
        }
    }
}

impl SessionHandler for ChannelHandler {
    fn on_event(&mut self, event: DomainEvent) {
        self.send(SessionUpdate::Event(event));
    }

    fn on_unknown_event(&mut self, kind: &str, payload: &str) {
        self.send(SessionUpdate::Unknown {
            kind: kind.to_string(),
            payload: payload.to_string(),
        });
    }

    fn on_completed(&mut self) {
        self.send(SessionUpdate::Completed);
    }

    fn on_error(&mut self, error: &StreamError) {
        self.send(SessionUpdate::Failed(error.clone()));
    }

    fn on_cancelled(&mut self) {
        self.send(SessionUpdate::Cancelled);
    }
}
