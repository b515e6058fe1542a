//! Streaming Sessions
//!
//! Runs the decode/route pipeline for each streaming request and reports to
//! caller-supplied handlers.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                         SessionRegistry                             │
//! │   ┌──────────────────────┐   ┌──────────────────────┐               │
//! │   │ SessionHandle (A)    │   │ SessionHandle (B)    │   ...         │
//! │   │  cancel / wait       │   │  cancel / wait       │               │
//! │   └──────────┬───────────┘   └──────────┬───────────┘               │
//! └──────────────┼──────────────────────────┼───────────────────────────┘
//!                │ CancellationToken        │
//!                ▼                          ▼
//! ┌──────────────────────────────┐  ┌──────────────────────────────┐
//! │ StreamSession task (A)       │  │ StreamSession task (B)       │
//! │  Transport ─► FrameDecoder   │  │  Transport ─► FrameDecoder   │
//! │   ─► EventRouter ─► Handler  │  │   ─► EventRouter ─► Handler  │
//! └──────────────────────────────┘  └──────────────────────────────┘
//! ```
//!
//! Each session owns its decoder, router, token and handler. Nothing is
//! shared between sessions except the transport's connection pool.
//!
//! # Example
//!
//! ```ignore
//! use tapline_core::streaming::{ChannelHandler, SessionOptions, StreamSession};
//!
//! let (handler, mut updates) = ChannelHandler::new();
//! let handle = StreamSession::open(
//!     transport,
//!     request,
//!     ProtocolVariant::StagedResearch,
//!     handler,
//!     SessionOptions::for_variant(ProtocolVariant::StagedResearch),
//! );
//!
//! while let Some(update) = updates.recv().await {
//!     println!("{update:?}");
//! }
//! ```

mod handler;
mod registry;
mod session;

pub use handler::{
    AnalysisCallbacks, AnalysisHandler, ChannelHandler, ResearchCallbacks, ResearchHandler,
    SessionHandler, SessionUpdate,
};
pub use registry::{RegisterError, RegistryConfig, SessionInfo, SessionRegistry};
pub use session::{
    Canceller, EndOfBodyPolicy, SessionHandle, SessionId, SessionOptions, SessionOutcome,
    SessionState, SessionStats, StreamError, StreamSession, Terminal,
};
