//! Tapline Core - Streaming Protocol Consumer
//!
//! This crate consumes long-lived event-stream responses from the analysis
//! backend and turns raw body chunks into typed events, in order, with each
//! session cancellable at any point.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         StreamClient                              │
//! │        open_simple_analysis_stream / open_staged_research_stream  │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │ SessionHandle (cancel / wait)
//! ┌───────────────────────────────┼──────────────────────────────────┐
//! │                        StreamSession task                         │
//! │  ┌───────────┐   ┌──────────────┐   ┌─────────────┐   ┌────────┐ │
//! │  │ Transport │──►│ FrameDecoder │──►│ EventRouter │──►│Handler │ │
//! │  │ (bytes)   │   │ (frames)     │   │ (events)    │   │        │ │
//! │  └───────────┘   └──────────────┘   └─────────────┘   └────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`FrameDecoder`]: Splits body bytes into frames across arbitrary chunking
//! - [`EventRouter`]: Turns a frame payload into a typed [`DomainEvent`]
//! - [`StreamSession`]: Drives one request and guarantees one terminal callback
//! - [`SessionHandle`]: Cancels a session or waits for its outcome
//! - [`SessionRegistry`]: Tracks concurrently running sessions
//! - [`StreamClient`]: Opens sessions with the configured options
//!
//! # Quick Start
//!
//! ```ignore
//! use tapline_core::{load_config, ResearchRequest, StreamClient};
//! use tapline_core::streaming::ResearchHandler;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = StreamClient::from_config(load_config()?)?;
//!
//!     let handle = client.open_staged_research_stream(
//!         &ResearchRequest::new("What moved treasury yields this week?"),
//!         MyResearchView::default(),
//!     );
//!
//!     // Cancel from anywhere; the handler gets on_cancelled
//!     // handle.cancel();
//!
//!     let outcome = handle.wait().await?;
//!     println!("{:?}", outcome.terminal);
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`protocol`]: Frame decoder, domain events and event router
//! - [`streaming`]: Sessions, handlers and the session registry
//! - [`transport`]: Transport trait with HTTP and scripted implementations
//! - [`client`]: Consumer-facing entry point
//! - [`config`]: TOML and environment configuration
//! - [`telemetry`]: Logging setup for binaries and tests

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod protocol;
pub mod streaming;
pub mod telemetry;
pub mod transport;

// Re-exports for convenience
pub use client::{ResearchRequest, StreamClient};
pub use protocol::{
    route, AnalysisEvent, DecodeError, DomainEvent, EventRouter, Frame, FrameDecoder, Impact,
    ProtocolVariant, ResearchEvent, RouteError, SourceEntry,
};
pub use streaming::{
    AnalysisHandler, Canceller, ChannelHandler, EndOfBodyPolicy, RegisterError, ResearchHandler,
    SessionHandle, SessionHandler, SessionId, SessionOptions, SessionOutcome, SessionRegistry,
    SessionState, SessionStats, SessionUpdate, StreamError, StreamSession, Terminal,
};
pub use transport::{HttpTransport, ScriptedTransport, StreamRequest, Transport, TransportError};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ConfigError, ConfigSource,
    StreamConfig, TaplineToml,
};
