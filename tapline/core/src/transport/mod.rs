//! Transport Layer
//!
//! Opens streaming requests against the backend and hands back raw body
//! chunks:
//! - `Http`: reqwest client against the configured base address
//! - `Scripted`: in-process playback for tests and offline tools
//!
//! The streaming core only sees the [`Transport`] trait, so sessions never
//! know which one they run on.

pub mod http;
pub mod scripted;
pub mod traits;

// Re-exports for convenience
pub use http::HttpTransport;
pub use scripted::{ScriptStep, ScriptedTransport};
pub use traits::{ByteStream, StreamRequest, Transport, TransportError};
