//! Wire Protocol
//!
//! The two pure stages of the pipeline:
//!
//! ```text
//! body bytes ──► FrameDecoder ──► Frame { payload } ──► EventRouter ──► DomainEvent
//! ```
//!
//! Neither stage does I/O; both are owned by a single
//! [`StreamSession`](crate::streaming::StreamSession).

pub mod events;
pub mod frame;
pub mod router;

pub use events::{
    AnalysisEvent, DomainEvent, Impact, ProtocolVariant, ResearchEvent, SourceEntry,
};
pub use frame::{
    DecodeError, Frame, FrameDecoder, Frames, FRAME_DELIMITER, MAX_FRAME_SIZE, PAYLOAD_MARKER,
};
pub use router::{route, EventRouter, RouteError};
