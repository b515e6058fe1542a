//! Event Router
//!
//! Classifies one frame payload into a [`DomainEvent`] of the session's
//! [`ProtocolVariant`].
//!
//! # Simple analysis
//!
//! ```text
//! { content?: string, done?: bool, impact?: string, analysis?: string, error?: string }
//! ```
//!
//! `error` wins over everything, then `done: true`, then `content`.
//!
//! # Staged research
//!
//! ```text
//! { type: "<kind>", data: { ...kind-specific fields... } }
//! ```
//!
//! Dispatch is strictly on `type`. Research kinds are unordered relative to
//! each other, but `research_complete` and `error` are terminal: the
//! stateful [`EventRouter`] refuses every frame after them.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use super::events::{AnalysisEvent, DomainEvent, Impact, ProtocolVariant, ResearchEvent, SourceEntry};
use super::frame::PAYLOAD_MARKER;

/// Fallback message for a research error frame that carries none
const DEFAULT_RESEARCH_ERROR: &str = "research stream failed";

/// Why a frame could not be turned into an event
///
/// None of these end a session on their own.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    /// The payload is not structured data of the expected shape
    #[error("malformed frame: {reason}")]
    Malformed {
        /// Parser diagnostic (for logs only)
        reason: String,
    },

    /// The research discriminator is outside the known set
    #[error("unknown event kind `{kind}`")]
    UnknownEvent {
        /// The unrecognised discriminator
        kind: String,
    },

    /// A terminal event was already routed for this session
    #[error("frame received after the terminal event")]
    AfterTerminal,
}

impl RouteError {
    fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// Route a single payload without ordering checks
///
/// # Errors
///
/// Returns [`RouteError::Malformed`] or [`RouteError::UnknownEvent`].
pub fn route(variant: ProtocolVariant, payload: &str) -> Result<DomainEvent, RouteError> {
    let payload = strip_marker(payload);
    if payload.trim().is_empty() {
        return Err(RouteError::malformed("empty payload"));
    }

    match variant {
        ProtocolVariant::SimpleAnalysis => route_analysis(payload).map(DomainEvent::Analysis),
        ProtocolVariant::StagedResearch => route_research(payload).map(DomainEvent::Research),
    }
}

/// Per-session router holding the terminal latch
#[derive(Debug)]
pub struct EventRouter {
    variant: ProtocolVariant,
    terminated: bool,
}

impl EventRouter {
    /// Create a router for one session
    #[must_use]
    pub fn new(variant: ProtocolVariant) -> Self {
        Self {
            variant,
            terminated: false,
        }
    }

    /// The session's variant
    #[must_use]
    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    /// Whether a terminal event has been routed
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Route one payload, enforcing the terminal latch
    ///
    /// # Errors
    ///
    /// Returns [`RouteError::AfterTerminal`] once a terminal event has been
    /// routed, otherwise whatever [`route`] returns.
    pub fn route(&mut self, payload: &str) -> Result<DomainEvent, RouteError> {
        if self.terminated {
            return Err(RouteError::AfterTerminal);
        }

        let event = route(self.variant, payload)?;
        if event.is_terminal() {
            self.terminated = true;
        }
        Ok(event)
    }
}

fn strip_marker(payload: &str) -> &str {
    match payload.trim_start().strip_prefix(PAYLOAD_MARKER) {
        Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
        None => payload,
    }
}

// ============================================================================
// Simple analysis
// ============================================================================

#[derive(Debug, Deserialize)]
struct AnalysisPayload {
    /// Chat streams send text as `chunk`
    #[serde(default, alias = "chunk")]
    content: Option<String>,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    impact: Option<String>,
    #[serde(default)]
    analysis: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn route_analysis(payload: &str) -> Result<AnalysisEvent, RouteError> {
    let frame: AnalysisPayload =
        serde_json::from_str(payload).map_err(|e| RouteError::malformed(e.to_string()))?;

    if let Some(message) = frame.error {
        return Ok(AnalysisEvent::Error { message });
    }

    if frame.done == Some(true) {
        return Ok(AnalysisEvent::Done {
            impact: frame.impact.as_deref().map(Impact::parse).unwrap_or_default(),
            analysis_text: frame.analysis.unwrap_or_default(),
        });
    }

    match frame.content {
        Some(text) => Ok(AnalysisEvent::Chunk { text }),
        None => Err(RouteError::malformed(
            "analysis frame has none of `error`, `done`, `content`",
        )),
    }
}

// ============================================================================
// Staged research
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct ThoughtData {
    thoughts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SourcesProgressData {
    count: u32,
    #[serde(alias = "currentSubtask")]
    current_subtask: u32,
    #[serde(alias = "totalSubtasks")]
    total_subtasks: u32,
}

#[derive(Debug, Deserialize)]
struct SourcesCompleteData {
    #[serde(default)]
    sources: BTreeMap<String, u32>,
    #[serde(default, alias = "sourceList")]
    source_list: Vec<SourceEntry>,
}

#[derive(Debug, Deserialize)]
struct SourceReadData {
    url: String,
    current: u32,
    total: u32,
}

#[derive(Debug, Deserialize)]
struct ContentChunkData {
    #[serde(alias = "text")]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ErrorData {
    #[serde(default)]
    message: Option<String>,
}

fn route_research(payload: &str) -> Result<ResearchEvent, RouteError> {
    let envelope: Envelope =
        serde_json::from_str(payload).map_err(|e| RouteError::malformed(e.to_string()))?;
    let Envelope { kind, data } = envelope;

    let event = match kind.as_str() {
        "research_start" => ResearchEvent::Started,
        "thought" => {
            let ThoughtData { thoughts } = kind_data(&kind, data)?;
            ResearchEvent::Thought { thoughts }
        }
        "status" => {
            let StatusData { message } = kind_data(&kind, data)?;
            ResearchEvent::Status { message }
        }
        "plan_created" => ResearchEvent::PlanCreated,
        "sources_update" => {
            let SourcesProgressData {
                count,
                current_subtask,
                total_subtasks,
            } = kind_data(&kind, data)?;
            ResearchEvent::SourcesProgress {
                count,
                current_subtask,
                total_subtasks,
            }
        }
        "sources_complete" => {
            let SourcesCompleteData {
                sources,
                source_list,
            } = kind_data(&kind, data)?;
            ResearchEvent::SourcesComplete {
                sources,
                source_list,
            }
        }
        "source_read" => {
            let SourceReadData {
                url,
                current,
                total,
            } = kind_data(&kind, data)?;
            ResearchEvent::SourceRead {
                url,
                current,
                total,
            }
        }
        "content_chunk" => {
            let ContentChunkData { content } = kind_data(&kind, data)?;
            ResearchEvent::ContentChunk { text: content }
        }
        "research_complete" => ResearchEvent::Completed,
        "error" => {
            let message = kind_data::<Option<ErrorData>>(&kind, data)?
                .and_then(|d| d.message)
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_RESEARCH_ERROR.to_string());
            ResearchEvent::Error { message }
        }
        _ => return Err(RouteError::UnknownEvent { kind }),
    };

    Ok(event)
}

fn kind_data<T: DeserializeOwned>(kind: &str, data: Value) -> Result<T, RouteError> {
    serde_json::from_value(data).map_err(|e| RouteError::malformed(format!("`{kind}` data: {e}")))
}
