//! Domain Events
//!
//! Typed events produced by routing one frame. Each session declares a
//! [`ProtocolVariant`] up front and only ever sees events of that variant.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Which event-kind set and ordering rules a session obeys
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolVariant {
    /// Single-shot news/event impact analysis
    SimpleAnalysis,
    /// Multi-phase research with progress events
    StagedResearch,
}

impl ProtocolVariant {
    /// Stable name used in logs and configuration
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SimpleAnalysis => "simple_analysis",
            Self::StagedResearch => "staged_research",
        }
    }
}

impl fmt::Display for ProtocolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Market impact verdict attached to a finished analysis
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    /// Positive for the market
    Positive,
    /// Negative for the market
    Negative,
    /// No clear direction
    #[default]
    Neutral,
}

impl Impact {
    /// Parse the backend's impact label
    ///
    /// Case-insensitive; anything unrecognised is neutral.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "positive" => Self::Positive,
            "negative" => Self::Negative,
            _ => Self::Neutral,
        }
    }

    /// Wire label
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Impact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events of the [`ProtocolVariant::SimpleAnalysis`] protocol
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisEvent {
    /// Incremental analysis text
    Chunk {
        /// Text fragment
        text: String,
    },
    /// Analysis finished
    Done {
        /// Impact verdict (neutral if the backend omitted it)
        impact: Impact,
        /// Final analysis text (empty if the backend omitted it)
        analysis_text: String,
    },
    /// Backend reported a failure
    Error {
        /// Backend message
        message: String,
    },
}

impl AnalysisEvent {
    /// Whether no event may follow this one
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// One source found during research
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Page title
    pub title: String,
    /// Page URL
    pub url: String,
    /// Short excerpt
    #[serde(default)]
    pub snippet: String,
    /// Search backend that produced the hit
    #[serde(default, alias = "source")]
    pub origin: String,
}

/// Events of the [`ProtocolVariant::StagedResearch`] protocol
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResearchEvent {
    /// Research accepted and started
    Started,
    /// Query decomposed into subtasks
    Thought {
        /// Subtask descriptions, in order
        thoughts: Vec<String>,
    },
    /// Free-form progress message
    Status {
        /// Message text
        message: String,
    },
    /// Research plan created
    PlanCreated,
    /// Search progress
    SourcesProgress {
        /// Sources found so far
        count: u32,
        /// Subtask being searched (1-based)
        current_subtask: u32,
        /// Number of subtasks
        total_subtasks: u32,
    },
    /// Search finished
    SourcesComplete {
        /// Hit count per domain
        sources: BTreeMap<String, u32>,
        /// Every source, in ranking order
        source_list: Vec<SourceEntry>,
    },
    /// One source fetched and read
    SourceRead {
        /// URL that was read
        url: String,
        /// Position of this source (1-based)
        current: u32,
        /// Number of sources to read
        total: u32,
    },
    /// Incremental report text
    ContentChunk {
        /// Text fragment
        text: String,
    },
    /// Research finished
    Completed,
    /// Backend reported a failure
    Error {
        /// Backend message
        message: String,
    },
}

impl ResearchEvent {
    /// Whether no event may follow this one
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error { .. })
    }

    /// Wire discriminator of this kind
    #[must_use]
    pub fn wire_kind(&self) -> &'static str {
        match self {
            Self::Started => "research_start",
            Self::Thought { .. } => "thought",
            Self::Status { .. } => "status",
            Self::PlanCreated => "plan_created",
            Self::SourcesProgress { .. } => "sources_update",
            Self::SourcesComplete { .. } => "sources_complete",
            Self::SourceRead { .. } => "source_read",
            Self::ContentChunk { .. } => "content_chunk",
            Self::Completed => "research_complete",
            Self::Error { .. } => "error",
        }
    }
}

/// A typed event routed from one frame
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    /// Event of a simple-analysis session
    Analysis(AnalysisEvent),
    /// Event of a staged-research session
    Research(ResearchEvent),
}

impl DomainEvent {
    /// Variant this event belongs to
    #[must_use]
    pub fn variant(&self) -> ProtocolVariant {
        match self {
            Self::Analysis(_) => ProtocolVariant::SimpleAnalysis,
            Self::Research(_) => ProtocolVariant::StagedResearch,
        }
    }

    /// Whether no event may follow this one
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Analysis(event) => event.is_terminal(),
            Self::Research(event) => event.is_terminal(),
        }
    }

    /// Backend error message, if this is an error event
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Analysis(AnalysisEvent::Error { message })
            | Self::Research(ResearchEvent::Error { message }) => Some(message),
            _ => None,
        }
    }
}

impl From<AnalysisEvent> for DomainEvent {
    fn from(event: AnalysisEvent) -> Self {
        Self::Analysis(event)
    }
}

impl From<ResearchEvent> for DomainEvent {
    fn from(event: ResearchEvent) -> Self {
        Self::Research(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impact_parse() {
        assert_eq!(Impact::parse("positive"), Impact::Positive);
        assert_eq!(Impact::parse(" NEGATIVE "), Impact::Negative);
        assert_eq!(Impact::parse("neutral"), Impact::Neutral);
        assert_eq!(Impact::parse("bullish"), Impact::Neutral);
        assert_eq!(Impact::parse(""), Impact::Neutral);
    }

    #[test]
    fn test_terminal_events() {
        assert!(DomainEvent::from(AnalysisEvent::Done {
            impact: Impact::Neutral,
            analysis_text: String::new(),
        })
        .is_terminal());
        assert!(!DomainEvent::from(AnalysisEvent::Chunk {
            text: "x".to_string()
        })
        .is_terminal());
        assert!(DomainEvent::from(ResearchEvent::Completed).is_terminal());
        assert!(!DomainEvent::from(ResearchEvent::PlanCreated).is_terminal());
    }

    #[test]
    fn test_error_message() {
        let event = DomainEvent::from(ResearchEvent::Error {
            message: "quota".to_string(),
        });
        assert_eq!(event.error_message(), Some("quota"));
        assert_eq!(event.variant(), ProtocolVariant::StagedResearch);
        assert_eq!(DomainEvent::from(ResearchEvent::Started).error_message(), None);
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = DomainEvent::from(ResearchEvent::SourceRead {
            url: "https://example.com".to_string(),
            current: 2,
            total: 5,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "source_read",
                "url": "https://example.com",
                "current": 2,
                "total": 5
            })
        );
    }
}
