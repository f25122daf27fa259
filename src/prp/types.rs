//! PRP document model and per-section-type metadata tables

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The named sections a PRP document may contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    Goal,
    Progress,
    Plan,
    DefinitionOfReady,
    DefinitionOfDone,
    Signals,
    Research,
    Implementation,
}

impl SectionType {
    /// Every section type, in canonical document order.
    pub const ALL: [SectionType; 8] = [
        SectionType::Goal,
        SectionType::Progress,
        SectionType::Plan,
        SectionType::DefinitionOfReady,
        SectionType::DefinitionOfDone,
        SectionType::Signals,
        SectionType::Research,
        SectionType::Implementation,
    ];

    /// Stable lowercase key, used in identifiers and tags.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Goal => "goal",
            Self::Progress => "progress",
            Self::Plan => "plan",
            Self::DefinitionOfReady => "dor",
            Self::DefinitionOfDone => "dod",
            Self::Signals => "signals",
            Self::Research => "research",
            Self::Implementation => "implementation",
        }
    }

    /// Display name used for section titles.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Goal => "Goal",
            Self::Progress => "Progress",
            Self::Plan => "Plan",
            Self::DefinitionOfReady => "Definition of Ready",
            Self::DefinitionOfDone => "Definition of Done",
            Self::Signals => "Signals",
            Self::Research => "Research",
            Self::Implementation => "Implementation",
        }
    }

    /// Heading spellings recognized for this section, lowercase.
    pub(crate) fn heading_aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Goal => &["goal"],
            Self::Progress => &["progress"],
            Self::Plan => &["plan"],
            Self::DefinitionOfReady => &["dor", "definition of ready"],
            Self::DefinitionOfDone => &["dod", "definition of done"],
            Self::Signals => &["signals"],
            Self::Research => &["research"],
            Self::Implementation => &["implementation"],
        }
    }

    /// Base relevance score when ranking this section against a signal.
    pub fn base_relevance(&self) -> f64 {
        match self {
            Self::Goal => 8.0,
            Self::Progress => 7.0,
            Self::Plan => 6.0,
            Self::DefinitionOfReady => 5.0,
            Self::DefinitionOfDone => 5.0,
            Self::Signals => 9.0,
            Self::Research => 4.0,
            Self::Implementation => 6.0,
        }
    }

    /// Fixed sharing priority on the 0-10 scale.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Goal => 10,
            Self::Signals => 9,
            Self::Progress => 7,
            Self::Plan => 6,
            Self::Implementation => 6,
            Self::DefinitionOfReady => 5,
            Self::DefinitionOfDone => 5,
            Self::Research => 4,
        }
    }

    /// Only the Goal section is required.
    pub fn required(&self) -> bool {
        matches!(self, Self::Goal)
    }

    /// Every section except Goal may be compressed during aggregation.
    pub fn compressible(&self) -> bool {
        !matches!(self, Self::Goal)
    }

    /// Permissions an agent must hold to receive this section.
    pub fn required_permissions(&self) -> Vec<String> {
        vec![format!("prp:{}:read", self.key())]
    }

    /// Sections this one logically depends on.
    pub fn dependencies(&self) -> &'static [SectionType] {
        match self {
            Self::Plan => &[SectionType::Goal, SectionType::DefinitionOfReady],
            Self::DefinitionOfDone => &[SectionType::Goal, SectionType::Plan],
            Self::Implementation => &[SectionType::Plan],
            Self::Progress => &[SectionType::Plan],
            _ => &[],
        }
    }
}

impl std::fmt::Display for SectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for SectionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.key() == key)
            .ok_or_else(|| Error::Validation(format!("unknown section type: {s}")))
    }
}

/// A tracked document: name, raw text, last-modified timestamp (ms)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrpDocument {
    pub name: String,
    pub content: String,
    pub last_modified: i64,
}

impl PrpDocument {
    pub fn new(name: &str, content: &str) -> Self {
        Self {
            name: name.to_string(),
            content: content.to_string(),
            last_modified: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// A shareable, versioned unit of extracted or aggregated document content
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSection {
    /// Context identifier, stable per (document, section type)
    pub id: String,
    /// Section display name
    pub name: String,
    /// Section body text
    pub content: String,
    /// Estimated tokens: ceil(characters / 4)
    pub token_count: usize,
    /// Sharing priority on the 0-10 scale
    pub priority: u8,
    /// Required sections survive every aggregation strategy
    pub required: bool,
    /// Whether aggregation may compress this section
    pub compressible: bool,
    /// Last content change (ms since epoch)
    pub last_updated: i64,
    /// Originating document name
    pub source: String,
    /// Monotonic version, bumped by merges
    pub version: u64,
    /// Free-form tags, used by context-type inference
    pub tags: Vec<String>,
    /// Permissions an agent must hold to receive this section
    pub required_permissions: Vec<String>,
    /// Keys of sections this one depends on
    pub dependencies: Vec<String>,
    /// Populated only when scored against a specific signal
    pub relevance_score: Option<f64>,
    /// Last access (ms since epoch)
    pub last_accessed: i64,
    /// Times this section has been resolved or touched
    pub access_count: u64,
}

impl ContextSection {
    /// Bump the access counter and timestamp.
    pub fn record_access(&mut self) {
        self.access_count += 1;
        self.last_accessed = chrono::Utc::now().timestamp_millis();
    }
}

/// One parsed line of the Progress section's signal log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalHistoryEntry {
    /// Bracketed signal type, e.g. `tests_prepared`
    pub signal_type: String,
    /// Parsed event timestamp (ms since epoch)
    pub timestamp: i64,
    /// Free-text context following the timestamp
    pub context: String,
    /// Reporting agent, when the line carries one
    pub agent: Option<String>,
}
