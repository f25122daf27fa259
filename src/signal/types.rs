//! Signal detection types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Discrete signal priority, derived from a pattern's numeric priority
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SignalPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl SignalPriority {
    /// Derive the discrete level from a 0-10 numeric priority.
    pub fn from_numeric(priority: u8) -> Self {
        match priority {
            p if p >= 9 => Self::Critical,
            p if p >= 7 => Self::High,
            p if p >= 4 => Self::Medium,
            _ => Self::Low,
        }
    }

    /// Representative numeric value on the 1-10 scale, used by the bridge's
    /// minimum-priority filter.
    pub fn as_numeric(&self) -> u8 {
        match self {
            Self::Low => 2,
            Self::Medium => 5,
            Self::High => 8,
            Self::Critical => 10,
        }
    }
}

impl std::fmt::Display for SignalPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A registered lexical pattern
///
/// Immutable once registered except for `enabled` toggling. Removal is only
/// permitted for user-defined patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalPattern {
    /// Stable identifier, doubles as the detected signal type
    pub id: String,
    /// Display name
    pub name: String,
    /// Regex source matched against document text
    pub pattern: String,
    /// Category tag
    pub category: String,
    /// Numeric priority on a 0-10 scale
    pub priority: u8,
    /// Free-text description
    pub description: String,
    /// Disabled patterns are skipped by the detector
    pub enabled: bool,
    /// Whether the pattern was added at runtime by a user
    pub user_defined: bool,
}

/// A single detected signal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedSignal {
    /// Identifier of the pattern that matched
    pub pattern_id: String,
    /// Resolved signal type name
    pub signal_type: String,
    /// The literal matched text
    pub matched_text: String,
    /// 1-based line number of the match
    pub line: usize,
    /// 1-based column number of the match
    pub column: usize,
    /// Human-readable context: source tag, nearby text, confidence annotation
    pub context: String,
    /// Match confidence in [0, 1]
    pub confidence: f64,
    /// Discrete priority level
    pub priority: SignalPriority,
    /// Source tag of the document the signal came from
    pub source: String,
}

/// Result of one detection pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionReport {
    /// Surviving signals, sorted by priority descending then line ascending
    pub signals: Vec<DetectedSignal>,
    /// Signals dropped by duplicate suppression during this pass
    pub duplicate_count: usize,
    /// Per-pattern hit counts for this pass
    pub per_pattern_stats: HashMap<String, u64>,
    /// Wall-clock processing time in milliseconds
    pub processing_time_ms: u64,
    /// Lines in the scanned content
    pub line_count: usize,
    /// Signals per line (0 for empty content)
    pub signal_density: f64,
    /// Mean confidence across surviving signals (0 when none)
    pub average_confidence: f64,
}

impl DetectionReport {
    /// The zeroed report returned when a pass fails internally.
    pub fn empty() -> Self {
        Self {
            signals: Vec::new(),
            duplicate_count: 0,
            per_pattern_stats: HashMap::new(),
            processing_time_ms: 0,
            line_count: 0,
            signal_density: 0.0,
            average_confidence: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_thresholds() {
        assert_eq!(SignalPriority::from_numeric(10), SignalPriority::Critical);
        assert_eq!(SignalPriority::from_numeric(9), SignalPriority::Critical);
        assert_eq!(SignalPriority::from_numeric(8), SignalPriority::High);
        assert_eq!(SignalPriority::from_numeric(7), SignalPriority::High);
        assert_eq!(SignalPriority::from_numeric(6), SignalPriority::Medium);
        assert_eq!(SignalPriority::from_numeric(4), SignalPriority::Medium);
        assert_eq!(SignalPriority::from_numeric(3), SignalPriority::Low);
        assert_eq!(SignalPriority::from_numeric(0), SignalPriority::Low);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(SignalPriority::Critical > SignalPriority::High);
        assert!(SignalPriority::High > SignalPriority::Medium);
        assert!(SignalPriority::Medium > SignalPriority::Low);
    }

    #[test]
    fn test_priority_numeric_is_monotone() {
        assert!(SignalPriority::Critical.as_numeric() > SignalPriority::High.as_numeric());
        assert!(SignalPriority::High.as_numeric() > SignalPriority::Medium.as_numeric());
        assert!(SignalPriority::Medium.as_numeric() > SignalPriority::Low.as_numeric());
    }

    #[test]
    fn test_detected_signal_serialization() {
        let signal = DetectedSignal {
            pattern_id: "blocked".to_string(),
            signal_type: "blocked".to_string(),
            matched_text: "[bl]".to_string(),
            line: 3,
            column: 1,
            context: "[prp-auth] ...waiting on schema... (82% confidence)".to_string(),
            confidence: 0.82,
            priority: SignalPriority::Critical,
            source: "prp-auth".to_string(),
        };
        let json = serde_json::to_string(&signal).unwrap();
        assert!(json.contains("\"signalType\":\"blocked\""));
        assert!(json.contains("\"priority\":\"critical\""));
        assert!(json.contains("\"line\":3"));
    }

    #[test]
    fn test_empty_report_is_zeroed() {
        let report = DetectionReport::empty();
        assert!(report.signals.is_empty());
        assert_eq!(report.duplicate_count, 0);
        assert_eq!(report.line_count, 0);
        assert_eq!(report.average_confidence, 0.0);
    }
}
