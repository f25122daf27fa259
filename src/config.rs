//! SignalMesh configuration management
//!
//! All components take their tuning knobs from here. Every field has a
//! documented default so an empty TOML file (or no file at all) yields a
//! fully working configuration. The built-in signal pattern table also
//! lives here, next to the knobs that govern it.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Main SignalMesh configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalMeshConfig {
    /// Signal detector configuration
    #[serde(default)]
    pub detector: DetectorConfig,

    /// Delivery bridge configuration
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// Context broker configuration
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Context aggregator configuration
    #[serde(default)]
    pub aggregator: AggregatorConfig,
}

impl SignalMeshConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }
}

/// Signal detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Duplicate suppression window in milliseconds
    pub duplicate_window_ms: i64,

    /// Maximum signals returned per document
    pub max_signals_per_document: usize,

    /// Minimum confidence for a match to survive
    pub min_confidence: f64,

    /// Interval between duplicate-cache sweeps in milliseconds
    pub sweep_interval_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            duplicate_window_ms: 300_000,
            max_signals_per_document: 50,
            min_confidence: 0.3,
            sweep_interval_ms: 60_000,
        }
    }
}

/// Delivery bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Signal types the bridge forwards (empty = all types allowed)
    pub enabled_signal_types: Vec<String>,

    /// Minimum numeric priority (1-10 scale) a signal must carry
    pub min_priority: u8,

    /// Maximum signals per batch
    pub batch_size: usize,

    /// Maximum wait for a delivery slot in milliseconds
    pub batch_timeout_ms: u64,

    /// Maximum batches in flight at once
    pub max_concurrent_batches: usize,

    /// Delivery attempts after the first failure
    pub max_retries: u32,

    /// Delay between delivery attempts in milliseconds
    pub retry_delay_ms: u64,

    /// Whether terminally failed signals go to the dead-letter queue
    pub dead_letter_enabled: bool,

    /// Interval between health checks in milliseconds
    pub health_check_interval_ms: u64,

    /// Timeout for a single consumer call in milliseconds
    pub connection_timeout_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled_signal_types: Vec::new(),
            min_priority: 1,
            batch_size: 10,
            batch_timeout_ms: 1000,
            max_concurrent_batches: 5,
            max_retries: 3,
            retry_delay_ms: 1000,
            dead_letter_enabled: true,
            health_check_interval_ms: 30_000,
            connection_timeout_ms: 5_000,
        }
    }
}

/// Context broker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Sessions idle longer than this are reaped by `cleanup()`
    pub session_idle_timeout_ms: i64,

    /// Interval between periodic cleanup passes in milliseconds
    pub cleanup_interval_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            session_idle_timeout_ms: 24 * 60 * 60 * 1000,
            cleanup_interval_ms: 60 * 60 * 1000,
        }
    }
}

/// Context aggregator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Token budget for the token-optimized aggregation strategy
    pub token_budget: usize,

    /// Shares unused longer than this are revoked by the optimizer
    pub unused_share_timeout_ms: i64,

    /// Sessions idle longer than this are reaped by the optimizer
    pub session_reap_timeout_ms: i64,

    /// Retry budget for pending context updates
    pub max_update_retries: u32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            token_budget: 4000,
            unused_share_timeout_ms: 24 * 60 * 60 * 1000,
            session_reap_timeout_ms: 48 * 60 * 60 * 1000,
            max_update_retries: 3,
        }
    }
}

/// Definition of a signal pattern, as configured or built in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternDefinition {
    /// Stable pattern identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Regex matched against document text
    pub pattern: String,
    /// Category tag (testing, progress, escalation, ...)
    pub category: String,
    /// Numeric priority on a 0-10 scale
    pub priority: u8,
    /// Free-text description
    pub description: String,
}

/// Built-in signal patterns recognized out of the box.
///
/// Signals are short bracketed markers embedded in PRP text, e.g. `[tp]`.
pub fn default_signal_patterns() -> Vec<PatternDefinition> {
    vec![
        PatternDefinition {
            id: "tests_prepared".to_string(),
            name: "Tests Prepared".to_string(),
            pattern: r"\[tp\]".to_string(),
            category: "testing".to_string(),
            priority: 7,
            description: "Test scaffolding is in place".to_string(),
        },
        PatternDefinition {
            id: "tests_written".to_string(),
            name: "Tests Written".to_string(),
            pattern: r"\[tw\]".to_string(),
            category: "testing".to_string(),
            priority: 7,
            description: "Tests have been written".to_string(),
        },
        PatternDefinition {
            id: "bug_fixed".to_string(),
            name: "Bug Fixed".to_string(),
            pattern: r"\[bf\]".to_string(),
            category: "progress".to_string(),
            priority: 8,
            description: "A defect was fixed".to_string(),
        },
        PatternDefinition {
            id: "development_progress".to_string(),
            name: "Development Progress".to_string(),
            pattern: r"\[dp\]".to_string(),
            category: "progress".to_string(),
            priority: 6,
            description: "Incremental implementation progress".to_string(),
        },
        PatternDefinition {
            id: "development_done".to_string(),
            name: "Development Done".to_string(),
            pattern: r"\[dd\]".to_string(),
            category: "progress".to_string(),
            priority: 8,
            description: "Implementation is complete".to_string(),
        },
        PatternDefinition {
            id: "task_complete".to_string(),
            name: "Task Complete".to_string(),
            pattern: r"\[tc\]".to_string(),
            category: "lifecycle".to_string(),
            priority: 8,
            description: "The tracked task is finished".to_string(),
        },
        PatternDefinition {
            id: "blocked".to_string(),
            name: "Blocked".to_string(),
            pattern: r"\[bl\]".to_string(),
            category: "escalation".to_string(),
            priority: 9,
            description: "Work cannot proceed without intervention".to_string(),
        },
        PatternDefinition {
            id: "help_needed".to_string(),
            name: "Help Needed".to_string(),
            pattern: r"\[hn\]".to_string(),
            category: "escalation".to_string(),
            priority: 9,
            description: "An agent is requesting assistance".to_string(),
        },
        PatternDefinition {
            id: "review_requested".to_string(),
            name: "Review Requested".to_string(),
            pattern: r"\[rr\]".to_string(),
            category: "collaboration".to_string(),
            priority: 6,
            description: "Work is ready for review".to_string(),
        },
        PatternDefinition {
            id: "decision_needed".to_string(),
            name: "Decision Needed".to_string(),
            pattern: r"\[dn\]".to_string(),
            category: "escalation".to_string(),
            priority: 8,
            description: "A design or scope decision is required".to_string(),
        },
    ]
}
