//! Event payload types
//!
//! All variants use camelCase JSON serialization so dashboards can consume
//! them directly.

use serde::{Deserialize, Serialize};

/// Coarse bridge health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStatus {
    /// Producer and consumer attached, backlog under control
    Healthy,
    /// Producer missing or backlog above the warning threshold
    Degraded,
    /// No consumer attached; deliveries cannot succeed
    Unhealthy,
}

impl std::fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Point-in-time bridge health report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub status: BridgeStatus,
    pub producer_connected: bool,
    pub consumer_connected: bool,
    pub pending_batches: usize,
    pub dead_letter_size: usize,
    pub timestamp: i64,
}

/// Notification event published by the core components
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeshEvent {
    /// A detection pass finished
    #[serde(rename_all = "camelCase")]
    DetectionComplete {
        source: String,
        signal_count: usize,
        duplicate_count: usize,
        processing_time_ms: u64,
    },

    /// A pattern was registered at runtime
    #[serde(rename_all = "camelCase")]
    PatternAdded { pattern_id: String },

    /// A user-defined pattern was removed
    #[serde(rename_all = "camelCase")]
    PatternRemoved { pattern_id: String },

    /// The bridge started accepting signals
    BridgeStarted,

    /// The bridge stopped; pending batches were flushed first
    BridgeStopped,

    /// A batch was delivered to the consumer
    #[serde(rename_all = "camelCase")]
    BatchCompleted {
        batch_id: String,
        signal_count: usize,
        latency_ms: u64,
    },

    /// A batch exhausted its retries
    #[serde(rename_all = "camelCase")]
    BatchFailed {
        batch_id: String,
        signal_count: usize,
        error: String,
    },

    /// Failed signals were appended to the dead-letter queue
    #[serde(rename_all = "camelCase")]
    DeadLetterQueued { batch_id: String, signal_count: usize },

    /// A signal producer attached to the bridge
    #[serde(rename_all = "camelCase")]
    ProducerConnected { tag: String },

    /// The signal producer detached
    ProducerDisconnected,

    /// A consumer attached to the bridge
    ConsumerConnected,

    /// The consumer detached
    ConsumerDisconnected,

    /// Periodic bridge health snapshot
    HealthCheck(HealthSnapshot),

    /// A context section was shared between agents
    #[serde(rename_all = "camelCase")]
    ContextShared {
        share_id: String,
        from_agent: String,
        to_agent: String,
        context_id: String,
    },

    /// A share was revoked by its original sharer
    #[serde(rename_all = "camelCase")]
    ContextRevoked { share_id: String, revoker: String },

    /// A context session was established
    #[serde(rename_all = "camelCase")]
    SessionEstablished {
        session_id: String,
        participants: Vec<String>,
    },

    /// A context update was broadcast into sessions
    #[serde(rename_all = "camelCase")]
    ContextUpdated {
        context_id: String,
        sessions_notified: usize,
    },
}
