//! Bridge types and the consumer capability trait

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::signal::{DetectedSignal, SignalPriority};

/// A bounded batch of signals in flight toward the consumer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalBatch {
    /// Generated batch identifier
    pub id: String,
    /// Signals in submission order
    pub signals: Vec<DetectedSignal>,
    /// Creation timestamp (ms since epoch)
    pub created_at: i64,
    /// Source tag shared by the contained signals
    pub source: String,
    /// Max priority among contained signals
    pub priority: SignalPriority,
}

impl SignalBatch {
    /// Build a batch from a non-empty slice of signals.
    pub fn new(signals: Vec<DetectedSignal>, source: &str) -> Self {
        let priority = signals
            .iter()
            .map(|s| s.priority)
            .max()
            .unwrap_or(SignalPriority::Low);
        Self {
            id: Uuid::new_v4().to_string(),
            signals,
            created_at: chrono::Utc::now().timestamp_millis(),
            source: source.to_string(),
            priority,
        }
    }
}

/// Per-signal outcome reported by the consumer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    /// The signal type the result refers to
    pub signal_type: String,
    /// Whether the consumer accepted the signal
    pub accepted: bool,
    /// Optional consumer-supplied detail
    pub detail: Option<String>,
}

/// The single capability the bridge requires of its downstream.
///
/// Any failure (error or timeout) of `process_batch` is treated as a batch
/// failure and handled by the bridge's retry/dead-letter logic.
#[async_trait]
pub trait SignalConsumer: Send + Sync {
    async fn process_batch(&self, signals: &[DetectedSignal]) -> Result<Vec<BatchItemResult>>;
}

/// Snapshot of bridge counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeMetrics {
    /// Signals that passed filtering and entered the batch path
    pub signals_forwarded: u64,
    /// Signals successfully processed by the consumer
    pub signals_processed: u64,
    /// Signals dropped by type/priority/shape filtering
    pub signals_dropped: u64,
    /// Failed delivery attempts
    pub error_count: u64,
    /// Batches delivered successfully
    pub batches_processed: u64,
    /// Rolling average delivery latency, weighted by signal count
    pub average_latency_ms: f64,
    /// Milliseconds since the bridge started (0 when stopped)
    pub uptime_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(signal_type: &str, priority: SignalPriority) -> DetectedSignal {
        DetectedSignal {
            pattern_id: signal_type.to_string(),
            signal_type: signal_type.to_string(),
            matched_text: format!("[{}]", &signal_type[..2.min(signal_type.len())]),
            line: 1,
            column: 1,
            context: String::new(),
            confidence: 0.8,
            priority,
            source: "prp-test".to_string(),
        }
    }

    #[test]
    fn test_batch_priority_is_max() {
        let batch = SignalBatch::new(
            vec![
                signal("development_progress", SignalPriority::Medium),
                signal("blocked", SignalPriority::Critical),
                signal("bug_fixed", SignalPriority::High),
            ],
            "prp-test",
        );
        assert_eq!(batch.priority, SignalPriority::Critical);
        assert_eq!(batch.signals.len(), 3);
        assert!(!batch.id.is_empty());
    }

    #[test]
    fn test_empty_batch_defaults_low() {
        let batch = SignalBatch::new(Vec::new(), "prp-test");
        assert_eq!(batch.priority, SignalPriority::Low);
    }

    #[test]
    fn test_batch_serialization() {
        let batch = SignalBatch::new(vec![signal("blocked", SignalPriority::Critical)], "prp-x");
        let json = serde_json::to_string(&batch).unwrap();
        assert!(json.contains("\"createdAt\""));
        assert!(json.contains("\"priority\":\"critical\""));
    }
}
