//! Signal delivery bridge
//!
//! Sits between the detector and a downstream consumer. Filters signals by
//! type and priority, groups them into bounded batches, delivers with
//! retry, and parks terminally failed signals in a dead-letter queue for
//! explicit replay. Queues batches while no consumer is attached and
//! flushes them on connect, so detection never blocks on the consumer.

mod delivery;
mod types;

pub use delivery::SignalBridge;
pub use types::{BatchItemResult, BridgeMetrics, SignalBatch, SignalConsumer};
