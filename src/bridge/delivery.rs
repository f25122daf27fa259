//! Batched signal delivery with retry and dead-lettering
//!
//! Maintains per-batch state: queued while no consumer is attached, then
//! delivered under a bounded concurrency permit with per-attempt timeout.
//! Terminal failures land in the dead-letter queue, which can be replayed
//! explicitly through the same filter/batch path.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::events::{BridgeStatus, EventBus, HealthSnapshot, MeshEvent};
use crate::signal::DetectedSignal;

use super::types::{BridgeMetrics, SignalBatch, SignalConsumer};

/// Pending-batch count above which health checks emit a backlog warning.
const BACKLOG_WARNING_THRESHOLD: usize = 10;

#[derive(Default)]
struct MetricsState {
    signals_forwarded: u64,
    signals_processed: u64,
    signals_dropped: u64,
    error_count: u64,
    batches_processed: u64,
    average_latency_ms: f64,
}

/// Delivery bridge between the detector and a [`SignalConsumer`]
pub struct SignalBridge {
    config: BridgeConfig,
    bus: Arc<EventBus>,
    consumer: RwLock<Option<Arc<dyn SignalConsumer>>>,
    producer_tag: RwLock<Option<String>>,
    running: AtomicBool,
    started_at: RwLock<Option<Instant>>,
    /// Batches waiting for a consumer (or for `start`)
    queued: RwLock<Vec<SignalBatch>>,
    /// Batches currently being delivered
    in_flight: AtomicUsize,
    dead_letters: RwLock<Vec<DetectedSignal>>,
    metrics: RwLock<MetricsState>,
    permits: Arc<Semaphore>,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

impl SignalBridge {
    /// Create a stopped bridge.
    pub fn new(config: BridgeConfig, bus: Arc<EventBus>) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_batches.max(1)));
        Self {
            config,
            bus,
            consumer: RwLock::new(None),
            producer_tag: RwLock::new(None),
            running: AtomicBool::new(false),
            started_at: RwLock::new(None),
            queued: RwLock::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            dead_letters: RwLock::new(Vec::new()),
            metrics: RwLock::new(MetricsState::default()),
            permits,
            health_task: Mutex::new(None),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start the bridge: flush anything queued and begin health checks.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.started_at.write().await = Some(Instant::now());
        self.flush_queued().await;

        let bridge = Arc::clone(self);
        let interval_ms = self.config.health_check_interval_ms.max(1);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                bridge.health_check().await;
            }
        });
        *self.health_task.lock().await = Some(handle);

        self.bus.publish(MeshEvent::BridgeStarted);
        tracing::info!("Signal bridge started");
    }

    /// Stop the bridge. Queued batches are flushed through the normal
    /// delivery path first (dead-lettering on failure); batches that
    /// cannot flush because no consumer is attached are dead-lettered
    /// rather than stranded in a stopped bridge.
    pub async fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        self.flush_queued().await;
        let stranded: Vec<SignalBatch> = self.queued.write().await.drain(..).collect();
        for batch in stranded {
            self.fail_batch(batch, "no consumer attached at shutdown")
                .await;
        }
        self.running.store(false, Ordering::SeqCst);
        *self.started_at.write().await = None;

        if let Some(handle) = self.health_task.lock().await.take() {
            handle.abort();
        }

        self.bus.publish(MeshEvent::BridgeStopped);
        tracing::info!("Signal bridge stopped");
    }

    /// Whether the bridge is accepting and delivering.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Collaborator attachment
    // =========================================================================

    /// Record the producer side as attached.
    pub async fn connect_producer(&self, tag: &str) {
        *self.producer_tag.write().await = Some(tag.to_string());
        self.bus.publish(MeshEvent::ProducerConnected {
            tag: tag.to_string(),
        });
    }

    /// Record the producer side as detached.
    pub async fn disconnect_producer(&self) {
        *self.producer_tag.write().await = None;
        self.bus.publish(MeshEvent::ProducerDisconnected);
    }

    /// Attach the consumer. Queued batches flush immediately if running.
    pub async fn connect_consumer(&self, consumer: Arc<dyn SignalConsumer>) {
        *self.consumer.write().await = Some(consumer);
        self.bus.publish(MeshEvent::ConsumerConnected);
        if self.running.load(Ordering::SeqCst) {
            self.flush_queued().await;
        }
    }

    /// Detach the consumer. Subsequent submissions queue.
    pub async fn disconnect_consumer(&self) {
        *self.consumer.write().await = None;
        self.bus.publish(MeshEvent::ConsumerDisconnected);
    }

    // =========================================================================
    // Submission path
    // =========================================================================

    /// Submit detected signals. Returns the number that passed filtering
    /// and entered the batch path.
    pub async fn submit(&self, signals: Vec<DetectedSignal>) -> Result<usize> {
        let mut accepted = Vec::new();
        let mut dropped = 0u64;
        for signal in signals {
            if self.passes_filter(&signal) {
                accepted.push(signal);
            } else {
                dropped += 1;
            }
        }

        {
            let mut metrics = self.metrics.write().await;
            metrics.signals_dropped += dropped;
            metrics.signals_forwarded += accepted.len() as u64;
        }
        if dropped > 0 {
            tracing::debug!(dropped, "Signals dropped by bridge filter");
        }
        if accepted.is_empty() {
            return Ok(0);
        }

        let forwarded = accepted.len();
        let batch_size = self.config.batch_size.max(1);
        let mut batches = Vec::new();
        for chunk in accepted.chunks(batch_size) {
            let source = chunk[0].source.clone();
            batches.push(SignalBatch::new(chunk.to_vec(), &source));
        }
        self.queued.write().await.extend(batches);

        if self.running.load(Ordering::SeqCst) {
            self.flush_queued().await;
        }

        Ok(forwarded)
    }

    /// A signal passes only if its type is allowed, its priority clears the
    /// threshold, and it carries a non-empty identifier/type/source.
    fn passes_filter(&self, signal: &DetectedSignal) -> bool {
        let type_allowed = self.config.enabled_signal_types.is_empty()
            || self
                .config
                .enabled_signal_types
                .iter()
                .any(|t| t == &signal.signal_type);
        type_allowed
            && signal.priority.as_numeric() >= self.config.min_priority
            && !signal.pattern_id.is_empty()
            && !signal.signal_type.is_empty()
            && !signal.source.is_empty()
    }

    /// Replay the dead-letter queue through the normal filter/batch path.
    ///
    /// Each call re-attempts every parked signal exactly once; signals that
    /// fail again are pushed back onto the queue.
    pub async fn process_dead_letter_queue(&self) -> Result<usize> {
        let signals: Vec<DetectedSignal> = self.dead_letters.write().await.drain(..).collect();
        if signals.is_empty() {
            return Ok(0);
        }
        let count = signals.len();
        tracing::info!(count, "Replaying dead-letter queue");
        self.submit(signals).await?;
        Ok(count)
    }

    // =========================================================================
    // Delivery
    // =========================================================================

    /// Deliver everything queued, bounded by the concurrency permits.
    async fn flush_queued(&self) {
        if self.consumer.read().await.is_none() {
            // Nothing to deliver against; batches stay queued for connect
            return;
        }
        let batches: Vec<SignalBatch> = self.queued.write().await.drain(..).collect();
        if batches.is_empty() {
            return;
        }
        futures::future::join_all(batches.into_iter().map(|b| self.deliver_batch(b))).await;
    }

    async fn deliver_batch(&self, batch: SignalBatch) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let outcome = self.try_deliver(&batch).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Err(reason) = outcome {
            self.fail_batch(batch, &reason).await;
        }
    }

    /// One batch through permit acquisition and the retry loop.
    /// Err carries the terminal failure reason.
    async fn try_deliver(&self, batch: &SignalBatch) -> std::result::Result<(), String> {
        let batch_window = Duration::from_millis(self.config.batch_timeout_ms.max(1));
        let _permit = match tokio::time::timeout(batch_window, self.permits.acquire()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err("delivery permits closed".to_string()),
            Err(_) => return Err("timed out waiting for a delivery slot".to_string()),
        };

        let consumer = match self.consumer.read().await.clone() {
            Some(c) => c,
            None => return Err("no consumer attached".to_string()),
        };

        let call_timeout = Duration::from_millis(self.config.connection_timeout_ms.max(1));
        let started = Instant::now();
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            match tokio::time::timeout(call_timeout, consumer.process_batch(&batch.signals)).await
            {
                Ok(Ok(_results)) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    self.record_success(batch, latency_ms).await;
                    return Ok(());
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                }
                Err(_) => {
                    last_error = format!(
                        "consumer call timed out after {}ms",
                        self.config.connection_timeout_ms
                    );
                }
            }
            self.metrics.write().await.error_count += 1;
            tracing::warn!(
                batch_id = %batch.id,
                attempt,
                "Batch delivery attempt failed: {}",
                last_error
            );
            if attempt < self.config.max_retries {
                tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
            }
        }

        Err(last_error)
    }

    async fn record_success(&self, batch: &SignalBatch, latency_ms: u64) {
        let count = batch.signals.len() as u64;
        {
            let mut metrics = self.metrics.write().await;
            let prev = metrics.signals_processed;
            metrics.average_latency_ms = if prev + count == 0 {
                0.0
            } else {
                (metrics.average_latency_ms * prev as f64 + latency_ms as f64 * count as f64)
                    / (prev + count) as f64
            };
            metrics.signals_processed += count;
            metrics.batches_processed += 1;
        }
        self.bus.publish(MeshEvent::BatchCompleted {
            batch_id: batch.id.clone(),
            signal_count: batch.signals.len(),
            latency_ms,
        });
        tracing::debug!(batch_id = %batch.id, latency_ms, "Batch delivered");
    }

    async fn fail_batch(&self, batch: SignalBatch, reason: &str) {
        tracing::warn!(batch_id = %batch.id, "Batch failed terminally: {}", reason);
        self.bus.publish(MeshEvent::BatchFailed {
            batch_id: batch.id.clone(),
            signal_count: batch.signals.len(),
            error: reason.to_string(),
        });

        if self.config.dead_letter_enabled {
            let count = batch.signals.len();
            self.dead_letters.write().await.extend(batch.signals);
            self.bus.publish(MeshEvent::DeadLetterQueued {
                batch_id: batch.id,
                signal_count: count,
            });
        }
    }

    // =========================================================================
    // Observability
    // =========================================================================

    /// Run one health check, publishing a snapshot and warning on trouble.
    pub async fn health_check(&self) -> HealthSnapshot {
        let producer_connected = self.producer_tag.read().await.is_some();
        let consumer_connected = self.consumer.read().await.is_some();
        let pending_batches = self.pending_batches().await;
        let dead_letter_size = self.dead_letters.read().await.len();

        let status = if !consumer_connected {
            BridgeStatus::Unhealthy
        } else if !producer_connected || pending_batches > BACKLOG_WARNING_THRESHOLD {
            BridgeStatus::Degraded
        } else {
            BridgeStatus::Healthy
        };

        if !producer_connected {
            tracing::warn!("Bridge health: no producer attached");
        }
        if !consumer_connected {
            tracing::warn!("Bridge health: no consumer attached");
        }
        if pending_batches > BACKLOG_WARNING_THRESHOLD {
            tracing::warn!(pending_batches, "Bridge health: delivery backlog");
        }

        let snapshot = HealthSnapshot {
            status,
            producer_connected,
            consumer_connected,
            pending_batches,
            dead_letter_size,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        self.bus.publish(MeshEvent::HealthCheck(snapshot.clone()));
        snapshot
    }

    /// Queued plus in-flight batches.
    pub async fn pending_batches(&self) -> usize {
        self.queued.read().await.len() + self.in_flight.load(Ordering::SeqCst)
    }

    /// Signals currently parked in the dead-letter queue.
    pub async fn dead_letter_size(&self) -> usize {
        self.dead_letters.read().await.len()
    }

    /// Snapshot of bridge counters.
    pub async fn metrics(&self) -> BridgeMetrics {
        let metrics = self.metrics.read().await;
        let uptime_ms = self
            .started_at
            .read()
            .await
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or(0);
        BridgeMetrics {
            signals_forwarded: metrics.signals_forwarded,
            signals_processed: metrics.signals_processed,
            signals_dropped: metrics.signals_dropped,
            error_count: metrics.error_count,
            batches_processed: metrics.batches_processed,
            average_latency_ms: metrics.average_latency_ms,
            uptime_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::types::BatchItemResult;
    use crate::error::Error;
    use crate::signal::SignalPriority;
    use async_trait::async_trait;

    fn test_config() -> BridgeConfig {
        BridgeConfig {
            retry_delay_ms: 1,
            connection_timeout_ms: 200,
            batch_timeout_ms: 500,
            health_check_interval_ms: 10_000,
            ..Default::default()
        }
    }

    fn signal(signal_type: &str, priority: SignalPriority) -> DetectedSignal {
        DetectedSignal {
            pattern_id: signal_type.to_string(),
            signal_type: signal_type.to_string(),
            matched_text: "[xx]".to_string(),
            line: 1,
            column: 1,
            context: String::new(),
            confidence: 0.8,
            priority,
            source: "prp-test".to_string(),
        }
    }

    /// Records every batch it is handed.
    struct CountingConsumer {
        batches: RwLock<Vec<usize>>,
    }

    impl CountingConsumer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                batches: RwLock::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SignalConsumer for CountingConsumer {
        async fn process_batch(&self, signals: &[DetectedSignal]) -> Result<Vec<BatchItemResult>> {
            self.batches.write().await.push(signals.len());
            Ok(signals
                .iter()
                .map(|s| BatchItemResult {
                    signal_type: s.signal_type.clone(),
                    accepted: true,
                    detail: None,
                })
                .collect())
        }
    }

    /// Always errors.
    struct FailingConsumer;

    #[async_trait]
    impl SignalConsumer for FailingConsumer {
        async fn process_batch(&self, _: &[DetectedSignal]) -> Result<Vec<BatchItemResult>> {
            Err(Error::Delivery("consumer offline".to_string()))
        }
    }

    /// Fails the first `failures` calls, then succeeds.
    struct FlakyConsumer {
        failures: AtomicUsize,
    }

    #[async_trait]
    impl SignalConsumer for FlakyConsumer {
        async fn process_batch(&self, signals: &[DetectedSignal]) -> Result<Vec<BatchItemResult>> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::Delivery("transient".to_string()));
            }
            Ok(signals
                .iter()
                .map(|s| BatchItemResult {
                    signal_type: s.signal_type.clone(),
                    accepted: true,
                    detail: None,
                })
                .collect())
        }
    }

    /// Never completes within any reasonable timeout.
    struct StalledConsumer;

    #[async_trait]
    impl SignalConsumer for StalledConsumer {
        async fn process_batch(&self, _: &[DetectedSignal]) -> Result<Vec<BatchItemResult>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    async fn started_bridge(config: BridgeConfig) -> Arc<SignalBridge> {
        let bridge = Arc::new(SignalBridge::new(config, Arc::new(EventBus::new())));
        bridge.start().await;
        bridge
    }

    #[tokio::test]
    async fn test_successful_delivery() {
        let bridge = started_bridge(test_config()).await;
        let consumer = CountingConsumer::new();
        bridge.connect_consumer(consumer.clone()).await;

        let forwarded = bridge
            .submit(vec![
                signal("bug_fixed", SignalPriority::High),
                signal("blocked", SignalPriority::Critical),
            ])
            .await
            .unwrap();
        assert_eq!(forwarded, 2);

        let metrics = bridge.metrics().await;
        assert_eq!(metrics.signals_forwarded, 2);
        assert_eq!(metrics.signals_processed, 2);
        assert_eq!(metrics.batches_processed, 1);
        assert_eq!(metrics.signals_dropped, 0);
        assert_eq!(consumer.batches.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_batching_respects_batch_size() {
        let config = BridgeConfig {
            batch_size: 10,
            ..test_config()
        };
        let bridge = started_bridge(config).await;
        let consumer = CountingConsumer::new();
        bridge.connect_consumer(consumer.clone()).await;

        let signals: Vec<_> = (0..25)
            .map(|_| signal("development_progress", SignalPriority::Medium))
            .collect();
        bridge.submit(signals).await.unwrap();

        let mut sizes = consumer.batches.read().await.clone();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![5, 10, 10]);
    }

    #[tokio::test]
    async fn test_priority_filter() {
        let config = BridgeConfig {
            min_priority: 6,
            ..test_config()
        };
        let bridge = started_bridge(config).await;
        bridge.connect_consumer(CountingConsumer::new()).await;

        let forwarded = bridge
            .submit(vec![
                signal("low_noise", SignalPriority::Low),       // numeric 2
                signal("progress", SignalPriority::Medium),     // numeric 5
                signal("bug_fixed", SignalPriority::High),      // numeric 8
            ])
            .await
            .unwrap();
        assert_eq!(forwarded, 1);
        assert_eq!(bridge.metrics().await.signals_dropped, 2);
    }

    #[tokio::test]
    async fn test_type_allow_list() {
        let config = BridgeConfig {
            enabled_signal_types: vec!["blocked".to_string()],
            ..test_config()
        };
        let bridge = started_bridge(config).await;
        bridge.connect_consumer(CountingConsumer::new()).await;

        let forwarded = bridge
            .submit(vec![
                signal("blocked", SignalPriority::Critical),
                signal("bug_fixed", SignalPriority::High),
            ])
            .await
            .unwrap();
        assert_eq!(forwarded, 1);
    }

    #[tokio::test]
    async fn test_malformed_signal_dropped() {
        let bridge = started_bridge(test_config()).await;
        bridge.connect_consumer(CountingConsumer::new()).await;

        let mut bad = signal("bug_fixed", SignalPriority::High);
        bad.source = String::new();

        let forwarded = bridge.submit(vec![bad]).await.unwrap();
        assert_eq!(forwarded, 0);
        assert_eq!(bridge.metrics().await.signals_dropped, 1);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let config = BridgeConfig {
            max_retries: 3,
            ..test_config()
        };
        let bridge = started_bridge(config).await;
        bridge
            .connect_consumer(Arc::new(FlakyConsumer {
                failures: AtomicUsize::new(2),
            }))
            .await;

        bridge
            .submit(vec![signal("bug_fixed", SignalPriority::High)])
            .await
            .unwrap();

        let metrics = bridge.metrics().await;
        assert_eq!(metrics.signals_processed, 1);
        assert_eq!(metrics.error_count, 2);
        assert_eq!(bridge.dead_letter_size().await, 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_dead_letter() {
        let config = BridgeConfig {
            max_retries: 1,
            ..test_config()
        };
        let bus = Arc::new(EventBus::new());
        let bridge = Arc::new(SignalBridge::new(config, bus.clone()));
        bridge.start().await;
        bridge.connect_consumer(Arc::new(FailingConsumer)).await;
        let mut rx = bus.subscribe();

        bridge
            .submit(vec![
                signal("bug_fixed", SignalPriority::High),
                signal("blocked", SignalPriority::Critical),
            ])
            .await
            .unwrap();

        assert_eq!(bridge.dead_letter_size().await, 2);
        assert_eq!(bridge.pending_batches().await, 0);
        let metrics = bridge.metrics().await;
        assert_eq!(metrics.signals_processed, 0);
        assert_eq!(metrics.error_count, 2); // initial attempt + one retry

        let mut saw_failed = false;
        let mut saw_dead_letter = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                MeshEvent::BatchFailed { .. } => saw_failed = true,
                MeshEvent::DeadLetterQueued { signal_count, .. } => {
                    saw_dead_letter = true;
                    assert_eq!(signal_count, 2);
                }
                _ => {}
            }
        }
        assert!(saw_failed);
        assert!(saw_dead_letter);
    }

    #[tokio::test]
    async fn test_dead_letter_disabled_drops() {
        let config = BridgeConfig {
            max_retries: 0,
            dead_letter_enabled: false,
            ..test_config()
        };
        let bridge = started_bridge(config).await;
        bridge.connect_consumer(Arc::new(FailingConsumer)).await;

        bridge
            .submit(vec![signal("bug_fixed", SignalPriority::High)])
            .await
            .unwrap();
        assert_eq!(bridge.dead_letter_size().await, 0);
    }

    #[tokio::test]
    async fn test_dead_letter_replay_succeeds_after_recovery() {
        let config = BridgeConfig {
            max_retries: 0,
            ..test_config()
        };
        let bridge = started_bridge(config).await;
        bridge.connect_consumer(Arc::new(FailingConsumer)).await;
        bridge
            .submit(vec![signal("bug_fixed", SignalPriority::High)])
            .await
            .unwrap();
        assert_eq!(bridge.dead_letter_size().await, 1);

        // Consumer recovers
        let consumer = CountingConsumer::new();
        bridge.connect_consumer(consumer.clone()).await;
        let replayed = bridge.process_dead_letter_queue().await.unwrap();
        assert_eq!(replayed, 1);
        assert_eq!(bridge.dead_letter_size().await, 0);
        assert_eq!(bridge.metrics().await.signals_processed, 1);
    }

    #[tokio::test]
    async fn test_dead_letter_replay_requeues_on_failure() {
        let config = BridgeConfig {
            max_retries: 0,
            ..test_config()
        };
        let bridge = started_bridge(config).await;
        bridge.connect_consumer(Arc::new(FailingConsumer)).await;
        bridge
            .submit(vec![signal("bug_fixed", SignalPriority::High)])
            .await
            .unwrap();

        let replayed = bridge.process_dead_letter_queue().await.unwrap();
        assert_eq!(replayed, 1);
        // Failed again: pushed back, not lost, not retried further
        assert_eq!(bridge.dead_letter_size().await, 1);
    }

    #[tokio::test]
    async fn test_queue_without_consumer_flush_on_connect() {
        let bridge = started_bridge(test_config()).await;

        bridge
            .submit(vec![signal("blocked", SignalPriority::Critical)])
            .await
            .unwrap();
        assert_eq!(bridge.pending_batches().await, 1);
        assert_eq!(bridge.metrics().await.signals_processed, 0);

        let consumer = CountingConsumer::new();
        bridge.connect_consumer(consumer.clone()).await;

        assert_eq!(bridge.pending_batches().await, 0);
        assert_eq!(bridge.metrics().await.signals_processed, 1);
    }

    #[tokio::test]
    async fn test_consumer_timeout_dead_letters() {
        let config = BridgeConfig {
            max_retries: 0,
            connection_timeout_ms: 20,
            ..test_config()
        };
        let bridge = started_bridge(config).await;
        bridge.connect_consumer(Arc::new(StalledConsumer)).await;

        bridge
            .submit(vec![signal("bug_fixed", SignalPriority::High)])
            .await
            .unwrap();
        assert_eq!(bridge.dead_letter_size().await, 1);
        assert_eq!(bridge.metrics().await.error_count, 1);
    }

    #[tokio::test]
    async fn test_stop_flushes_queued_batches() {
        let bridge = started_bridge(test_config()).await;
        bridge.disconnect_consumer().await;
        bridge
            .submit(vec![signal("bug_fixed", SignalPriority::High)])
            .await
            .unwrap();
        assert_eq!(bridge.pending_batches().await, 1);

        // Consumer comes back before shutdown, so the stop-flush delivers
        let consumer = CountingConsumer::new();
        bridge.connect_consumer(consumer.clone()).await;
        bridge.stop().await;

        assert_eq!(bridge.pending_batches().await, 0);
        assert!(!bridge.is_running());
        assert_eq!(bridge.metrics().await.signals_processed, 1);
    }

    #[tokio::test]
    async fn test_stop_dead_letters_queued_without_consumer() {
        let bridge = started_bridge(test_config()).await;
        bridge
            .submit(vec![signal("bug_fixed", SignalPriority::High)])
            .await
            .unwrap();
        assert_eq!(bridge.pending_batches().await, 1);

        bridge.stop().await;

        assert!(!bridge.is_running());
        assert_eq!(bridge.pending_batches().await, 0);
        assert_eq!(bridge.dead_letter_size().await, 1);
    }

    #[tokio::test]
    async fn test_health_status_transitions() {
        let bridge = started_bridge(test_config()).await;

        let snapshot = bridge.health_check().await;
        assert_eq!(snapshot.status, BridgeStatus::Unhealthy);

        bridge.connect_consumer(CountingConsumer::new()).await;
        let snapshot = bridge.health_check().await;
        assert_eq!(snapshot.status, BridgeStatus::Degraded);
        assert!(!snapshot.producer_connected);

        bridge.connect_producer("detector").await;
        let snapshot = bridge.health_check().await;
        assert_eq!(snapshot.status, BridgeStatus::Healthy);

        bridge.disconnect_producer().await;
        let snapshot = bridge.health_check().await;
        assert_eq!(snapshot.status, BridgeStatus::Degraded);
    }

    #[tokio::test]
    async fn test_metrics_uptime_and_latency() {
        let bridge = started_bridge(test_config()).await;
        bridge.connect_consumer(CountingConsumer::new()).await;
        bridge
            .submit(vec![signal("bug_fixed", SignalPriority::High)])
            .await
            .unwrap();

        let metrics = bridge.metrics().await;
        assert!(metrics.average_latency_ms >= 0.0);

        bridge.stop().await;
        assert_eq!(bridge.metrics().await.uptime_ms, 0);
    }

    #[tokio::test]
    async fn test_submit_before_start_queues() {
        let bridge = Arc::new(SignalBridge::new(test_config(), Arc::new(EventBus::new())));
        let consumer = CountingConsumer::new();
        bridge.connect_consumer(consumer.clone()).await;

        bridge
            .submit(vec![signal("bug_fixed", SignalPriority::High)])
            .await
            .unwrap();
        assert_eq!(bridge.pending_batches().await, 1);

        bridge.start().await;
        assert_eq!(bridge.pending_batches().await, 0);
        assert_eq!(consumer.batches.read().await.len(), 1);
    }
}
