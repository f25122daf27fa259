//! End-to-end pipeline tests: detection through delivery, and extraction
//! through brokered aggregation.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use signalmesh::bridge::{BatchItemResult, SignalBridge, SignalConsumer};
use signalmesh::config::SignalMeshConfig;
use signalmesh::context::{
    AggregationStrategy, AgentPermissions, ContextAggregator, ContextBroker, ContextType,
};
use signalmesh::events::EventBus;
use signalmesh::prp::{PrpDocument, SectionExtractor, SectionType};
use signalmesh::signal::{DetectedSignal, PatternRegistry, SignalDetector};
use signalmesh::Result;

struct RecordingConsumer {
    received: RwLock<Vec<DetectedSignal>>,
}

#[async_trait]
impl SignalConsumer for RecordingConsumer {
    async fn process_batch(&self, signals: &[DetectedSignal]) -> Result<Vec<BatchItemResult>> {
        self.received.write().await.extend(signals.iter().cloned());
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

const PRP: &str = "\
# prp-auth

## Goal
Ship token-based authentication.

## Progress
[tp] Tests prepared
[dp] Development progress
[bf] Bug fixed
[tw] Tests written

## Signals
Watch tests_prepared and blocked markers.
";

#[tokio::test]
async fn detect_to_consumer_pipeline() {
    let config = SignalMeshConfig::default();
    let bus = Arc::new(EventBus::new());

    let registry = Arc::new(PatternRegistry::new(bus.clone()));
    let detector = SignalDetector::new(registry, config.detector, bus.clone());

    let mut bridge_config = config.bridge;
    bridge_config.retry_delay_ms = 1;
    let bridge = Arc::new(SignalBridge::new(bridge_config, bus));
    let consumer = Arc::new(RecordingConsumer {
        received: RwLock::new(Vec::new()),
    });
    bridge.start().await;
    bridge.connect_producer("detector").await;
    bridge.connect_consumer(consumer.clone()).await;

    let report = detector.detect(PRP, "prp-auth").await;
    assert_eq!(report.signals.len(), 4);

    let forwarded = bridge.submit(report.signals).await.unwrap();
    assert_eq!(forwarded, 4);

    let received = consumer.received.read().await;
    let mut types: Vec<&str> = received.iter().map(|s| s.signal_type.as_str()).collect();
    types.sort_unstable();
    assert_eq!(
        types,
        vec![
            "bug_fixed",
            "development_progress",
            "tests_prepared",
            "tests_written"
        ]
    );
    drop(received);

    let metrics = bridge.metrics().await;
    assert_eq!(metrics.signals_processed, 4);
    assert_eq!(metrics.signals_dropped, 0);
    bridge.stop().await;
}

#[tokio::test]
async fn extract_to_aggregate_pipeline() {
    let config = SignalMeshConfig::default();
    let bus = Arc::new(EventBus::new());
    let broker = Arc::new(ContextBroker::new(config.broker, bus));
    let aggregator = ContextAggregator::new(config.aggregator, broker.clone());

    aggregator
        .register_document(PrpDocument::new("prp-auth", PRP))
        .await;

    let agents = vec!["alpha".to_string(), "beta".to_string()];
    let aggregate = aggregator
        .aggregate_and_share(
            &["prp-auth".to_string()],
            &agents,
            AggregationStrategy::TokenOptimized,
        )
        .await
        .unwrap();
    assert!(aggregate.sections.iter().any(|s| s.name == "Goal"));

    // Both agents can resolve the shared context
    for agent in &agents {
        let resolved = broker
            .request_context(agent, ContextType::PrpContext)
            .await
            .unwrap();
        assert!(resolved.id.starts_with("prp-auth:"));
    }

    // A detected signal routes back through the registered documents
    let registry = Arc::new(PatternRegistry::new(Arc::new(EventBus::new())));
    let detector = SignalDetector::new(
        registry,
        SignalMeshConfig::default().detector,
        Arc::new(EventBus::new()),
    );
    let report = detector.detect("[tp] Tests prepared", "prp-auth").await;
    let handling = aggregator.handle_signal(&report.signals[0]).await;
    assert!(handling.processed);
    assert!(handling.context_used);
}

#[tokio::test]
async fn permissioned_sharing_round_trip() {
    let config = SignalMeshConfig::default();
    let broker = ContextBroker::new(config.broker, Arc::new(EventBus::new()));

    broker
        .register_permissions(AgentPermissions {
            agent_id: "alpha".to_string(),
            can_receive: ContextType::ALL.to_vec(),
            can_share: ContextType::ALL.to_vec(),
            trusted_agents: vec!["beta".to_string()],
            restrictions: Vec::new(),
        })
        .await;

    let document = PrpDocument::new("prp-auth", PRP);
    let section = SectionExtractor::new()
        .extract_section(&document, SectionType::Goal)
        .unwrap();

    // Trusted recipient succeeds, untrusted fails
    broker
        .share_context("alpha", "beta", section.clone())
        .await
        .unwrap();
    assert!(broker.share_context("alpha", "gamma", section).await.is_err());

    let resolved = broker
        .request_context("beta", ContextType::PrpContext)
        .await
        .unwrap();
    assert_eq!(resolved.id, "prp-auth:goal");
}
