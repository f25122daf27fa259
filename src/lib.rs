//! SignalMesh - Agent Coordination over Shared PRP Documents
//!
//! SignalMesh coordinates autonomous agents working on a shared body of
//! structured documents ("PRPs"). It detects inline status markers
//! ("signals") in document text, routes them reliably to a downstream
//! consumer, and brokers slices of shared context between agents under
//! session-scoped access control.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          SignalMesh                              │
//! │                                                                  │
//! │  ┌────────────────┐      ┌──────────────────────────────────┐   │
//! │  │ Pattern        │      │         Signal Detector           │   │
//! │  │ Registry       ├─────▶│  - regex scan + confidence score  │   │
//! │  │ (built-in +    │      │  - duplicate suppression          │   │
//! │  │  user-defined) │      │  - priority ranking / truncation  │   │
//! │  └────────────────┘      └────────────────┬─────────────────┘   │
//! │                                           │ DetectedSignal       │
//! │  ┌────────────────────────────────────────▼─────────────────┐   │
//! │  │                    Delivery Bridge                        │   │
//! │  │  - type/priority filtering, bounded batches               │   │
//! │  │  - retry with timeout, dead-letter queue                  │   │
//! │  │  - health checks and delivery metrics                     │   │
//! │  └────────────────────────────────────────┬─────────────────┘   │
//! │                                           │ process_batch        │
//! │                                           ▼                      │
//! │                                   SignalConsumer                 │
//! │                                                                  │
//! │  ┌────────────────┐      ┌──────────────────────────────────┐   │
//! │  │ PRP Section    │      │       Context Broker              │   │
//! │  │ Extractor      ├─────▶│  - sessions and share records     │   │
//! │  │ (parse, score, │      │  - permission checks, revocation  │   │
//! │  │  history)      │      │  - update broadcast               │   │
//! │  └────────────────┘      └────────────────┬─────────────────┘   │
//! │                                           │                      │
//! │  ┌────────────────────────────────────────▼─────────────────┐   │
//! │  │              Context Aggregator / Updater                 │   │
//! │  │  - strategy-based aggregation, merge, sync, optimize      │   │
//! │  └──────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Signals flow one direction (registry → detector → bridge → consumer);
//! context flows bidirectionally between the extractor/aggregator, the
//! broker, and the participating agents. All components are explicitly
//! constructed and injected; there is no global state.

pub mod bridge;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod prp;
pub mod signal;

pub use bridge::{BridgeMetrics, SignalBridge, SignalConsumer};
pub use config::SignalMeshConfig;
pub use context::{ContextAggregator, ContextBroker};
pub use error::{Error, Result};
pub use events::{EventBus, MeshEvent};
pub use prp::{PrpDocument, SectionExtractor};
pub use signal::{DetectedSignal, DetectionReport, PatternRegistry, SignalDetector};
