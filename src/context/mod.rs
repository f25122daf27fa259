//! Context sharing between agents
//!
//! The broker owns sessions, share records and the custody store, and
//! enforces share/receive permissions. The aggregator sits on top: it
//! registers documents, builds aggregated context under a strategy,
//! keeps shared context synchronized, and resolves merge conflicts.

mod aggregator;
mod broker;
mod types;

pub use aggregator::{
    AggregatedContext, AggregationStrategy, ContextAggregator, OptimizationReport, SignalHandling,
    SyncReport,
};
pub use broker::{ContextBroker, AGGREGATOR_AGENT};
pub use types::{
    infer_context_type, AgentPermissions, ContextSession, ContextType, ContextUpdate, ShareRecord,
    UpdateKind,
};
