//! Context aggregation, synchronization and merging
//!
//! The aggregator is the facade external callers use: it holds the
//! registered documents, builds aggregated context under a strategy,
//! shares the result through the broker under the reserved aggregator
//! identity, keeps synchronized copies converged on the highest version,
//! and merges sections into combined units.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::AggregatorConfig;
use crate::error::{Error, Result};
use crate::prp::{ContextSection, PrpDocument, SectionExtractor, SectionType};
use crate::signal::DetectedSignal;

use super::broker::{ContextBroker, AGGREGATOR_AGENT};
use super::types::{ContextUpdate, ShareRecord, UpdateKind};

/// How sections are selected into an aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    /// Pack highest-priority, least-compressible-first sections until the
    /// token budget is exhausted; required sections are always packed
    TokenOptimized,
    /// Every section of every named document
    Complete,
}

/// An aggregate built from one or more documents and shared into a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedContext {
    pub id: String,
    pub prp_ids: Vec<String>,
    pub session_id: String,
    pub strategy: AggregationStrategy,
    pub sections: Vec<ContextSection>,
    pub total_tokens: usize,
    pub created_at: i64,
}

/// Result of a synchronization pass; partial failure never throws
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub synchronized: usize,
    pub conflicts: Vec<String>,
    pub errors: Vec<String>,
}

/// Outcome of routing one signal through registered documents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalHandling {
    pub processed: bool,
    pub context_used: bool,
    pub actions: Vec<String>,
}

/// What the optimizer did in one pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationReport {
    pub revoked_shares: usize,
    pub rejected_updates: usize,
    pub reaped_sessions: usize,
    /// Coarse overall improvement count
    pub improvement: usize,
}

pub struct ContextAggregator {
    config: AggregatorConfig,
    broker: Arc<ContextBroker>,
    extractor: SectionExtractor,
    documents: RwLock<HashMap<String, PrpDocument>>,
    aggregates: RwLock<HashMap<String, AggregatedContext>>,
    /// context id -> agents subscribed to its updates
    subscriptions: RwLock<HashMap<String, Vec<String>>>,
    /// context ids under real-time sync
    sync_enabled: RwLock<HashSet<String>>,
    /// updates waiting for sync to be enabled on their context
    pending_updates: RwLock<Vec<ContextUpdate>>,
}

impl ContextAggregator {
    pub fn new(config: AggregatorConfig, broker: Arc<ContextBroker>) -> Self {
        Self {
            config,
            broker,
            extractor: SectionExtractor::new(),
            documents: RwLock::new(HashMap::new()),
            aggregates: RwLock::new(HashMap::new()),
            subscriptions: RwLock::new(HashMap::new()),
            sync_enabled: RwLock::new(HashSet::new()),
            pending_updates: RwLock::new(Vec::new()),
        }
    }

    /// Register (or replace) a document under its name.
    pub async fn register_document(&self, document: PrpDocument) {
        self.documents
            .write()
            .await
            .insert(document.name.clone(), document);
    }

    pub async fn document(&self, name: &str) -> Option<PrpDocument> {
        self.documents.read().await.get(name).cloned()
    }

    // =========================================================================
    // Aggregation
    // =========================================================================

    /// Build one aggregate from the named documents, open a session for
    /// the agents, share every packed section with every agent, and
    /// subscribe the agents to updates on those sections.
    pub async fn aggregate_and_share(
        &self,
        prp_ids: &[String],
        agents: &[String],
        strategy: AggregationStrategy,
    ) -> Result<AggregatedContext> {
        let mut sections = Vec::new();
        {
            let documents = self.documents.read().await;
            for prp_id in prp_ids {
                let document = documents.get(prp_id).ok_or_else(|| {
                    Error::NotFound(format!("document '{prp_id}' is not registered"))
                })?;
                sections.extend(self.extractor.parse_structure(document).sections);
            }
        }

        let packed = match strategy {
            AggregationStrategy::TokenOptimized => {
                pack_token_optimized(sections, self.config.token_budget)
            }
            AggregationStrategy::Complete => sections,
        };

        let session = self.broker.establish_session(agents).await?;
        for section in &packed {
            for agent in agents {
                self.broker
                    .share_context(AGGREGATOR_AGENT, agent, section.clone())
                    .await?;
            }
        }

        {
            let mut subscriptions = self.subscriptions.write().await;
            for section in &packed {
                let subscribers = subscriptions.entry(section.id.clone()).or_default();
                for agent in agents {
                    if !subscribers.contains(agent) {
                        subscribers.push(agent.clone());
                    }
                }
            }
        }

        let aggregate = AggregatedContext {
            id: Uuid::new_v4().to_string(),
            prp_ids: prp_ids.to_vec(),
            session_id: session.id,
            strategy,
            total_tokens: packed.iter().map(|s| s.token_count).sum(),
            sections: packed,
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        self.aggregates
            .write()
            .await
            .insert(aggregate.id.clone(), aggregate.clone());

        tracing::info!(
            aggregate_id = %aggregate.id,
            sections = aggregate.sections.len(),
            tokens = aggregate.total_tokens,
            "Aggregated context shared"
        );
        Ok(aggregate)
    }

    /// Extract one section from a registered document and share it.
    pub async fn extract_and_share_section(
        &self,
        prp_id: &str,
        section_type: SectionType,
        target_agent: &str,
    ) -> Result<ShareRecord> {
        let document = self
            .document(prp_id)
            .await
            .ok_or_else(|| Error::NotFound(format!("document '{prp_id}' is not registered")))?;
        let section = self.extractor.extract_section(&document, section_type)?;
        self.broker
            .share_context(AGGREGATOR_AGENT, target_agent, section)
            .await
    }

    // =========================================================================
    // Synchronization
    // =========================================================================

    /// Route an update. Contexts under real-time sync broadcast at once;
    /// everything else queues until sync is enabled for it.
    pub async fn apply_update(&self, update: ContextUpdate) -> Result<usize> {
        if self.sync_enabled.read().await.contains(&update.context_id) {
            self.broker.broadcast_update(&update).await
        } else {
            self.pending_updates.write().await.push(update);
            Ok(0)
        }
    }

    /// Turn on real-time sync for the given contexts: queued updates for
    /// them are flushed through the broker, then a synchronization pass
    /// converges every copy.
    pub async fn enable_real_time_sync(&self, context_ids: &[String]) -> SyncReport {
        {
            let mut enabled = self.sync_enabled.write().await;
            enabled.extend(context_ids.iter().cloned());
        }

        let flush: Vec<ContextUpdate> = {
            let mut pending = self.pending_updates.write().await;
            let (flush, keep): (Vec<_>, Vec<_>) = pending
                .drain(..)
                .partition(|u| context_ids.contains(&u.context_id));
            *pending = keep;
            flush
        };

        let mut report = SyncReport::default();
        for update in flush {
            if let Err(e) = self.broker.broadcast_update(&update).await {
                report
                    .errors
                    .push(format!("update '{}' failed: {e}", update.id));
            }
        }

        let sync = self.synchronize(context_ids).await;
        report.synchronized = sync.synchronized;
        report.conflicts.extend(sync.conflicts);
        report.errors.extend(sync.errors);
        report
    }

    /// Converge every copy of each context on its highest version.
    /// Reports conflicts and errors; never throws on partial failure.
    pub async fn synchronize(&self, context_ids: &[String]) -> SyncReport {
        let mut report = SyncReport::default();
        for context_id in context_ids {
            let Some(winner) = self.broker.newest_copy(context_id).await else {
                report
                    .errors
                    .push(format!("context '{context_id}' not found"));
                continue;
            };

            let stale = self
                .broker
                .session_versions(context_id)
                .await
                .into_iter()
                .filter(|(_, version)| *version != winner.version)
                .count();
            if stale > 0 {
                report.conflicts.push(format!(
                    "context '{context_id}': {stale} stale copies resolved to version {}",
                    winner.version
                ));
            }

            let update = ContextUpdate::new(
                context_id,
                UpdateKind::Update,
                Some(winner),
                AGGREGATOR_AGENT,
            );
            match self.broker.broadcast_update(&update).await {
                Ok(_) => report.synchronized += 1,
                Err(e) => report
                    .errors
                    .push(format!("context '{context_id}' sync failed: {e}")),
            }
        }
        report
    }

    // =========================================================================
    // Signal handling
    // =========================================================================

    /// Route a signal through every registered document, bumping access
    /// metadata on relevant shared sections. Never throws; internal
    /// failures degrade to `processed: false`.
    pub async fn handle_signal(&self, signal: &DetectedSignal) -> SignalHandling {
        match self.handle_signal_inner(signal).await {
            Ok(handling) => handling,
            Err(e) => {
                tracing::error!(signal_type = %signal.signal_type, "Signal handling failed: {e}");
                SignalHandling {
                    processed: false,
                    context_used: false,
                    actions: Vec::new(),
                }
            }
        }
    }

    async fn handle_signal_inner(&self, signal: &DetectedSignal) -> Result<SignalHandling> {
        let mut actions = Vec::new();
        let mut context_used = false;

        let documents: Vec<PrpDocument> =
            self.documents.read().await.values().cloned().collect();
        for document in &documents {
            let relevant = self.extractor.extract_relevant_sections(document, signal);
            if relevant.is_empty() {
                continue;
            }
            context_used = true;
            let mut touched = 0;
            for section in &relevant {
                if self.broker.touch_context(&section.id).await {
                    touched += 1;
                }
            }
            actions.push(format!(
                "matched {} relevant section(s) in '{}' ({} shared copies touched)",
                relevant.len(),
                document.name,
                touched
            ));
        }

        for agent in mentioned_agents(&signal.context) {
            let available = self.broker.has_context_for(&agent).await;
            actions.push(format!(
                "agent '{agent}' shared context available: {available}"
            ));
        }

        Ok(SignalHandling {
            processed: true,
            context_used,
            actions,
        })
    }

    // =========================================================================
    // Merging
    // =========================================================================

    /// Merge sections into one combined unit.
    ///
    /// Content concatenates with blank-line separators; tokens sum;
    /// priority and relevance take the max; `required` ORs, `compressible`
    /// ANDs; tags, permissions and dependencies union; the version is one
    /// past the highest input version with fresh timestamps and zeroed
    /// access counters. An empty input is a validation error; a singleton
    /// returns unchanged.
    pub fn merge_contexts(&self, sections: &[ContextSection]) -> Result<ContextSection> {
        let first = sections
            .first()
            .ok_or_else(|| Error::Validation("cannot merge an empty context list".to_string()))?;
        if sections.len() == 1 {
            return Ok(first.clone());
        }

        let now = chrono::Utc::now().timestamp_millis();
        let mut tags = Vec::new();
        let mut permissions = Vec::new();
        let mut dependencies = Vec::new();
        let mut sources = Vec::new();
        for section in sections {
            union_into(&mut tags, &section.tags);
            union_into(&mut permissions, &section.required_permissions);
            union_into(&mut dependencies, &section.dependencies);
            union_into(&mut sources, std::slice::from_ref(&section.source));
        }

        let relevance_score = sections
            .iter()
            .filter_map(|s| s.relevance_score)
            .max_by(f64::total_cmp);

        Ok(ContextSection {
            id: format!("merged:{}", Uuid::new_v4()),
            name: "Merged Context".to_string(),
            content: sections
                .iter()
                .map(|s| s.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
            token_count: sections.iter().map(|s| s.token_count).sum(),
            priority: sections.iter().map(|s| s.priority).max().unwrap_or(0),
            required: sections.iter().any(|s| s.required),
            compressible: sections.iter().all(|s| s.compressible),
            last_updated: now,
            source: sources.join("+"),
            version: sections.iter().map(|s| s.version).max().unwrap_or(0) + 1,
            tags,
            required_permissions: permissions,
            dependencies,
            relevance_score,
            last_accessed: now,
            access_count: 0,
        })
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// One optimization pass: revoke shares whose context went unused past
    /// the timeout, reject retry-exhausted pending updates, and reap
    /// long-idle sessions.
    pub async fn optimize_performance(&self) -> OptimizationReport {
        let now = chrono::Utc::now().timestamp_millis();
        let cutoff = now - self.config.unused_share_timeout_ms;

        let mut revoked_shares = 0;
        for record in self.broker.list_shares().await {
            if !record.is_valid(now) {
                continue;
            }
            let unused = match self.broker.section(&record.context_id).await {
                Some(section) => section.last_accessed < cutoff,
                None => true,
            };
            if unused
                && self
                    .broker
                    .revoke_context(&record.id, &record.from_agent)
                    .await
                    .is_ok()
            {
                revoked_shares += 1;
            }
        }

        let rejected_updates = {
            let mut pending = self.pending_updates.write().await;
            let before = pending.len();
            pending.retain(|u| u.retry_count < self.config.max_update_retries);
            before - pending.len()
        };

        let reaped_sessions = self
            .broker
            .reap_sessions_idle_longer_than(self.config.session_reap_timeout_ms)
            .await;

        let report = OptimizationReport {
            revoked_shares,
            rejected_updates,
            reaped_sessions,
            improvement: revoked_shares + rejected_updates + reaped_sessions,
        };
        tracing::info!(
            revoked = report.revoked_shares,
            rejected = report.rejected_updates,
            reaped = report.reaped_sessions,
            "Context optimization pass"
        );
        report
    }

    /// Look up a previously built aggregate.
    pub async fn aggregate(&self, aggregate_id: &str) -> Option<AggregatedContext> {
        self.aggregates.read().await.get(aggregate_id).cloned()
    }

    /// Agents subscribed to a context's updates.
    pub async fn subscribers(&self, context_id: &str) -> Vec<String> {
        self.subscriptions
            .read()
            .await
            .get(context_id)
            .cloned()
            .unwrap_or_default()
    }
}

/// Append items not already present, preserving first-seen order.
fn union_into(target: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

/// `@name` mentions in a signal's context string.
fn mentioned_agents(context: &str) -> Vec<String> {
    context
        .split_whitespace()
        .filter_map(|word| {
            let name = word
                .strip_prefix('@')?
                .trim_end_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '_');
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

/// Token-optimized packing: required sections always survive; optional
/// sections enter highest-priority, least-compressible-first while budget
/// remains.
fn pack_token_optimized(
    mut sections: Vec<ContextSection>,
    token_budget: usize,
) -> Vec<ContextSection> {
    sections.sort_by(|a, b| {
        b.required
            .cmp(&a.required)
            .then(b.priority.cmp(&a.priority))
            .then(a.compressible.cmp(&b.compressible))
    });

    let mut remaining = token_budget;
    let mut packed = Vec::new();
    for section in sections {
        if section.required {
            remaining = remaining.saturating_sub(section.token_count);
            packed.push(section);
        } else if section.token_count <= remaining {
            remaining -= section.token_count;
            packed.push(section);
        }
    }
    packed
}
