//! Agent context broker: sessions, permission-checked sharing, revocation
//!
//! The broker holds custody of shared sections, the share-record table,
//! the session table and per-agent policies. All mutation goes through
//! its methods; callers never touch the tables directly.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::BrokerConfig;
use crate::error::{Error, Result};
use crate::events::{EventBus, MeshEvent};
use crate::prp::ContextSection;

use super::types::{
    infer_context_type, AgentPermissions, ContextSession, ContextType, ContextUpdate, ShareRecord,
    UpdateKind,
};

/// Reserved agent id under which aggregated context is shared.
pub const AGGREGATOR_AGENT: &str = "aggregator";

/// Access ceiling for required sections.
const MAX_ACCESS_REQUIRED: u64 = 1000;
/// Access ceiling for high-priority (> 8) sections.
const MAX_ACCESS_HIGH_PRIORITY: u64 = 100;
/// Access ceiling for everything else.
const MAX_ACCESS_DEFAULT: u64 = 50;

/// Session-joining restriction tag.
const NO_SESSIONS: &str = "no_sessions";

pub struct ContextBroker {
    config: BrokerConfig,
    bus: Arc<EventBus>,
    /// Custody of shared sections, keyed by context id
    store: RwLock<HashMap<String, ContextSection>>,
    shares: RwLock<HashMap<String, ShareRecord>>,
    sessions: RwLock<HashMap<String, ContextSession>>,
    permissions: RwLock<HashMap<String, AgentPermissions>>,
    cleaner: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ContextBroker {
    /// Create a broker. The reserved aggregator agent is pre-registered
    /// with wildcard trust so aggregation can share on behalf of the
    /// system.
    pub fn new(config: BrokerConfig, bus: Arc<EventBus>) -> Self {
        let mut permissions = HashMap::new();
        permissions.insert(
            AGGREGATOR_AGENT.to_string(),
            AgentPermissions {
                agent_id: AGGREGATOR_AGENT.to_string(),
                can_receive: ContextType::ALL.to_vec(),
                can_share: ContextType::ALL.to_vec(),
                trusted_agents: vec!["*".to_string()],
                restrictions: Vec::new(),
            },
        );
        Self {
            config,
            bus,
            store: RwLock::new(HashMap::new()),
            shares: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            permissions: RwLock::new(permissions),
            cleaner: tokio::sync::Mutex::new(None),
        }
    }

    // =========================================================================
    // Permissions
    // =========================================================================

    /// Register or replace an agent's policy.
    pub async fn register_permissions(&self, perms: AgentPermissions) {
        self.permissions
            .write()
            .await
            .insert(perms.agent_id.clone(), perms);
    }

    /// Look up an agent's policy, falling back to the system default.
    pub async fn permissions_for(&self, agent: &str) -> AgentPermissions {
        self.permissions
            .read()
            .await
            .get(agent)
            .cloned()
            .unwrap_or_else(|| AgentPermissions::default_for(agent))
    }

    // =========================================================================
    // Sharing
    // =========================================================================

    /// Share a section from one agent to another.
    ///
    /// Fails with `Permission` unless the sharer may share the inferred
    /// type, trusts the recipient, and the recipient may receive the type.
    pub async fn share_context(
        &self,
        from: &str,
        to: &str,
        mut section: ContextSection,
    ) -> Result<ShareRecord> {
        let context_type = infer_context_type(&section);
        let from_perms = self.permissions_for(from).await;
        let to_perms = self.permissions_for(to).await;

        if !from_perms.can_share(context_type) {
            return Err(Error::Permission(format!(
                "agent '{from}' may not share {context_type} context"
            )));
        }
        if !from_perms.trusts(to) {
            return Err(Error::Permission(format!(
                "agent '{from}' does not trust '{to}'"
            )));
        }
        if !to_perms.can_receive(context_type) {
            return Err(Error::Permission(format!(
                "agent '{to}' may not receive {context_type} context"
            )));
        }

        if section.id.is_empty() {
            section.id = Uuid::new_v4().to_string();
        }
        let context_id = section.id.clone();

        let max_access = if section.required {
            MAX_ACCESS_REQUIRED
        } else if section.priority > 8 {
            MAX_ACCESS_HIGH_PRIORITY
        } else {
            MAX_ACCESS_DEFAULT
        };

        let record = ShareRecord {
            id: Uuid::new_v4().to_string(),
            from_agent: from.to_string(),
            to_agent: to.to_string(),
            context_id: context_id.clone(),
            shared_at: chrono::Utc::now().timestamp_millis(),
            expires_at: None,
            access_count: 0,
            max_access: Some(max_access),
            required_permissions: section.required_permissions.clone(),
        };

        // If an active session already holds both agents, the section
        // becomes session-visible as well
        {
            let mut sessions = self.sessions.write().await;
            for session in sessions.values_mut() {
                if session.has_participant(from) && session.has_participant(to) {
                    session
                        .shared_context
                        .insert(context_id.clone(), section.clone());
                    session.touch();
                }
            }
        }

        self.store
            .write()
            .await
            .insert(context_id.clone(), section);
        self.shares
            .write()
            .await
            .insert(record.id.clone(), record.clone());

        self.bus.publish(MeshEvent::ContextShared {
            share_id: record.id.clone(),
            from_agent: from.to_string(),
            to_agent: to.to_string(),
            context_id,
        });
        tracing::info!(from, to, share_id = %record.id, "Context shared");
        Ok(record)
    }

    /// Resolve the most relevant accessible section of a type for an agent.
    ///
    /// Candidates come from live share records and from sessions the agent
    /// participates in; the winner maximizes `relevance + access * 0.1`.
    /// Each successful resolution consumes one access on the share record.
    pub async fn request_context(
        &self,
        agent: &str,
        context_type: ContextType,
    ) -> Result<ContextSection> {
        let perms = self.permissions_for(agent).await;
        if !perms.can_receive(context_type) {
            return Err(Error::Permission(format!(
                "agent '{agent}' may not receive {context_type} context"
            )));
        }

        let now = chrono::Utc::now().timestamp_millis();

        // context id -> share record id, for access accounting
        let mut share_for_context: HashMap<String, String> = HashMap::new();
        let mut candidate_ids: Vec<String> = Vec::new();
        {
            let shares = self.shares.read().await;
            for record in shares.values() {
                if record.to_agent == agent && record.is_valid(now) {
                    share_for_context.insert(record.context_id.clone(), record.id.clone());
                    candidate_ids.push(record.context_id.clone());
                }
            }
        }
        {
            let sessions = self.sessions.read().await;
            for session in sessions.values() {
                if session.has_participant(agent) {
                    candidate_ids.extend(session.shared_context.keys().cloned());
                }
            }
        }
        candidate_ids.sort();
        candidate_ids.dedup();

        let best_id = {
            let store = self.store.read().await;
            candidate_ids
                .into_iter()
                .filter_map(|id| store.get(&id))
                .filter(|section| infer_context_type(section) == context_type)
                .max_by(|a, b| selection_score(a).total_cmp(&selection_score(b)))
                .map(|section| section.id.clone())
        };
        let Some(best_id) = best_id else {
            return Err(Error::NotFound(format!(
                "no {context_type} context available to agent '{agent}'"
            )));
        };

        if let Some(share_id) = share_for_context.get(&best_id) {
            if let Some(record) = self.shares.write().await.get_mut(share_id) {
                record.access_count += 1;
            }
        }

        let mut store = self.store.write().await;
        let section = store
            .get_mut(&best_id)
            .ok_or_else(|| Error::NotFound(format!("context '{best_id}' vanished")))?;
        section.record_access();
        Ok(section.clone())
    }

    /// Revoke a share. Only the original sharer may revoke; the record is
    /// marked expired rather than deleted, and the context is scrubbed
    /// from every session.
    pub async fn revoke_context(&self, share_id: &str, revoker: &str) -> Result<()> {
        let context_id = {
            let mut shares = self.shares.write().await;
            let record = shares
                .get_mut(share_id)
                .ok_or_else(|| Error::NotFound(format!("share '{share_id}' not found")))?;
            if record.from_agent != revoker {
                return Err(Error::Permission(format!(
                    "only '{}' may revoke share '{share_id}'",
                    record.from_agent
                )));
            }
            record.expires_at = Some(chrono::Utc::now().timestamp_millis() - 1);
            record.context_id.clone()
        };

        let mut sessions = self.sessions.write().await;
        for session in sessions.values_mut() {
            session.shared_context.remove(&context_id);
        }

        self.bus.publish(MeshEvent::ContextRevoked {
            share_id: share_id.to_string(),
            revoker: revoker.to_string(),
        });
        tracing::info!(share_id, revoker, "Context revoked");
        Ok(())
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Open a session between two or more agents.
    pub async fn establish_session(&self, participants: &[String]) -> Result<ContextSession> {
        if participants.len() < 2 {
            return Err(Error::Validation(
                "a context session needs at least 2 participants".to_string(),
            ));
        }
        for agent in participants {
            if self.permissions_for(agent).await.is_restricted(NO_SESSIONS) {
                return Err(Error::Permission(format!(
                    "agent '{agent}' may not join sessions"
                )));
            }
        }

        let now = chrono::Utc::now().timestamp_millis();
        let session = ContextSession {
            id: Uuid::new_v4().to_string(),
            participants: participants.to_vec(),
            shared_context: HashMap::new(),
            created_at: now,
            last_activity: now,
        };
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());

        self.bus.publish(MeshEvent::SessionEstablished {
            session_id: session.id.clone(),
            participants: participants.to_vec(),
        });
        tracing::info!(session_id = %session.id, ?participants, "Session established");
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str) -> Option<ContextSession> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Sessions the agent participates in.
    pub async fn sessions_for(&self, agent: &str) -> Vec<ContextSession> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.has_participant(agent))
            .cloned()
            .collect()
    }

    // =========================================================================
    // Updates and maintenance
    // =========================================================================

    /// Apply an update to every session already holding the context id,
    /// refreshing their activity. Returns the number of sessions notified.
    /// Delivery to sessions completes before this returns.
    pub async fn broadcast_update(&self, update: &ContextUpdate) -> Result<usize> {
        let mut notified = 0;
        {
            let mut sessions = self.sessions.write().await;
            for session in sessions.values_mut() {
                if !session.shared_context.contains_key(&update.context_id) {
                    continue;
                }
                match update.kind {
                    UpdateKind::Create | UpdateKind::Update => {
                        if let Some(section) = &update.section {
                            session
                                .shared_context
                                .insert(update.context_id.clone(), section.clone());
                        }
                    }
                    UpdateKind::Delete => {
                        session.shared_context.remove(&update.context_id);
                    }
                }
                session.touch();
                notified += 1;
            }
        }

        // Custody follows the same update
        let mut store = self.store.write().await;
        match update.kind {
            UpdateKind::Create | UpdateKind::Update => {
                if let Some(section) = &update.section {
                    store.insert(update.context_id.clone(), section.clone());
                }
            }
            UpdateKind::Delete => {
                store.remove(&update.context_id);
            }
        }
        drop(store);

        self.bus.publish(MeshEvent::ContextUpdated {
            context_id: update.context_id.clone(),
            sessions_notified: notified,
        });
        Ok(notified)
    }

    /// Evict idle sessions and dead share records. Returns
    /// `(sessions_removed, shares_removed)`.
    pub async fn cleanup(&self) -> (usize, usize) {
        let sessions_removed = self
            .reap_sessions_idle_longer_than(self.config.session_idle_timeout_ms)
            .await;

        let now = chrono::Utc::now().timestamp_millis();
        let mut shares = self.shares.write().await;
        let before = shares.len();
        shares.retain(|_, r| r.is_valid(now));
        let shares_removed = before - shares.len();

        if sessions_removed > 0 || shares_removed > 0 {
            tracing::debug!(sessions_removed, shares_removed, "Broker cleanup");
        }
        (sessions_removed, shares_removed)
    }

    /// Evict sessions idle longer than `idle_ms`. Returns the count.
    pub async fn reap_sessions_idle_longer_than(&self, idle_ms: i64) -> usize {
        let now = chrono::Utc::now().timestamp_millis();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| now - s.last_activity <= idle_ms);
        before - sessions.len()
    }

    /// Spawn the periodic cleanup task.
    pub async fn start(self: &Arc<Self>) {
        let broker = Arc::clone(self);
        let interval_ms = self.config.cleanup_interval_ms.max(1);
        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                broker.cleanup().await;
            }
        });
        *self.cleaner.lock().await = Some(handle);
    }

    /// Cancel the cleanup task.
    pub async fn stop(&self) {
        if let Some(handle) = self.cleaner.lock().await.take() {
            handle.abort();
        }
    }

    // =========================================================================
    // Accessors used by the aggregator
    // =========================================================================

    /// Look up a section in custody.
    pub async fn section(&self, context_id: &str) -> Option<ContextSection> {
        self.store.read().await.get(context_id).cloned()
    }

    /// Bump access metadata on a section in custody, if present.
    pub async fn touch_context(&self, context_id: &str) -> bool {
        match self.store.write().await.get_mut(context_id) {
            Some(section) => {
                section.record_access();
                true
            }
            None => false,
        }
    }

    /// Highest-version copy of a context across custody and sessions.
    pub async fn newest_copy(&self, context_id: &str) -> Option<ContextSection> {
        let mut best = self.store.read().await.get(context_id).cloned();
        for session in self.sessions.read().await.values() {
            if let Some(copy) = session.shared_context.get(context_id) {
                let newer = best
                    .as_ref()
                    .map(|b| copy.version > b.version)
                    .unwrap_or(true);
                if newer {
                    best = Some(copy.clone());
                }
            }
        }
        best
    }

    /// Versions of a context as held by each session containing it.
    pub async fn session_versions(&self, context_id: &str) -> Vec<(String, u64)> {
        self.sessions
            .read()
            .await
            .values()
            .filter_map(|s| {
                s.shared_context
                    .get(context_id)
                    .map(|c| (s.id.clone(), c.version))
            })
            .collect()
    }

    /// Snapshot of all share records, live and dead.
    pub async fn list_shares(&self) -> Vec<ShareRecord> {
        self.shares.read().await.values().cloned().collect()
    }

    /// Whether the agent currently has any live share or session context.
    pub async fn has_context_for(&self, agent: &str) -> bool {
        let now = chrono::Utc::now().timestamp_millis();
        if self
            .shares
            .read()
            .await
            .values()
            .any(|r| r.to_agent == agent && r.is_valid(now))
        {
            return true;
        }
        self.sessions
            .read()
            .await
            .values()
            .any(|s| s.has_participant(agent) && !s.shared_context.is_empty())
    }
}

/// Candidate ranking for `request_context`.
fn selection_score(section: &ContextSection) -> f64 {
    section.relevance_score.unwrap_or(0.0) + section.access_count as f64 * 0.1
}
