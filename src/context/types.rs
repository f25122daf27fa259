//! Context-sharing data model: types, permissions, sessions, share records

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::prp::ContextSection;

/// Kinds of context an agent may share or receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    PrpContext,
    AgentStatus,
    SignalHistory,
    ToolContext,
    SharedMemory,
}

impl ContextType {
    pub const ALL: [ContextType; 5] = [
        ContextType::PrpContext,
        ContextType::AgentStatus,
        ContextType::SignalHistory,
        ContextType::ToolContext,
        ContextType::SharedMemory,
    ];
}

impl std::fmt::Display for ContextType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PrpContext => "prp_context",
            Self::AgentStatus => "agent_status",
            Self::SignalHistory => "signal_history",
            Self::ToolContext => "tool_context",
            Self::SharedMemory => "shared_memory",
        };
        write!(f, "{name}")
    }
}

/// Infer a section's context type from its name and tags.
///
/// Heuristic by design; first match in the fixed order prp → agent →
/// signal → tool wins, everything else is shared memory. A section whose
/// name matches several keywords resolves by that order. Kept behind this
/// one pure function so an explicit type tag can replace it without
/// touching callers.
pub fn infer_context_type(section: &ContextSection) -> ContextType {
    let mut haystack = section.name.to_lowercase();
    for tag in &section.tags {
        haystack.push(' ');
        haystack.push_str(&tag.to_lowercase());
    }

    if haystack.contains("prp") {
        ContextType::PrpContext
    } else if haystack.contains("agent") {
        ContextType::AgentStatus
    } else if haystack.contains("signal") {
        ContextType::SignalHistory
    } else if haystack.contains("tool") {
        ContextType::ToolContext
    } else {
        ContextType::SharedMemory
    }
}

/// A grant of one context section from one agent to another
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRecord {
    pub id: String,
    pub from_agent: String,
    pub to_agent: String,
    pub context_id: String,
    pub shared_at: i64,
    /// Expiry timestamp; revocation sets this into the past
    pub expires_at: Option<i64>,
    pub access_count: u64,
    /// Resolutions permitted before the record becomes invalid
    pub max_access: Option<u64>,
    pub required_permissions: Vec<String>,
}

impl ShareRecord {
    /// Whether the record still grants access at `now`.
    pub fn is_valid(&self, now: i64) -> bool {
        if let Some(expires_at) = self.expires_at {
            if now >= expires_at {
                return false;
            }
        }
        if let Some(max_access) = self.max_access {
            if self.access_count >= max_access {
                return false;
            }
        }
        true
    }
}

/// A time-bounded scope in which context is visible to all participants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSession {
    pub id: String,
    /// Always at least two participants
    pub participants: Vec<String>,
    /// Shared context keyed by context id
    pub shared_context: HashMap<String, ContextSection>,
    pub created_at: i64,
    pub last_activity: i64,
}

impl ContextSession {
    pub fn touch(&mut self) {
        self.last_activity = chrono::Utc::now().timestamp_millis();
    }

    pub fn has_participant(&self, agent: &str) -> bool {
        self.participants.iter().any(|p| p == agent)
    }
}

/// Per-agent sharing policy, with a system-wide default fallback
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPermissions {
    pub agent_id: String,
    pub can_receive: Vec<ContextType>,
    pub can_share: Vec<ContextType>,
    /// Trusted peers; `"*"` trusts everyone
    pub trusted_agents: Vec<String>,
    /// Restriction tags, e.g. `"no_sessions"`
    pub restrictions: Vec<String>,
}

impl AgentPermissions {
    /// The fallback for agents with no registered policy: may receive any
    /// type, may share nothing, trusts no one.
    pub fn default_for(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            can_receive: ContextType::ALL.to_vec(),
            can_share: Vec::new(),
            trusted_agents: Vec::new(),
            restrictions: Vec::new(),
        }
    }

    pub fn can_receive(&self, context_type: ContextType) -> bool {
        self.can_receive.contains(&context_type)
    }

    pub fn can_share(&self, context_type: ContextType) -> bool {
        self.can_share.contains(&context_type)
    }

    pub fn trusts(&self, agent: &str) -> bool {
        self.trusted_agents
            .iter()
            .any(|t| t == "*" || t == agent)
    }

    pub fn is_restricted(&self, tag: &str) -> bool {
        self.restrictions.iter().any(|r| r == tag)
    }
}

/// How an update applies to context held inside sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Create,
    Update,
    Delete,
}

/// A broadcastable change to one context section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextUpdate {
    pub id: String,
    pub context_id: String,
    pub kind: UpdateKind,
    /// Absent only for deletes
    pub section: Option<ContextSection>,
    pub source_agent: String,
    pub timestamp: i64,
    /// Delivery attempts consumed so far
    pub retry_count: u32,
}

impl ContextUpdate {
    pub fn new(
        context_id: &str,
        kind: UpdateKind,
        section: Option<ContextSection>,
        source_agent: &str,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            context_id: context_id.to_string(),
            kind,
            section,
            source_agent: source_agent.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            retry_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(name: &str, tags: &[&str]) -> ContextSection {
        ContextSection {
            id: "ctx-1".to_string(),
            name: name.to_string(),
            content: "body".to_string(),
            token_count: 1,
            priority: 5,
            required: false,
            compressible: true,
            last_updated: 0,
            source: "doc".to_string(),
            version: 1,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            required_permissions: Vec::new(),
            dependencies: Vec::new(),
            relevance_score: None,
            last_accessed: 0,
            access_count: 0,
        }
    }

    #[test]
    fn test_infer_context_type_keywords() {
        assert_eq!(
            infer_context_type(&section("Goal", &["prp", "goal"])),
            ContextType::PrpContext
        );
        assert_eq!(
            infer_context_type(&section("agent heartbeat", &[])),
            ContextType::AgentStatus
        );
        assert_eq!(
            infer_context_type(&section("Signals", &["signal"])),
            ContextType::SignalHistory
        );
        assert_eq!(
            infer_context_type(&section("tool output", &[])),
            ContextType::ToolContext
        );
        assert_eq!(
            infer_context_type(&section("notes", &[])),
            ContextType::SharedMemory
        );
    }

    #[test]
    fn test_infer_context_type_first_match_order() {
        // Matches both "prp" and "signal"; prp wins by fixed order
        assert_eq!(
            infer_context_type(&section("prp signal log", &[])),
            ContextType::PrpContext
        );
    }

    #[test]
    fn test_share_record_validity() {
        let now = chrono::Utc::now().timestamp_millis();
        let mut record = ShareRecord {
            id: "s-1".to_string(),
            from_agent: "alpha".to_string(),
            to_agent: "beta".to_string(),
            context_id: "ctx-1".to_string(),
            shared_at: now,
            expires_at: None,
            access_count: 0,
            max_access: Some(2),
            required_permissions: Vec::new(),
        };
        assert!(record.is_valid(now));

        record.access_count = 2;
        assert!(!record.is_valid(now), "access-exhausted record is invalid");

        record.access_count = 0;
        record.expires_at = Some(now - 1);
        assert!(!record.is_valid(now), "expired record is invalid");
    }

    #[test]
    fn test_default_permissions_receive_only() {
        let perms = AgentPermissions::default_for("ghost");
        assert!(perms.can_receive(ContextType::PrpContext));
        assert!(!perms.can_share(ContextType::PrpContext));
        assert!(!perms.trusts("anyone"));
    }

    #[test]
    fn test_wildcard_trust() {
        let mut perms = AgentPermissions::default_for("alpha");
        perms.trusted_agents = vec!["*".to_string()];
        assert!(perms.trusts("beta"));
        assert!(perms.trusts("gamma"));
    }
}
