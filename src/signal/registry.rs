//! Signal pattern registry
//!
//! Owns the catalogue of named lexical patterns. Patterns are compiled at
//! registration time so an invalid regex fails the `add_pattern` call, never
//! a detection pass. The registry is an explicitly constructed instance (no
//! global state) so multiple registries can coexist in tests.

use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::{default_signal_patterns, PatternDefinition};
use crate::error::{Error, Result};
use crate::events::{EventBus, MeshEvent};
use crate::signal::types::SignalPattern;

/// A pattern with its compiled regex
#[derive(Clone)]
pub(crate) struct CompiledPattern {
    pub def: SignalPattern,
    pub regex: Regex,
}

/// Catalogue of signal patterns, built-in and user-added
pub struct PatternRegistry {
    /// Insertion-ordered pattern list; scan order is deterministic
    patterns: Arc<RwLock<Vec<CompiledPattern>>>,
    /// Cumulative hit counts per pattern id across all detection passes
    hit_counts: Arc<RwLock<HashMap<String, u64>>>,
    bus: Arc<EventBus>,
}

impl PatternRegistry {
    /// Create a registry seeded with the built-in patterns.
    ///
    /// A built-in definition that fails to compile is skipped with a log
    /// line rather than aborting construction.
    pub fn new(bus: Arc<EventBus>) -> Self {
        let mut patterns = Vec::new();
        for def in default_signal_patterns() {
            match Self::compile(def, false) {
                Ok(compiled) => patterns.push(compiled),
                Err(e) => tracing::error!("Skipping built-in pattern: {}", e),
            }
        }
        Self::from_compiled(patterns, bus)
    }

    /// Create a registry from explicit definitions.
    pub fn with_patterns(defs: Vec<PatternDefinition>, bus: Arc<EventBus>) -> Result<Self> {
        let mut patterns = Vec::with_capacity(defs.len());
        for def in defs {
            patterns.push(Self::compile(def, false)?);
        }
        Ok(Self::from_compiled(patterns, bus))
    }

    fn from_compiled(patterns: Vec<CompiledPattern>, bus: Arc<EventBus>) -> Self {
        Self {
            patterns: Arc::new(RwLock::new(patterns)),
            hit_counts: Arc::new(RwLock::new(HashMap::new())),
            bus,
        }
    }

    fn compile(def: PatternDefinition, user_defined: bool) -> Result<CompiledPattern> {
        if def.priority > 10 {
            return Err(Error::Pattern(format!(
                "Pattern '{}' priority {} exceeds the 0-10 scale",
                def.id, def.priority
            )));
        }
        let regex = Regex::new(&def.pattern).map_err(|e| {
            Error::Pattern(format!("Invalid regex for pattern '{}': {}", def.id, e))
        })?;
        Ok(CompiledPattern {
            def: SignalPattern {
                id: def.id,
                name: def.name,
                pattern: def.pattern,
                category: def.category,
                priority: def.priority,
                description: def.description,
                enabled: true,
                user_defined,
            },
            regex,
        })
    }

    /// Register a user-defined pattern at runtime.
    pub async fn add_pattern(&self, def: PatternDefinition) -> Result<()> {
        let compiled = Self::compile(def, true)?;
        let mut patterns = self.patterns.write().await;
        if patterns.iter().any(|p| p.def.id == compiled.def.id) {
            return Err(Error::Pattern(format!(
                "Pattern '{}' is already registered",
                compiled.def.id
            )));
        }
        let id = compiled.def.id.clone();
        patterns.push(compiled);
        drop(patterns);

        self.bus.publish(MeshEvent::PatternAdded { pattern_id: id });
        Ok(())
    }

    /// Remove a pattern. Only user-defined patterns can be removed.
    pub async fn remove_pattern(&self, id: &str) -> Result<()> {
        let mut patterns = self.patterns.write().await;
        let pos = patterns
            .iter()
            .position(|p| p.def.id == id)
            .ok_or_else(|| Error::NotFound(format!("Pattern '{}' is not registered", id)))?;
        if !patterns[pos].def.user_defined {
            return Err(Error::Pattern(format!(
                "Pattern '{}' is built in and cannot be removed",
                id
            )));
        }
        patterns.remove(pos);
        drop(patterns);

        self.bus.publish(MeshEvent::PatternRemoved {
            pattern_id: id.to_string(),
        });
        Ok(())
    }

    /// Enable or disable a pattern without deleting it.
    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let mut patterns = self.patterns.write().await;
        let pattern = patterns
            .iter_mut()
            .find(|p| p.def.id == id)
            .ok_or_else(|| Error::NotFound(format!("Pattern '{}' is not registered", id)))?;
        pattern.def.enabled = enabled;
        Ok(())
    }

    /// Look up a pattern by id.
    pub async fn get(&self, id: &str) -> Option<SignalPattern> {
        self.patterns
            .read()
            .await
            .iter()
            .find(|p| p.def.id == id)
            .map(|p| p.def.clone())
    }

    /// List all registered patterns.
    pub async fn list(&self) -> Vec<SignalPattern> {
        self.patterns
            .read()
            .await
            .iter()
            .map(|p| p.def.clone())
            .collect()
    }

    /// Snapshot of enabled patterns with compiled regexes for a scan pass.
    pub(crate) async fn enabled_snapshot(&self) -> Vec<CompiledPattern> {
        self.patterns
            .read()
            .await
            .iter()
            .filter(|p| p.def.enabled)
            .cloned()
            .collect()
    }

    /// Record surviving hits for a pattern after a detection pass.
    pub async fn record_hits(&self, id: &str, count: u64) {
        if count == 0 {
            return;
        }
        *self
            .hit_counts
            .write()
            .await
            .entry(id.to_string())
            .or_insert(0) += count;
    }

    /// Cumulative hit counts per pattern id.
    pub async fn hit_stats(&self) -> HashMap<String, u64> {
        self.hit_counts.read().await.clone()
    }
}
