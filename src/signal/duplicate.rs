//! Time-windowed duplicate suppression
//!
//! A repeat sighting of the same signal (type + matched text + context line)
//! within the window increments its record and is dropped from the pass.
//! Eviction is an explicit, testable `sweep()`; a background task runs it
//! periodically so the cache stays bounded without relying on access
//! patterns.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// A sighted signal within the duplicate window
#[derive(Debug, Clone)]
pub struct DuplicateRecord {
    /// sha256 of (type, matched text, context line)
    pub key: String,
    /// Signal type
    pub signal_type: String,
    /// The literal matched text
    pub matched_text: String,
    /// First-sighting timestamp (ms since epoch); fixed, so records expire
    pub timestamp: i64,
    /// Source tag of the first sighting
    pub source: String,
    /// Sightings within the window, including the first
    pub count: u64,
}

/// Duplicate-suppression cache
pub struct DuplicateCache {
    records: Arc<RwLock<HashMap<String, DuplicateRecord>>>,
    window_ms: i64,
}

impl DuplicateCache {
    /// Create a cache with the given suppression window.
    pub fn new(window_ms: i64) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            window_ms,
        }
    }

    /// Record a sighting. Returns `true` if the signal is a duplicate of a
    /// live record (the caller drops it), `false` for a first sighting.
    pub async fn check_and_record(
        &self,
        signal_type: &str,
        matched_text: &str,
        context_line: &str,
        source: &str,
    ) -> bool {
        let key = Self::key_for(signal_type, matched_text, context_line);
        let now = chrono::Utc::now().timestamp_millis();
        let mut records = self.records.write().await;

        match records.get_mut(&key) {
            Some(record) if now - record.timestamp <= self.window_ms => {
                record.count += 1;
                true
            }
            _ => {
                // Either unseen or the previous record aged out
                records.insert(
                    key.clone(),
                    DuplicateRecord {
                        key,
                        signal_type: signal_type.to_string(),
                        matched_text: matched_text.to_string(),
                        timestamp: now,
                        source: source.to_string(),
                        count: 1,
                    },
                );
                false
            }
        }
    }

    /// Evict records older than the window. Returns the number evicted.
    pub async fn sweep(&self) -> usize {
        let now = chrono::Utc::now().timestamp_millis();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| now - r.timestamp <= self.window_ms);
        let evicted = before - records.len();
        if evicted > 0 {
            tracing::debug!(evicted, "Swept duplicate cache");
        }
        evicted
    }

    /// Look up the live record for a signal, if any.
    pub async fn get(
        &self,
        signal_type: &str,
        matched_text: &str,
        context_line: &str,
    ) -> Option<DuplicateRecord> {
        let key = Self::key_for(signal_type, matched_text, context_line);
        self.records.read().await.get(&key).cloned()
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the cache holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Spawn a periodic sweep task. Abort the returned handle on shutdown.
    pub fn start_sweeper(self: &Arc<Self>, interval_ms: u64) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_millis(interval_ms.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                cache.sweep().await;
            }
        })
    }

    fn key_for(signal_type: &str, matched_text: &str, context_line: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(signal_type.as_bytes());
        hasher.update([0]);
        hasher.update(matched_text.as_bytes());
        hasher.update([0]);
        hasher.update(context_line.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_sighting_not_duplicate() {
        let cache = DuplicateCache::new(300_000);
        let dup = cache
            .check_and_record("blocked", "[bl]", "[bl] waiting on schema", "prp-auth")
            .await;
        assert!(!dup);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_repeat_within_window_is_duplicate() {
        let cache = DuplicateCache::new(300_000);
        cache
            .check_and_record("blocked", "[bl]", "[bl] waiting", "prp-auth")
            .await;
        let dup = cache
            .check_and_record("blocked", "[bl]", "[bl] waiting", "prp-auth")
            .await;
        assert!(dup);

        let record = cache.get("blocked", "[bl]", "[bl] waiting").await.unwrap();
        assert_eq!(record.count, 2);
    }

    #[tokio::test]
    async fn test_different_context_not_duplicate() {
        let cache = DuplicateCache::new(300_000);
        cache
            .check_and_record("blocked", "[bl]", "[bl] waiting on schema", "prp-auth")
            .await;
        let dup = cache
            .check_and_record("blocked", "[bl]", "[bl] waiting on review", "prp-auth")
            .await;
        assert!(!dup);
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_expired_record_accepts_again() {
        // Window of 0 ms: anything older than "now" has aged out
        let cache = DuplicateCache::new(0);
        cache
            .check_and_record("blocked", "[bl]", "[bl] waiting", "prp-auth")
            .await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let dup = cache
            .check_and_record("blocked", "[bl]", "[bl] waiting", "prp-auth")
            .await;
        assert!(!dup, "record outside the window must be treated as fresh");

        // Replacement record restarts the count
        let record = cache.get("blocked", "[bl]", "[bl] waiting").await.unwrap();
        assert_eq!(record.count, 1);
    }

    #[tokio::test]
    async fn test_sweep_evicts_old_records() {
        let cache = DuplicateCache::new(0);
        cache
            .check_and_record("blocked", "[bl]", "a", "prp-auth")
            .await;
        cache
            .check_and_record("bug_fixed", "[bf]", "b", "prp-auth")
            .await;
        assert_eq!(cache.len().await, 2);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let evicted = cache.sweep().await;
        assert_eq!(evicted, 2);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_sweep_keeps_live_records() {
        let cache = DuplicateCache::new(300_000);
        cache
            .check_and_record("blocked", "[bl]", "a", "prp-auth")
            .await;
        assert_eq!(cache.sweep().await, 0);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_sweeper_task_runs() {
        let cache = Arc::new(DuplicateCache::new(0));
        cache
            .check_and_record("blocked", "[bl]", "a", "prp-auth")
            .await;

        let handle = cache.start_sweeper(10);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        handle.abort();

        assert!(cache.is_empty().await);
    }
}
