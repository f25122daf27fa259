//! Signal detection pass
//!
//! Scans document text against every enabled pattern, scores each match,
//! suppresses duplicates, and returns a ranked [`DetectionReport`]. The
//! `detect` boundary never propagates an internal failure: a fault inside
//! the pass yields an empty zeroed report and an error log line.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::DetectorConfig;
use crate::error::Result;
use crate::events::{EventBus, MeshEvent};
use crate::signal::duplicate::DuplicateCache;
use crate::signal::registry::PatternRegistry;
use crate::signal::types::{DetectedSignal, DetectionReport, SignalPriority};

/// Characters of surrounding text captured on each side of a match.
const CONTEXT_RADIUS: usize = 100;

/// Matches in the first this-many characters get a confidence bonus.
const EARLY_DOCUMENT_CUTOFF: usize = 1000;

/// A match that survived the confidence filter, before duplicate suppression
struct Candidate {
    pattern_id: String,
    matched_text: String,
    line: usize,
    column: usize,
    line_text: String,
    nearby: String,
    confidence: f64,
    priority: SignalPriority,
}

/// Scans document text for signal markers
pub struct SignalDetector {
    registry: Arc<PatternRegistry>,
    duplicates: Arc<DuplicateCache>,
    config: DetectorConfig,
    bus: Arc<EventBus>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SignalDetector {
    /// Create a detector over the given registry.
    pub fn new(registry: Arc<PatternRegistry>, config: DetectorConfig, bus: Arc<EventBus>) -> Self {
        let duplicates = Arc::new(DuplicateCache::new(config.duplicate_window_ms));
        Self {
            registry,
            duplicates,
            config,
            bus,
            sweeper: Mutex::new(None),
        }
    }

    /// The duplicate-suppression cache (shared; useful for inspection).
    pub fn duplicate_cache(&self) -> Arc<DuplicateCache> {
        Arc::clone(&self.duplicates)
    }

    /// Start the periodic duplicate-cache sweep.
    pub async fn start(&self) {
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.is_none() {
            *sweeper = Some(self.duplicates.start_sweeper(self.config.sweep_interval_ms));
        }
    }

    /// Stop the periodic sweep.
    pub async fn stop(&self) {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
        }
    }

    /// Run one detection pass over `content` tagged with `source`.
    ///
    /// Never fails past this boundary: an internal fault produces an empty
    /// report with zeroed statistics.
    pub async fn detect(&self, content: &str, source: &str) -> DetectionReport {
        match self.run_pass(content, source).await {
            Ok(report) => {
                self.bus.publish(MeshEvent::DetectionComplete {
                    source: source.to_string(),
                    signal_count: report.signals.len(),
                    duplicate_count: report.duplicate_count,
                    processing_time_ms: report.processing_time_ms,
                });
                report
            }
            Err(e) => {
                tracing::error!(source, "Detection pass failed: {}", e);
                DetectionReport::empty()
            }
        }
    }

    async fn run_pass(&self, content: &str, source: &str) -> Result<DetectionReport> {
        let started = Instant::now();
        let patterns = self.registry.enabled_snapshot().await;

        let mut candidates: Vec<Candidate> = Vec::new();
        let mut per_pattern: HashMap<String, u64> = HashMap::new();

        for pattern in &patterns {
            for m in pattern.regex.find_iter(content) {
                let candidate = match self.score_match(
                    content,
                    m.start(),
                    m.end(),
                    m.as_str(),
                    &pattern.def.id,
                    pattern.def.priority,
                ) {
                    Some(c) => c,
                    // Below minimum confidence
                    None => continue,
                };
                *per_pattern.entry(pattern.def.id.clone()).or_insert(0) += 1;
                candidates.push(candidate);
            }
        }

        for (id, count) in &per_pattern {
            self.registry.record_hits(id, *count).await;
        }

        // Priority descending, then line ascending
        candidates.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.line.cmp(&b.line)));

        let mut duplicate_count = 0usize;
        let mut signals: Vec<DetectedSignal> = Vec::new();
        for candidate in candidates {
            let is_dup = self
                .duplicates
                .check_and_record(
                    &candidate.pattern_id,
                    &candidate.matched_text,
                    &candidate.line_text,
                    source,
                )
                .await;
            if is_dup {
                duplicate_count += 1;
                continue;
            }
            signals.push(self.to_signal(candidate, source));
        }
        signals.truncate(self.config.max_signals_per_document);

        let line_count = content.lines().count();
        // Density ignores blank lines so padding does not dilute it
        let content_lines = content.lines().filter(|l| !l.trim().is_empty()).count();
        let signal_density = if content_lines > 0 {
            signals.len() as f64 / content_lines as f64
        } else {
            0.0
        };
        let average_confidence = if signals.is_empty() {
            0.0
        } else {
            signals.iter().map(|s| s.confidence).sum::<f64>() / signals.len() as f64
        };

        Ok(DetectionReport {
            signals,
            duplicate_count,
            per_pattern_stats: per_pattern,
            processing_time_ms: started.elapsed().as_millis() as u64,
            line_count,
            signal_density,
            average_confidence,
        })
    }

    /// Score one raw match; returns `None` if it falls below the minimum
    /// confidence.
    fn score_match(
        &self,
        content: &str,
        start: usize,
        end: usize,
        matched_text: &str,
        pattern_id: &str,
        priority: u8,
    ) -> Option<Candidate> {
        let line = content[..start].bytes().filter(|b| *b == b'\n').count() + 1;
        let line_start = content[..start].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_end = content[start..]
            .find('\n')
            .map(|i| start + i)
            .unwrap_or(content.len());
        let line_text = &content[line_start..line_end];
        let column = content[line_start..start].chars().count() + 1;

        let ctx_start = floor_char_boundary(content, start.saturating_sub(CONTEXT_RADIUS));
        let ctx_end = ceil_char_boundary(content, (end + CONTEXT_RADIUS).min(content.len()));
        let nearby = &content[ctx_start..ctx_end];

        let mut confidence = 0.5 + (priority as f64 / 10.0) * 0.3;
        if line_text.len() > 10 {
            confidence += 0.1;
        }
        if start < EARLY_DOCUMENT_CUTOFF {
            confidence += 0.1;
        }
        let nearby_lower = nearby.to_lowercase();
        if nearby_lower.contains("progress")
            || nearby_lower.contains("done")
            || nearby_lower.contains("complete")
        {
            confidence += 0.1;
        }
        let confidence = confidence.min(1.0);

        if confidence < self.config.min_confidence {
            return None;
        }

        Some(Candidate {
            pattern_id: pattern_id.to_string(),
            matched_text: matched_text.to_string(),
            line,
            column,
            line_text: line_text.to_string(),
            nearby: nearby.split_whitespace().collect::<Vec<_>>().join(" "),
            confidence,
            priority: SignalPriority::from_numeric(priority),
        })
    }

    fn to_signal(&self, candidate: Candidate, source: &str) -> DetectedSignal {
        let context = format!(
            "[{}] ...{}... ({:.0}% confidence)",
            source,
            candidate.nearby,
            candidate.confidence * 100.0
        );
        DetectedSignal {
            signal_type: candidate.pattern_id.clone(),
            pattern_id: candidate.pattern_id,
            matched_text: candidate.matched_text,
            line: candidate.line,
            column: candidate.column,
            context,
            confidence: candidate.confidence,
            priority: candidate.priority,
            source: source.to_string(),
        }
    }
}

/// Largest index `<= i` that is a char boundary of `s`.
fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Smallest index `>= i` that is a char boundary of `s`.
fn ceil_char_boundary(s: &str, mut i: usize) -> usize {
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}
