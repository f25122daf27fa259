//! Section parsing, relevance scoring and signal-history extraction

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::signal::DetectedSignal;

use super::types::{ContextSection, PrpDocument, SectionType, SignalHistoryEntry};

/// Score added when the section text mentions the signal's type name.
const TYPE_MENTION_SCORE: f64 = 10.0;
/// Score added per shared word between signal data and section text.
const SHARED_WORD_SCORE: f64 = 2.0;
/// Minimum word length considered in shared-word scoring.
const SHARED_WORD_MIN_LEN: usize = 3;

/// Result of parsing a full document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedStructure {
    /// Sections found in the document, in canonical type order
    pub sections: Vec<ContextSection>,
    /// Sum of the sections' token estimates
    pub total_tokens: usize,
}

/// Parses PRP documents into shareable context sections
///
/// Extraction is pure text processing: no suspension points, no shared
/// state. A missing section is a `NotFound` error from `extract_section`
/// and simply absent from `parse_structure`.
#[derive(Debug, Default)]
pub struct SectionExtractor;

impl SectionExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Parse every recognized section out of `document`.
    pub fn parse_structure(&self, document: &PrpDocument) -> ParsedStructure {
        let mut sections = Vec::new();
        for section_type in SectionType::ALL {
            if let Some(body) = find_section_body(&document.content, section_type) {
                sections.push(self.build_section(document, section_type, &body));
            }
        }
        let total_tokens = sections.iter().map(|s| s.token_count).sum();
        ParsedStructure {
            sections,
            total_tokens,
        }
    }

    /// Extract one named section as a shareable context unit.
    pub fn extract_section(
        &self,
        document: &PrpDocument,
        section_type: SectionType,
    ) -> Result<ContextSection> {
        let body = find_section_body(&document.content, section_type).ok_or_else(|| {
            Error::NotFound(format!(
                "document '{}' has no {} section",
                document.name, section_type
            ))
        })?;
        Ok(self.build_section(document, section_type, &body))
    }

    /// Extract the sections relevant to `signal`, scored and sorted
    /// descending. Sections that fail to score stay out of the result
    /// rather than aborting the pass.
    pub fn extract_relevant_sections(
        &self,
        document: &PrpDocument,
        signal: &DetectedSignal,
    ) -> Vec<ContextSection> {
        let mut relevant = Vec::new();
        for section_type in SectionType::ALL {
            let Some(body) = find_section_body(&document.content, section_type) else {
                continue;
            };
            let score = self.score_relevance(section_type, &body, signal);
            if score <= 0.0 {
                continue;
            }
            let mut section = self.build_section(document, section_type, &body);
            section.relevance_score = Some(score);
            relevant.push(section);
        }
        relevant.sort_by(|a, b| {
            b.relevance_score
                .unwrap_or(0.0)
                .total_cmp(&a.relevance_score.unwrap_or(0.0))
        });
        relevant
    }

    /// Rank a section body against a signal.
    pub fn score_relevance(
        &self,
        section_type: SectionType,
        body: &str,
        signal: &DetectedSignal,
    ) -> f64 {
        let body_lower = body.to_lowercase();
        let type_lower = signal.signal_type.to_lowercase();
        let mut score = section_type.base_relevance();

        if body_lower.contains(&type_lower) {
            score += TYPE_MENTION_SCORE;
        }

        let signal_data = serde_json::to_string(signal).unwrap_or_default();
        let signal_words = significant_words(&signal_data);
        let body_words = significant_words(&body_lower);
        score += signal_words.intersection(&body_words).count() as f64 * SHARED_WORD_SCORE;

        score += match section_type {
            SectionType::Progress if body_lower.contains(&type_lower) => 5.0,
            SectionType::Plan
                if type_lower.contains("implement") || type_lower.contains("develop") =>
            {
                5.0
            }
            SectionType::Signals => 15.0,
            _ => 0.0,
        };

        score
    }

    /// Parse the Progress section's signal log.
    ///
    /// Expected line shape: `[type] ISO-timestamp context | agent | ...`.
    /// Malformed lines are skipped, never fatal.
    pub fn extract_signal_history(&self, document: &PrpDocument) -> Vec<SignalHistoryEntry> {
        let Some(body) = find_section_body(&document.content, SectionType::Progress) else {
            return Vec::new();
        };

        let mut entries = Vec::new();
        for line in body.lines() {
            match parse_history_line(line.trim()) {
                Some(entry) => entries.push(entry),
                None if !line.trim().is_empty() => {
                    tracing::debug!(document = %document.name, line, "Skipped malformed history line");
                }
                None => {}
            }
        }
        entries
    }

    fn build_section(
        &self,
        document: &PrpDocument,
        section_type: SectionType,
        body: &str,
    ) -> ContextSection {
        ContextSection {
            id: format!("{}:{}", document.name, section_type.key()),
            name: section_type.display_name().to_string(),
            content: body.to_string(),
            token_count: estimate_tokens(body),
            priority: section_type.priority(),
            required: section_type.required(),
            compressible: section_type.compressible(),
            last_updated: document.last_modified,
            source: document.name.clone(),
            version: 1,
            tags: vec!["prp".to_string(), section_type.key().to_string()],
            required_permissions: section_type.required_permissions(),
            dependencies: section_type
                .dependencies()
                .iter()
                .map(|d| d.key().to_string())
                .collect(),
            relevance_score: None,
            last_accessed: chrono::Utc::now().timestamp_millis(),
            access_count: 0,
        }
    }
}

/// Token estimate: ceil(character length / 4).
fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Words longer than the minimum, lowercased, alphanumeric runs only.
fn significant_words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| w.len() > SHARED_WORD_MIN_LEN)
        .map(|w| w.to_lowercase())
        .collect()
}

/// Locate the body of a section: a `#`-prefixed heading matching one of the
/// type's aliases, through to the next heading or end of document.
fn find_section_body(content: &str, section_type: SectionType) -> Option<String> {
    let mut body: Option<Vec<&str>> = None;
    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            if body.is_some() {
                break;
            }
            let heading = trimmed.trim_start_matches('#').trim().to_lowercase();
            if heading_matches(&heading, section_type) {
                body = Some(Vec::new());
            }
            continue;
        }
        if let Some(lines) = body.as_mut() {
            lines.push(line);
        }
    }
    body.map(|lines| lines.join("\n").trim().to_string())
}

fn heading_matches(heading: &str, section_type: SectionType) -> bool {
    section_type.heading_aliases().iter().any(|alias| {
        heading == *alias
            || heading
                .strip_prefix(alias)
                .is_some_and(|rest| rest.starts_with(|c: char| !c.is_alphanumeric()))
    })
}

/// Parse one `[type] ISO-timestamp context | agent | ...` line.
fn parse_history_line(line: &str) -> Option<SignalHistoryEntry> {
    let rest = line.strip_prefix('[')?;
    let (signal_type, rest) = rest.split_once(']')?;
    if signal_type.is_empty()
        || !signal_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return None;
    }

    let rest = rest.trim_start();
    let (raw_timestamp, rest) = rest.split_once(' ').unwrap_or((rest, ""));
    let timestamp = chrono::DateTime::parse_from_rfc3339(raw_timestamp)
        .ok()?
        .timestamp_millis();

    let mut parts = rest.split('|').map(str::trim);
    let context = parts.next().unwrap_or("").to_string();
    let agent = parts.next().filter(|a| !a.is_empty()).map(str::to_string);

    Some(SignalHistoryEntry {
        signal_type: signal_type.to_string(),
        timestamp,
        context,
        agent,
    })
}
