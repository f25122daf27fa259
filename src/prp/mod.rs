//! PRP document parsing and section extraction
//!
//! A PRP is a markdown-ish document divided into named sections (Goal,
//! Progress, Plan, ...). The extractor turns sections into shareable
//! [`ContextSection`] units, ranks them against detected signals, and pulls
//! structured signal history out of the Progress section.

mod extractor;
mod types;

pub use extractor::{ParsedStructure, SectionExtractor};
pub use types::{ContextSection, PrpDocument, SectionType, SignalHistoryEntry};
