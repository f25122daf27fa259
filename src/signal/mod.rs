//! Signal detection
//!
//! Scans PRP text for inline status markers (`[tp]`, `[bl]`, ...) against a
//! runtime-managed pattern registry, scores each match, suppresses
//! duplicates within a time window, and emits ranked [`DetectedSignal`]s.

mod detector;
mod duplicate;
mod registry;
mod types;

pub use detector::SignalDetector;
pub use duplicate::{DuplicateCache, DuplicateRecord};
pub use registry::PatternRegistry;
pub use types::{DetectedSignal, DetectionReport, SignalPattern, SignalPriority};
