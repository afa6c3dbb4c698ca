//! Core pipeline orchestration and domain logic for capwatch.
//!
//! This crate ties together the competitor registry, source discovery, page
//! chunking, change detection and classification into crawl runs driven by
//! [`CapabilityWatch`].

pub mod classify;
pub mod detect;
pub mod pipeline;
pub mod registry;

pub use classify::{
    Classification, Classifier, ClassifyInput, FallbackClassifier, OpenRouterClassifier,
    classify_or_fallback, fallback_classification,
};
pub use detect::{ChangedChunk, content_hash, detect_changes, heading_key};
pub use pipeline::{
    CapabilityWatch, CompetitorSources, ProgressReporter, RunGuard, RunTicket, SilentProgress,
    discover_sources,
};
pub use registry::Registry;
