//! Shared types, error model, and configuration for capwatch.
//!
//! This crate is the foundation depended on by all other capwatch crates.
//! It provides:
//! - [`CapwatchError`]: the unified error type
//! - Domain types ([`Competitor`], [`SourceCandidate`], [`ContentChunk`],
//!   [`FingerprintState`], [`CapabilityEvent`], [`CrawlResult`])
//! - Configuration ([`AppConfig`], [`CrawlConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ClassifierConfig, CrawlConfig, CrawlSettings, DefaultsConfig, MAX_PRIORITY,
    ScheduleConfig, classifier_api_key, config_dir, config_file_path, expand_home, init_config,
    load_config, load_config_from, parse_config, validate_config, validate_priority,
};
pub use error::{CapwatchError, Result};
pub use types::{
    CapabilityEvent, ChangeOrigin, ChangeType, Competitor, CompetitorCategory, ContentChunk,
    CrawlResult, CrawlStatusReport, CuratedSource, EventId, FINGERPRINT_STATE_KEY,
    FingerprintState, RunState, SourceCandidate, SourceCategory, Theme,
};
