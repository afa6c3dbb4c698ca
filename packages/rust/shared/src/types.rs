//! Core domain types for the capability-change crawler.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CapwatchError;

/// Fixed key under which the fingerprint map is stored.
pub const FINGERPRINT_STATE_KEY: &str = "competitor_source_state";

/// Normalise a free-form enum label: lower-case, spaces and hyphens to `_`.
fn normalize_label(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Implements `as_str`, `Display` and `FromStr` for a unit-variant enum
/// whose serialized form is snake_case.
macro_rules! label_enum {
    ($ty:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl $ty {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            /// Stable snake_case label used in storage and prompts.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = CapwatchError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match normalize_label(s).as_str() {
                    $($label => Ok($ty::$variant),)+
                    other => Err(CapwatchError::validation(format!(
                        "unknown {} '{other}'",
                        stringify!($ty)
                    ))),
                }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Competitor
// ---------------------------------------------------------------------------

/// Market segment of a competitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetitorCategory {
    Traditional,
    Modern,
}

label_enum!(CompetitorCategory {
    Traditional => "traditional",
    Modern => "modern",
});

/// A curated source URL attached to a competitor in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuratedSource {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<SourceCategory>,
}

/// A watched competitor. Identity is `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competitor {
    pub name: String,
    pub base_url: String,
    pub category: CompetitorCategory,
    #[serde(default)]
    pub description: String,
    /// Scheduling tier, 1 (most important) to 3.
    pub priority: u8,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Curated high-signal URLs crawled in addition to discovered ones.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<CuratedSource>,
}

fn default_enabled() -> bool {
    true
}

impl Competitor {
    /// Build an enabled competitor with no curated sources.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        category: CompetitorCategory,
        description: impl Into<String>,
        priority: u8,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            category,
            description: description.into(),
            priority,
            enabled: true,
            sources: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// SourceCandidate
// ---------------------------------------------------------------------------

/// Content category of a discovered source URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    ReleaseNotes,
    FeatureDocs,
    ApiChangelog,
    Deprecation,
    Other,
}

label_enum!(SourceCategory {
    ReleaseNotes => "release_notes",
    FeatureDocs => "feature_docs",
    ApiChangelog => "api_changelog",
    Deprecation => "deprecation",
    Other => "other",
});

/// A candidate URL produced by discovery. Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCandidate {
    /// Owning competitor name.
    pub competitor: String,
    pub url: String,
    pub label: String,
    pub category: SourceCategory,
}

// ---------------------------------------------------------------------------
// ContentChunk
// ---------------------------------------------------------------------------

/// One heading-delimited section of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentChunk {
    /// Section heading; empty for text outside any heading.
    pub heading: String,
    /// Whitespace-normalised visible text.
    pub text: String,
}

impl ContentChunk {
    pub fn new(heading: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            text: text.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// FingerprintState
// ---------------------------------------------------------------------------

/// Persistent `url -> { heading_key -> content_hash }` map.
///
/// Stored as one record under [`FINGERPRINT_STATE_KEY`] and replaced whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FingerprintState(pub BTreeMap<String, BTreeMap<String, String>>);

impl FingerprintState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded hashes for `url` (empty if the URL has never been seen).
    pub fn for_url(&self, url: &str) -> BTreeMap<String, String> {
        self.0.get(url).cloned().unwrap_or_default()
    }

    /// Hash recorded for one heading key of `url`.
    pub fn get(&self, url: &str, heading_key: &str) -> Option<&str> {
        self.0
            .get(url)
            .and_then(|m| m.get(heading_key))
            .map(String::as_str)
    }

    /// Record `hash` for `url`/`heading_key`.
    pub fn record(&mut self, url: &str, heading_key: &str, hash: &str) {
        self.0
            .entry(url.to_string())
            .or_default()
            .insert(heading_key.to_string(), hash.to_string());
    }

    /// Number of URLs tracked.
    pub fn url_count(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Classification taxonomy
// ---------------------------------------------------------------------------

/// Product area a capability change belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Ai,
    Consolidation,
    Reporting,
    Integrations,
    Procurement,
    Automation,
    RevenueRecognition,
    AccountsPayable,
    AccountsReceivable,
    GeneralLedger,
    CloseManagement,
    Unspecified,
}

label_enum!(Theme {
    Ai => "ai",
    Consolidation => "consolidation",
    Reporting => "reporting",
    Integrations => "integrations",
    Procurement => "procurement",
    Automation => "automation",
    RevenueRecognition => "revenue_recognition",
    AccountsPayable => "accounts_payable",
    AccountsReceivable => "accounts_receivable",
    GeneralLedger => "general_ledger",
    CloseManagement => "close_management",
    Unspecified => "unspecified",
});

/// Kind of capability change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    NewCapability,
    Enhancement,
    Deprecation,
    Limitation,
    Unspecified,
}

label_enum!(ChangeType {
    NewCapability => "new_capability",
    Enhancement => "enhancement",
    Deprecation => "deprecation",
    Limitation => "limitation",
    Unspecified => "unspecified",
});

/// Whether a changed chunk was never seen before or seen with different content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOrigin {
    New,
    Modified,
}

label_enum!(ChangeOrigin {
    New => "new",
    Modified => "modified",
});

// ---------------------------------------------------------------------------
// CapabilityEvent
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for event identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A classified, human-summarised record of one detected product change.
///
/// Immutable once stored; unique on `(competitor, evidence_url, heading, content_hash)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityEvent {
    pub id: EventId,
    pub competitor: String,
    pub theme: Theme,
    pub change_type: ChangeType,
    /// One product-language sentence.
    pub claim: String,
    /// Plain-language bullets: meaning, why it matters, competitive insight.
    pub beginner_summary: Vec<String>,
    pub evidence_url: String,
    pub evidence_snippet: String,
    /// Heading text of the chunk this event was produced from, as it appears on the page.
    pub heading: String,
    /// SHA-256 fingerprint of the chunk.
    pub content_hash: String,
    pub change_origin: ChangeOrigin,
    pub source_category: SourceCategory,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Crawl run reporting
// ---------------------------------------------------------------------------

/// Lifecycle of a crawl run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
}

label_enum!(RunState {
    Idle => "idle",
    Running => "running",
    Completed => "completed",
    Failed => "failed",
});

/// Statistics returned by a crawl run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub status: RunState,
    pub events_created: usize,
    pub sources_crawled: usize,
    pub sources_failed: usize,
    /// Competitors included in the run, by priority then name.
    pub competitors: Vec<String>,
    pub duration_seconds: f64,
}

/// Aggregate view of the event store for `status()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlStatusReport {
    pub total_events: u64,
    /// `(competitor, count)` ordered by count descending.
    pub per_competitor: Vec<(String, u64)>,
    /// `(theme, count)` ordered by count descending, at most ten.
    pub per_theme: Vec<(String, u64)>,
    /// Finish time of the most recent completed run.
    pub last_run_at: Option<DateTime<Utc>>,
}
