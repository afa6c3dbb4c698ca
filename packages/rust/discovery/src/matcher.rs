//! Keyword classification of candidate links.
//!
//! A link is matched on its path plus anchor text against four category
//! pattern sets. Sets are tried most specific first so that an API changelog
//! is not swallowed by the generic `changelog` release-notes pattern.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use capwatch_shared::SourceCategory;

/// Maximum label length in characters.
const MAX_LABEL_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

static API_CHANGELOG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)api.*changelog|api.*release|api.*updates?|developer.*changelog")
        .expect("api changelog regex")
});

static DEPRECATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)deprecat|sunset|end[-_ ]?of[-_ ]?life|\beol\b|retiring")
        .expect("deprecation regex")
});

static RELEASE_NOTES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)release[-_ ]?notes?|what'?s[-_ ]?new|changelog|product[-_ ]?updates?|latest[-_ ]?updates?|announcements?",
    )
    .expect("release notes regex")
});

static FEATURE_DOCS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)features?|capabilities|documentation|\bdocs?\b|product[-_ ]?guide|user[-_ ]?guide")
        .expect("feature docs regex")
});

/// Category pattern sets in match order.
static CATEGORY_PATTERNS: LazyLock<[(SourceCategory, &'static Regex); 4]> = LazyLock::new(|| {
    [
        (SourceCategory::ApiChangelog, &*API_CHANGELOG_RE),
        (SourceCategory::Deprecation, &*DEPRECATION_RE),
        (SourceCategory::ReleaseNotes, &*RELEASE_NOTES_RE),
        (SourceCategory::FeatureDocs, &*FEATURE_DOCS_RE),
    ]
});

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Classify a link by its path and anchor text. `None` means not high-signal.
pub fn classify_link(url: &Url, anchor_text: &str) -> Option<SourceCategory> {
    let haystack = format!("{} {}", url.path(), anchor_text).to_lowercase();
    CATEGORY_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(&haystack))
        .map(|(category, _)| *category)
}

/// Human label for a source: anchor text, else last path segment, else
/// `"Documentation"`; at most 200 characters.
pub fn source_label(url: &Url, anchor_text: &str) -> String {
    let anchor = anchor_text.split_whitespace().collect::<Vec<_>>().join(" ");
    let label = if !anchor.is_empty() {
        anchor
    } else {
        url.path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .map(str::to_string)
            .unwrap_or_else(|| "Documentation".to_string())
    };
    label.chars().take(MAX_LABEL_CHARS).collect()
}

/// Host without a leading `www.`.
fn site_host(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Whether `link` is on the same site as `base` (same host or a subdomain).
pub fn is_same_site(base: &Url, link: &Url) -> bool {
    let (Some(base_host), Some(link_host)) = (base.host_str(), link.host_str()) else {
        return false;
    };
    let base_host = site_host(base_host);
    let link_host = site_host(link_host);
    link_host == base_host || link_host.ends_with(&format!(".{base_host}"))
}

/// Normalise a candidate URL to `scheme://host[:port]/path`.
pub fn clean_url(url: &Url) -> Url {
    let mut cleaned = url.clone();
    cleaned.set_query(None);
    cleaned.set_fragment(None);
    cleaned
}
