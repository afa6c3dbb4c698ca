//! Chunk fingerprinting and change detection.
//!
//! Each chunk is keyed by its normalised heading and fingerprinted with
//! SHA-256 over `heading + "\n" + text`. Comparing against the stored map for
//! the URL yields new and modified chunks; removed headings produce nothing.

use std::collections::{BTreeMap, HashMap};

use sha2::{Digest, Sha256};

use capwatch_shared::{ChangeOrigin, ContentChunk};

/// Maximum heading-key length in characters.
const MAX_KEY_CHARS: usize = 120;

// ---------------------------------------------------------------------------
// Fingerprints
// ---------------------------------------------------------------------------

/// Stable hex SHA-256 of a chunk.
pub fn content_hash(heading: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(heading.as_bytes());
    hasher.update(b"\n");
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Normalised identity of a heading within its page.
pub fn heading_key(heading: &str) -> String {
    heading
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .chars()
        .take(MAX_KEY_CHARS)
        .collect()
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// A chunk whose fingerprint differs from the stored state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedChunk {
    pub url: String,
    pub heading: String,
    /// State key (unique within the page).
    pub key: String,
    pub text: String,
    pub hash: String,
    pub origin: ChangeOrigin,
}

/// Compare `chunks` of `url` against its stored `{key -> hash}` map.
///
/// Output keeps page order. Repeated keys on one page get a ` #2`, ` #3`
/// suffix so every chunk has its own slot in the state.
pub fn detect_changes(
    url: &str,
    chunks: &[ContentChunk],
    previous: &BTreeMap<String, String>,
) -> Vec<ChangedChunk> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut changed = Vec::new();

    for chunk in chunks {
        let base = heading_key(&chunk.heading);
        let n = seen.entry(base.clone()).or_default();
        *n += 1;
        let key = if *n == 1 { base } else { format!("{base} #{n}") };

        let hash = content_hash(&chunk.heading, &chunk.text);
        let origin = match previous.get(&key) {
            None => ChangeOrigin::New,
            Some(old) if *old != hash => ChangeOrigin::Modified,
            Some(_) => continue,
        };

        changed.push(ChangedChunk {
            url: url.to_string(),
            heading: chunk.heading.clone(),
            key,
            text: chunk.text.clone(),
            hash,
            origin,
        });
    }

    changed
}
