//! Page fetching and heading-based chunking.
//!
//! This crate provides:
//! - [`fetch`]: polite HTTP fetcher (timeouts, per-host rate limit, global
//!   concurrency cap, SSRF guard, anti-bot detection)
//! - [`chunker`]: splits a fetched page into [`ContentChunk`](capwatch_shared::ContentChunk)s

pub mod chunker;
pub mod fetch;

pub use chunker::{chunk_page, extract_chunks, normalize_whitespace};
pub use fetch::{FetchedPage, Fetcher, is_ssrf_target, looks_blocked};
