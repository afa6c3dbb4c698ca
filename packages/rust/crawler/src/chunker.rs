//! Heading-based page chunking.
//!
//! A page's visible text is split at `h2`/`h3` boundaries into
//! [`ContentChunk`]s. Text before the first boundary (or the whole page when
//! there are no boundaries) becomes a chunk with an empty heading.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, instrument};
use url::Url;

use capwatch_shared::{CapwatchError, ContentChunk, Result};

use crate::fetch::Fetcher;

/// Elements whose subtree never contributes text.
const NOISE_TAGS: &[&str] = &[
    "nav", "header", "footer", "aside", "script", "style", "noscript", "template", "svg",
    "iframe", "form",
];

/// Elements that start a new chunk.
const BOUNDARY_TAGS: &[&str] = &["h2", "h3"];

/// Elements whose edges separate words.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "section", "li", "ul", "ol", "td", "th", "tr", "table", "br", "h1", "h4", "h5",
    "h6", "dd", "dt", "dl", "blockquote", "pre", "figcaption", "article", "main",
];

/// Content-root candidates, most specific first.
static ROOT_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["main", "article", r#"[role="main"]"#, "body"]
        .into_iter()
        .map(|s| Selector::parse(s).expect("root selector"))
        .collect()
});

/// Fetch `url` and split it into chunks.
///
/// Fetch failures surface as `Network` errors; a page with no extractable
/// text is a `Parse` error.
#[instrument(skip_all, fields(url = %url))]
pub async fn chunk_page(fetcher: &Fetcher, url: &Url) -> Result<Vec<ContentChunk>> {
    let page = fetcher.fetch(url).await?;
    let chunks = extract_chunks(&page.body);

    if chunks.is_empty() {
        return Err(CapwatchError::parse(format!(
            "{url}: no text content found"
        )));
    }

    debug!(chunks = chunks.len(), "page chunked");
    Ok(chunks)
}

/// Split an HTML document into heading-delimited chunks.
pub fn extract_chunks(html: &str) -> Vec<ContentChunk> {
    let doc = Html::parse_document(html);

    let root = ROOT_SELECTORS
        .iter()
        .find_map(|sel| doc.select(sel).next())
        .unwrap_or_else(|| doc.root_element());

    let mut builder = ChunkBuilder::default();
    walk(root, &mut builder);
    builder.finish()
}

/// Depth-first text collection, starting a new section at each boundary.
fn walk(element: ElementRef<'_>, out: &mut ChunkBuilder) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_text(text),
            Node::Element(el) => {
                let name = el.name();
                if NOISE_TAGS.contains(&name) {
                    continue;
                }
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                if BOUNDARY_TAGS.contains(&name) {
                    let heading = child_el.text().collect::<Vec<_>>().join(" ");
                    out.start_section(normalize_whitespace(&heading));
                    continue;
                }

                let is_block = BLOCK_TAGS.contains(&name);
                if is_block {
                    out.push_break();
                }
                walk(child_el, out);
                if is_block {
                    out.push_break();
                }
            }
            _ => {}
        }
    }
}

/// Accumulates sections while walking the tree.
#[derive(Default)]
struct ChunkBuilder {
    chunks: Vec<ContentChunk>,
    heading: String,
    text: String,
}

impl ChunkBuilder {
    fn push_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn push_break(&mut self) {
        self.text.push(' ');
    }

    fn start_section(&mut self, heading: String) {
        self.flush();
        self.heading = heading;
    }

    fn flush(&mut self) {
        let text = normalize_whitespace(&self.text);
        if !text.is_empty() {
            self.chunks
                .push(ContentChunk::new(std::mem::take(&mut self.heading), text));
        }
        self.heading.clear();
        self.text.clear();
    }

    fn finish(mut self) -> Vec<ContentChunk> {
        self.flush();
        self.chunks
    }
}

/// Collapse all whitespace runs to single spaces and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
