//! High-signal source discovery for a competitor.
//!
//! Fetches the competitor's base URL, extracts same-site links, and keeps
//! those whose path or anchor text matches one of the release-notes,
//! feature-docs, API-changelog, or deprecation patterns. Output is bounded
//! per category and per competitor so a crawl's cost stays predictable.

mod matcher;

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use capwatch_crawler::Fetcher;
use capwatch_shared::{Competitor, CrawlConfig, SourceCandidate, SourceCategory};

pub use matcher::{classify_link, clean_url, is_same_site, source_label};

static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("link selector"));

// ---------------------------------------------------------------------------
// DiscoveryResult
// ---------------------------------------------------------------------------

/// Outcome of discovering sources for one competitor.
#[derive(Debug, Clone)]
pub enum DiscoveryResult {
    /// The base URL was fetched; `sources` holds curated plus matched links.
    Found { sources: Vec<SourceCandidate> },
    /// The base URL could not be fetched or parsed. Curated sources are still
    /// returned so they can be crawled.
    Failed {
        curated: Vec<SourceCandidate>,
        reason: String,
    },
}

impl DiscoveryResult {
    /// Sources to crawl, regardless of outcome.
    pub fn sources(&self) -> &[SourceCandidate] {
        match self {
            Self::Found { sources } => sources,
            Self::Failed { curated, .. } => curated,
        }
    }

    /// Consume into the sources to crawl.
    pub fn into_sources(self) -> Vec<SourceCandidate> {
        match self {
            Self::Found { sources } => sources,
            Self::Failed { curated, .. } => curated,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

// ---------------------------------------------------------------------------
// Discovery options
// ---------------------------------------------------------------------------

/// Bounds on discovery output.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Maximum sources per competitor (curated included).
    pub max_sources: usize,
    /// Maximum discovered links per category.
    pub max_per_category: usize,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self::from(&CrawlConfig::default())
    }
}

impl From<&CrawlConfig> for DiscoveryOptions {
    fn from(config: &CrawlConfig) -> Self {
        Self {
            max_sources: config.max_sources_per_competitor,
            max_per_category: config.max_sources_per_category,
        }
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Discover candidate sources for `competitor`.
///
/// Never returns an error: fetch failures (network, non-2xx, timeout,
/// anti-bot block) come back as [`DiscoveryResult::Failed`].
#[instrument(skip_all, fields(competitor = %competitor.name))]
pub async fn discover(
    competitor: &Competitor,
    fetcher: &Fetcher,
    opts: &DiscoveryOptions,
) -> DiscoveryResult {
    let curated = curated_sources(competitor, opts);

    let base_url = match Url::parse(&competitor.base_url) {
        Ok(url) => url,
        Err(e) => {
            warn!(base_url = %competitor.base_url, error = %e, "invalid base URL");
            return DiscoveryResult::Failed {
                curated,
                reason: format!("invalid base URL '{}': {e}", competitor.base_url),
            };
        }
    };

    info!(%base_url, "discovering sources");

    let page = match fetcher.fetch(&base_url).await {
        Ok(page) => page,
        Err(e) => {
            warn!(error = %e, "could not fetch base URL");
            return DiscoveryResult::Failed {
                curated,
                reason: e.to_string(),
            };
        }
    };

    let links = extract_links(&page.body, &page.url);
    let sources = select_sources(competitor, &base_url, links, curated, opts);

    info!(sources = sources.len(), "discovered sources");
    DiscoveryResult::Found { sources }
}

/// Curated sources from the registry entry, capped and deduplicated.
fn curated_sources(competitor: &Competitor, opts: &DiscoveryOptions) -> Vec<SourceCandidate> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for source in &competitor.sources {
        let Ok(url) = Url::parse(&source.url) else {
            warn!(url = %source.url, "skipping unparseable curated source");
            continue;
        };
        let url = clean_url(&url);
        if !seen.insert(url.to_string()) || out.len() >= opts.max_sources {
            continue;
        }
        let label = source
            .label
            .clone()
            .unwrap_or_else(|| source_label(&url, ""));
        out.push(SourceCandidate {
            competitor: competitor.name.clone(),
            url: url.to_string(),
            label,
            category: source.category.unwrap_or(SourceCategory::Other),
        });
    }

    out
}

/// Merge curated sources with matched same-site links under the caps.
fn select_sources(
    competitor: &Competitor,
    base_url: &Url,
    links: Vec<(Url, String)>,
    curated: Vec<SourceCandidate>,
    opts: &DiscoveryOptions,
) -> Vec<SourceCandidate> {
    let mut seen: HashSet<String> = curated.iter().map(|s| s.url.clone()).collect();
    let mut per_category: HashMap<SourceCategory, usize> = HashMap::new();
    let mut sources = curated;

    for (link, anchor_text) in links {
        if sources.len() >= opts.max_sources {
            break;
        }
        if !matches!(link.scheme(), "http" | "https") || !is_same_site(base_url, &link) {
            continue;
        }

        let link = clean_url(&link);
        let key = link.to_string();
        if seen.contains(&key) {
            continue;
        }

        let Some(category) = classify_link(&link, &anchor_text) else {
            continue;
        };
        let count = per_category.entry(category).or_default();
        if *count >= opts.max_per_category {
            continue;
        }
        *count += 1;
        seen.insert(key.clone());

        debug!(%category, url = %key, "found source");
        sources.push(SourceCandidate {
            competitor: competitor.name.clone(),
            label: source_label(&link, &anchor_text),
            url: key,
            category,
        });
    }

    sources
}

/// Extract `(resolved_url, anchor_text)` pairs from a document.
fn extract_links(html: &str, base_url: &Url) -> Vec<(Url, String)> {
    let doc = Html::parse_document(html);
    let mut links = Vec::new();

    for el in doc.select(&LINK_SELECTOR) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        // Skip anchors, javascript:, mailto:
        if href.starts_with('#') || href.starts_with("javascript:") || href.starts_with("mailto:")
        {
            continue;
        }
        if let Ok(resolved) = base_url.join(href) {
            let text = el.text().collect::<Vec<_>>().join(" ");
            links.push((resolved, text));
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use capwatch_shared::{CompetitorCategory, CuratedSource};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_fetcher() -> Fetcher {
        let config = CrawlConfig {
            rate_limit_ms: 0,
            allow_private_hosts: true,
            ..CrawlConfig::default()
        };
        Fetcher::new(&config).unwrap()
    }

    fn competitor(base_url: &str) -> Competitor {
        Competitor::new(
            "Acme",
            base_url,
            CompetitorCategory::Modern,
            "AI-native ERP",
            1,
        )
    }

    const HOMEPAGE: &str = r##"<html><body>
        <nav>
          <a href="/release-notes">Release Notes</a>
          <a href="/product/features#ai">Features</a>
          <a href="/developers/api/changelog">API Changelog</a>
          <a href="/legal/end-of-life">Product lifecycle</a>
          <a href="/pricing">Pricing</a>
          <a href="#top">Top</a>
          <a href="mailto:sales@acme.test">Contact</a>
          <a href="https://elsewhere.test/whats-new">What's New elsewhere</a>
          <a href="/release-notes?utm_source=nav">Release Notes again</a>
        </nav>
    </body></html>"##;

    #[tokio::test]
    async fn discovers_categorised_same_site_links() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(HOMEPAGE))
            .mount(&server)
            .await;

        let comp = competitor(&server.uri());
        let result = discover(&comp, &test_fetcher(), &DiscoveryOptions::default()).await;
        assert!(!result.is_failed());

        let sources = result.into_sources();
        let summary: Vec<(&str, SourceCategory)> = sources
            .iter()
            .map(|s| (s.label.as_str(), s.category))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Release Notes", SourceCategory::ReleaseNotes),
                ("Features", SourceCategory::FeatureDocs),
                ("API Changelog", SourceCategory::ApiChangelog),
                ("Product lifecycle", SourceCategory::Deprecation),
            ]
        );
        assert_eq!(sources[1].url, format!("{}/product/features", server.uri()));
        assert!(sources.iter().all(|s| s.competitor == "Acme"));
    }

    #[tokio::test]
    async fn caps_per_category_and_competitor() {
        let server = MockServer::start().await;
        let links: String = (0..10)
            .map(|i| format!(r#"<a href="/release-notes/{i}">Release notes {i}</a>"#))
            .chain((0..10).map(|i| format!(r#"<a href="/features/{i}">Feature {i}</a>"#)))
            .collect();
        Mock::given(path("/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(format!("<body>{links}</body>")),
            )
            .mount(&server)
            .await;

        let opts = DiscoveryOptions {
            max_sources: 7,
            max_per_category: 4,
        };
        let sources = discover(&competitor(&server.uri()), &test_fetcher(), &opts)
            .await
            .into_sources();

        assert_eq!(sources.len(), 7);
        let release = sources
            .iter()
            .filter(|s| s.category == SourceCategory::ReleaseNotes)
            .count();
        assert_eq!(release, 4);
    }

    #[tokio::test]
    async fn fetch_failure_is_reported_not_raised() {
        let server = MockServer::start().await;
        Mock::given(path("/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = discover(
            &competitor(&server.uri()),
            &test_fetcher(),
            &DiscoveryOptions::default(),
        )
        .await;

        match result {
            DiscoveryResult::Failed { curated, reason } => {
                assert!(curated.is_empty());
                assert!(reason.contains("503"));
            }
            DiscoveryResult::Found { .. } => panic!("expected Failed"),
        }
    }

    #[tokio::test]
    async fn curated_sources_survive_failure_and_lead_output() {
        let server = MockServer::start().await;
        Mock::given(path("/"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let mut comp = competitor(&server.uri());
        comp.sources = vec![
            CuratedSource {
                url: format!("{}/changelog#top", server.uri()),
                label: Some("Changelog".into()),
                category: Some(SourceCategory::ReleaseNotes),
            },
            CuratedSource {
                url: format!("{}/docs/ai", server.uri()),
                label: None,
                category: None,
            },
        ];

        let result = discover(&comp, &test_fetcher(), &DiscoveryOptions::default()).await;
        assert!(result.is_failed());
        let sources = result.sources();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].url, format!("{}/changelog", server.uri()));
        assert_eq!(sources[1].label, "ai");
        assert_eq!(sources[1].category, SourceCategory::Other);
    }

    #[tokio::test]
    async fn invalid_base_url_fails() {
        let comp = competitor("not a url");
        let result = discover(&comp, &test_fetcher(), &DiscoveryOptions::default()).await;
        assert!(result.is_failed());
    }

    #[test]
    fn extract_links_resolves_relative() {
        let html = r##"<a href="/page2">Page 2</a><a href="#x">Anchor</a><a href="rel/path">Rel</a>"##;
        let base = Url::parse("https://acme.test/docs/").unwrap();
        let links = extract_links(html, &base);
        let urls: Vec<String> = links.iter().map(|(u, _)| u.to_string()).collect();
        assert_eq!(
            urls,
            vec![
                "https://acme.test/page2".to_string(),
                "https://acme.test/docs/rel/path".to_string()
            ]
        );
        assert_eq!(links[0].1, "Page 2");
    }
}
