//! Polite HTTP fetcher shared by discovery and chunking.
//!
//! Every request goes through a per-host rate limiter and a global
//! concurrency cap, and fails (never panics) on timeouts, non-2xx statuses,
//! oversized bodies, and anti-bot interstitials.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use capwatch_shared::{CapwatchError, CrawlConfig, Result};

/// User-Agent string for crawl requests.
const USER_AGENT: &str = concat!("capwatch/", env!("CARGO_PKG_VERSION"));

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Maximum response size we accept (10 MB).
const MAX_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;

/// Body markers of bot-challenge pages served with a 2xx status.
const BLOCK_MARKERS: &[&str] = &[
    "cf-challenge",
    "cf-browser-verification",
    "<title>just a moment...</title>",
    "attention required! | cloudflare",
    "please verify you are a human",
    "access denied</title>",
];

/// Captcha widgets. Real pages embed these in signup forms, so they only
/// count on a challenge-titled or near-empty page.
const CAPTCHA_MARKERS: &[&str] = &["g-recaptcha", "h-captcha"];

/// Title words of interstitials that carry a captcha widget.
const CHALLENGE_TITLE_WORDS: &[&str] = &["captcha", "verify", "security check", "robot", "human"];

/// Pages with less visible text than this are treated as interstitials.
const THIN_PAGE_TEXT_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// FetchedPage
// ---------------------------------------------------------------------------

/// A successfully fetched HTML document.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: Url,
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub body: String,
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

/// HTTP client wrapper enforcing timeouts, rate limits, and the SSRF guard.
///
/// Cheap to clone; clones share the rate limiter and concurrency cap.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    limiter: Arc<HostRateLimiter>,
    permits: Arc<Semaphore>,
    allow_private_hosts: bool,
}

impl Fetcher {
    /// Create a fetcher from the runtime crawl configuration.
    pub fn new(config: &CrawlConfig) -> Result<Self> {
        let user_agent = config.user_agent.as_deref().unwrap_or(USER_AGENT);
        let client = Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CapwatchError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            limiter: Arc::new(HostRateLimiter::new(Duration::from_millis(
                config.rate_limit_ms,
            ))),
            permits: Arc::new(Semaphore::new(config.concurrency.max(1) as usize)),
            allow_private_hosts: config.allow_private_hosts,
        })
    }

    /// Fetch `url` as text.
    pub async fn fetch(&self, url: &Url) -> Result<FetchedPage> {
        if !self.allow_private_hosts && is_ssrf_target(url) {
            warn!(%url, "SSRF protection: blocked");
            return Err(CapwatchError::Network(format!(
                "{url}: refusing to fetch private or non-http target"
            )));
        }

        let host = url.host_str().unwrap_or_default().to_string();
        self.limiter.wait(&host).await;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| CapwatchError::Network(format!("fetch limiter closed: {e}")))?;

        debug!(%url, "fetching");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| CapwatchError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CapwatchError::Network(format!("{url}: HTTP {status}")));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_RESPONSE_SIZE {
                return Err(CapwatchError::Network(format!(
                    "{url}: response too large ({len} bytes, max {MAX_RESPONSE_SIZE})"
                )));
            }
        }

        let final_url = response.url().clone();
        let body = read_body(response, url, MAX_RESPONSE_SIZE).await?;

        if looks_blocked(&body) {
            return Err(CapwatchError::Network(format!(
                "{url}: blocked by anti-bot challenge"
            )));
        }

        Ok(FetchedPage {
            url: final_url,
            status: status.as_u16(),
            body,
        })
    }
}

// ---------------------------------------------------------------------------
// Rate limiting
// ---------------------------------------------------------------------------

/// Hands out request slots per host spaced at least `min_interval` apart.
struct HostRateLimiter {
    min_interval: Duration,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl HostRateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(HashMap::new()),
        }
    }

    /// Sleep until this caller's slot for `host` arrives.
    async fn wait(&self, host: &str) {
        if self.min_interval.is_zero() {
            return;
        }

        let slot = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = slots
                .get(host)
                .copied()
                .filter(|t| *t > now)
                .unwrap_or(now);
            slots.insert(host.to_string(), slot + self.min_interval);
            slot
        };

        tokio::time::sleep_until(slot).await;
    }
}

// ---------------------------------------------------------------------------
// Response screening
// ---------------------------------------------------------------------------

/// Read the body in pieces, giving up as soon as it passes `limit` bytes.
///
/// `Content-Length` is checked before this; servers that omit it are caught here.
async fn read_body(mut response: reqwest::Response, url: &Url, limit: u64) -> Result<String> {
    let mut buf: Vec<u8> = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| CapwatchError::Network(format!("{url}: body read failed: {e}")))?
    {
        if (buf.len() + chunk.len()) as u64 > limit {
            return Err(CapwatchError::Network(format!(
                "{url}: response too large (max {limit} bytes)"
            )));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Whether a 2xx body is actually a bot-challenge interstitial.
pub fn looks_blocked(body: &str) -> bool {
    // Challenge pages are small; only inspect the head of large documents.
    let mut end = body.len().min(16 * 1024);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    let head = body[..end].to_lowercase();
    if BLOCK_MARKERS.iter().any(|m| head.contains(m)) {
        return true;
    }
    if !CAPTCHA_MARKERS.iter().any(|m| head.contains(m)) {
        return false;
    }
    let challenge_title = page_title(&head)
        .is_some_and(|t| CHALLENGE_TITLE_WORDS.iter().any(|w| t.contains(w)));
    challenge_title || visible_text_chars(body) < THIN_PAGE_TEXT_CHARS
}

/// Contents of the first `<title>` element of a lowercased document.
fn page_title(lower: &str) -> Option<&str> {
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let len = lower[start..].find("</title")?;
    Some(lower[start..start + len].trim())
}

/// Non-whitespace characters outside tags, scripts and styles.
fn visible_text_chars(html: &str) -> usize {
    let doc = scraper::Html::parse_document(html);
    doc.root_element()
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node
                .parent()
                .and_then(|p| p.value().as_element())
                .is_some_and(|el| matches!(el.name(), "script" | "style" | "noscript" | "title"));
            (!hidden).then(|| text.chars().filter(|c| !c.is_whitespace()).count())
        })
        .sum()
}

// ---------------------------------------------------------------------------
// SSRF protection
// ---------------------------------------------------------------------------

/// Check if a URL targets a potentially dangerous resource.
pub fn is_ssrf_target(url: &Url) -> bool {
    match url.scheme() {
        "http" | "https" => {}
        _ => return true,
    }

    match url.host() {
        Some(url::Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(url::Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(url::Host::Domain(host)) => {
            host == "localhost" || host.ends_with(".local") || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
                // 192.0.0.0/24
                || (v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0)
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}
