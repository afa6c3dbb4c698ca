//! Crawl orchestration: registry → discover → chunk → detect → classify → persist.
//!
//! [`CapabilityWatch`] is the trigger surface used by the CLI. A run moves
//! `Idle → Running → {Completed, Failed}`; only one run may be active per
//! database, and a second start is rejected with
//! [`CapwatchError::AlreadyRunning`]. The in-process [`RunGuard`] rejects
//! overlapping starts on one instance; the `crawl_runs` row claimed by
//! [`Storage::insert_crawl_run`] rejects them across processes.
//!
//! Per-source work (fetch, chunk, detect, classify) runs on a bounded set of
//! tasks. Persistence stays on the calling task, in discovery order, and the
//! fingerprint map is written back once at the end of the run.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use capwatch_crawler::{Fetcher, chunk_page};
use capwatch_discovery::{DiscoveryOptions, DiscoveryResult};
use capwatch_shared::{
    CapabilityEvent, CapwatchError, Competitor, CrawlConfig, CrawlResult, CrawlStatusReport,
    EventId, FingerprintState, Result, RunState, SourceCandidate, validate_priority,
};
use capwatch_storage::Storage;

use crate::classify::{Classification, Classifier, ClassifyInput, classify_or_fallback, truncate_chars};
use crate::detect::{ChangedChunk, detect_changes};
use crate::registry::Registry;

/// Maximum characters of chunk text kept as event evidence.
pub const MAX_SNIPPET_CHARS: usize = 2000;

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after discovery finishes for one competitor.
    fn competitor_discovered(&self, competitor: &str, sources: usize);
    /// Called as each source finishes processing.
    fn source_done(&self, url: &str, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, result: &CrawlResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn competitor_discovered(&self, _competitor: &str, _sources: usize) {}
    fn source_done(&self, _url: &str, _current: usize, _total: usize) {}
    fn done(&self, _result: &CrawlResult) {}
}

// ---------------------------------------------------------------------------
// Run guard
// ---------------------------------------------------------------------------

/// Single-flight flag shared by manual and scheduled runs of one instance.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

/// Held for the lifetime of a run; releases the guard on drop.
#[derive(Debug)]
pub struct RunTicket {
    running: Arc<AtomicBool>,
}

impl RunGuard {
    /// Claim the guard, or fail with `AlreadyRunning`.
    pub fn try_start(&self) -> Result<RunTicket> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CapwatchError::AlreadyRunning)?;
        Ok(RunTicket {
            running: Arc::clone(&self.running),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> RunState {
        if self.is_running() {
            RunState::Running
        } else {
            RunState::Idle
        }
    }
}

impl Drop for RunTicket {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Discovery view
// ---------------------------------------------------------------------------

/// Discovered sources for one competitor.
#[derive(Debug, Clone)]
pub struct CompetitorSources {
    pub competitor: Competitor,
    pub sources: Vec<SourceCandidate>,
    /// Why discovery failed, if it did. Curated sources are still listed.
    pub failure: Option<String>,
}

/// Discover sources for every enabled competitor with `priority <= max_priority`.
///
/// Read-only: touches the network but never the store.
#[instrument(skip_all, fields(priority = max_priority))]
pub async fn discover_sources(
    registry: &Registry,
    fetcher: &Fetcher,
    opts: &DiscoveryOptions,
    max_priority: u8,
    progress: &dyn ProgressReporter,
) -> Result<Vec<CompetitorSources>> {
    validate_priority(max_priority)?;

    let mut groups = Vec::new();
    for competitor in registry.list(max_priority) {
        progress.phase(&format!("Discovering {}", competitor.name));
        let result = capwatch_discovery::discover(&competitor, fetcher, opts).await;
        let failure = match &result {
            DiscoveryResult::Failed { reason, .. } => Some(reason.clone()),
            DiscoveryResult::Found { .. } => None,
        };
        let sources = result.into_sources();
        progress.competitor_discovered(&competitor.name, sources.len());
        groups.push(CompetitorSources {
            competitor,
            sources,
            failure,
        });
    }

    Ok(groups)
}

// ---------------------------------------------------------------------------
// CapabilityWatch
// ---------------------------------------------------------------------------

/// The crawl service: registry, store, fetcher, classifier and run guard.
pub struct CapabilityWatch {
    registry: Registry,
    storage: Storage,
    fetcher: Fetcher,
    classifier: Arc<dyn Classifier>,
    config: CrawlConfig,
    guard: RunGuard,
}

/// Outcome of one source worker.
struct SourceOutcome {
    index: usize,
    source: SourceCandidate,
    result: Result<Vec<(ChangedChunk, Classification)>>,
}

impl CapabilityWatch {
    pub fn new(
        registry: Registry,
        storage: Storage,
        config: CrawlConfig,
        classifier: Arc<dyn Classifier>,
    ) -> Result<Self> {
        let fetcher = Fetcher::new(&config)?;
        Ok(Self {
            registry,
            storage,
            fetcher,
            classifier,
            config,
            guard: RunGuard::default(),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Current run state of this instance.
    pub fn state(&self) -> RunState {
        self.guard.state()
    }

    /// Grouped discovery without crawling.
    pub async fn discover(
        &self,
        max_priority: u8,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<CompetitorSources>> {
        discover_sources(
            &self.registry,
            &self.fetcher,
            &DiscoveryOptions::from(&self.config),
            max_priority,
            progress,
        )
        .await
    }

    /// Most recent events first.
    pub async fn list_events(&self, limit: u32) -> Result<Vec<CapabilityEvent>> {
        self.storage.list_events(limit).await
    }

    pub async fn status(&self) -> Result<CrawlStatusReport> {
        self.storage.status_report().await
    }

    /// Run the full pipeline once.
    ///
    /// Source-level failures are counted in the result. Store failures abort
    /// the run and are returned as errors.
    #[instrument(skip_all, fields(priority = max_priority, max_urls = ?max_urls))]
    pub async fn crawl(
        &self,
        max_priority: u8,
        max_urls: Option<usize>,
        progress: &dyn ProgressReporter,
    ) -> Result<CrawlResult> {
        validate_priority(max_priority)?;
        let _ticket = self.guard.try_start()?;
        let start = Instant::now();

        info!("starting crawl run");
        let run_id = self.storage.insert_crawl_run(max_priority, max_urls).await?;

        match self.run(max_priority, max_urls, start, progress).await {
            Ok(result) => {
                self.storage
                    .finish_crawl_run(&run_id, RunState::Completed, Some(&result))
                    .await?;
                info!(
                    events = result.events_created,
                    crawled = result.sources_crawled,
                    failed = result.sources_failed,
                    duration_secs = result.duration_seconds,
                    "crawl run completed"
                );
                progress.done(&result);
                Ok(result)
            }
            Err(e) => {
                error!(error = %e, "crawl run failed");
                if let Err(record_err) = self
                    .storage
                    .finish_crawl_run(&run_id, RunState::Failed, None)
                    .await
                {
                    warn!(error = %record_err, "could not record failed run");
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        max_priority: u8,
        max_urls: Option<usize>,
        start: Instant,
        progress: &dyn ProgressReporter,
    ) -> Result<CrawlResult> {
        // --- Phase 1: Discovery ---
        let groups = self.discover(max_priority, progress).await?;
        let competitors: Vec<String> = groups.iter().map(|g| g.competitor.name.clone()).collect();

        let mut sources_failed = groups.iter().filter(|g| g.failure.is_some()).count();
        let mut sources: Vec<SourceCandidate> =
            groups.into_iter().flat_map(|g| g.sources).collect();
        if let Some(limit) = max_urls {
            sources.truncate(limit);
        }

        // --- Phase 2: Fetch, chunk, detect, classify ---
        progress.phase("Crawling sources");
        let mut state = self.storage.load_fingerprints().await?;
        let outcomes = self.process_sources(&sources, &state, progress).await;

        // --- Phase 3: Persist ---
        progress.phase("Storing events");
        let mut sources_crawled = 0;
        let mut events_created = 0;

        for outcome in outcomes {
            let changes = match outcome.result {
                Ok(changes) => changes,
                Err(e) => {
                    warn!(
                        competitor = %outcome.source.competitor,
                        url = %outcome.source.url,
                        error = %e,
                        "source failed"
                    );
                    sources_failed += 1;
                    continue;
                }
            };
            sources_crawled += 1;
            events_created += self
                .persist_changes(&outcome.source, changes, &mut state)
                .await?;
        }

        self.storage.save_fingerprints(&state).await?;

        Ok(CrawlResult {
            status: RunState::Completed,
            events_created,
            sources_crawled,
            sources_failed,
            competitors,
            duration_seconds: start.elapsed().as_secs_f64(),
        })
    }

    /// Run source workers and return their outcomes in source order.
    ///
    /// A worker that panics is counted as a failed source.
    async fn process_sources(
        &self,
        sources: &[SourceCandidate],
        state: &FingerprintState,
        progress: &dyn ProgressReporter,
    ) -> Vec<SourceOutcome> {
        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1) as usize));
        let timeout = Duration::from_secs(self.config.classify_timeout_secs);
        let mut tasks = JoinSet::new();

        for (index, source) in sources.iter().cloned().enumerate() {
            let previous = state.for_url(&source.url);
            let fetcher = self.fetcher.clone();
            let classifier = Arc::clone(&self.classifier);
            let permits = Arc::clone(&permits);

            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let result =
                    process_source(&fetcher, classifier.as_ref(), &source, &previous, timeout)
                        .await;
                SourceOutcome {
                    index,
                    source,
                    result,
                }
            });
        }

        let total = sources.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut done = 0;
        while let Some(joined) = tasks.join_next().await {
            done += 1;
            match joined {
                Ok(outcome) => {
                    progress.source_done(&outcome.source.url, done, total);
                    outcomes.push(outcome);
                }
                Err(e) => warn!(error = %e, "source worker aborted"),
            }
        }

        // Panicked workers leave a gap; record them as failures.
        let mut by_index: BTreeMap<usize, SourceOutcome> =
            outcomes.into_iter().map(|o| (o.index, o)).collect();
        sources
            .iter()
            .enumerate()
            .map(|(index, source)| {
                by_index.remove(&index).unwrap_or_else(|| SourceOutcome {
                    index,
                    source: source.clone(),
                    result: Err(CapwatchError::parse("source worker aborted")),
                })
            })
            .collect()
    }

    /// Store events for one source and advance its fingerprints.
    ///
    /// A fingerprint moves only after its event is stored (or found to be
    /// stored already). Returns the number of new rows.
    async fn persist_changes(
        &self,
        source: &SourceCandidate,
        changes: Vec<(ChangedChunk, Classification)>,
        state: &mut FingerprintState,
    ) -> Result<usize> {
        let mut created = 0;
        for (chunk, classification) in changes {
            let event = build_event(source, &chunk, classification);
            if self.storage.insert_event(&event).await? {
                created += 1;
                debug!(competitor = %event.competitor, heading = %event.heading, "event stored");
            } else {
                debug!(heading = %event.heading, "duplicate event skipped");
            }
            state.record(&chunk.url, &chunk.key, &chunk.hash);
        }
        Ok(created)
    }

    /// Start a crawl on a background task unless one is already running.
    ///
    /// Returns `None` (and logs) when the tick is skipped.
    pub fn spawn_scheduled_run(
        self: &Arc<Self>,
        max_priority: u8,
    ) -> Option<JoinHandle<Result<CrawlResult>>> {
        if self.guard.is_running() {
            info!("crawl already in progress, skipping scheduled run");
            return None;
        }
        let watch = Arc::clone(self);
        Some(tokio::spawn(async move {
            let result = watch.crawl(max_priority, None, &SilentProgress).await;
            if matches!(result, Err(CapwatchError::AlreadyRunning)) {
                info!("crawl already in progress, scheduled run skipped");
            }
            result
        }))
    }
}

/// Fetch, chunk, detect and classify one source.
async fn process_source(
    fetcher: &Fetcher,
    classifier: &dyn Classifier,
    source: &SourceCandidate,
    previous: &BTreeMap<String, String>,
    timeout: Duration,
) -> Result<Vec<(ChangedChunk, Classification)>> {
    let url = Url::parse(&source.url)
        .map_err(|e| CapwatchError::parse(format!("invalid source URL '{}': {e}", source.url)))?;

    let chunks = chunk_page(fetcher, &url).await?;
    let changed = detect_changes(&source.url, &chunks, previous);
    debug!(
        url = %source.url,
        chunks = chunks.len(),
        changed = changed.len(),
        "source diffed"
    );

    let mut classified = Vec::with_capacity(changed.len());
    for chunk in changed {
        let input = ClassifyInput::new(&source.competitor, &chunk, source.category);
        let classification = classify_or_fallback(classifier, &input, timeout).await;
        classified.push((chunk, classification));
    }
    Ok(classified)
}

fn build_event(
    source: &SourceCandidate,
    chunk: &ChangedChunk,
    classification: Classification,
) -> CapabilityEvent {
    CapabilityEvent {
        id: EventId::new(),
        competitor: source.competitor.clone(),
        theme: classification.theme,
        change_type: classification.change_type,
        claim: classification.claim,
        beginner_summary: classification.beginner_summary,
        evidence_url: chunk.url.clone(),
        evidence_snippet: truncate_chars(&chunk.text, MAX_SNIPPET_CHARS).to_string(),
        heading: chunk.heading.clone(),
        content_hash: chunk.hash.clone(),
        change_origin: chunk.origin,
        source_category: source.category,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use capwatch_shared::{
        ChangeOrigin, ChangeType, CompetitorCategory, CuratedSource, SourceCategory, Theme,
    };
    use uuid::Uuid;
    use wiremock::matchers::path;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::classify::{FallbackClassifier, MAX_CLASSIFIER_INPUT_CHARS};

    /// Deterministic classifier that records what it was shown.
    #[derive(Default)]
    struct StubClassifier {
        calls: AtomicUsize,
        longest_input: AtomicUsize,
    }

    #[async_trait]
    impl Classifier for StubClassifier {
        fn name(&self) -> &str {
            "stub"
        }

        async fn classify(&self, input: &ClassifyInput<'_>) -> Result<Classification> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.longest_input
                .fetch_max(input.text.chars().count(), Ordering::SeqCst);
            Ok(Classification {
                theme: Theme::Ai,
                change_type: ChangeType::NewCapability,
                claim: format!("{} changed {}", input.competitor, input.heading),
                beginner_summary: vec!["a".into(), "b".into(), "c".into()],
            })
        }
    }

    fn test_config() -> CrawlConfig {
        CrawlConfig {
            rate_limit_ms: 0,
            allow_private_hosts: true,
            timeout_secs: 5,
            classify_timeout_secs: 2,
            ..CrawlConfig::default()
        }
    }

    fn temp_db() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("capwatch_pipeline_{}.db", Uuid::now_v7()))
    }

    fn acme(base_url: String, priority: u8) -> Competitor {
        Competitor::new("Acme", base_url, CompetitorCategory::Modern, "AI-native ERP", priority)
    }

    async fn watch_with(
        competitors: Vec<Competitor>,
        classifier: Arc<dyn Classifier>,
    ) -> CapabilityWatch {
        let storage = Storage::open(&temp_db()).await.unwrap();
        CapabilityWatch::new(Registry::new(competitors), storage, test_config(), classifier)
            .unwrap()
    }

    async fn serve(server: &MockServer, route: &str, body: &str) {
        Mock::given(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
            .mount(server)
            .await;
    }

    const HOME: &str = r#"<body><a href="/whats-new">What's New</a></body>"#;

    #[tokio::test]
    async fn acme_new_then_idempotent_then_modified() {
        let server = MockServer::start().await;
        serve(&server, "/", HOME).await;
        serve(&server, "/whats-new", "<main><h2>AI Assistant</h2><p>v1</p></main>").await;

        let watch = watch_with(vec![acme(server.uri(), 1)], Arc::new(StubClassifier::default())).await;

        let first = watch.crawl(1, None, &SilentProgress).await.unwrap();
        assert_eq!(first.status, RunState::Completed);
        assert_eq!(first.events_created, 1);
        assert_eq!(first.sources_crawled, 1);
        assert_eq!(first.sources_failed, 0);
        assert_eq!(first.competitors, vec!["Acme"]);

        let second = watch.crawl(1, None, &SilentProgress).await.unwrap();
        assert_eq!(second.events_created, 0);

        server.reset().await;
        serve(&server, "/", HOME).await;
        serve(&server, "/whats-new", "<main><h2>AI Assistant</h2><p>v2</p></main>").await;

        let third = watch.crawl(1, None, &SilentProgress).await.unwrap();
        assert_eq!(third.events_created, 1);

        let events = watch.list_events(10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].change_origin, ChangeOrigin::Modified);
        assert_eq!(events[1].change_origin, ChangeOrigin::New);
        assert_ne!(events[0].content_hash, events[1].content_hash);
        assert_eq!(events[0].heading, "AI Assistant");
        assert_eq!(events[0].evidence_url, format!("{}/whats-new", server.uri()));
        assert_eq!(events[0].source_category, SourceCategory::ReleaseNotes);
        assert_eq!(events[0].theme, Theme::Ai);

        let status = watch.status().await.unwrap();
        assert_eq!(status.total_events, 2);
        assert!(status.last_run_at.is_some());
        assert_eq!(watch.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn added_heading_is_new_and_removed_heading_is_silent() {
        let server = MockServer::start().await;
        serve(&server, "/", HOME).await;
        serve(
            &server,
            "/whats-new",
            "<body><h2>Bank feeds</h2><p>Ten banks</p><h2>Retired</h2><p>Old export</p></body>",
        )
        .await;

        let watch = watch_with(vec![acme(server.uri(), 1)], Arc::new(StubClassifier::default())).await;
        assert_eq!(watch.crawl(1, None, &SilentProgress).await.unwrap().events_created, 2);

        server.reset().await;
        serve(&server, "/", HOME).await;
        serve(
            &server,
            "/whats-new",
            "<body><h2>Bank feeds</h2><p>Ten banks</p><h2>Close</h2><p>Faster close</p></body>",
        )
        .await;

        let result = watch.crawl(1, None, &SilentProgress).await.unwrap();
        assert_eq!(result.events_created, 1);
        let newest = &watch.list_events(1).await.unwrap()[0];
        assert_eq!(newest.heading, "Close");
        assert_eq!(newest.change_origin, ChangeOrigin::New);
    }

    #[tokio::test]
    async fn classifier_failure_still_stores_unspecified_event() {
        let server = MockServer::start().await;
        serve(&server, "/", HOME).await;
        let long = "ledger ".repeat(500);
        serve(&server, "/whats-new", &format!("<body><h2>GL</h2><p>{long}</p></body>")).await;

        let watch = watch_with(vec![acme(server.uri(), 1)], Arc::new(FallbackClassifier)).await;
        let result = watch.crawl(1, None, &SilentProgress).await.unwrap();
        assert_eq!(result.events_created, 1);

        let event = &watch.list_events(1).await.unwrap()[0];
        assert_eq!(event.theme, Theme::Unspecified);
        assert_eq!(event.change_type, ChangeType::Enhancement);
        assert_eq!(event.claim, "GL");
        assert_eq!(event.evidence_snippet.chars().count(), MAX_SNIPPET_CHARS);
    }

    #[tokio::test]
    async fn classifier_sees_capped_text() {
        let server = MockServer::start().await;
        serve(&server, "/", HOME).await;
        let long = "x".repeat(4000);
        serve(&server, "/whats-new", &format!("<body><p>{long}</p></body>")).await;

        let stub = Arc::new(StubClassifier::default());
        let watch = watch_with(vec![acme(server.uri(), 1)], stub.clone()).await;
        watch.crawl(1, None, &SilentProgress).await.unwrap();

        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            stub.longest_input.load(Ordering::SeqCst),
            MAX_CLASSIFIER_INPUT_CHARS
        );
    }

    #[tokio::test]
    async fn failing_source_is_isolated() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/",
            r#"<body>
                <a href="/whats-new">What's New</a>
                <a href="/release-notes">Release notes</a>
                <a href="/features">Features</a>
            </body>"#,
        )
        .await;
        serve(&server, "/whats-new", "<body><h2>AI</h2><p>one</p></body>").await;
        Mock::given(path("/release-notes"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        serve(&server, "/features", "<body><h2>Reporting</h2><p>two</p></body>").await;

        let watch = watch_with(vec![acme(server.uri(), 1)], Arc::new(StubClassifier::default())).await;
        let result = watch.crawl(1, None, &SilentProgress).await.unwrap();

        assert_eq!(result.sources_crawled, 2);
        assert_eq!(result.sources_failed, 1);
        assert_eq!(result.events_created, 2);
    }

    #[tokio::test]
    async fn discovery_failure_counts_once_and_curated_sources_still_run() {
        let server = MockServer::start().await;
        Mock::given(path("/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        serve(&server, "/changelog", "<body><h2>AP</h2><p>Bill pay</p></body>").await;

        let mut comp = acme(server.uri(), 1);
        comp.sources = vec![CuratedSource {
            url: format!("{}/changelog", server.uri()),
            label: Some("Changelog".into()),
            category: Some(SourceCategory::ReleaseNotes),
        }];

        let watch = watch_with(vec![comp], Arc::new(StubClassifier::default())).await;
        let result = watch.crawl(1, None, &SilentProgress).await.unwrap();
        assert_eq!(result.sources_failed, 1);
        assert_eq!(result.sources_crawled, 1);
        assert_eq!(result.events_created, 1);
    }

    #[tokio::test]
    async fn priority_filter_excludes_lower_tiers() {
        let server = MockServer::start().await;
        serve(&server, "/acme", r#"<a href="/acme/whats-new">What's New</a>"#).await;
        serve(&server, "/acme/whats-new", "<body><p>hello</p></body>").await;
        Mock::given(path("/globex"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let globex = Competitor::new(
            "Globex",
            format!("{}/globex", server.uri()),
            CompetitorCategory::Traditional,
            "",
            2,
        );
        let watch = watch_with(
            vec![acme(format!("{}/acme", server.uri()), 1), globex],
            Arc::new(StubClassifier::default()),
        )
        .await;

        let result = watch.crawl(1, None, &SilentProgress).await.unwrap();
        assert_eq!(result.competitors, vec!["Acme"]);
        assert_eq!(result.events_created, 1);
    }

    #[tokio::test]
    async fn max_urls_bounds_the_run() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/",
            r#"<a href="/whats-new">What's New</a><a href="/features">Features</a>"#,
        )
        .await;
        serve(&server, "/whats-new", "<body><p>one</p></body>").await;
        serve(&server, "/features", "<body><p>two</p></body>").await;

        let watch = watch_with(vec![acme(server.uri(), 1)], Arc::new(StubClassifier::default())).await;
        let result = watch.crawl(1, Some(1), &SilentProgress).await.unwrap();
        assert_eq!(result.sources_crawled, 1);
        assert_eq!(result.events_created, 1);
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_running() {
        let watch = Arc::new(watch_with(vec![], Arc::new(StubClassifier::default())).await);

        let ticket = watch.guard.try_start().unwrap();
        assert_eq!(watch.state(), RunState::Running);
        let err = watch.crawl(1, None, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, CapwatchError::AlreadyRunning));
        assert!(watch.spawn_scheduled_run(1).is_none());

        drop(ticket);
        assert_eq!(watch.state(), RunState::Idle);
        let handle = watch.spawn_scheduled_run(1).unwrap();
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.events_created, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn watches_sharing_a_database_run_one_at_a_time() {
        let server = MockServer::start().await;
        Mock::given(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(HOME)
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;
        serve(&server, "/whats-new", "<main><h2>AI Assistant</h2><p>v1</p></main>").await;

        let db = temp_db();
        let open = |db: std::path::PathBuf, base: String| async move {
            CapabilityWatch::new(
                Registry::new(vec![acme(base, 1)]),
                Storage::open(&db).await.unwrap(),
                test_config(),
                Arc::new(StubClassifier::default()),
            )
            .unwrap()
        };
        let scheduled = open(db.clone(), server.uri()).await;
        let manual = open(db.clone(), server.uri()).await;

        let (a, b) = tokio::join!(
            scheduled.crawl(1, None, &SilentProgress),
            manual.crawl(1, None, &SilentProgress)
        );
        let (winner, loser) = if a.is_ok() { (a, b) } else { (b, a) };
        assert_eq!(winner.unwrap().events_created, 1);
        assert!(matches!(loser.unwrap_err(), CapwatchError::AlreadyRunning));

        // The lock is released once the first run finishes.
        let again = manual.crawl(1, None, &SilentProgress).await.unwrap();
        assert_eq!(again.events_created, 0);
    }

    #[tokio::test]
    async fn event_store_failure_mid_run_keeps_fingerprints() {
        let server = MockServer::start().await;
        serve(&server, "/", HOME).await;
        serve(&server, "/whats-new", "<main><h2>AI Assistant</h2><p>v1</p></main>").await;

        let db = temp_db();
        let watch = CapabilityWatch::new(
            Registry::new(vec![acme(server.uri(), 1)]),
            Storage::open(&db).await.unwrap(),
            test_config(),
            Arc::new(StubClassifier::default()),
        )
        .unwrap();
        watch.crawl(1, None, &SilentProgress).await.unwrap();
        let before = watch.storage.load_fingerprints().await.unwrap();

        let raw = libsql::Builder::new_local(&db)
            .build()
            .await
            .unwrap()
            .connect()
            .unwrap();
        raw.execute_batch(
            "CREATE TRIGGER reject_events BEFORE INSERT ON capability_events
             BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
        )
        .await
        .unwrap();

        server.reset().await;
        serve(&server, "/", HOME).await;
        serve(&server, "/whats-new", "<main><h2>AI Assistant</h2><p>v2</p></main>").await;

        let err = watch.crawl(1, None, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, CapwatchError::Storage(_)));
        assert_eq!(watch.storage.load_fingerprints().await.unwrap(), before);
        assert_eq!(watch.state(), RunState::Idle);

        let mut rows = raw
            .query(
                "SELECT status FROM crawl_runs ORDER BY started_at DESC LIMIT 1",
                (),
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<String>(0).unwrap(), "failed");
    }

    #[tokio::test]
    async fn store_failure_is_fatal() {
        let path = temp_db();
        drop(Storage::open(&path).await.unwrap());
        let storage = Storage::open_readonly(&path).await.unwrap();
        let watch = CapabilityWatch::new(
            Registry::new(vec![]),
            storage,
            test_config(),
            Arc::new(StubClassifier::default()),
        )
        .unwrap();

        let err = watch.crawl(1, None, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, CapwatchError::Storage(_)));
        assert_eq!(watch.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn invalid_priority_is_rejected() {
        let watch = watch_with(vec![], Arc::new(StubClassifier::default())).await;
        let err = watch.crawl(4, None, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, CapwatchError::Validation { .. }));
    }

    #[tokio::test]
    async fn discover_groups_sources_per_competitor() {
        let server = MockServer::start().await;
        serve(&server, "/", HOME).await;

        let watch = watch_with(vec![acme(server.uri(), 1)], Arc::new(StubClassifier::default())).await;
        let groups = watch.discover(1, &SilentProgress).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].competitor.name, "Acme");
        assert!(groups[0].failure.is_none());
        assert_eq!(groups[0].sources.len(), 1);
        assert_eq!(groups[0].sources[0].label, "What's New");
    }
}
