//! libSQL-backed state and event store.
//!
//! The [`Storage`] struct wraps a local libSQL database holding:
//! - the fingerprint state, one JSON document under a fixed key in `sync_state`
//! - capability events, deduplicated on `(competitor, evidence_url, heading, content_hash)`
//! - crawl-run history, used for `last_run_at` in status reports
//!
//! **Access rules:**
//! - crawl and watch: read-write via [`Storage::open`]
//! - events, status: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database, TransactionBehavior, params};
use uuid::Uuid;

use capwatch_shared::{
    CapabilityEvent, CapwatchError, CrawlResult, CrawlStatusReport, EventId,
    FINGERPRINT_STATE_KEY, FingerprintState, Result, RunState,
};

/// Number of themes reported by [`Storage::status_report`].
const TOP_THEMES: u32 = 10;

/// A `running` crawl row older than this no longer holds the run lock.
pub const STALE_RUN_SECS: i64 = 2 * 60 * 60;

/// How long a write waits for another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CapwatchError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| CapwatchError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| CapwatchError::Storage(e.to_string()))?;

        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| CapwatchError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CapwatchError::Storage(format!(
                "database not found: {} (run `capwatch crawl` first)",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| CapwatchError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| CapwatchError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        CapwatchError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(CapwatchError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Fingerprint state
    // -----------------------------------------------------------------------

    /// Load the whole fingerprint map. A missing record is an empty map.
    pub async fn load_fingerprints(&self) -> Result<FingerprintState> {
        let mut rows = self
            .conn
            .query(
                "SELECT value_json FROM sync_state WHERE key = ?1",
                params![FINGERPRINT_STATE_KEY],
            )
            .await
            .map_err(|e| CapwatchError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let json: String = row
                    .get(0)
                    .map_err(|e| CapwatchError::Storage(e.to_string()))?;
                serde_json::from_str(&json).map_err(|e| {
                    CapwatchError::Storage(format!("corrupt fingerprint state: {e}"))
                })
            }
            Ok(None) => Ok(FingerprintState::new()),
            Err(e) => Err(CapwatchError::Storage(e.to_string())),
        }
    }

    /// Replace the whole fingerprint map in a single statement.
    pub async fn save_fingerprints(&self, state: &FingerprintState) -> Result<()> {
        self.check_writable()?;
        let json = serde_json::to_string(state)
            .map_err(|e| CapwatchError::Storage(format!("serialize fingerprint state: {e}")))?;
        let now = timestamp(&Utc::now());
        self.conn
            .execute(
                "INSERT INTO sync_state (key, value_json, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    value_json = excluded.value_json,
                    updated_at = excluded.updated_at",
                params![FINGERPRINT_STATE_KEY, json.as_str(), now.as_str()],
            )
            .await
            .map_err(|e| CapwatchError::Storage(e.to_string()))?;
        tracing::debug!(urls = state.url_count(), "fingerprint state saved");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Capability events
    // -----------------------------------------------------------------------

    /// Insert an event unless its dedup key already exists.
    ///
    /// Returns `true` when a row was written, `false` for a duplicate.
    pub async fn insert_event(&self, event: &CapabilityEvent) -> Result<bool> {
        self.check_writable()?;
        let summary_json = serde_json::to_string(&event.beginner_summary)
            .map_err(|e| CapwatchError::Storage(format!("serialize summary: {e}")))?;
        let id = event.id.to_string();
        let created_at = timestamp(&event.created_at);

        let inserted = self
            .conn
            .execute(
                "INSERT INTO capability_events
                    (id, competitor, theme, change_type, claim, summary_json,
                     evidence_url, evidence_snippet, heading, content_hash,
                     change_origin, source_category, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(competitor, evidence_url, heading, content_hash) DO NOTHING",
                params![
                    id.as_str(),
                    event.competitor.as_str(),
                    event.theme.as_str(),
                    event.change_type.as_str(),
                    event.claim.as_str(),
                    summary_json.as_str(),
                    event.evidence_url.as_str(),
                    event.evidence_snippet.as_str(),
                    event.heading.as_str(),
                    event.content_hash.as_str(),
                    event.change_origin.as_str(),
                    event.source_category.as_str(),
                    created_at.as_str()
                ],
            )
            .await
            .map_err(|e| CapwatchError::Storage(e.to_string()))?;

        Ok(inserted > 0)
    }

    /// Most recent events first.
    pub async fn list_events(&self, limit: u32) -> Result<Vec<CapabilityEvent>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, competitor, theme, change_type, claim, summary_json,
                        evidence_url, evidence_snippet, heading, content_hash,
                        change_origin, source_category, created_at
                 FROM capability_events
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?1",
                params![limit as i64],
            )
            .await
            .map_err(|e| CapwatchError::Storage(e.to_string()))?;

        let mut events = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| CapwatchError::Storage(e.to_string()))?
        {
            events.push(row_to_event(&row)?);
        }
        Ok(events)
    }

    /// Total number of stored events.
    pub async fn count_events(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM capability_events", params![])
            .await
            .map_err(|e| CapwatchError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map(|n| n as u64)
                .map_err(|e| CapwatchError::Storage(e.to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(CapwatchError::Storage(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Crawl runs
    // -----------------------------------------------------------------------

    /// Record the start of a crawl run. Returns the generated run ID.
    ///
    /// The store is the run lock shared by every process on this database:
    /// claiming fails with [`CapwatchError::AlreadyRunning`] while another
    /// `running` row started less than [`STALE_RUN_SECS`] ago exists. Older
    /// `running` rows belong to crashed processes and are marked `failed`.
    pub async fn insert_crawl_run(&self, priority: u8, max_urls: Option<usize>) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();
        let started_at = timestamp(&now);
        let cutoff = timestamp(&(now - chrono::Duration::seconds(STALE_RUN_SECS)));
        let max_urls = max_urls.map(|n| n as i64);

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(|e| CapwatchError::Storage(e.to_string()))?;

        let abandoned = tx
            .execute(
                "UPDATE crawl_runs SET status = ?1, finished_at = ?2
                 WHERE status = ?3 AND started_at <= ?4",
                params![
                    RunState::Failed.as_str(),
                    started_at.as_str(),
                    RunState::Running.as_str(),
                    cutoff.as_str()
                ],
            )
            .await
            .map_err(|e| CapwatchError::Storage(e.to_string()))?;
        if abandoned > 0 {
            tracing::warn!(runs = abandoned, "marked abandoned crawl runs as failed");
        }

        let mut active = tx
            .query(
                "SELECT id FROM crawl_runs WHERE status = ?1 LIMIT 1",
                params![RunState::Running.as_str()],
            )
            .await
            .map_err(|e| CapwatchError::Storage(e.to_string()))?;
        let busy = active
            .next()
            .await
            .map_err(|e| CapwatchError::Storage(e.to_string()))?
            .is_some();
        drop(active);
        if busy {
            tx.rollback()
                .await
                .map_err(|e| CapwatchError::Storage(e.to_string()))?;
            return Err(CapwatchError::AlreadyRunning);
        }

        tx.execute(
            "INSERT INTO crawl_runs (id, priority, max_urls, started_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.as_str(),
                priority as i64,
                max_urls,
                started_at.as_str(),
                RunState::Running.as_str()
            ],
        )
        .await
        .map_err(|e| CapwatchError::Storage(e.to_string()))?;
        tx.commit()
            .await
            .map_err(|e| CapwatchError::Storage(e.to_string()))?;
        Ok(id)
    }

    /// Mark a crawl run finished with its terminal state and statistics.
    pub async fn finish_crawl_run(
        &self,
        run_id: &str,
        status: RunState,
        stats: Option<&CrawlResult>,
    ) -> Result<()> {
        self.check_writable()?;
        let now = timestamp(&Utc::now());
        let stats_json = stats
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| CapwatchError::Storage(format!("serialize run stats: {e}")))?;
        self.conn
            .execute(
                "UPDATE crawl_runs SET finished_at = ?1, status = ?2, stats_json = ?3
                 WHERE id = ?4",
                params![now.as_str(), status.as_str(), stats_json, run_id],
            )
            .await
            .map_err(|e| CapwatchError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Finish time of the most recent completed run.
    pub async fn last_completed_run_at(&self) -> Result<Option<DateTime<Utc>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT finished_at FROM crawl_runs
                 WHERE status = ?1 AND finished_at IS NOT NULL
                 ORDER BY finished_at DESC
                 LIMIT 1",
                params![RunState::Completed.as_str()],
            )
            .await
            .map_err(|e| CapwatchError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let s: String = row
                    .get(0)
                    .map_err(|e| CapwatchError::Storage(e.to_string()))?;
                parse_timestamp(&s).map(Some)
            }
            Ok(None) => Ok(None),
            Err(e) => Err(CapwatchError::Storage(e.to_string())),
        }
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    /// Aggregate counts for the status report.
    pub async fn status_report(&self) -> Result<CrawlStatusReport> {
        let total_events = self.count_events().await?;
        let per_competitor = self
            .grouped_counts(
                "SELECT competitor, COUNT(*) AS n FROM capability_events
                 GROUP BY competitor ORDER BY n DESC, competitor",
                None,
            )
            .await?;
        let per_theme = self
            .grouped_counts(
                "SELECT theme, COUNT(*) AS n FROM capability_events
                 GROUP BY theme ORDER BY n DESC, theme LIMIT ?1",
                Some(TOP_THEMES),
            )
            .await?;
        let last_run_at = self.last_completed_run_at().await?;

        Ok(CrawlStatusReport {
            total_events,
            per_competitor,
            per_theme,
            last_run_at,
        })
    }

    async fn grouped_counts(&self, sql: &str, limit: Option<u32>) -> Result<Vec<(String, u64)>> {
        let mut rows = match limit {
            Some(limit) => self.conn.query(sql, params![limit as i64]).await,
            None => self.conn.query(sql, params![]).await,
        }
        .map_err(|e| CapwatchError::Storage(e.to_string()))?;

        let mut counts = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| CapwatchError::Storage(e.to_string()))?
        {
            counts.push((
                row.get::<String>(0)
                    .map_err(|e| CapwatchError::Storage(e.to_string()))?,
                row.get::<i64>(1)
                    .map_err(|e| CapwatchError::Storage(e.to_string()))? as u64,
            ));
        }
        Ok(counts)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// RFC 3339 with fixed precision so stored timestamps sort lexically.
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CapwatchError::Storage(format!("invalid date '{s}': {e}")))
}

fn column(row: &libsql::Row, idx: i32) -> Result<String> {
    row.get::<String>(idx)
        .map_err(|e| CapwatchError::Storage(e.to_string()))
}

/// Parse a stored label back into its enum.
fn label<T>(row: &libsql::Row, idx: i32) -> Result<T>
where
    T: std::str::FromStr<Err = CapwatchError>,
{
    column(row, idx)?
        .parse()
        .map_err(|e: CapwatchError| CapwatchError::Storage(e.to_string()))
}

/// Convert a database row to a [`CapabilityEvent`].
fn row_to_event(row: &libsql::Row) -> Result<CapabilityEvent> {
    let raw_id = column(row, 0)?;
    let id: EventId = raw_id
        .parse()
        .map_err(|e| CapwatchError::Storage(format!("invalid event id '{raw_id}': {e}")))?;
    let summary_json = column(row, 5)?;
    let beginner_summary: Vec<String> = serde_json::from_str(&summary_json)
        .map_err(|e| CapwatchError::Storage(format!("corrupt summary for {id}: {e}")))?;

    Ok(CapabilityEvent {
        id,
        competitor: column(row, 1)?,
        theme: label(row, 2)?,
        change_type: label(row, 3)?,
        claim: column(row, 4)?,
        beginner_summary,
        evidence_url: column(row, 6)?,
        evidence_snippet: column(row, 7)?,
        heading: column(row, 8)?,
        content_hash: column(row, 9)?,
        change_origin: label(row, 10)?,
        source_category: label(row, 11)?,
        created_at: parse_timestamp(&column(row, 12)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use capwatch_shared::{ChangeOrigin, ChangeType, SourceCategory, Theme};
    use chrono::Duration;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("capwatch_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn event(competitor: &str, heading: &str, hash: &str, theme: Theme) -> CapabilityEvent {
        CapabilityEvent {
            id: EventId::new(),
            competitor: competitor.into(),
            theme,
            change_type: ChangeType::NewCapability,
            claim: format!("{competitor} shipped {heading}"),
            beginner_summary: vec!["one".into(), "two".into(), "three".into()],
            evidence_url: format!("https://{}.test/whats-new", competitor.to_lowercase()),
            evidence_snippet: "snippet".into(),
            heading: heading.into(),
            content_hash: hash.into(),
            change_origin: ChangeOrigin::New,
            source_category: SourceCategory::ReleaseNotes,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("capwatch_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 2);
    }

    #[tokio::test]
    async fn fingerprints_default_empty_and_replace_whole_map() {
        let storage = test_storage().await;
        assert!(storage.load_fingerprints().await.unwrap().is_empty());

        let mut state = FingerprintState::new();
        state.record("https://acme.test/a", "ai assistant", "h1");
        state.record("https://acme.test/b", "", "h2");
        storage.save_fingerprints(&state).await.unwrap();
        assert_eq!(storage.load_fingerprints().await.unwrap(), state);

        let mut next = FingerprintState::new();
        next.record("https://acme.test/a", "ai assistant", "h3");
        storage.save_fingerprints(&next).await.unwrap();

        let loaded = storage.load_fingerprints().await.unwrap();
        assert_eq!(loaded, next);
        assert_eq!(loaded.url_count(), 1);
    }

    #[tokio::test]
    async fn insert_event_dedups_on_key() {
        let storage = test_storage().await;
        let first = event("Acme", "AI Assistant", "h1", Theme::Ai);
        assert!(storage.insert_event(&first).await.unwrap());

        // Same dedup key, fresh id.
        let dup = event("Acme", "AI Assistant", "h1", Theme::Reporting);
        assert!(!storage.insert_event(&dup).await.unwrap());

        // New hash is a distinct event.
        let changed = event("Acme", "AI Assistant", "h2", Theme::Ai);
        assert!(storage.insert_event(&changed).await.unwrap());

        assert_eq!(storage.count_events().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn list_events_newest_first_and_round_trips_fields() {
        let storage = test_storage().await;
        let mut old = event("Acme", "Bank feeds", "h1", Theme::Integrations);
        old.created_at = Utc::now() - Duration::hours(1);
        let new = event("Acme", "AI Assistant", "h2", Theme::Ai);
        storage.insert_event(&old).await.unwrap();
        storage.insert_event(&new).await.unwrap();

        let events = storage.list_events(10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, new.id);
        assert_eq!(events[0].theme, Theme::Ai);
        assert_eq!(events[0].beginner_summary.len(), 3);
        assert_eq!(events[1].heading, "Bank feeds");
        assert_eq!(events[1].source_category, SourceCategory::ReleaseNotes);

        assert_eq!(storage.list_events(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn status_report_counts_and_last_run() {
        let storage = test_storage().await;
        for (i, (competitor, theme)) in [
            ("Acme", Theme::Ai),
            ("Acme", Theme::Ai),
            ("Acme", Theme::Reporting),
            ("Globex", Theme::Ai),
        ]
        .into_iter()
        .enumerate()
        {
            let e = event(competitor, &format!("h{i}"), &format!("x{i}"), theme);
            storage.insert_event(&e).await.unwrap();
        }

        let report = storage.status_report().await.unwrap();
        assert_eq!(report.total_events, 4);
        assert_eq!(
            report.per_competitor,
            vec![("Acme".to_string(), 3), ("Globex".to_string(), 1)]
        );
        assert_eq!(report.per_theme[0], ("ai".to_string(), 3));
        assert!(report.last_run_at.is_none());

        let failed = storage.insert_crawl_run(1, None).await.unwrap();
        storage
            .finish_crawl_run(&failed, RunState::Failed, None)
            .await
            .unwrap();
        assert!(storage.status_report().await.unwrap().last_run_at.is_none());

        let run = storage.insert_crawl_run(2, Some(5)).await.unwrap();
        let stats = CrawlResult {
            status: RunState::Completed,
            events_created: 4,
            sources_crawled: 2,
            sources_failed: 0,
            competitors: vec!["Acme".into(), "Globex".into()],
            duration_seconds: 1.5,
        };
        storage
            .finish_crawl_run(&run, RunState::Completed, Some(&stats))
            .await
            .unwrap();
        assert!(storage.status_report().await.unwrap().last_run_at.is_some());
    }

    #[tokio::test]
    async fn running_row_blocks_other_handles_on_same_file() {
        let tmp = std::env::temp_dir().join(format!("capwatch_test_{}.db", Uuid::now_v7()));
        let first = Storage::open(&tmp).await.unwrap();
        let second = Storage::open(&tmp).await.unwrap();

        let run = first.insert_crawl_run(1, None).await.unwrap();
        let err = second.insert_crawl_run(1, None).await.unwrap_err();
        assert!(matches!(err, CapwatchError::AlreadyRunning));

        first
            .finish_crawl_run(&run, RunState::Completed, None)
            .await
            .unwrap();
        assert!(second.insert_crawl_run(2, None).await.is_ok());
    }

    #[tokio::test]
    async fn stale_running_row_is_failed_and_released() {
        let storage = test_storage().await;
        let started = Utc::now() - Duration::seconds(STALE_RUN_SECS + 60);
        storage
            .conn
            .execute(
                "INSERT INTO crawl_runs (id, priority, started_at, status)
                 VALUES ('crashed', 1, ?1, 'running')",
                params![timestamp(&started)],
            )
            .await
            .unwrap();

        assert!(storage.insert_crawl_run(1, None).await.is_ok());

        let mut rows = storage
            .conn
            .query("SELECT status FROM crawl_runs WHERE id = 'crashed'", params![])
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<String>(0).unwrap(), "failed");
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("capwatch_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.insert_event(&event("Acme", "AI", "h1", Theme::Ai))
            .await
            .unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.list_events(10).await.unwrap().len(), 1);

        let result = ro.save_fingerprints(&FingerprintState::new()).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
        assert!(ro.insert_crawl_run(1, None).await.is_err());
    }

    #[tokio::test]
    async fn readonly_requires_existing_file() {
        let tmp = std::env::temp_dir().join(format!("capwatch_missing_{}.db", Uuid::now_v7()));
        assert!(Storage::open_readonly(&tmp).await.is_err());
    }
}
