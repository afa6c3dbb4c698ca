//! SQL migration definitions for the capwatch database.
//!
//! Migrations are applied in order on database open. Each migration records
//! its version in `schema_migrations` as its last statement.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: sync_state, capability_events",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Whole-document state records (fingerprint map lives here)
CREATE TABLE IF NOT EXISTS sync_state (
    key        TEXT PRIMARY KEY,
    value_json TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Detected capability changes
CREATE TABLE IF NOT EXISTS capability_events (
    id               TEXT PRIMARY KEY,
    competitor       TEXT NOT NULL,
    theme            TEXT NOT NULL,
    change_type      TEXT NOT NULL,
    claim            TEXT NOT NULL,
    summary_json     TEXT NOT NULL,
    evidence_url     TEXT NOT NULL,
    evidence_snippet TEXT NOT NULL,
    heading          TEXT NOT NULL,
    content_hash     TEXT NOT NULL,
    change_origin    TEXT NOT NULL,
    source_category  TEXT NOT NULL,
    created_at       TEXT NOT NULL,
    UNIQUE(competitor, evidence_url, heading, content_hash)
);

CREATE INDEX IF NOT EXISTS idx_events_created_at ON capability_events(created_at);
CREATE INDEX IF NOT EXISTS idx_events_competitor ON capability_events(competitor);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Crawl run history",
            sql: r#"
CREATE TABLE IF NOT EXISTS crawl_runs (
    id          TEXT PRIMARY KEY,
    priority    INTEGER NOT NULL,
    max_urls    INTEGER,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    status      TEXT NOT NULL,
    stats_json  TEXT
);

CREATE INDEX IF NOT EXISTS idx_crawl_runs_finished ON crawl_runs(status, finished_at);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
