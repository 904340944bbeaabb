//! SQLite schema for the user database

/// Schema version for migrations
pub const SCHEMA_VERSION: u32 = 1;

/// SQLite schema definition
pub struct Schema;

impl Schema {
    /// Get the complete schema SQL
    pub fn create_tables() -> &'static str {
        r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Plans are tombstoned, never removed, except when seeding fails
CREATE TABLE IF NOT EXISTS plans (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0,
    version INTEGER NOT NULL,
    origin TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_plans_version ON plans(version);

-- One row per (plan_id, word) identity, live or tombstoned.
-- No foreign key: sync may deliver a word before its plan.
CREATE TABLE IF NOT EXISTS words (
    plan_id TEXT NOT NULL,
    word TEXT NOT NULL,
    time INTEGER NOT NULL DEFAULT 0,
    paraphrase TEXT NOT NULL DEFAULT '',
    show_paraphrase INTEGER NOT NULL DEFAULT 0,
    color TEXT NOT NULL DEFAULT '',
    status INTEGER NOT NULL DEFAULT 0,
    deleted INTEGER NOT NULL DEFAULT 0,
    version INTEGER NOT NULL,
    origin TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (plan_id, word)
);

CREATE INDEX IF NOT EXISTS idx_words_listing ON words(plan_id, deleted, status, time);
CREATE INDEX IF NOT EXISTS idx_words_version ON words(version);

-- Single-value system entries (current plan, device id)
CREATE TABLE IF NOT EXISTS system_state (
    key TEXT PRIMARY KEY,
    value TEXT,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- User settings, JSON-encoded values
CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#
    }

    /// Get migration SQL for a specific version
    pub fn migration(from_version: u32, to_version: u32) -> Option<&'static str> {
        match (from_version, to_version) {
            // Add migrations here as the schema evolves
            // (1, 2) => Some("ALTER TABLE ..."),
            _ => None,
        }
    }
}
