//! SQL schema for the Sekolah SQLite store.
//!
//! Executed once, on first use of a store, via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per record. `table_name` is the partition key; tables exist as
-- long as at least one of their rows does.
CREATE TABLE IF NOT EXISTS records (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,  -- insertion order
    table_name  TEXT NOT NULL,
    record_id   TEXT NOT NULL,
    created_at  TEXT NOT NULL,   -- RFC 3339 UTC
    updated_at  TEXT NOT NULL,   -- RFC 3339 UTC
    fields      TEXT NOT NULL DEFAULT '{}',  -- JSON object of domain fields
    UNIQUE (table_name, record_id)
);

CREATE INDEX IF NOT EXISTS records_table_idx ON records(table_name, seq);

PRAGMA user_version = 1;
";
