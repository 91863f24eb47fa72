//! SQL schema for the swarm DB. Applied on open.

/// Fleet roster: one row per mysis.
pub const MYSES: &str = "
CREATE TABLE IF NOT EXISTS myses (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL UNIQUE,
    provider TEXT NOT NULL,
    model TEXT NOT NULL DEFAULT '',
    temperature REAL NOT NULL DEFAULT 1.0,
    state TEXT NOT NULL DEFAULT 'idle',
    created_at TEXT NOT NULL
);
";

/// Append-only conversation log; rows cascade with their mysis.
pub const MEMORIES: &str = "
CREATE TABLE IF NOT EXISTS memories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    mysis_id TEXT NOT NULL REFERENCES myses(id) ON DELETE CASCADE,
    role TEXT NOT NULL,
    source TEXT NOT NULL,
    content TEXT NOT NULL,
    reasoning TEXT NOT NULL DEFAULT '',
    sender_id TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_memories_mysis ON memories(mysis_id, id);
CREATE INDEX IF NOT EXISTS idx_memories_source ON memories(mysis_id, source, id);
";

/// Pooled credentials; `in_use`/`claimed_by` enforce single-holder claims.
pub const ACCOUNTS: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    username TEXT PRIMARY KEY NOT NULL,
    password TEXT NOT NULL,
    in_use INTEGER NOT NULL DEFAULT 0,
    claimed_by TEXT NOT NULL DEFAULT '',
    last_used_at TEXT,
    created_at TEXT NOT NULL
);
";

/// Run all migrations on an open connection.
pub fn run_all(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(MYSES)?;
    conn.execute_batch(MEMORIES)?;
    conn.execute_batch(ACCOUNTS)?;
    Ok(())
}
