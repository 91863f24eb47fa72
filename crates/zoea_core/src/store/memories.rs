//! Append-only memory log persistence.

use rusqlite::{params, OptionalExtension, Row};

use super::{format_ts, parse_ts, Store};
use crate::error::Result;
use crate::memory::{Memory, MemoryRole, MemorySource};
use crate::mysis::MysisId;

fn memory_from_row(row: &Row<'_>) -> rusqlite::Result<Memory> {
    Ok(Memory {
        id: row.get(0)?,
        mysis_id: MysisId(row.get(1)?),
        role: row.get::<_, String>(2)?.parse().unwrap_or(MemoryRole::User),
        source: row
            .get::<_, String>(3)?
            .parse()
            .unwrap_or(MemorySource::System),
        content: row.get(4)?,
        reasoning: row.get(5)?,
        sender_id: row.get(6)?,
        created_at: parse_ts(&row.get::<_, String>(7)?),
    })
}

const COLUMNS: &str = "id, mysis_id, role, source, content, reasoning, sender_id, created_at";

impl Store {
    /// Append a memory and return its assigned id.
    pub fn add_memory(&self, memory: &Memory) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO memories (mysis_id, role, source, content, reasoning, sender_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                memory.mysis_id.as_str(),
                memory.role.as_str(),
                memory.source.as_str(),
                memory.content,
                memory.reasoning,
                memory.sender_id,
                format_ts(memory.created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Full log for a mysis in insertion order.
    pub fn get_memories(&self, mysis_id: &MysisId) -> Result<Vec<Memory>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM memories WHERE mysis_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![mysis_id.as_str()], memory_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// The `n` most recent memories, newest first.
    pub fn get_recent_memories(&self, mysis_id: &MysisId, n: usize) -> Result<Vec<Memory>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM memories WHERE mysis_id = ?1 ORDER BY id DESC LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![mysis_id.as_str(), n as i64], memory_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// The latest system-role memory (the persona prompt), if any.
    pub fn get_system_memory(&self, mysis_id: &MysisId) -> Result<Option<Memory>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM memories
                 WHERE mysis_id = ?1 AND role = 'system' ORDER BY id DESC LIMIT 1"
            ),
            params![mysis_id.as_str()],
            memory_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn count_memories(&self, mysis_id: &MysisId) -> Result<i64> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE mysis_id = ?1",
            params![mysis_id.as_str()],
            |row| row.get(0),
        )
        .map_err(Into::into)
    }

    /// The most recent broadcast addressed to this mysis, if any.
    pub fn get_most_recent_broadcast(&self, mysis_id: &MysisId) -> Result<Option<Memory>> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM memories
                 WHERE mysis_id = ?1 AND source = 'broadcast' ORDER BY id DESC LIMIT 1"
            ),
            params![mysis_id.as_str()],
            memory_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    /// The `n` most recent broadcasts across the fleet, newest first.
    pub fn get_recent_broadcasts(&self, n: usize) -> Result<Vec<Memory>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM memories WHERE source = 'broadcast' ORDER BY id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![n as i64], memory_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }
}
