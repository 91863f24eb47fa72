//! Mysis roster persistence.

use rusqlite::{params, OptionalExtension, Row};

use super::{format_ts, parse_ts, Store};
use crate::error::{CoreError, Result};
use crate::mysis::{MysisConfig, MysisId, MysisRecord, MysisState};

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<MysisRecord> {
    Ok(MysisRecord {
        id: MysisId(row.get(0)?),
        name: row.get(1)?,
        config: MysisConfig {
            provider: row.get(2)?,
            model: row.get(3)?,
            temperature: row.get(4)?,
        },
        state: row
            .get::<_, String>(5)?
            .parse()
            .unwrap_or(MysisState::Idle),
        created_at: parse_ts(&row.get::<_, String>(6)?),
    })
}

const COLUMNS: &str = "id, name, provider, model, temperature, state, created_at";

impl Store {
    pub fn create_mysis(&self, record: &MysisRecord) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO myses (id, name, provider, model, temperature, state, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id.as_str(),
                record.name,
                record.config.provider,
                record.config.model,
                record.config.temperature,
                record.state.as_str(),
                format_ts(record.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_mysis(&self, id: &MysisId) -> Result<MysisRecord> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM myses WHERE id = ?1"),
            params![id.as_str()],
            record_from_row,
        )
        .optional()?
        .ok_or_else(|| CoreError::NotFound(format!("mysis {}", id)))
    }

    pub fn list_myses(&self) -> Result<Vec<MysisRecord>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare(&format!("SELECT {COLUMNS} FROM myses ORDER BY created_at, name"))?;
        let rows = stmt.query_map([], record_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn update_mysis_config(&self, id: &MysisId, config: &MysisConfig) -> Result<()> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE myses SET provider = ?1, model = ?2, temperature = ?3 WHERE id = ?4",
            params![config.provider, config.model, config.temperature, id.as_str()],
        )?;
        if n == 0 {
            return Err(CoreError::NotFound(format!("mysis {}", id)));
        }
        Ok(())
    }

    pub fn update_mysis_state(&self, id: &MysisId, state: MysisState) -> Result<()> {
        let conn = self.conn()?;
        let n = conn.execute(
            "UPDATE myses SET state = ?1 WHERE id = ?2",
            params![state.as_str(), id.as_str()],
        )?;
        if n == 0 {
            return Err(CoreError::NotFound(format!("mysis {}", id)));
        }
        Ok(())
    }

    /// Delete a mysis; its memories cascade.
    pub fn delete_mysis(&self, id: &MysisId) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM myses WHERE id = ?1", params![id.as_str()])?;
        Ok(())
    }
}
