use crate::metrics::MetricsRecord;
use rusqlite::{Connection, Result, params};
use std::path::Path;

/// Run-metrics sink. Each sheet is a table holding one row per run; a sheet is
/// created the first time a run is appended to it.
pub struct MetricsStore {
    conn: Connection,
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl MetricsStore {
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;
        Ok(MetricsStore { conn })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(MetricsStore {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn ensure_sheet(&self, sheet: &str) -> Result<()> {
        self.conn.execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS {} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL UNIQUE,
    date TEXT NOT NULL,           -- dd/mm/YYYY
    start_time TEXT NOT NULL,     -- HH:MM:SS
    end_time TEXT NOT NULL,
    elapsed TEXT NOT NULL,        -- H:MM:SS
    row_count INTEGER NOT NULL,
    rows_per_minute REAL NOT NULL,
    errors INTEGER NOT NULL,
    reached_depth INTEGER NOT NULL
);
            ",
            quote_identifier(sheet)
        ))
    }

    pub fn has_sheet(&self, sheet: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![sheet],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn append(&self, sheet: &str, record: &MetricsRecord) -> Result<i64> {
        self.ensure_sheet(sheet)?;
        self.conn.execute(
            &format!(
                "INSERT INTO {} (
                    run_id, date, start_time, end_time, elapsed, row_count, rows_per_minute, errors, reached_depth
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                quote_identifier(sheet)
            ),
            params![
                &record.run_id,
                &record.date,
                &record.start,
                &record.end,
                &record.elapsed,
                record.rows as i64,
                record.rows_per_minute,
                record.errors as i64,
                record.reached_depth as i64,
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent runs first.
    pub fn recent(&self, sheet: &str, limit: usize) -> Result<Vec<MetricsRecord>> {
        if !self.has_sheet(sheet)? {
            return Ok(Vec::new());
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT run_id, date, start_time, end_time, elapsed, row_count, rows_per_minute, errors, reached_depth
             FROM {} ORDER BY id DESC LIMIT ?1",
            quote_identifier(sheet)
        ))?;

        let records = stmt
            .query_map(params![limit as i64], |row| {
                Ok(MetricsRecord {
                    run_id: row.get(0)?,
                    date: row.get(1)?,
                    start: row.get(2)?,
                    end: row.get(3)?,
                    elapsed: row.get(4)?,
                    rows: row.get::<_, i64>(5)? as usize,
                    rows_per_minute: row.get(6)?,
                    errors: row.get::<_, i64>(7)? as usize,
                    reached_depth: row.get::<_, i64>(8)? as usize,
                })
            })?
            .collect::<Result<Vec<_>>>()?;

        Ok(records)
    }

    pub fn count(&self, sheet: &str) -> Result<i64> {
        if !self.has_sheet(sheet)? {
            return Ok(0);
        }
        self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_identifier(sheet)),
            [],
            |row| row.get(0),
        )
    }

    pub fn get_connection(&self) -> &Connection {
        &self.conn
    }
}
