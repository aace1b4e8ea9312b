use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::info;

/// Append-only store for scraped gigs, backed by a single SQLite connection.
pub struct RecordStore {
    conn: Connection,
}

impl RecordStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!("Database connection established: {}", path.display());
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Create the `gigs` table if it does not exist yet.
    pub fn init(&self) -> Result<()> {
        // Column names and types are shared with existing database files.
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS gigs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT,
                description TEXT
            );
            ",
        )?;
        info!("Database table created or already exists.");
        Ok(())
    }

    /// Insert one record and return its assigned id.
    pub fn write(&self, title: &str, description: &str) -> Result<i64> {
        self.conn
            .prepare_cached("INSERT INTO gigs (title, description) VALUES (?1, ?2)")?
            .execute(rusqlite::params![title, description])
            .context("Failed to insert gig")?;
        Ok(self.conn.last_insert_rowid())
    }

    /// All non-empty descriptions in insertion order.
    pub fn read_all_nonempty_descriptions(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT description FROM gigs
             WHERE description IS NOT NULL AND description != ''
             ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        info!("Loaded {} descriptions from database.", rows.len());
        Ok(rows)
    }

    pub fn count(&self) -> Result<usize> {
        let n: usize = self.conn.query_row("SELECT COUNT(*) FROM gigs", [], |r| r.get(0))?;
        Ok(n)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let total = self.count()?;
        let with_title: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM gigs WHERE title IS NOT NULL AND title != ''",
            [],
            |r| r.get(0),
        )?;
        let with_description: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM gigs WHERE description IS NOT NULL AND description != ''",
            [],
            |r| r.get(0),
        )?;
        Ok(StoreStats {
            total,
            with_title,
            with_description,
        })
    }

    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e)?;
        info!("Database connection closed.");
        Ok(())
    }
}

// ── Stats ──

pub struct StoreStats {
    pub total: usize,
    pub with_title: usize,
    pub with_description: usize,
}
