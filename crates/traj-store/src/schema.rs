use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA_VERSION: i64 = 1;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    conn.pragma_update(None, "wal_autocheckpoint", 1000)?;

    // Fold a WAL left behind by an unclean shutdown into the main file.
    // In-memory and fresh databases may refuse; that is not an error.
    if conn
        .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
        .is_ok()
    {
        tracing::info!("startup WAL checkpoint complete");
    }

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS trajectories (
            id             TEXT PRIMARY KEY,
            name           TEXT NOT NULL UNIQUE,
            frame          TEXT NOT NULL,
            format_version TEXT NOT NULL,
            updated_at     INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS segments (
            trajectory_id       TEXT NOT NULL REFERENCES trajectories(id) ON DELETE CASCADE,
            position            INTEGER NOT NULL,
            parent              INTEGER,
            fork_time           REAL,
            origin              TEXT NOT NULL,
            interpolation       TEXT NOT NULL,
            kernel              TEXT NOT NULL,
            max_dense_intervals INTEGER,
            tolerance           REAL,
            dense_samples       INTEGER NOT NULL,
            PRIMARY KEY (trajectory_id, position)
        );

        CREATE TABLE IF NOT EXISTS samples (
            trajectory_id TEXT NOT NULL,
            segment       INTEGER NOT NULL,
            idx           INTEGER NOT NULL,
            t  REAL NOT NULL,
            px REAL NOT NULL,
            py REAL NOT NULL,
            pz REAL NOT NULL,
            vx REAL NOT NULL,
            vy REAL NOT NULL,
            vz REAL NOT NULL,
            PRIMARY KEY (trajectory_id, segment, idx),
            FOREIGN KEY (trajectory_id, segment)
                REFERENCES segments(trajectory_id, position) ON DELETE CASCADE
        );",
    )?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i64>().unwrap_or(0))
        })
        .ok();
    Ok(version)
}
