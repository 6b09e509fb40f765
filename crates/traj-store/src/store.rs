use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use traj_core::serde_compat::{WireSegment, WireTree};
use traj_core::{DownsamplingParameters, Frame, SegmentTree};

use crate::error::{Result, StoreError};
use crate::schema;

/// One row of [`Store::list`].
#[derive(Clone, Debug, PartialEq)]
pub struct TrajectorySummary {
    pub id: Uuid,
    pub name: String,
    pub frame: String,
    pub segments: usize,
    pub samples: usize,
    /// Unix seconds of the last save.
    pub updated_at: i64,
}

/// Named segment trees in one SQLite database.
///
/// Each save rewrites the whole tree in a single transaction; trees are
/// loaded back through the same validation as JSON imports.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        tracing::info!("opened trajectory store at {}", path.display());
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM metadata WHERE key = ?1")?;
        let result = stmt.query_row([key], |row| row.get(0)).optional()?;
        Ok(result)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // --- Save ---

    /// Store `tree` under `name`, replacing any tree already saved there.
    /// A replaced tree keeps its id.
    pub fn save_tree<F: Frame>(&self, name: &str, tree: &SegmentTree<F>) -> Result<Uuid> {
        validate_name(name)?;
        let wire = WireTree::from_tree(tree);
        let tx = self.conn.unchecked_transaction()?;

        let existing = find_id(&tx, name)?;
        let id = existing.unwrap_or_else(Uuid::new_v4);
        let id_str = id.to_string();
        if existing.is_some() {
            tx.execute("DELETE FROM segments WHERE trajectory_id = ?1", [&id_str])?;
            tx.execute(
                "UPDATE trajectories SET frame = ?1, format_version = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![wire.frame, wire.version, now_unix_secs(), id_str],
            )?;
        } else {
            tx.execute(
                "INSERT INTO trajectories (id, name, frame, format_version, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id_str, name, wire.frame, wire.version, now_unix_secs()],
            )?;
        }

        for segment in &wire.segments {
            save_segment_on(&tx, &id_str, segment)?;
        }
        tx.commit()?;

        tracing::info!(
            "saved trajectory '{name}': {} segments, {} samples",
            wire.segments.len(),
            tree.sample_count()
        );
        Ok(id)
    }

    // --- Load ---

    pub fn load_tree<F: Frame>(&self, name: &str) -> Result<SegmentTree<F>> {
        let (id, frame, version): (String, String, String) = self
            .conn
            .query_row(
                "SELECT id, frame, format_version FROM trajectories WHERE name = ?1",
                [name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;

        let mut segments = self.load_segments(&id)?;
        for segment in &mut segments {
            segment.samples = self.load_samples(&id, segment.id)?;
        }

        let wire = WireTree {
            version,
            frame,
            segments,
        };
        let tree = wire.into_tree()?;
        tracing::debug!(
            "loaded trajectory '{name}': {} segments, {} samples",
            tree.segment_count(),
            tree.sample_count()
        );
        Ok(tree)
    }

    fn load_segments(&self, trajectory_id: &str) -> Result<Vec<WireSegment>> {
        let mut stmt = self.conn.prepare(
            "SELECT position, parent, fork_time, origin, interpolation, kernel,
                    max_dense_intervals, tolerance, dense_samples
             FROM segments WHERE trajectory_id = ?1 ORDER BY position",
        )?;
        let rows = stmt
            .query_map([trajectory_id], |row| {
                Ok(SegmentRow {
                    position: row.get(0)?,
                    parent: row.get(1)?,
                    fork_time: row.get(2)?,
                    origin: row.get(3)?,
                    interpolation: row.get(4)?,
                    kernel: row.get(5)?,
                    max_dense_intervals: row.get(6)?,
                    tolerance: row.get(7)?,
                    dense_samples: row.get(8)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(SegmentRow::into_wire).collect()
    }

    fn load_samples(&self, trajectory_id: &str, segment: usize) -> Result<Vec<[f64; 7]>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT t, px, py, pz, vx, vy, vz FROM samples
             WHERE trajectory_id = ?1 AND segment = ?2 ORDER BY idx",
        )?;
        let samples = stmt
            .query_map(params![trajectory_id, to_sql_index(segment)?], |row| {
                Ok([
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ])
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(samples)
    }

    // --- Catalogue ---

    pub fn contains(&self, name: &str) -> Result<bool> {
        Ok(find_id(&self.conn, name)?.is_some())
    }

    /// Every stored trajectory, ordered by name.
    pub fn list(&self) -> Result<Vec<TrajectorySummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.name, t.frame, t.updated_at,
                    (SELECT COUNT(*) FROM segments s WHERE s.trajectory_id = t.id),
                    (SELECT COUNT(*) FROM samples m WHERE m.trajectory_id = t.id)
             FROM trajectories t ORDER BY t.name",
        )?;
        let rows: Vec<(String, String, String, i64, i64, i64)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(|(id, name, frame, updated_at, segments, samples)| {
                Ok(TrajectorySummary {
                    id: parse_uuid(&id)?,
                    name,
                    frame,
                    segments: from_sql_index(segments)?,
                    samples: from_sql_index(samples)?,
                    updated_at,
                })
            })
            .collect()
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let rows = self
            .conn
            .execute("DELETE FROM trajectories WHERE name = ?1", [name])?;
        if rows == 0 {
            return Err(StoreError::NotFound(name.to_string()));
        }
        tracing::info!("deleted trajectory '{name}'");
        Ok(())
    }

    /// Database file size in bytes (page_count * page_size).
    pub fn db_size(&self) -> u64 {
        let page_count: i64 = self
            .conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .unwrap_or(0);
        let page_size: i64 = self
            .conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))
            .unwrap_or(0);
        (page_count * page_size).max(0) as u64
    }
}

struct SegmentRow {
    position: i64,
    parent: Option<i64>,
    fork_time: Option<f64>,
    origin: String,
    interpolation: String,
    kernel: String,
    max_dense_intervals: Option<i64>,
    tolerance: Option<f64>,
    dense_samples: i64,
}

impl SegmentRow {
    fn into_wire(self) -> Result<WireSegment> {
        let downsampling = match (self.max_dense_intervals, self.tolerance) {
            (Some(max), Some(tolerance)) => Some(DownsamplingParameters::new(
                from_sql_index(max)?,
                tolerance,
            )?),
            (None, None) => None,
            _ => {
                return Err(StoreError::InvalidData(format!(
                    "segment {} has partial downsampling parameters",
                    self.position
                )));
            }
        };
        Ok(WireSegment {
            id: from_sql_index(self.position)?,
            parent: self.parent.map(from_sql_index).transpose()?,
            fork_time: self.fork_time,
            origin: self.origin.parse()?,
            interpolation: self.interpolation.parse()?,
            kernel: self.kernel.parse()?,
            downsampling,
            dense_samples: from_sql_index(self.dense_samples)?,
            samples: Vec::new(),
        })
    }
}

fn save_segment_on(conn: &Connection, trajectory_id: &str, segment: &WireSegment) -> Result<()> {
    let position = to_sql_index(segment.id)?;
    let max_dense = segment
        .downsampling
        .map(|p| to_sql_index(p.max_dense_intervals))
        .transpose()?;
    conn.execute(
        "INSERT INTO segments (trajectory_id, position, parent, fork_time, origin, interpolation,
                               kernel, max_dense_intervals, tolerance, dense_samples)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            trajectory_id,
            position,
            segment.parent.map(to_sql_index).transpose()?,
            segment.fork_time,
            segment.origin.as_str(),
            segment.interpolation.as_str(),
            segment.kernel.as_str(),
            max_dense,
            segment.downsampling.map(|p| p.tolerance),
            to_sql_index(segment.dense_samples)?,
        ],
    )?;

    let mut stmt = conn.prepare_cached(
        "INSERT INTO samples (trajectory_id, segment, idx, t, px, py, pz, vx, vy, vz)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;
    for (idx, [t, px, py, pz, vx, vy, vz]) in segment.samples.iter().enumerate() {
        stmt.execute(params![
            trajectory_id,
            position,
            to_sql_index(idx)?,
            t,
            px,
            py,
            pz,
            vx,
            vy,
            vz
        ])?;
    }
    Ok(())
}

fn find_id(conn: &Connection, name: &str) -> Result<Option<Uuid>> {
    let id: Option<String> = conn
        .query_row("SELECT id FROM trajectories WHERE name = ?1", [name], |row| {
            row.get(0)
        })
        .optional()?;
    id.as_deref().map(parse_uuid).transpose()
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(StoreError::InvalidData(
            "trajectory name must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| StoreError::InvalidData(format!("invalid UUID '{s}': {e}")))
}

fn to_sql_index(value: usize) -> Result<i64> {
    i64::try_from(value).map_err(|_| StoreError::InvalidData(format!("{value} overflows i64")))
}

fn from_sql_index(value: i64) -> Result<usize> {
    usize::try_from(value).map_err(|_| StoreError::InvalidData(format!("negative index {value}")))
}

fn now_unix_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
