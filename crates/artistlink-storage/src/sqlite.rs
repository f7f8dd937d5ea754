//! SQLite implementation of [`ArtistStore`].
//!
//! [`SqliteStore`] persists artists and collaboration edges in a SQLite
//! database with WAL mode, a transaction around every write, and automatic
//! schema migrations. Genres are stored as JSON TEXT, timestamps as RFC 3339.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use artistlink_core::{ArtistId, EntityRecord};

use crate::error::StorageError;
use crate::traits::ArtistStore;

/// SQLite-backed implementation of [`ArtistStore`].
pub struct SqliteStore {
    conn: Connection,
}

/// Raw `artists` row before conversion.
struct ArtistRow {
    name: String,
    art_url: String,
    followers: i64,
    popularity: i32,
    genres_json: String,
    last_updated: Option<String>,
    resolved: bool,
}

impl SqliteStore {
    /// Opens (or creates) a SQLite database at `path`.
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = crate::schema::open_database(path)?;
        Ok(SqliteStore { conn })
    }

    /// Opens an in-memory SQLite database (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = crate::schema::open_in_memory()?;
        Ok(SqliteStore { conn })
    }

    /// The direction in which the edge between `a` and `b` was discovered.
    pub fn edge_direction(
        &self,
        a: &ArtistId,
        b: &ArtistId,
    ) -> Result<Option<(ArtistId, ArtistId)>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT artist_id, related_artist_id FROM connections
                 WHERE (artist_id = ?1 AND related_artist_id = ?2)
                    OR (artist_id = ?2 AND related_artist_id = ?1)",
                params![a.as_str(), b.as_str()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(row.map(|(from, to)| (ArtistId(from), ArtistId(to))))
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn parse_timestamp(id: &ArtistId, raw: &str) -> Result<DateTime<Utc>, StorageError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| StorageError::InvalidRecord {
                id: id.clone(),
                reason: format!("bad last_updated '{}': {}", raw, e),
            })
    }

    fn row_to_record(
        id: &ArtistId,
        row: ArtistRow,
        neighbors: Vec<ArtistId>,
    ) -> Result<EntityRecord, StorageError> {
        let genres: BTreeSet<String> = serde_json::from_str(&row.genres_json)?;
        let last_updated = row
            .last_updated
            .as_deref()
            .map(|raw| Self::parse_timestamp(id, raw))
            .transpose()?;
        let neighbors = row.resolved.then_some(neighbors);
        Ok(EntityRecord {
            id: id.clone(),
            name: row.name,
            popularity: row.popularity,
            followers: row.followers,
            art_url: row.art_url,
            genres,
            last_updated,
            neighbors,
        })
    }
}

impl ArtistStore for SqliteStore {
    fn get(&self, id: &ArtistId) -> Result<Option<EntityRecord>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT name, art_url, follower_count, popularity, genres_json, last_updated, neighbors_resolved
                 FROM artists WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok(ArtistRow {
                        name: row.get(0)?,
                        art_url: row.get(1)?,
                        followers: row.get(2)?,
                        popularity: row.get(3)?,
                        genres_json: row.get(4)?,
                        last_updated: row.get(5)?,
                        resolved: row.get(6)?,
                    })
                },
            )
            .optional()?;

        match row {
            Some(row) => {
                let neighbors = self.neighbor_ids(id)?;
                Self::row_to_record(id, row, neighbors).map(Some)
            }
            None => Ok(None),
        }
    }

    fn put_record(&mut self, record: &EntityRecord) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        let genres_json = serde_json::to_string(&record.genres)?;
        let last_updated = record.last_updated.map(|ts| ts.to_rfc3339());
        tx.execute(
            "INSERT INTO artists (id, name, art_url, follower_count, popularity, genres_json, last_updated, neighbors_resolved)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                art_url = excluded.art_url,
                follower_count = excluded.follower_count,
                popularity = excluded.popularity,
                genres_json = excluded.genres_json,
                last_updated = excluded.last_updated,
                neighbors_resolved = excluded.neighbors_resolved",
            params![
                record.id.as_str(),
                record.name,
                record.art_url,
                record.followers,
                record.popularity,
                genres_json,
                last_updated,
                record.is_resolved(),
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn find_edge(&self, a: &ArtistId, b: &ArtistId) -> Result<bool, StorageError> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM connections
                WHERE (artist_id = ?1 AND related_artist_id = ?2)
                   OR (artist_id = ?2 AND related_artist_id = ?1))",
            params![a.as_str(), b.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn add_edge(&mut self, from: &ArtistId, to: &ArtistId) -> Result<(), StorageError> {
        if from == to {
            return Err(StorageError::SelfEdge { id: from.clone() });
        }
        if self.find_edge(from, to)? {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO connections (artist_id, related_artist_id, discovered_at)
             VALUES (?1, ?2, ?3)",
            params![from.as_str(), to.as_str(), Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn neighbor_ids(&self, id: &ArtistId) -> Result<Vec<ArtistId>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT CASE WHEN artist_id = ?1 THEN related_artist_id ELSE artist_id END
             FROM connections
             WHERE artist_id = ?1 OR related_artist_id = ?1
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![id.as_str()], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(ArtistId(row?));
        }
        Ok(ids)
    }

    fn artist_count(&self) -> Result<usize, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM artists", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
