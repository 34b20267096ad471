//! SQLite-based cache implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fusion_core::{CacheKey, DataCache, DataError, Payload, Result, SharedClock, system_clock};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::is_expired;

/// SQLite-based cache for resolved payloads.
///
/// Payloads are stored as JSON together with their creation time and TTL,
/// providing persistence across application restarts. Each write is a single
/// `INSERT OR REPLACE`, so an entry is either fully present or absent.
#[derive(Debug)]
pub struct SqliteCache {
    conn: Mutex<Connection>,
    clock: SharedClock,
}

impl SqliteCache {
    /// Create a new SQLite cache at the given path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| DataError::Cache(e.to_string()))?;
        Self::from_connection(conn, system_clock())
    }

    /// Create an in-memory SQLite cache.
    ///
    /// Useful for testing; data is lost when the cache is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| DataError::Cache(e.to_string()))?;
        Self::from_connection(conn, system_clock())
    }

    /// Replaces the clock used for timestamps and expiry.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    fn from_connection(conn: Connection, clock: SharedClock) -> Result<Self> {
        let cache = Self {
            conn: Mutex::new(conn),
            clock,
        };
        cache.initialize_schema()?;
        Ok(cache)
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DataError::Cache(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS payload_cache (
                capability TEXT NOT NULL,
                params TEXT NOT NULL,
                payload_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                ttl_ms INTEGER NOT NULL,
                PRIMARY KEY (capability, params)
            )",
            [],
        )
        .map_err(|e| DataError::Cache(e.to_string()))?;

        Ok(())
    }

    fn delete(conn: &Connection, key: &CacheKey) -> Result<()> {
        conn.execute(
            "DELETE FROM payload_cache WHERE capability = ?1 AND params = ?2",
            params![key.capability.as_str(), key.params],
        )
        .map_err(|e| DataError::Cache(e.to_string()))?;
        Ok(())
    }
}

fn parse_created_at(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DataError::Cache(e.to_string()))
}

fn ttl_from_millis(ttl_ms: i64) -> Duration {
    Duration::from_millis(u64::try_from(ttl_ms).unwrap_or(0))
}

#[async_trait]
impl DataCache for SqliteCache {
    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &CacheKey) -> Result<Option<Payload>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DataError::Cache(e.to_string()))?;

        let row: Option<(String, String, i64)> = conn
            .query_row(
                "SELECT payload_json, created_at, ttl_ms FROM payload_cache
                 WHERE capability = ?1 AND params = ?2",
                params![key.capability.as_str(), key.params],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|e| DataError::Cache(e.to_string()))?;

        let Some((json, created_at, ttl_ms)) = row else {
            debug!("Cache miss");
            return Ok(None);
        };

        if is_expired(
            parse_created_at(&created_at)?,
            ttl_from_millis(ttl_ms),
            self.clock.now(),
        ) {
            Self::delete(&conn, key)?;
            debug!("Cache entry expired");
            return Ok(None);
        }

        match serde_json::from_str(&json) {
            Ok(payload) => {
                debug!("Cache hit");
                Ok(Some(payload))
            }
            Err(e) => {
                // Written by an incompatible version; treat as a miss.
                warn!(error = %e, bytes = json.len(), "Dropping undecodable cache entry");
                Self::delete(&conn, key)?;
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, payload), fields(key = %key))]
    async fn put(&self, key: &CacheKey, payload: &Payload, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(payload).map_err(|e| DataError::Cache(e.to_string()))?;
        let created_at = self.clock.now().to_rfc3339();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);

        let conn = self
            .conn
            .lock()
            .map_err(|e| DataError::Cache(e.to_string()))?;
        conn.execute(
            "INSERT OR REPLACE INTO payload_cache
             (capability, params, payload_json, created_at, ttl_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![key.capability.as_str(), key.params, json, created_at, ttl_ms],
        )
        .map_err(|e| DataError::Cache(e.to_string()))?;

        debug!(shape = %payload.shape(), "Cached payload");
        Ok(())
    }

    async fn invalidate_stale(&self) -> Result<usize> {
        let now = self.clock.now();
        let conn = self
            .conn
            .lock()
            .map_err(|e| DataError::Cache(e.to_string()))?;

        let mut stmt = conn
            .prepare("SELECT capability, params, created_at, ttl_ms FROM payload_cache")
            .map_err(|e| DataError::Cache(e.to_string()))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .map_err(|e| DataError::Cache(e.to_string()))?;

        let mut stale = Vec::new();
        for row in rows {
            let (capability, params, created_at, ttl_ms) =
                row.map_err(|e| DataError::Cache(e.to_string()))?;
            let expired = parse_created_at(&created_at)
                .map(|created| is_expired(created, ttl_from_millis(ttl_ms), now))
                .unwrap_or(true);
            if expired {
                stale.push((capability, params));
            }
        }
        drop(stmt);

        for (capability, params) in &stale {
            conn.execute(
                "DELETE FROM payload_cache WHERE capability = ?1 AND params = ?2",
                params![capability, params],
            )
            .map_err(|e| DataError::Cache(e.to_string()))?;
        }

        debug!(removed = stale.len(), "Invalidated stale entries");
        Ok(stale.len())
    }

    async fn clear(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| DataError::Cache(e.to_string()))?;

        conn.execute("DELETE FROM payload_cache", [])
            .map_err(|e| DataError::Cache(e.to_string()))?;

        debug!("Cleared all cache data");
        Ok(())
    }
}
