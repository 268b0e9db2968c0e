//! PostgreSQL History Store
//!
//! The edit ledger and the cache control row live in PostgreSQL. Every
//! timestamp the sync protocol compares comes from the database clock
//! (`clock_timestamp()`), never from a worker.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{
    Config, ManagerConfig, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime, Timeouts,
};
use pixels_core::{
    CacheState, Coordinates, CurrentPixel, LockClaim, NewPixelEdit, PixelEdit, PixelsError,
    PixelsResult, Rgb, StoreError, StoreKind, Timestamp, UserId,
};
use pixels_storage::HistoryStore;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};

use crate::error::{ApiError, ApiResult};

const SCHEMA: &str = include_str!("../migrations/0001_init.sql");

/// Advisory lock serializing concurrent migrations. Outside the range of
/// per-coordinate keys.
const MIGRATION_LOCK_KEY: i64 = 0x5049_5845_4C53;

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Pool wait/connect timeout, also applied as `statement_timeout`.
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "pixels".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(5),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("PIXELS_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("PIXELS_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("PIXELS_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("PIXELS_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("PIXELS_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("PIXELS_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: std::env::var("PIXELS_DB_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());
        cfg.options = Some(format!(
            "-c statement_timeout={}",
            self.timeout.as_millis()
        ));

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_config = PoolConfig::new(self.max_size);
        pool_config.timeouts = Timeouts {
            wait: Some(self.timeout),
            create: Some(self.timeout),
            recycle: Some(self.timeout),
        };
        cfg.pool = Some(pool_config);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

/// Tag database failures with the operation that hit them.
trait HistoryResultExt<T> {
    fn during(self, operation: &str) -> PixelsResult<T>;
}

impl<T> HistoryResultExt<T> for Result<T, tokio_postgres::Error> {
    fn during(self, operation: &str) -> PixelsResult<T> {
        self.map_err(|err| {
            if err.code() == Some(&SqlState::QUERY_CANCELED) {
                StoreError::timeout(StoreKind::History, operation).into()
            } else {
                StoreError::unavailable(StoreKind::History, operation, err).into()
            }
        })
    }
}

impl<T> HistoryResultExt<T> for Result<T, PoolError> {
    fn during(self, operation: &str) -> PixelsResult<T> {
        self.map_err(|err| match err {
            PoolError::Timeout(_) => StoreError::timeout(StoreKind::History, operation).into(),
            other => StoreError::unavailable(StoreKind::History, operation, other).into(),
        })
    }
}

fn corrupt(reason: impl std::fmt::Display) -> PixelsError {
    StoreError::corrupt(StoreKind::History, reason).into()
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn parse_rgb(row: &Row) -> PixelsResult<Rgb> {
    let raw: String = row.try_get("rgb").map_err(corrupt)?;
    raw.parse().map_err(corrupt)
}

fn coords_of(row: &Row) -> PixelsResult<Coordinates> {
    Ok(Coordinates {
        x: row.try_get("x").map_err(corrupt)?,
        y: row.try_get("y").map_err(corrupt)?,
    })
}

fn edit_from_row(row: &Row) -> PixelsResult<PixelEdit> {
    Ok(PixelEdit {
        id: row.try_get("id").map_err(corrupt)?,
        coords: coords_of(row)?,
        color: parse_rgb(row)?,
        author: UserId(row.try_get("user_id").map_err(corrupt)?),
        created_at: row.try_get("created_at").map_err(corrupt)?,
        deleted: row.try_get("deleted").map_err(corrupt)?,
    })
}

fn current_from_row(row: &Row) -> PixelsResult<CurrentPixel> {
    Ok(CurrentPixel {
        coords: coords_of(row)?,
        color: parse_rgb(row)?,
        author: UserId(row.try_get("user_id").map_err(corrupt)?),
        placed_at: row.try_get("created_at").map_err(corrupt)?,
    })
}

/// Advisory lock key for one coordinate.
pub(crate) fn coordinate_lock_key(coords: Coordinates) -> i64 {
    (i64::from(coords.x) << 16) | i64::from(coords.y as u16)
}

// ============================================================================
// HISTORY STORE
// ============================================================================

const INSERT_EDIT: &str = "INSERT INTO pixel_history (x, y, rgb, user_id, deleted)
     VALUES ($1, $2, $3, $4, $5)
     RETURNING id, x, y, rgb, user_id, created_at, deleted";

/// [`HistoryStore`] backed by PostgreSQL.
#[derive(Clone)]
pub struct PgHistoryStore {
    pool: Pool,
}

impl PgHistoryStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Create or update the schema. Safe to run from several workers at once.
    pub async fn migrate(&self) -> PixelsResult<()> {
        let mut client = self.pool.get().await.during("migrate")?;
        let tx = client.transaction().await.during("migrate")?;
        tx.execute("SELECT pg_advisory_xact_lock($1)", &[&MIGRATION_LOCK_KEY])
            .await
            .during("migrate")?;
        tx.batch_execute(SCHEMA).await.during("migrate")?;
        tx.commit().await.during("migrate")?;
        tracing::info!("history store schema is up to date");
        Ok(())
    }

    async fn append(
        &self,
        operation: &str,
        coords: Coordinates,
        author: UserId,
        color: Option<Rgb>,
    ) -> PixelsResult<Option<PixelEdit>> {
        let mut client = self.pool.get().await.during(operation)?;
        let tx = client.transaction().await.during(operation)?;
        tx.execute(
            "SELECT pg_advisory_xact_lock($1)",
            &[&coordinate_lock_key(coords)],
        )
        .await
        .during(operation)?;

        // A deletion records the color it removes.
        let (color, deleted) = match color {
            Some(color) => (color, false),
            None => {
                let surviving = tx
                    .query_opt(
                        "SELECT rgb FROM current_pixels WHERE x = $1 AND y = $2",
                        &[&coords.x, &coords.y],
                    )
                    .await
                    .during(operation)?;
                match surviving {
                    Some(row) => (parse_rgb(&row)?, true),
                    None => return Ok(None),
                }
            }
        };

        let row = tx
            .query_one(
                INSERT_EDIT,
                &[&coords.x, &coords.y, &color.to_hex(), &author.0, &deleted],
            )
            .await
            .during(operation)?;
        let edit = edit_from_row(&row)?;
        tx.commit().await.during(operation)?;
        Ok(Some(edit))
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn append_edit(&self, edit: NewPixelEdit) -> PixelsResult<PixelEdit> {
        self.append("append_edit", edit.coords, edit.author, Some(edit.color))
            .await?
            .ok_or_else(|| corrupt("insert returned no row"))
    }

    async fn append_deletion(
        &self,
        coords: Coordinates,
        author: UserId,
    ) -> PixelsResult<Option<PixelEdit>> {
        self.append("append_deletion", coords, author, None).await
    }

    async fn current_pixels(&self) -> PixelsResult<Vec<CurrentPixel>> {
        let client = self.pool.get().await.during("current_pixels")?;
        let rows = client
            .query(
                "SELECT x, y, rgb, user_id, created_at FROM current_pixels",
                &[],
            )
            .await
            .during("current_pixels")?;
        rows.iter().map(current_from_row).collect()
    }

    async fn current_pixel(&self, coords: Coordinates) -> PixelsResult<Option<CurrentPixel>> {
        let client = self.pool.get().await.during("current_pixel")?;
        let row = client
            .query_opt(
                "SELECT x, y, rgb, user_id, created_at FROM current_pixels
                 WHERE x = $1 AND y = $2",
                &[&coords.x, &coords.y],
            )
            .await
            .during("current_pixel")?;
        row.as_ref().map(current_from_row).transpose()
    }

    async fn cache_state(&self) -> PixelsResult<CacheState> {
        let client = self.pool.get().await.during("cache_state")?;
        let row = client
            .query_one(
                "SELECT last_modified, last_synced, sync_lock FROM cache_state WHERE id",
                &[],
            )
            .await
            .during("cache_state")?;
        Ok(CacheState {
            last_modified: row.try_get("last_modified").map_err(corrupt)?,
            last_synced: row.try_get("last_synced").map_err(corrupt)?,
            sync_lock: row.try_get("sync_lock").map_err(corrupt)?,
        })
    }

    async fn claim_sync_lock(&self) -> PixelsResult<LockClaim> {
        let mut client = self.pool.get().await.during("claim_sync_lock")?;
        let tx = client.transaction().await.during("claim_sync_lock")?;
        // The clock is read after the row lock is granted, so it is later
        // than every append that committed before this claim.
        let row = tx
            .query_one(
                "SELECT sync_lock, clock_timestamp() AS now FROM cache_state WHERE id FOR UPDATE",
                &[],
            )
            .await
            .during("claim_sync_lock")?;
        let previous: Option<Timestamp> = row.try_get("sync_lock").map_err(corrupt)?;
        let claimed_at: Timestamp = row.try_get("now").map_err(corrupt)?;

        if previous.is_none() {
            tx.execute(
                "UPDATE cache_state SET sync_lock = $1 WHERE id",
                &[&claimed_at],
            )
            .await
            .during("claim_sync_lock")?;
        }
        tx.commit().await.during("claim_sync_lock")?;

        Ok(LockClaim {
            claimed_at,
            previous,
        })
    }

    async fn reclaim_sync_lock(&self, observed: Timestamp) -> PixelsResult<Option<Timestamp>> {
        let client = self.pool.get().await.during("reclaim_sync_lock")?;
        let row = client
            .query_opt(
                "UPDATE cache_state SET sync_lock = clock_timestamp()
                 WHERE id AND sync_lock = $1
                 RETURNING sync_lock",
                &[&observed],
            )
            .await
            .during("reclaim_sync_lock")?;
        row.map(|row| row.try_get::<_, Timestamp>("sync_lock").map_err(corrupt))
            .transpose()
    }

    async fn release_sync_lock(&self, claimed_at: Timestamp) -> PixelsResult<()> {
        let client = self.pool.get().await.during("release_sync_lock")?;
        let released = client
            .execute(
                "UPDATE cache_state SET sync_lock = NULL WHERE id AND sync_lock = $1",
                &[&claimed_at],
            )
            .await
            .during("release_sync_lock")?;
        if released == 0 {
            tracing::warn!(%claimed_at, "sync lock was taken over before release");
        }
        Ok(())
    }

    async fn mark_synced(&self, started_at: Timestamp) -> PixelsResult<()> {
        let client = self.pool.get().await.during("mark_synced")?;
        client
            .execute(
                "UPDATE cache_state SET last_synced = GREATEST(last_synced, $1) WHERE id",
                &[&started_at],
            )
            .await
            .during("mark_synced")?;
        Ok(())
    }

    async fn ping(&self) -> PixelsResult<()> {
        let client = self.pool.get().await.during("ping")?;
        client.simple_query("SELECT 1").await.during("ping")?;
        Ok(())
    }
}
