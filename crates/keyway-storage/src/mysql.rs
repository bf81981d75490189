use crate::shard::Shard;
use async_trait::async_trait;
use jiff::Timestamp;
use keyway_core::store::Result;
use keyway_core::{
    AllocatorError, BlockAuthority, IdBlock, PutOutcome, ShortKey, StorageError, UrlMapping,
};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};
use tracing::{debug, trace};

/// Attempts at a conditional insert before giving up on a key whose owner
/// keeps expiring underneath us.
const INSERT_ATTEMPTS: usize = 3;

/// MySQL implementation of a shard.
///
/// Each shard is its own database (`url_mappings` table, see
/// `ddl/mysql/url_mappings.sql`). The primary key on `short_key` is the
/// conditional write: the loser of a racing insert gets a unique violation
/// and reads back the winner. Timestamps are stored as Unix milliseconds.
#[derive(Debug, Clone)]
pub struct MySqlShard {
    pool: MySqlPool,
}

impl MySqlShard {
    /// Creates a shard from an existing MySQL connection pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Creates a shard by opening a new MySQL connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    async fn fetch_any(&self, key: &str) -> Result<Option<UrlMapping>> {
        let row = sqlx::query(
            r#"
            SELECT short_key, target_url, created_at, expires_at, is_alias
            FROM url_mappings
            WHERE short_key = ?
            LIMIT 1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(mapping_from_row).transpose()
    }
}

fn parse_millis(value: i64, column: &str) -> Result<Timestamp> {
    Timestamp::from_millisecond(value).map_err(|e| {
        StorageError::InvalidData(format!("invalid {column} timestamp '{value}': {e}"))
    })
}

fn mapping_from_row(row: &MySqlRow) -> Result<UrlMapping> {
    let key: String = row.try_get("short_key").map_err(map_sqlx_error)?;
    let target_url: String = row.try_get("target_url").map_err(map_sqlx_error)?;
    let created_at: i64 = row.try_get("created_at").map_err(map_sqlx_error)?;
    let expires_at: Option<i64> = row.try_get("expires_at").map_err(map_sqlx_error)?;
    let is_alias: bool = row.try_get("is_alias").map_err(map_sqlx_error)?;

    Ok(UrlMapping {
        key: ShortKey::new_unchecked(key),
        target_url,
        created_at: parse_millis(created_at, "created_at")?,
        expires_at: expires_at
            .map(|value| parse_millis(value, "expires_at"))
            .transpose()?,
        owner_alias: is_alias,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

#[async_trait]
impl Shard for MySqlShard {
    async fn insert_if_absent(&self, mapping: UrlMapping, now: Timestamp) -> Result<PutOutcome> {
        let key = mapping.key.as_str();
        let now_ms = now.as_millisecond();

        for _ in 0..INSERT_ATTEMPTS {
            // An expired row no longer owns its key.
            sqlx::query(
                r#"
                DELETE FROM url_mappings
                WHERE short_key = ?
                  AND expires_at IS NOT NULL
                  AND expires_at <= ?
                "#,
            )
            .bind(key)
            .bind(now_ms)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

            let result = sqlx::query(
                r#"
                INSERT INTO url_mappings (short_key, target_url, created_at, expires_at, is_alias)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(key)
            .bind(mapping.target_url.as_str())
            .bind(mapping.created_at.as_millisecond())
            .bind(mapping.expires_at.map(|ts| ts.as_millisecond()))
            .bind(mapping.owner_alias)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => return Ok(PutOutcome::Created),
                Err(err) if is_unique_violation(&err) => {
                    trace!(key, "insert lost to an existing row");
                    match self.fetch_any(key).await? {
                        Some(existing) if !existing.is_expired_at(now) => {
                            return Ok(PutOutcome::AlreadyExists(existing));
                        }
                        // Gone or expired since the insert; try again.
                        _ => continue,
                    }
                }
                Err(err) => return Err(map_sqlx_error(err)),
            }
        }

        Err(StorageError::Operation(format!(
            "conditional insert of {key} did not settle after {INSERT_ATTEMPTS} attempts"
        )))
    }

    async fn get(&self, key: &str, now: Timestamp) -> Result<Option<UrlMapping>> {
        let row = sqlx::query(
            r#"
            SELECT short_key, target_url, created_at, expires_at, is_alias
            FROM url_mappings
            WHERE short_key = ?
              AND (expires_at IS NULL OR expires_at > ?)
            LIMIT 1
            "#,
        )
        .bind(key)
        .bind(now.as_millisecond())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.as_ref().map(mapping_from_row).transpose()
    }

    async fn find_by_url(&self, target_url: &str, now: Timestamp) -> Result<Vec<UrlMapping>> {
        let rows = sqlx::query(
            r#"
            SELECT short_key, target_url, created_at, expires_at, is_alias
            FROM url_mappings
            WHERE target_url = ?
              AND (expires_at IS NULL OR expires_at > ?)
            ORDER BY short_key
            "#,
        )
        .bind(target_url)
        .bind(now.as_millisecond())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(mapping_from_row).collect()
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<usize> {
        let result = sqlx::query(
            r#"
            DELETE FROM url_mappings
            WHERE expires_at IS NOT NULL
              AND expires_at <= ?
            "#,
        )
        .bind(now.as_millisecond())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() as usize)
    }

    async fn scan(&self) -> Result<Vec<UrlMapping>> {
        let rows = sqlx::query(
            r#"
            SELECT short_key, target_url, created_at, expires_at, is_alias
            FROM url_mappings
            ORDER BY short_key
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter().map(mapping_from_row).collect()
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM url_mappings WHERE short_key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}

/// Block authority backed by a row-locked counter in MySQL.
///
/// Every node reserves its blocks from the same `id_blocks` row (see
/// `ddl/mysql/id_blocks.sql`). `SELECT ... FOR UPDATE` serializes the
/// reservations, so two nodes can never be handed overlapping blocks.
#[derive(Debug, Clone)]
pub struct MySqlBlockAuthority {
    pool: MySqlPool,
    sequence: String,
}

impl MySqlBlockAuthority {
    /// Name of the counter row used when none is given.
    pub const DEFAULT_SEQUENCE: &'static str = "url_keys";

    pub fn new(pool: MySqlPool) -> Self {
        Self::with_sequence(pool, Self::DEFAULT_SEQUENCE)
    }

    pub fn with_sequence(pool: MySqlPool, sequence: impl Into<String>) -> Self {
        Self {
            pool,
            sequence: sequence.into(),
        }
    }

    pub async fn connect(database_url: &str) -> std::result::Result<Self, AllocatorError> {
        let pool = MySqlPool::connect(database_url)
            .await
            .map_err(authority_error)?;
        Ok(Self::new(pool))
    }
}

fn authority_error(err: sqlx::Error) -> AllocatorError {
    AllocatorError::AuthorityUnavailable(err.to_string())
}

#[async_trait]
impl BlockAuthority for MySqlBlockAuthority {
    async fn reserve_block(
        &self,
        node_id: u16,
        size: u64,
    ) -> std::result::Result<IdBlock, AllocatorError> {
        if size == 0 {
            return Err(AllocatorError::Exhausted(
                "requested an empty identifier block".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await.map_err(authority_error)?;

        sqlx::query("INSERT IGNORE INTO id_blocks (name, next_id) VALUES (?, 1)")
            .bind(self.sequence.as_str())
            .execute(&mut *tx)
            .await
            .map_err(authority_error)?;

        let start: u64 = sqlx::query("SELECT next_id FROM id_blocks WHERE name = ? FOR UPDATE")
            .bind(self.sequence.as_str())
            .fetch_one(&mut *tx)
            .await
            .and_then(|row| row.try_get("next_id"))
            .map_err(authority_error)?;

        if start == u64::MAX {
            return Err(AllocatorError::Exhausted(format!(
                "sequence {} has no identifiers left",
                self.sequence
            )));
        }
        let end = start.saturating_add(size);

        sqlx::query("UPDATE id_blocks SET next_id = ? WHERE name = ?")
            .bind(end)
            .bind(self.sequence.as_str())
            .execute(&mut *tx)
            .await
            .map_err(authority_error)?;

        tx.commit().await.map_err(authority_error)?;

        debug!(node_id, start, end, sequence = %self.sequence, "reserved identifier block");
        Ok(IdBlock::new(start, end))
    }
}
