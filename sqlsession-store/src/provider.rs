//! Session Provider - row-level session lifecycle over a sqlx pool

use crate::row::{create_tables, SessionRow};
use crate::store::SqlSessionStore;
use sqlsession_core::{
    async_trait, retry_async, unix_now, JsonCodec, RawStore, RetryConfig, SessionCodec,
    SessionConfig, SessionData, SessionError, SessionProvider, SessionResult,
};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Connection, SqlitePool};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

const SELECT_SESSION: &str = r#"SELECT "key", data, expiry FROM session WHERE "key" = ?"#;
const SELECT_EXISTS: &str = r#"SELECT 1 FROM session WHERE "key" = ?"#;
const INSERT_SESSION: &str = r#"INSERT INTO session ("key", data, expiry) VALUES (?, ?, ?)"#;
const DELETE_SESSION: &str = r#"DELETE FROM session WHERE "key" = ?"#;
const RENAME_SESSION: &str = r#"UPDATE session SET "key" = ? WHERE "key" = ?"#;
const COUNT_SESSIONS: &str = "SELECT COUNT(*) FROM session";
const DELETE_EXPIRED: &str = "DELETE FROM session WHERE expiry + ? <= ?";

/// SQL-backed session provider
#[derive(Clone)]
pub struct SqlSessionProvider {
    pool: SqlitePool,
    expire_secs: i64,
    codec: Arc<dyn SessionCodec>,
    retry: RetryConfig,
}

impl SqlSessionProvider {
    /// Connect with default pool settings and verify the database answers
    pub async fn init(expire_secs: i64, connection_string: &str) -> SessionResult<Self> {
        let config = SessionConfig {
            expire_secs,
            connection_string: connection_string.to_string(),
            ..SessionConfig::default()
        };
        Self::connect(&config).await
    }

    /// Connect using a full configuration
    pub async fn connect(config: &SessionConfig) -> SessionResult<Self> {
        info!(
            expire_secs = config.expire_secs,
            max_connections = config.max_connections,
            "Connecting session provider"
        );

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .max_lifetime(Duration::from_secs(config.conn_max_lifetime_secs))
            .connect(&config.connection_string)
            .await
            .map_err(|e| SessionError::connection("Failed to open session database", e))?;

        let provider = Self::from_pool(pool, config.expire_secs);
        provider.ping().await?;

        if config.create_table {
            create_tables(&provider.pool)
                .await
                .map_err(|e| SessionError::query("create_tables", None, e))?;
        }

        info!("Session provider ready");
        Ok(provider)
    }

    /// Wrap an existing pool. The session table must already exist.
    pub fn from_pool(pool: SqlitePool, expire_secs: i64) -> Self {
        Self {
            pool,
            expire_secs,
            codec: Arc::new(JsonCodec),
            retry: RetryConfig::single_retry(),
        }
    }

    /// Replace the blob codec
    pub fn with_codec(mut self, codec: Arc<dyn SessionCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn expire_secs(&self) -> i64 {
        self.expire_secs
    }

    /// Verify a pooled connection is alive
    pub async fn ping(&self) -> SessionResult<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| SessionError::connection("Failed to acquire connection", e))?;
        conn.ping()
            .await
            .map_err(|e| SessionError::connection("Database ping failed", e))
    }

    /// Fetch the raw row for `id`
    pub async fn load_row(&self, id: &str) -> SessionResult<Option<SessionRow>> {
        sqlx::query_as::<_, SessionRow>(SELECT_SESSION)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SessionError::query("load_row", Some(id), e))
    }

    async fn insert_blank(&self, id: &str, expiry: i64) -> Result<(), sqlx::Error> {
        sqlx::query(INSERT_SESSION)
            .bind(id)
            .bind(&[] as &[u8])
            .bind(expiry)
            .execute(&self.pool)
            .await
            .map(|_| ())
    }

    /// Load the session, inserting an empty row when none exists
    pub async fn read_store(&self, id: &str) -> SessionResult<SqlSessionStore> {
        let (data, expiry) = match self.load_row(id).await? {
            Some(row) => {
                let data = match row.data.as_deref() {
                    Some(bytes) if !bytes.is_empty() => self.codec.decode(bytes)?,
                    _ => SessionData::new(),
                };
                (data, row.expiry)
            }
            None => {
                let now = unix_now();
                self.insert_blank(id, now)
                    .await
                    .map_err(|e| SessionError::query("read", Some(id), e))?;
                debug!(session_id = id, "Created session row");
                (SessionData::new(), now)
            }
        };

        Ok(SqlSessionStore::new(
            self.pool.clone(),
            Arc::clone(&self.codec),
            id.to_string(),
            data,
            expiry,
        ))
    }

    async fn query_exists(&self, id: &str) -> Result<bool, sqlx::Error> {
        let found: Option<i64> = sqlx::query_scalar(SELECT_EXISTS)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    /// Whether a row exists for `id`. Retries once; persistent failure is `false`.
    pub async fn exist(&self, id: &str) -> bool {
        match retry_async(move || self.query_exists(id), &self.retry, "session_exists").await {
            Ok(exists) => exists,
            Err(e) => {
                SessionError::query("exist", Some(id), e).log();
                false
            }
        }
    }

    /// Delete the row for `id`
    pub async fn destroy(&self, id: &str) -> SessionResult<()> {
        sqlx::query(DELETE_SESSION)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| SessionError::query("destroy", Some(id), e))?;
        debug!(session_id = id, "Destroyed session");
        Ok(())
    }

    /// Move the session stored under `old_id` to `new_id`
    pub async fn regenerate_store(
        &self,
        old_id: &str,
        new_id: &str,
    ) -> SessionResult<SqlSessionStore> {
        if self.exist(new_id).await {
            return Err(SessionError::already_exists(new_id));
        }

        if !self.exist(old_id).await {
            self.insert_blank(old_id, unix_now())
                .await
                .map_err(|e| SessionError::query("regenerate", Some(old_id), e))?;
        }

        sqlx::query(RENAME_SESSION)
            .bind(new_id)
            .bind(old_id)
            .execute(&self.pool)
            .await
            .map_err(|e| SessionError::query("regenerate", Some(old_id), e))?;

        info!(old_id = old_id, new_id = new_id, "Regenerated session id");
        self.read_store(new_id).await
    }

    /// Number of stored sessions
    pub async fn try_count(&self) -> SessionResult<usize> {
        let total: i64 = sqlx::query_scalar(COUNT_SESSIONS)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SessionError::query("count", None, e))?;
        Ok(usize::try_from(total).unwrap_or_default())
    }

    /// Number of stored sessions.
    ///
    /// # Panics
    ///
    /// Panics when the count query fails. Use [`Self::try_count`] to handle
    /// the error instead.
    pub async fn count(&self) -> usize {
        match self.try_count().await {
            Ok(total) => total,
            Err(e) => panic!("session: error counting records: {e}"),
        }
    }

    /// Delete expired rows once, returning how many were removed
    pub async fn sweep_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(DELETE_EXPIRED)
            .bind(self.expire_secs)
            .bind(unix_now())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete expired rows. Retries once; persistent failure is only logged.
    pub async fn gc(&self) {
        match retry_async(move || self.sweep_expired(), &self.retry, "session_gc").await {
            Ok(removed) => debug!(removed = removed, "Session GC completed"),
            Err(e) => {
                error!(error = %e, "Error garbage collecting sessions");
            }
        }
    }
}

impl std::fmt::Debug for SqlSessionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlSessionProvider")
            .field("expire_secs", &self.expire_secs)
            .field("codec", &self.codec.name())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionProvider for SqlSessionProvider {
    async fn read(&self, id: &str) -> SessionResult<Box<dyn RawStore>> {
        Ok(Box::new(self.read_store(id).await?))
    }

    async fn exist(&self, id: &str) -> bool {
        SqlSessionProvider::exist(self, id).await
    }

    async fn destroy(&self, id: &str) -> SessionResult<()> {
        SqlSessionProvider::destroy(self, id).await
    }

    async fn regenerate(&self, old_id: &str, new_id: &str) -> SessionResult<Box<dyn RawStore>> {
        Ok(Box::new(self.regenerate_store(old_id, new_id).await?))
    }

    async fn count(&self) -> usize {
        SqlSessionProvider::count(self).await
    }

    async fn gc(&self) {
        SqlSessionProvider::gc(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn provider(expire_secs: i64) -> SqlSessionProvider {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_tables(&pool).await.unwrap();
        SqlSessionProvider::from_pool(pool, expire_secs)
    }

    async fn insert_row(provider: &SqlSessionProvider, id: &str, data: &[u8], expiry: i64) {
        sqlx::query(INSERT_SESSION)
            .bind(id)
            .bind(data)
            .bind(expiry)
            .execute(provider.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_read_creates_blank_row() {
        let provider = provider(3600).await;
        let before = unix_now();

        let store = provider.read_store("s1").await.unwrap();
        assert_eq!(store.id(), "s1");
        assert!(store.is_empty().await);
        assert!(!store.is_dirty().await);
        assert!(store.expiry().await >= before);

        let row = provider.load_row("s1").await.unwrap().unwrap();
        assert!(row.is_blank());
        assert_eq!(row.expiry, store.expiry().await);
        assert_eq!(provider.try_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_second_read_before_release_sees_empty_map() {
        let provider = provider(3600).await;

        let first = provider.read_store("s1").await.unwrap();
        first.set("uid", json!(1)).await;

        let second = provider.read_store("s1").await.unwrap();
        assert!(second.is_empty().await);
        assert_eq!(provider.try_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_read_decodes_existing_blob() {
        let provider = provider(3600).await;
        insert_row(&provider, "s1", br#"{"uid":42,"name":"alice"}"#, 1_000).await;

        let store = provider.read_store("s1").await.unwrap();
        assert_eq!(store.get("uid").await, Some(json!(42)));
        assert_eq!(store.get("name").await, Some(json!("alice")));
        assert_eq!(store.expiry().await, 1_000);
    }

    #[tokio::test]
    async fn test_read_fails_on_undecodable_blob() {
        let provider = provider(3600).await;
        insert_row(&provider, "s1", b"\xff\xfe", 1_000).await;

        let err = provider.read_store("s1").await.unwrap_err();
        assert!(matches!(err, SessionError::Codec { .. }));

        // The row is left untouched
        let row = provider.load_row("s1").await.unwrap().unwrap();
        assert_eq!(row.data.as_deref(), Some(&b"\xff\xfe"[..]));
    }

    #[tokio::test]
    async fn test_release_round_trip_through_provider() {
        let provider = provider(3600).await;

        let store = provider.read_store("s1").await.unwrap();
        store.set("uid", json!(7)).await;
        store.set("roles", json!(["admin"])).await;
        store.release().await.unwrap();

        let reread = provider.read_store("s1").await.unwrap();
        assert_eq!(reread.get("uid").await, Some(json!(7)));
        assert_eq!(reread.get("roles").await, Some(json!(["admin"])));
    }

    #[tokio::test]
    async fn test_exist_and_destroy() {
        let provider = provider(3600).await;
        assert!(!provider.exist("s1").await);

        provider.read_store("s1").await.unwrap();
        assert!(provider.exist("s1").await);

        provider.destroy("s1").await.unwrap();
        assert!(!provider.exist("s1").await);

        // Destroying an absent session succeeds
        provider.destroy("s1").await.unwrap();
    }

    #[tokio::test]
    async fn test_regenerate_moves_data() {
        let provider = provider(3600).await;
        let store = provider.read_store("old").await.unwrap();
        store.set("uid", json!(5)).await;
        store.release().await.unwrap();

        let renamed = provider.regenerate_store("old", "new").await.unwrap();
        assert_eq!(renamed.id(), "new");
        assert_eq!(renamed.get("uid").await, Some(json!(5)));
        assert!(!provider.exist("old").await);
        assert!(provider.exist("new").await);
    }

    #[tokio::test]
    async fn test_regenerate_conflict_leaves_rows_untouched() {
        let provider = provider(3600).await;
        insert_row(&provider, "old", br#"{"a":1}"#, 1_000).await;
        insert_row(&provider, "new", br#"{"b":2}"#, 2_000).await;

        let err = provider.regenerate_store("old", "new").await.unwrap_err();
        assert!(matches!(err, SessionError::AlreadyExists { ref id, .. } if id == "new"));

        let old = provider.load_row("old").await.unwrap().unwrap();
        let new = provider.load_row("new").await.unwrap().unwrap();
        assert_eq!(old.data.as_deref(), Some(&br#"{"a":1}"#[..]));
        assert_eq!(new.data.as_deref(), Some(&br#"{"b":2}"#[..]));
        assert_eq!(provider.try_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_regenerate_missing_old_id() {
        let provider = provider(3600).await;

        let store = provider.regenerate_store("ghost", "fresh").await.unwrap();
        assert_eq!(store.id(), "fresh");
        assert!(store.is_empty().await);
        assert!(!provider.exist("ghost").await);
        assert!(provider.exist("fresh").await);
        assert_eq!(provider.try_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_gc_deletes_only_expired_rows() {
        let provider = provider(3600).await;
        let now = unix_now();
        insert_row(&provider, "expired", b"", now - 4000).await;
        insert_row(&provider, "boundary", b"", now - 3600).await;
        insert_row(&provider, "live", b"", now - 100).await;

        provider.gc().await;

        assert!(!provider.exist("expired").await);
        assert!(!provider.exist("boundary").await);
        assert!(provider.exist("live").await);
        assert_eq!(provider.count().await, 1);
    }

    #[tokio::test]
    async fn test_sweep_expired_edge_is_inclusive() {
        let provider = provider(3600).await;
        let now = unix_now();
        insert_row(&provider, "at_edge", b"", now - 3600).await;
        insert_row(&provider, "inside", b"", now - 3600 + 10).await;

        assert_eq!(provider.sweep_expired().await.unwrap(), 1);
        assert!(!provider.exist("at_edge").await);
        assert!(provider.exist("inside").await);
    }

    #[tokio::test]
    async fn test_exist_and_gc_retry_once() {
        let provider = provider(3600).await;
        assert_eq!(provider.retry, RetryConfig::single_retry());
        assert_eq!(provider.retry.max_attempts, 2);
        assert_eq!(provider.expire_secs(), 3600);

        // Clones share the policy
        let cloned = provider.clone();
        assert_eq!(cloned.retry, RetryConfig::single_retry());
    }

    #[tokio::test]
    async fn test_sweep_expired_reports_removed_rows() {
        let provider = provider(60).await;
        let now = unix_now();
        insert_row(&provider, "a", b"", now - 500).await;
        insert_row(&provider, "b", b"", now - 400).await;
        insert_row(&provider, "c", b"", now).await;

        assert_eq!(provider.sweep_expired().await.unwrap(), 2);
        assert_eq!(provider.sweep_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_closed_pool_degrades_exist_and_gc() {
        let provider = provider(3600).await;
        provider.pool().close().await;

        assert!(!provider.exist("s1").await);
        provider.gc().await;
        assert!(matches!(
            provider.try_count().await,
            Err(SessionError::Query { .. })
        ));
        assert!(provider.destroy("s1").await.is_err());
        assert!(provider.read_store("s1").await.is_err());
    }

    #[tokio::test]
    #[should_panic(expected = "error counting records")]
    async fn test_count_panics_when_backend_is_broken() {
        let provider = provider(3600).await;
        provider.pool().close().await;
        provider.count().await;
    }

    #[tokio::test]
    async fn test_trait_object_lifecycle() {
        let provider: Arc<dyn SessionProvider> = Arc::new(provider(3600).await);

        let store = provider.read("s1").await.unwrap();
        store.set("uid", json!(9)).await.unwrap();
        store.release().await.unwrap();

        let renamed = provider.regenerate("s1", "s2").await.unwrap();
        assert_eq!(renamed.id(), "s2");
        assert_eq!(renamed.get("uid").await, Some(json!(9)));

        renamed.flush().await.unwrap();
        renamed.release().await.unwrap();
        assert_eq!(provider.read("s2").await.unwrap().get("uid").await, None);

        provider.destroy("s2").await.unwrap();
        assert_eq!(provider.count().await, 0);
    }
}
