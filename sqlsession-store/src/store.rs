//! Session Store - one request's in-memory view of a session row
//!
//! Reads and writes hit the in-memory map only. `release` writes the map back
//! when it changed, or when the persisted expiry is older than the freshness
//! window so GC keeps seeing the session as alive.

use serde_json::Value;
use sqlsession_core::{
    async_trait, unix_now, RawStore, SessionCodec, SessionData, SessionError, SessionResult,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Seconds a clean session's persisted expiry may lag behind before release rewrites it
pub const FRESHNESS_WINDOW_SECS: i64 = 60;

const UPDATE_SESSION: &str = r#"UPDATE session SET data = ?, expiry = ? WHERE "key" = ?"#;

#[derive(Debug)]
struct StoreState {
    data: SessionData,
    expiry: i64,
    dirty: bool,
}

/// SQL-backed session store
///
/// Stores checked out concurrently for the same identifier are independent;
/// the last one released wins.
pub struct SqlSessionStore {
    pool: SqlitePool,
    codec: Arc<dyn SessionCodec>,
    id: String,
    state: RwLock<StoreState>,
}

impl SqlSessionStore {
    /// Wrap a decoded session map
    pub fn new(
        pool: SqlitePool,
        codec: Arc<dyn SessionCodec>,
        id: String,
        data: SessionData,
        expiry: i64,
    ) -> Self {
        Self {
            pool,
            codec,
            id,
            state: RwLock::new(StoreState {
                data,
                expiry,
                dirty: false,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn set(&self, key: &str, value: Value) {
        let mut state = self.state.write().await;
        state.data.insert(key.to_string(), value);
        state.dirty = true;
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.state.read().await.data.get(key).cloned()
    }

    pub async fn delete(&self, key: &str) {
        let mut state = self.state.write().await;
        state.data.remove(key);
        state.dirty = true;
    }

    pub async fn flush(&self) {
        let mut state = self.state.write().await;
        state.data = SessionData::new();
        state.dirty = true;
    }

    /// Whether the map changed since load or the last write-back
    pub async fn is_dirty(&self) -> bool {
        self.state.read().await.dirty
    }

    /// Persisted expiry as last loaded or written
    pub async fn expiry(&self) -> i64 {
        self.state.read().await.expiry
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.data.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.data.is_empty()
    }

    /// Keys currently set, sorted
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.read().await.data.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Write the session back unless it is clean and its expiry is still fresh.
    ///
    /// Returns whether a write was issued.
    pub async fn release(&self) -> SessionResult<bool> {
        let now = unix_now();
        let mut state = self.state.write().await;

        if !state.dirty && state.expiry + FRESHNESS_WINDOW_SECS >= now {
            debug!(session_id = %self.id, "Skipping write-back for clean session");
            return Ok(false);
        }

        let blob = self.codec.encode(&state.data)?;

        sqlx::query(UPDATE_SESSION)
            .bind(blob)
            .bind(now)
            .bind(&self.id)
            .execute(&self.pool)
            .await
            .map_err(|e| SessionError::query("release", Some(&self.id), e))?;

        state.dirty = false;
        state.expiry = now;
        debug!(session_id = %self.id, expiry = now, "Session written back");
        Ok(true)
    }
}

impl std::fmt::Debug for SqlSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlSessionStore")
            .field("id", &self.id)
            .field("codec", &self.codec.name())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RawStore for SqlSessionStore {
    async fn set(&self, key: &str, value: Value) -> SessionResult<()> {
        SqlSessionStore::set(self, key, value).await;
        Ok(())
    }

    async fn get(&self, key: &str) -> Option<Value> {
        SqlSessionStore::get(self, key).await
    }

    async fn delete(&self, key: &str) -> SessionResult<()> {
        SqlSessionStore::delete(self, key).await;
        Ok(())
    }

    async fn keys(&self) -> Vec<String> {
        SqlSessionStore::keys(self).await
    }

    fn id(&self) -> &str {
        &self.id
    }

    async fn release(&self) -> SessionResult<()> {
        SqlSessionStore::release(self).await.map(|_| ())
    }

    async fn flush(&self) -> SessionResult<()> {
        SqlSessionStore::flush(self).await;
        Ok(())
    }
}
