//! Store and provider contracts consumed by the host session framework

use crate::error::SessionResult;
use async_trait::async_trait;
use serde_json::Value;

/// One request's view of a session.
///
/// Mutations stay in memory until [`RawStore::release`] writes them back.
#[async_trait]
pub trait RawStore: Send + Sync {
    /// Set a value, marking the session dirty
    async fn set(&self, key: &str, value: Value) -> SessionResult<()>;

    /// Get a value, `None` when absent
    async fn get(&self, key: &str) -> Option<Value>;

    /// Remove a key, marking the session dirty
    async fn delete(&self, key: &str) -> SessionResult<()>;

    /// Keys currently set, sorted
    async fn keys(&self) -> Vec<String>;

    /// Session identifier
    fn id(&self) -> &str;

    /// Write the session back to storage if needed
    async fn release(&self) -> SessionResult<()>;

    /// Drop all keys, marking the session dirty
    async fn flush(&self) -> SessionResult<()>;
}

/// Row-level session lifecycle
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Load the session, creating an empty row if none exists
    async fn read(&self, id: &str) -> SessionResult<Box<dyn RawStore>>;

    /// Whether a row exists. Query failures degrade to `false`.
    async fn exist(&self, id: &str) -> bool;

    /// Delete the session row
    async fn destroy(&self, id: &str) -> SessionResult<()>;

    /// Rename `old_id` to `new_id` and return the renamed session
    async fn regenerate(&self, old_id: &str, new_id: &str) -> SessionResult<Box<dyn RawStore>>;

    /// Number of stored sessions.
    ///
    /// # Panics
    ///
    /// Panics when the storage backend cannot be queried.
    async fn count(&self) -> usize;

    /// Sweep expired sessions. Failures are logged, never returned.
    async fn gc(&self);
}
