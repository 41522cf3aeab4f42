//! sqlsession store - SQL-backed session persistence
//!
//! One row per session identifier holds an encoded key/value blob and the unix
//! time of its last write. [`SqlSessionProvider`] manages the row lifecycle and
//! hands out [`SqlSessionStore`]s, in-memory views that write back on release.
//!
//! ```no_run
//! use serde_json::json;
//! use sqlsession_store::SqlSessionProvider;
//!
//! # async fn demo() -> sqlsession_core::SessionResult<()> {
//! let provider = SqlSessionProvider::init(86400, "sqlite://sessions.db?mode=rwc").await?;
//! let store = provider.read_store("a1b2c3").await?;
//! store.set("uid", json!(42)).await;
//! store.release().await?;
//! # Ok(())
//! # }
//! ```

pub mod factory;
pub mod provider;
pub mod row;
pub mod store;

pub use factory::{register, register_with_config, SqlProviderFactory, PROVIDER_NAME};
pub use provider::SqlSessionProvider;
pub use row::{create_tables, SessionRow, SESSION_TABLE};
pub use store::{SqlSessionStore, FRESHNESS_WINDOW_SECS};
