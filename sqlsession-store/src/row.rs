//! Persisted session row and table schema

use sqlx::SqlitePool;
use tracing::{debug, info};

/// Session table name
pub const SESSION_TABLE: &str = "session";

const CREATE_SESSION_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS session (
        "key"  TEXT PRIMARY KEY NOT NULL,
        data   BLOB,
        expiry INTEGER NOT NULL
    )
"#;

const CREATE_EXPIRY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_session_expiry ON session (expiry)";

/// One session as stored in the database
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct SessionRow {
    /// Session identifier
    pub key: String,
    /// Encoded key/value map; empty or NULL until the first write-back
    pub data: Option<Vec<u8>>,
    /// Unix seconds of creation or last write-back
    pub expiry: i64,
}

impl SessionRow {
    /// Whether the row carries no encoded data yet
    pub fn is_blank(&self) -> bool {
        self.data.as_deref().map_or(true, <[u8]>::is_empty)
    }
}

/// Create the session table and its expiry index if missing
pub async fn create_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    debug!("Creating session table...");
    sqlx::query(CREATE_SESSION_TABLE).execute(pool).await?;
    sqlx::query(CREATE_EXPIRY_INDEX).execute(pool).await?;
    info!(table = SESSION_TABLE, "Session table ready");
    Ok(())
}
