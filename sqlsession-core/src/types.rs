//! Core data types

use std::collections::HashMap;

/// Decoded session state: application-defined keys mapped to dynamically typed values
pub type SessionData = HashMap<String, serde_json::Value>;

/// Current wall-clock time in unix seconds
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
