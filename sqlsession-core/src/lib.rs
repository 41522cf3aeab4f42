//! sqlsession core - contracts and ambient infrastructure
//!
//! Defines the session store/provider contracts, the blob codec, the provider
//! registry, and the error, logging and configuration layers shared by every
//! backend crate.

pub mod async_utils;
pub mod codec;
pub mod config;
pub mod error;
pub mod logging;
pub mod registry;
pub mod sweeper;
pub mod traits;
pub mod types;

pub use async_utils::*;
pub use codec::*;
pub use config::*;
pub use error::*;
pub use logging::*;
pub use registry::*;
pub use sweeper::*;
pub use traits::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use serde_json::Value;
pub use tracing;
