//! Named provider factories
//!
//! The host's composition root registers backends explicitly and opens one by
//! name at startup; nothing registers itself globally.

use crate::error::{ErrorContext, SessionError, SessionResult};
use crate::traits::SessionProvider;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Creates an initialized provider from an expiry window and a connection string
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn init(
        &self,
        expire_secs: i64,
        connection_string: &str,
    ) -> SessionResult<Arc<dyn SessionProvider>>;
}

/// Registry of provider factories keyed by name
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory. Names are unique.
    pub fn register(
        &mut self,
        name: &str,
        factory: Arc<dyn ProviderFactory>,
    ) -> SessionResult<()> {
        if self.factories.contains_key(name) {
            return Err(SessionError::Config {
                message: format!("Session provider '{}' is already registered", name),
                source: None,
                context: ErrorContext::new("registry")
                    .with_operation("register")
                    .with_metadata("provider", name),
            });
        }

        self.factories.insert(name.to_string(), factory);
        info!(provider = name, "Registered session provider");
        Ok(())
    }

    /// Whether a provider is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered provider names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Initialize the provider registered under `name`
    pub async fn open(
        &self,
        name: &str,
        expire_secs: i64,
        connection_string: &str,
    ) -> SessionResult<Arc<dyn SessionProvider>> {
        let factory = self.factories.get(name).ok_or_else(|| SessionError::Config {
            message: format!("Unknown session provider: {}", name),
            source: None,
            context: ErrorContext::new("registry")
                .with_operation("open")
                .with_metadata("provider", name)
                .with_suggestion(&format!("Available providers: {}", self.names().join(", "))),
        })?;

        factory.init(expire_secs, connection_string).await
    }
}
