//! Registry factory for the SQL provider

use crate::provider::SqlSessionProvider;
use sqlsession_core::{
    async_trait, ProviderFactory, ProviderRegistry, SessionConfig, SessionProvider, SessionResult,
};
use std::sync::Arc;

/// Name the SQL provider registers under
pub const PROVIDER_NAME: &str = "sqlite";

/// Builds [`SqlSessionProvider`]s, taking pool settings from a base configuration
#[derive(Debug, Clone, Default)]
pub struct SqlProviderFactory {
    base: SessionConfig,
}

impl SqlProviderFactory {
    pub fn new(base: SessionConfig) -> Self {
        Self { base }
    }
}

#[async_trait]
impl ProviderFactory for SqlProviderFactory {
    async fn init(
        &self,
        expire_secs: i64,
        connection_string: &str,
    ) -> SessionResult<Arc<dyn SessionProvider>> {
        let config = SessionConfig {
            expire_secs,
            connection_string: connection_string.to_string(),
            ..self.base.clone()
        };
        let provider = SqlSessionProvider::connect(&config).await?;
        Ok(Arc::new(provider))
    }
}

/// Register the SQL provider with default pool settings
pub fn register(registry: &mut ProviderRegistry) -> SessionResult<()> {
    register_with_config(registry, SessionConfig::default())
}

/// Register the SQL provider, taking pool settings from `base`
pub fn register_with_config(
    registry: &mut ProviderRegistry,
    base: SessionConfig,
) -> SessionResult<()> {
    registry.register(PROVIDER_NAME, Arc::new(SqlProviderFactory::new(base)))
}
