// Configuration cache - single-slot memoized studio + show-style settings

//! # Configuration Cache
//!
//! Timeline builds and action refreshes all need the current
//! [`Configuration`]. Fetching it from the source on every tick is wasteful,
//! so [`ConfigurationCache`] keeps exactly one value until someone calls
//! [`ConfigurationCache::clear_configuration_cache`].
//!
//! Writers only ever replace or clear the slot; readers get an `Arc` to an
//! immutable value and never observe a partial update.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::models::Configuration;
use crate::{Result, RundownError};

/// Where configuration comes from
#[async_trait::async_trait]
pub trait ConfigurationSource: Send + Sync {
    async fn fetch_configuration(&self) -> Result<Configuration>;
}

/// A fixed configuration held in memory
#[derive(Debug, Default)]
pub struct StaticConfigurationSource {
    configuration: RwLock<Option<Configuration>>,
}

impl StaticConfigurationSource {
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration: RwLock::new(Some(configuration)),
        }
    }

    /// Swap the stored configuration; cached copies stay until cleared
    pub async fn replace(&self, configuration: Configuration) {
        *self.configuration.write().await = Some(configuration);
    }
}

#[async_trait::async_trait]
impl ConfigurationSource for StaticConfigurationSource {
    async fn fetch_configuration(&self) -> Result<Configuration> {
        self.configuration
            .read()
            .await
            .clone()
            .ok_or_else(|| RundownError::Misconfiguration("no configuration loaded".to_string()))
    }
}

/// Reads configuration from a TOML/JSON/YAML file on every fetch
#[derive(Debug, Clone)]
pub struct FileConfigurationSource {
    path: PathBuf,
}

impl FileConfigurationSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl ConfigurationSource for FileConfigurationSource {
    async fn fetch_configuration(&self) -> Result<Configuration> {
        let path = self.path.clone();
        let configuration = tokio::task::spawn_blocking(move || {
            config::Config::builder()
                .add_source(config::File::from(path.as_path()).required(true))
                .build()?
                .try_deserialize::<Configuration>()
        })
        .await
        .map_err(|e| RundownError::Internal(format!("configuration loader panicked: {}", e)))??;
        debug!(path = %self.path.display(), "Loaded configuration from file");
        Ok(configuration)
    }
}

/// Single-slot memoized accessor for the current configuration
pub struct ConfigurationCache {
    source: Arc<dyn ConfigurationSource>,
    cached: RwLock<Option<Arc<Configuration>>>,
}

impl ConfigurationCache {
    pub fn new(source: Arc<dyn ConfigurationSource>) -> Self {
        Self {
            source,
            cached: RwLock::new(None),
        }
    }

    /// Return the cached configuration, fetching it on first use
    ///
    /// Concurrent first callers wait on one fetch instead of each hitting the
    /// source. Invalid configurations are rejected and not cached.
    pub async fn get_configuration(&self) -> Result<Arc<Configuration>> {
        if let Some(configuration) = self.cached.read().await.as_ref() {
            return Ok(configuration.clone());
        }

        let mut slot = self.cached.write().await;
        if let Some(configuration) = slot.as_ref() {
            return Ok(configuration.clone());
        }

        let configuration = self.source.fetch_configuration().await?;
        configuration.validate()?;
        info!(
            studio_id = %configuration.studio.studio_id,
            show_style_id = %configuration.show_style.show_style_id,
            "Configuration cached"
        );
        let configuration = Arc::new(configuration);
        *slot = Some(configuration.clone());
        Ok(configuration)
    }

    /// Drop the cached value; the next read goes to the source
    pub async fn clear_configuration_cache(&self) {
        *self.cached.write().await = None;
        debug!("Configuration cache cleared");
    }
}
