use crate::runtime::catalog::StaticCatalog;
use crate::runtime::http::{HttpExecutionFeed, HttpWorkflowStore};
use crate::runtime::redis_storage::{RedisExecutionFeed, RedisWorkflowStore};
use crate::runtime::storage::{
    ExecutionFeed, InMemoryExecutionFeed, InMemoryWorkflowStore, WorkflowStore,
};
use anyhow::{Context as AnyhowContext, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// ```yaml
/// store:
///   backend: redis
///   url: redis://127.0.0.1/
/// feed:
///   poll_interval_ms: 1000
/// catalog: tasks.yaml
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub catalog: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    Redis,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: Backend,
    /// Redis connection string or the engine's API base URL.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            url: None,
            prefix: default_prefix(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl FeedConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

fn default_prefix() -> String {
    "flowtree".to_string()
}

fn default_poll_interval() -> u64 {
    1000
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

impl Config {
    fn url(&self) -> Result<&str> {
        self.store
            .url
            .as_deref()
            .ok_or_else(|| anyhow!("store.url is required for the {:?} backend", self.store.backend))
    }

    pub fn open_store(&self) -> Result<Arc<dyn WorkflowStore>> {
        let store: Arc<dyn WorkflowStore> = match self.store.backend {
            Backend::Memory => Arc::new(InMemoryWorkflowStore::new()),
            Backend::Redis => {
                let client = redis::Client::open(self.url()?).context("Invalid Redis URL")?;
                Arc::new(RedisWorkflowStore::new(client, self.store.prefix.clone()))
            }
            Backend::Http => Arc::new(HttpWorkflowStore::new(self.url()?)),
        };
        Ok(store)
    }

    /// The execution feed lives next to the definitions.
    pub fn open_feed(&self) -> Result<Arc<dyn ExecutionFeed>> {
        let feed: Arc<dyn ExecutionFeed> = match self.store.backend {
            Backend::Memory => Arc::new(InMemoryExecutionFeed::new()),
            Backend::Redis => {
                let client = redis::Client::open(self.url()?).context("Invalid Redis URL")?;
                Arc::new(RedisExecutionFeed::new(client, self.store.prefix.clone()))
            }
            Backend::Http => Arc::new(HttpExecutionFeed::new(self.url()?)),
        };
        Ok(feed)
    }

    pub fn open_catalog(&self) -> Result<Option<StaticCatalog>> {
        self.catalog
            .as_deref()
            .map(StaticCatalog::load)
            .transpose()
    }
}
