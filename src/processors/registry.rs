use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::{CollectAdapter, PayoutAdapter, ProcessorAdapter, ProcessorError};
use crate::domain::{ProcessorConfig, ProcessorKind};
use crate::ports::LedgerStore;

#[derive(Clone)]
struct Entry {
    config: Option<ProcessorConfig>,
    adapter: Arc<dyn ProcessorAdapter>,
}

/// Builds the adapter for a config, rejecting endpoints that are not absolute URLs.
pub fn build_adapter(
    config: &ProcessorConfig,
    timeout: Duration,
) -> Result<Arc<dyn ProcessorAdapter>, ProcessorError> {
    let endpoint = url::Url::parse(&config.endpoint).map_err(|e| {
        ProcessorError::Config(format!("{} endpoint '{}': {}", config.name, config.endpoint, e))
    })?;
    if !matches!(endpoint.scheme(), "http" | "https") {
        return Err(ProcessorError::Config(format!(
            "{} endpoint must be http(s)",
            config.name
        )));
    }
    let adapter: Arc<dyn ProcessorAdapter> = match config.kind {
        ProcessorKind::Payout => Arc::new(PayoutAdapter::new(config, timeout)?),
        ProcessorKind::Collect => Arc::new(CollectAdapter::new(config, timeout)?),
    };
    Ok(adapter)
}

/// Processor adapters by name, swapped atomically when configs change.
pub struct ProcessorRegistry {
    inner: ArcSwap<HashMap<String, Entry>>,
    timeout: Duration,
}

impl ProcessorRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: ArcSwap::from_pointee(HashMap::new()),
            timeout,
        }
    }

    /// Registry over ready-made adapters. They are dropped on the next config reload.
    pub fn from_adapters(adapters: Vec<Arc<dyn ProcessorAdapter>>) -> Self {
        let map = adapters
            .into_iter()
            .map(|adapter| {
                (
                    adapter.name().to_string(),
                    Entry {
                        config: None,
                        adapter,
                    },
                )
            })
            .collect();
        Self {
            inner: ArcSwap::from_pointee(map),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ProcessorAdapter>, ProcessorError> {
        self.inner
            .load()
            .get(name)
            .map(|entry| entry.adapter.clone())
            .ok_or_else(|| ProcessorError::Unknown(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.load().keys().cloned().collect();
        names.sort();
        names
    }

    /// Replaces the registry contents. Adapters whose config is unchanged are
    /// kept so their circuit breaker state survives. Invalid configs are
    /// skipped and returned.
    pub fn apply(&self, configs: Vec<ProcessorConfig>) -> Vec<ProcessorError> {
        let current = self.inner.load_full();
        let mut next = HashMap::new();
        let mut rejected = Vec::new();

        for config in configs.into_iter().filter(|c| c.is_active) {
            if let Some(existing) = current.get(&config.name) {
                if existing.config.as_ref() == Some(&config) {
                    next.insert(config.name.clone(), existing.clone());
                    continue;
                }
            }
            match build_adapter(&config, self.timeout) {
                Ok(adapter) => {
                    next.insert(
                        config.name.clone(),
                        Entry {
                            config: Some(config),
                            adapter,
                        },
                    );
                }
                Err(e) => rejected.push(e),
            }
        }

        self.inner.store(Arc::new(next));
        rejected
    }

    pub async fn reload_once(&self, store: &dyn LedgerStore) -> anyhow::Result<usize> {
        let configs = store.processors().await?;
        for err in self.apply(configs) {
            tracing::warn!("Skipping processor config: {}", err);
        }
        Ok(self.inner.load().len())
    }

    /// Loads configs now and keeps refreshing them in the background.
    pub async fn start(
        self: Arc<Self>,
        store: Arc<dyn LedgerStore>,
        refresh_interval: Duration,
    ) -> JoinHandle<()> {
        if let Err(e) = self.reload_once(store.as_ref()).await {
            tracing::error!("Initial processor load failed: {}", e);
        }
        tokio::spawn(async move {
            loop {
                sleep(refresh_interval).await;
                match self.reload_once(store.as_ref()).await {
                    Ok(count) => tracing::debug!("Processor registry refreshed ({} active)", count),
                    Err(e) => tracing::error!("Processor registry refresh failed: {}", e),
                }
            }
        })
    }
}
