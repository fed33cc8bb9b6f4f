//! Periodic configuration reload driven by a content hash.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::collector::CollectorHandle;
use crate::config::ServiceSpec;

/// Where service definitions come from
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<BTreeMap<String, ServiceSpec>>;
}

impl<F> ConfigSource for F
where
    F: Fn() -> Result<BTreeMap<String, ServiceSpec>> + Send + Sync,
{
    fn load(&self) -> Result<BTreeMap<String, ServiceSpec>> {
        self()
    }
}

/// Stable hash of a service set, hex encoded
pub fn config_hash(services: &BTreeMap<String, ServiceSpec>) -> Result<String> {
    let encoded = serde_json::to_vec(services)?;
    Ok(hex::encode(Sha256::digest(&encoded)))
}

/// Loads the source and pushes it to the collector when its hash changed
pub struct ConfigPoller<S> {
    source: S,
    collector: CollectorHandle,
    last_hash: Option<String>,
}

impl<S: ConfigSource + 'static> ConfigPoller<S> {
    pub fn new(source: S, collector: CollectorHandle) -> Self {
        Self { source, collector, last_hash: None }
    }

    /// One poll; returns whether a new configuration was applied
    pub async fn poll_once(&mut self) -> Result<bool> {
        let services = self.source.load()?;
        let hash = config_hash(&services)?;
        if self.last_hash.as_deref() == Some(hash.as_str()) {
            return Ok(false);
        }

        info!(services = services.len(), hash = %&hash[..12], "Applying new configuration");
        self.collector.apply_config(services).await?;
        self.last_hash = Some(hash);
        Ok(true)
    }

    /// Poll forever at `interval`; load failures keep the current config
    pub fn spawn(mut self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            loop {
                timer.tick().await;
                match self.poll_once().await {
                    Ok(_) => {}
                    Err(e) if e.is::<crate::collector::CollectorError>() => {
                        error!("Stopping config poller: {}", e);
                        break;
                    }
                    Err(e) => warn!("Could not load configuration: {:#}", e),
                }
            }
        })
    }
}
