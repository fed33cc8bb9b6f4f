use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;
use std::{fmt, fs, path};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use watchpost::{ConfigSource, ServiceSpec};

/// Server configuration file looked up inside the config directory
pub const SERVER_CONFIG_FILE: &str = "watchpost.toml";

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {}", .0.display())]
    ReadFailed(path::PathBuf, #[source] std::io::Error),

    #[error("failed to parse {}", .0.display())]
    ParseFailed(path::PathBuf, #[source] toml::de::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding service definitions, relative to the config dir
    pub services_dir: Option<path::PathBuf>,
    pub reload_interval_seconds: u64,
    pub history_capacity: usize,
    pub slack: Option<Slack>,
    pub metrics: Option<Metrics>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Slack {
    pub webhook: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metrics {
    /// Address of the Prometheus scrape endpoint
    pub listen: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            services_dir: None,
            reload_interval_seconds: 10,
            history_capacity: watchpost::collector::DEFAULT_CAPACITY,
            slack: None,
            metrics: None,
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);
        let services_dir = self
            .services_dir
            .as_ref()
            .map_or_else(|| ".".to_string(), |dir| dir.display().to_string());

        writeln!(f, "Current Configuration State:")?;
        write_title_1(f, "Services")?;
        write_1(f, "Directory", &services_dir)?;
        write_1(f, "Reload Interval", &format!("{}s", self.reload_interval_seconds))?;
        write_1(f, "History Capacity", &self.history_capacity)?;
        write_title_1(f, "Notifications")?;
        write_1(f, "Slack", &self.slack.is_some())?;
        write_title_1(f, "Metrics")?;
        match &self.metrics {
            Some(metrics) => write_1(f, "Listen", &metrics.listen)?,
            None => write_1(f, "Listen", &"disabled")?,
        }

        Ok(())
    }
}

impl Config {
    /// Read `watchpost.toml` from the config directory, defaults if absent
    pub fn from_config_dir(config_dir: impl AsRef<path::Path>) -> Result<Self, Error> {
        let config_path = config_dir.as_ref().join(SERVER_CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let raw_string = fs::read_to_string(&config_path)
            .map_err(|err| Error::ReadFailed(config_path.clone(), err))?;
        toml::from_str(raw_string.as_str()).map_err(|err| Error::ParseFailed(config_path, err))
    }

    pub fn services_dir(&self, config_dir: &path::Path) -> path::PathBuf {
        match &self.services_dir {
            Some(dir) => config_dir.join(dir),
            None => config_dir.to_path_buf(),
        }
    }

    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_seconds.max(1))
    }
}

/// Service definitions stored as `*.toml` files below a directory.
///
/// The id of a service is its path relative to the directory without the
/// extension, e.g. `shop/checkout.toml` becomes `shop/checkout`.
#[derive(Debug, Clone)]
pub struct ServiceDirectory {
    root: path::PathBuf,
}

impl ServiceDirectory {
    pub fn new(root: impl Into<path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn collect(
        &self,
        dir: &path::Path,
        services: &mut BTreeMap<String, ServiceSpec>,
    ) -> anyhow::Result<()> {
        let mut entries = fs::read_dir(dir)
            .with_context(|| format!("failed to list {}", dir.display()))?
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|entry| entry.path());

        for entry in entries {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            if entry.file_type()?.is_dir() {
                self.collect(&path, services)?;
                continue;
            }
            if path.extension().is_none_or(|ext| ext != "toml") || name == SERVER_CONFIG_FILE {
                continue;
            }

            let id = self.service_id(&path)?;
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let mut spec: ServiceSpec = toml::from_str(&raw)
                .with_context(|| format!("invalid service file {}", path.display()))?;
            spec.id = id.clone();
            spec.validate().with_context(|| format!("invalid service {id}"))?;

            services.insert(id, spec);
        }

        Ok(())
    }

    fn service_id(&self, path: &path::Path) -> anyhow::Result<String> {
        let relative = path.strip_prefix(&self.root)?.with_extension("");
        Ok(relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"))
    }
}

impl ConfigSource for ServiceDirectory {
    fn load(&self) -> anyhow::Result<BTreeMap<String, ServiceSpec>> {
        let mut services = BTreeMap::new();
        self.collect(&self.root, &mut services)?;
        Ok(services)
    }
}
