//! Synthetic monitoring engine.
//!
//! A [`collector::Collector`] owns one [`monitoring::Watcher`] per configured
//! service. Every watcher polls its service on a fixed interval, runs the
//! configured session of HTTP calls and validates each response with the
//! ordered rules in [`validation`]. Results flow back to the collector, which
//! keeps a bounded history and feeds registered listeners.

pub mod check;
pub mod collector;
pub mod config;
pub mod monitoring;
pub mod notifier;
pub mod reload;
pub mod types;
pub mod validation;

#[cfg(test)]
mod testing;

pub use collector::{Collector, CollectorError, CollectorHandle, ResultListener, ServiceResults};
pub use config::{Call, Check, ConfigError, Expectation, ServiceSpec};
pub use monitoring::{Checker, HttpChecker};
pub use notifier::{Channel, Notifier, Notifiers};
pub use reload::{ConfigPoller, ConfigSource, config_hash};
pub use types::{ErrorKind, Location, ProbeError, ProbeResult};
