//! Service definitions consumed by the probing engine.
//!
//! A [`ServiceSpec`] is immutable once loaded; a reload replaces it wholesale.
//! Every map is a `BTreeMap` so that serialization (and therefore the reload
//! hash) is stable.

pub mod expect;
pub mod validation;

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use expect::{Bound, Expectation};

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Poll interval applied when a service does not declare one
pub const DEFAULT_INTERVAL_SECONDS: u64 = 60;

/// Warn one week before a certificate expires by default
pub const DEFAULT_TLS_WARNING_HOURS: u64 = 7 * 24;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("expectation has no mode, set one of min, max, count, contains, equals")]
    EmptyExpectation,

    #[error("expectation mixes several modes: {0}")]
    AmbiguousExpectation(String),

    #[error("endpoint is invalid: {0}")]
    InvalidEndpoint(String),

    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    #[error("invalid call in session @{index}: {reason}")]
    InvalidCall { index: usize, reason: String },
}

/// A monitored HTTP endpoint plus the session run against it every cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceSpec {
    /// Filled in by the loader, never read from the service file
    #[serde(default, skip_deserializing)]
    pub id: String,

    pub endpoint: String,

    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    /// Certificates expiring within this many hours are reported
    #[serde(default = "default_tls_warning_hours")]
    pub tls_warning_hours: u64,

    #[serde(default)]
    pub notify_if_resolved: bool,

    /// Report a `down` alert once the service has failed for this long
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_after_seconds: Option<u64>,

    #[serde(default)]
    pub session: Vec<Call>,
}

fn default_interval_seconds() -> u64 {
    DEFAULT_INTERVAL_SECONDS
}

fn default_tls_warning_hours() -> u64 {
    DEFAULT_TLS_WARNING_HOURS
}

impl ServiceSpec {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            tls_warning_hours: DEFAULT_TLS_WARNING_HOURS,
            notify_if_resolved: false,
            alert_after_seconds: None,
            session: Vec::new(),
        }
    }

    pub fn with_call(mut self, call: Call) -> Self {
        self.session.push(call);
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn tls_warning(&self) -> Duration {
        Duration::from_secs(self.tls_warning_hours * 3600)
    }

    pub fn alert_after(&self) -> Option<Duration> {
        self.alert_after_seconds.map(Duration::from_secs)
    }

    /// Reject definitions that could never be probed
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = validation::parse_endpoint(&self.endpoint)?;
        validation::check_interval(self.interval_seconds)?;
        self.session
            .iter()
            .enumerate()
            .try_for_each(|(index, call)| validation::check_call(&endpoint, index, call))
    }
}

/// One HTTP request within a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Call {
    /// Path and query overlaid onto the service endpoint
    #[serde(default)]
    pub uri: String,

    /// Override the endpoint scheme for this call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Request payload, encoded according to `content_type`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default)]
    pub check: Vec<Check>,
}

impl Call {
    pub fn get(uri: impl Into<String>) -> Self {
        Self { uri: uri.into(), ..Self::default() }
    }

    pub fn with_check(mut self, check: Check) -> Self {
        self.check.push(check);
        self
    }

    pub fn method(&self) -> &str {
        self.method.as_deref().filter(|m| !m.is_empty()).unwrap_or("GET")
    }

    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or(CONTENT_TYPE_JSON)
    }
}

/// Declarative bundle of validation rules applied to one response.
///
/// Every populated field activates its validator, absent fields are no-ops.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Check {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_ms: Option<u64>,

    #[serde(default)]
    pub json_path: BTreeMap<String, Expectation>,

    #[serde(default)]
    pub css: BTreeMap<String, Expectation>,

    #[serde(default)]
    pub regex: BTreeMap<String, Expectation>,

    /// Expected body, compared after trimming surrounding whitespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_reply: Option<String>,
}

impl Check {
    pub fn max_duration(&self) -> Option<Duration> {
        self.max_duration_ms.map(Duration::from_millis)
    }
}
