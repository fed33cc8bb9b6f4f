use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::ProbeResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    /// Timestamp of the first result of the current failure streak
    pub start: DateTime<Utc>,
}

/// Start of the trailing run of failing results, if the latest one failed
pub fn down_since<'a>(results: impl IntoIterator<Item = &'a ProbeResult>) -> Option<DateTime<Utc>> {
    let mut since = None;
    for result in results {
        match (result.is_ok(), since) {
            (false, None) => since = Some(result.timestamp),
            (true, Some(_)) => since = None,
            _ => {}
        }
    }
    since
}

/// A `down` alert once a failure streak has lasted longer than `after`
pub fn evaluate<'a>(
    id: &str,
    after: Duration,
    results: impl IntoIterator<Item = &'a ProbeResult>,
    now: DateTime<Utc>,
) -> Option<Alert> {
    let start = down_since(results)?;
    let elapsed = (now - start).to_std().unwrap_or_default();
    (elapsed > after).then(|| Alert { id: id.to_string(), kind: AlertKind::Down, start })
}
