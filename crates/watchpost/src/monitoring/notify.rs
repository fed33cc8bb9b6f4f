//! Per-channel notification decisions for a watcher.
//!
//! [`plan`] decides what to send and updates the watcher state, [`dispatch`]
//! hands the deliveries to detached tasks. Sends are never retried.

use std::sync::Arc;

use tracing::{debug, warn};

use super::scheduler::WatcherState;
use crate::config::ServiceSpec;
use crate::notifier::{Channel, Notifier, Notifiers};
use crate::types::{ProbeError, ProbeResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Errors { channel: Channel, summary: String },
    Resolved { channel: Channel },
}

impl Delivery {
    pub fn channel(&self) -> Channel {
        match self {
            Delivery::Errors { channel, .. } | Delivery::Resolved { channel } => *channel,
        }
    }
}

/// Positional comparison of two error lists by location.
///
/// Reordering otherwise identical errors counts as a change.
pub fn did_errors_change(previous: &[ProbeError], current: &[ProbeError]) -> bool {
    if previous.len() != current.len() {
        return true;
    }
    previous.iter().zip(current).any(|(before, now)| before.location != now.location)
}

/// Human readable list of errors, one per line
pub fn summary(errors: &[ProbeError]) -> String {
    errors
        .iter()
        .map(|error| {
            let mut line = format!("- {} type: {}", error.error, error.kind);
            if let Some(comment) = &error.comment {
                line.push_str(&format!(" comment: {comment}"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Decide which channels hear about `result`, updating `state` in place
pub fn plan(
    spec: &ServiceSpec,
    result: &ProbeResult,
    state: &mut WatcherState,
    channels: impl IntoIterator<Item = Channel>,
) -> Vec<Delivery> {
    let mut deliveries = Vec::new();

    if !result.errors.is_empty() {
        let changed = did_errors_change(&state.last_errors, &result.errors);
        let summary = summary(&result.errors);
        for channel in channels {
            if !state.notified.get(channel) || changed {
                deliveries.push(Delivery::Errors { channel, summary: summary.clone() });
                state.notified.set(channel, true);
            }
        }
        state.last_errors = result.errors.clone();
    } else if !state.last_errors.is_empty() {
        for channel in channels {
            state.notified.set(channel, false);
            if spec.notify_if_resolved {
                deliveries.push(Delivery::Resolved { channel });
            }
        }
        state.last_errors.clear();
    }

    deliveries
}

/// Plan and send notifications without waiting for delivery
pub fn dispatch(
    spec: &ServiceSpec,
    result: &ProbeResult,
    state: &mut WatcherState,
    notifiers: &Notifiers,
) {
    let channels: Vec<Channel> = notifiers.configured().map(|(channel, _)| channel).collect();

    for delivery in plan(spec, result, state, channels) {
        let Some(notifier) = notifiers.get(delivery.channel()).cloned() else {
            continue;
        };
        let service_id = spec.id.clone();
        tokio::spawn(deliver(notifier, service_id, delivery));
    }
}

async fn deliver(notifier: Arc<dyn Notifier>, service_id: String, delivery: Delivery) {
    let channel = delivery.channel();
    let sent = match &delivery {
        Delivery::Errors { summary, .. } => notifier.notify_errors(&service_id, summary).await,
        Delivery::Resolved { .. } => notifier.notify_resolved(&service_id).await,
    };

    match sent {
        Ok(()) => debug!(service_id = %service_id, %channel, "Notification sent"),
        Err(e) => warn!(service_id = %service_id, %channel, "Failed to send notification: {:#}", e),
    }
}
