use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::checker::Checker;
use super::notify;
use crate::config::ServiceSpec;
use crate::notifier::{Channel, Notifiers};
use crate::types::{ProbeError, ProbeResult};

/// Whether a channel has been told about the current failure streak
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifiedFlags {
    pub mail: bool,
    pub slack: bool,
    pub sms: bool,
}

impl NotifiedFlags {
    pub fn get(&self, channel: Channel) -> bool {
        match channel {
            Channel::Mail => self.mail,
            Channel::Slack => self.slack,
            Channel::Sms => self.sms,
        }
    }

    pub fn set(&mut self, channel: Channel, value: bool) {
        match channel {
            Channel::Mail => self.mail = value,
            Channel::Slack => self.slack = value,
            Channel::Sms => self.sms = value,
        }
    }
}

/// Mutable per-service state carried across cycles and reloads
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WatcherState {
    pub last_errors: Vec<ProbeError>,
    pub notified: NotifiedFlags,
}

/// What a watcher hands to the collector after each cycle
#[derive(Debug, Clone)]
pub struct WatcherReport {
    /// Identifies the watcher instance that produced the report
    pub generation: u64,
    pub result: ProbeResult,
    /// State after notification dispatch for this cycle
    pub state: WatcherState,
}

/// Handle to one service's polling task.
///
/// Stopping is cooperative: an in-flight cycle finishes, then the loop exits
/// without reporting it.
#[derive(Debug)]
pub struct Watcher {
    service_id: String,
    generation: u64,
    active: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Watcher {
    pub fn spawn(
        spec: ServiceSpec,
        state: WatcherState,
        generation: u64,
        checker: Arc<dyn Checker>,
        notifiers: Notifiers,
        reports: mpsc::Sender<WatcherReport>,
    ) -> Self {
        let active = Arc::new(AtomicBool::new(true));
        let service_id = spec.id.clone();

        let handle = tokio::spawn(watch(
            spec,
            state,
            generation,
            checker,
            notifiers,
            reports,
            active.clone(),
        ));

        Self { service_id, generation, active, handle }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Clear the active flag; it is never set again
    pub fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            debug!(service_id = %self.service_id, generation = self.generation, "Watcher stopping");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop and cancel the task immediately, used on shutdown
    pub fn abort(&self) {
        self.stop();
        self.handle.abort();
    }
}

async fn watch(
    spec: ServiceSpec,
    mut state: WatcherState,
    generation: u64,
    checker: Arc<dyn Checker>,
    notifiers: Notifiers,
    reports: mpsc::Sender<WatcherReport>,
    active: Arc<AtomicBool>,
) {
    info!(service_id = %spec.id, generation, interval = ?spec.interval(), "Watcher started");

    loop {
        let result = checker.check(&spec).await;

        if !active.load(Ordering::SeqCst) {
            debug!(service_id = %spec.id, generation, "Discarding result of stopped watcher");
            break;
        }

        notify::dispatch(&spec, &result, &mut state, &notifiers);

        let report = WatcherReport { generation, result, state: state.clone() };
        if let Err(e) = reports.send(report).await {
            tracing::error!(service_id = %spec.id, "Failed to send check result: {}", e);
            break;
        }

        tokio::time::sleep(spec.interval()).await;

        if !active.load(Ordering::SeqCst) {
            break;
        }
    }

    info!(service_id = %spec.id, generation, "Watcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ErrorKind, Location};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Fails on every cycle with one error
    struct Failing {
        cycles: AtomicUsize,
    }

    #[async_trait]
    impl Checker for Failing {
        async fn check(&self, spec: &ServiceSpec) -> ProbeResult {
            self.cycles.fetch_add(1, Ordering::SeqCst);
            let mut result = ProbeResult::new(&spec.id);
            result.push(
                ProbeError::new(ErrorKind::WrongHttpStatusCode, "expected 200, got 503")
                    .at(Location::new(0, 0)),
            );
            result
        }
    }

    fn spec() -> ServiceSpec {
        ServiceSpec { interval_seconds: 1, ..ServiceSpec::new("svc", "http://example.com") }
    }

    #[tokio::test]
    async fn test_watcher_reports_with_generation_and_state() {
        let (tx, mut rx) = mpsc::channel(4);
        let checker = Arc::new(Failing { cycles: AtomicUsize::new(0) });
        let watcher =
            Watcher::spawn(spec(), WatcherState::default(), 7, checker, Notifiers::none(), tx);

        let report = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("Timeout waiting for result")
            .expect("Channel closed");

        assert_eq!(report.generation, 7);
        assert_eq!(report.result.id, "svc");
        assert_eq!(report.state.last_errors.len(), 1);
        assert!(watcher.is_active());
        watcher.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_watcher_does_not_report_again() {
        let (tx, mut rx) = mpsc::channel(4);
        let checker = Arc::new(Failing { cycles: AtomicUsize::new(0) });
        let watcher = Watcher::spawn(
            spec(),
            WatcherState::default(),
            1,
            checker.clone(),
            Notifiers::none(),
            tx,
        );

        assert!(rx.recv().await.is_some());
        watcher.stop();
        assert!(!watcher.is_active());

        // the loop notices the flag after sleeping and drops its sender
        assert!(rx.recv().await.is_none());
        assert_eq!(checker.cycles.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closed_collector_ends_the_loop() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let checker = Arc::new(Failing { cycles: AtomicUsize::new(0) });
        let watcher =
            Watcher::spawn(spec(), WatcherState::default(), 1, checker, Notifiers::none(), tx);

        tokio::time::timeout(Duration::from_secs(2), async {
            while !watcher.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_notified_flags_by_channel() {
        let mut flags = NotifiedFlags::default();
        flags.set(Channel::Sms, true);
        assert!(flags.get(Channel::Sms));
        assert!(!flags.get(Channel::Mail));
        assert!(!flags.get(Channel::Slack));
    }
}
