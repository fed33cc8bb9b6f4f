//! The coordinating actor owning every watcher and all result history.
//!
//! All mutable state lives inside [`Collector::run`]; other tasks talk to it
//! through a [`CollectorHandle`] and the watcher report channel. Messages are
//! handled one at a time in arrival order.

pub mod alerts;
pub mod history;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::ServiceSpec;
use crate::monitoring::{Checker, Watcher, WatcherReport, WatcherState};
use crate::notifier::Notifiers;
use crate::types::ProbeResult;

pub use alerts::{Alert, AlertKind};
pub use history::{DEFAULT_CAPACITY, History};

const MAILBOX_SIZE: usize = 256;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("collector is not running")]
    Closed,
}

/// Observer invoked synchronously with every recorded result.
///
/// Runs inside the collector loop, so it must return quickly and must not
/// panic.
pub trait ResultListener: Send + Sync {
    fn on_result(&self, result: &ProbeResult);
}

impl<F> ResultListener for F
where
    F: Fn(&ProbeResult) + Send + Sync,
{
    fn on_result(&self, result: &ProbeResult) {
        self(result)
    }
}

/// History of one service, as returned by result queries
#[derive(Debug, Clone, Serialize)]
pub struct ServiceResults {
    pub id: String,
    pub results: Vec<ProbeResult>,
}

#[derive(Debug)]
pub enum Command {
    GetResults {
        service_id: Option<String>,
        limit: Option<usize>,
        reply: oneshot::Sender<Vec<ServiceResults>>,
    },
    GetAlerts {
        reply: oneshot::Sender<Vec<Alert>>,
    },
    ApplyConfig(BTreeMap<String, ServiceSpec>),
    ResultArrived(WatcherReport),
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct CollectorHandle {
    commands: mpsc::Sender<Command>,
}

impl CollectorHandle {
    async fn send(&self, command: Command) -> Result<(), CollectorError> {
        self.commands.send(command).await.map_err(|_| CollectorError::Closed)
    }

    /// Replace the monitored services
    pub async fn apply_config(
        &self,
        services: BTreeMap<String, ServiceSpec>,
    ) -> Result<(), CollectorError> {
        self.send(Command::ApplyConfig(services)).await
    }

    /// Snapshot of recorded results ordered by service id
    pub async fn get_results(
        &self,
        service_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<ServiceResults>, CollectorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::GetResults { service_id: service_id.map(str::to_string), limit, reply })
            .await?;
        rx.await.map_err(|_| CollectorError::Closed)
    }

    pub async fn alerts(&self) -> Result<Vec<Alert>, CollectorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::GetAlerts { reply }).await?;
        rx.await.map_err(|_| CollectorError::Closed)
    }

    /// Abort every watcher and end the collector loop
    pub async fn shutdown(&self) -> Result<(), CollectorError> {
        self.send(Command::Shutdown).await
    }
}

pub struct CollectorBuilder {
    checker: Arc<dyn Checker>,
    notifiers: Notifiers,
    listeners: Vec<Arc<dyn ResultListener>>,
    capacity: usize,
}

impl CollectorBuilder {
    pub fn notifiers(mut self, notifiers: Notifiers) -> Self {
        self.notifiers = notifiers;
        self
    }

    pub fn listener(mut self, listener: impl ResultListener + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    pub fn history_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn build(self) -> Collector {
        let (reports_tx, reports_rx) = mpsc::channel(MAILBOX_SIZE);
        Collector {
            checker: self.checker,
            notifiers: self.notifiers,
            listeners: self.listeners,
            watchers: HashMap::new(),
            specs: HashMap::new(),
            states: HashMap::new(),
            history: History::new(self.capacity),
            next_generation: 0,
            reports_tx,
            reports_rx,
        }
    }

    /// Start the collector loop on the current runtime
    pub fn spawn(self) -> (CollectorHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::channel(MAILBOX_SIZE);
        let collector = self.build();
        let task = tokio::spawn(collector.run(commands_rx));
        (CollectorHandle { commands: commands_tx }, task)
    }
}

pub struct Collector {
    checker: Arc<dyn Checker>,
    notifiers: Notifiers,
    listeners: Vec<Arc<dyn ResultListener>>,
    watchers: HashMap<String, Watcher>,
    specs: HashMap<String, ServiceSpec>,
    /// Latest state reported by the current watcher of each service
    states: HashMap<String, WatcherState>,
    history: History,
    next_generation: u64,
    reports_tx: mpsc::Sender<WatcherReport>,
    reports_rx: mpsc::Receiver<WatcherReport>,
}

impl Collector {
    pub fn builder(checker: Arc<dyn Checker>) -> CollectorBuilder {
        CollectorBuilder {
            checker,
            notifiers: Notifiers::none(),
            listeners: Vec::new(),
            capacity: DEFAULT_CAPACITY,
        }
    }

    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        info!(capacity = self.history.capacity(), "Collector started");

        loop {
            let command = tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => command,
                    None => Command::Shutdown,
                },
                Some(report) = self.reports_rx.recv() => Command::ResultArrived(report),
            };

            if !self.handle(command) {
                break;
            }
        }

        info!("Collector stopped");
    }

    /// Process one message; returns false once the collector should stop
    pub fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::GetResults { service_id, limit, reply } => {
                let _ = reply.send(self.results(service_id.as_deref(), limit));
            }
            Command::GetAlerts { reply } => {
                let _ = reply.send(self.alerts());
            }
            Command::ApplyConfig(services) => self.apply_config(services),
            Command::ResultArrived(report) => self.record(report),
            Command::Shutdown => {
                for watcher in self.watchers.values() {
                    watcher.abort();
                }
                self.watchers.clear();
                return false;
            }
        }
        true
    }

    fn apply_config(&mut self, services: BTreeMap<String, ServiceSpec>) {
        let previous = std::mem::take(&mut self.watchers);
        for watcher in previous.values() {
            watcher.stop();
        }

        let removed: Vec<&String> =
            previous.keys().filter(|id| !services.contains_key(id.as_str())).collect();
        for id in &removed {
            info!(service_id = %id, "Service removed");
            self.history.forget(id);
            self.states.remove(id.as_str());
            self.specs.remove(id.as_str());
        }

        let mut started = 0;
        for (id, mut spec) in services {
            spec.id = id.clone();

            let state = match self.states.get(&id) {
                Some(state) if previous.contains_key(&id) && !state.last_errors.is_empty() => {
                    debug!(
                        service_id = %id,
                        errors = state.last_errors.len(),
                        "Transferring watcher state"
                    );
                    state.clone()
                }
                _ => WatcherState::default(),
            };

            self.next_generation += 1;
            self.history.track(&id);
            self.states.insert(id.clone(), state.clone());

            let watcher = Watcher::spawn(
                spec.clone(),
                state,
                self.next_generation,
                self.checker.clone(),
                self.notifiers.clone(),
                self.reports_tx.clone(),
            );
            self.watchers.insert(id.clone(), watcher);
            self.specs.insert(id, spec);
            started += 1;
        }

        info!(started, removed = removed.len(), "Configuration applied");
    }

    fn record(&mut self, report: WatcherReport) {
        let WatcherReport { generation, result, state } = report;
        let id = result.id.clone();

        if !self.history.contains(&id) {
            debug!(service_id = %id, generation, "Discarding result of removed service");
            return;
        }

        if self.watchers.get(&id).is_some_and(|watcher| watcher.generation() == generation) {
            self.states.insert(id.clone(), state);
        }

        self.history.push(result);
        if let Some(recorded) = self.history.latest(&id) {
            for listener in &self.listeners {
                listener.on_result(recorded);
            }
        }
    }

    fn results(&self, service_id: Option<&str>, limit: Option<usize>) -> Vec<ServiceResults> {
        self.history
            .ids()
            .into_iter()
            .filter(|id| service_id.is_none_or(|wanted| wanted == id.as_str()))
            .map(|id| {
                let results = self.history.snapshot(&id, limit);
                ServiceResults { id, results }
            })
            .collect()
    }

    fn alerts(&self) -> Vec<Alert> {
        let now = Utc::now();
        let mut alerts: Vec<Alert> = self
            .specs
            .iter()
            .filter_map(|(id, spec)| {
                let after = spec.alert_after()?;
                let results = self.history.results(id)?;
                alerts::evaluate(id, after, results, now)
            })
            .collect();
        alerts.sort_by(|a, b| a.id.cmp(&b.id));
        alerts
    }
}
