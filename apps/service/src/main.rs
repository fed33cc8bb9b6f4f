use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use logger::{LogFormat, init_tracing};
use tracing::{debug, info};
use watchpost::{Channel, Collector, ConfigPoller, HttpChecker, Notifiers};

mod config;
mod exporter;
mod slack;

use config::{Config, ServiceDirectory};
use slack::SlackNotifier;

#[derive(Debug, Parser)]
#[command(name = "watchpost-service", version, about = "Synthetic monitoring for HTTP services")]
struct Args {
    /// Directory containing watchpost.toml and the service definitions
    config_dir: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_output: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(LogFormat::resolve(args.json_output));

    let config = Config::from_config_dir(&args.config_dir)?;
    debug!("{}", config);

    let mut notifiers = Notifiers::none();
    if let Some(slack) = &config.slack {
        notifiers = notifiers.with(Channel::Slack, Arc::new(SlackNotifier::new(&slack.webhook)));
    }

    let mut collector = Collector::builder(Arc::new(HttpChecker::new()))
        .notifiers(notifiers)
        .history_capacity(config.history_capacity)
        .listener(exporter::log_result);
    if let Some(metrics) = &config.metrics {
        exporter::install_prometheus(metrics.listen)?;
        collector = collector.listener(exporter::record_metrics);
    }
    let (collector, collector_task) = collector.spawn();

    let services_dir = config.services_dir(&args.config_dir);
    info!(services_dir = %services_dir.display(), "Loading services");
    let mut poller = ConfigPoller::new(ServiceDirectory::new(services_dir), collector.clone());
    poller.poll_once().await.context("initial service configuration is invalid")?;
    let poller_task = poller.spawn(config.reload_interval());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    poller_task.abort();
    collector.shutdown().await?;
    collector_task.await?;

    Ok(())
}
