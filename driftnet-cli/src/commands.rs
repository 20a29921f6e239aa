use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use driftnet_capture::ReceiverState;
use driftnet_config::DriftnetConfig;
use driftnet_engine::{Collector, LogSink};
use driftnet_telemetry::{EventLogger, MetricsRecorder};
use tracing::{debug, error, info, warn};

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Receive and decode telemetry until interrupted
    Listen(ListenArgs),
    /// Validate the configuration and print the effective values
    CheckConfig(ConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Configuration file; the layered `config/` lookup is used when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ListenArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Overrides `listener.port`
    #[arg(short, long)]
    pub port: Option<u16>,
}

impl ListenArgs {
    fn load(&self) -> anyhow::Result<DriftnetConfig> {
        let mut config = self.config.load()?;
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        Ok(config)
    }
}

impl ConfigArgs {
    fn load(&self) -> anyhow::Result<DriftnetConfig> {
        let config = match &self.config {
            Some(path) => DriftnetConfig::load_from_path(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => DriftnetConfig::load().context("loading layered configuration")?,
        };
        Ok(config)
    }
}

pub fn check_config(args: ConfigArgs) -> anyhow::Result<()> {
    let config = args.load()?;
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

pub async fn listen(args: ListenArgs) -> anyhow::Result<()> {
    let config = args.load()?;
    EventLogger::init(&config.telemetry.log_level, config.telemetry.thread_names)
        .map_err(|e| anyhow!("installing log subscriber: {e}"))?;

    let metrics = MetricsRecorder::new().context("registering metrics")?;
    let mut collector = Collector::new(config, Arc::new(LogSink), metrics);
    let local_addr = collector.start().await.context("starting collector")?;
    info!(%local_addr, "Listening");

    let outcome = supervise(&mut collector, &args).await;

    collector.shutdown().await.context("stopping collector")?;
    match collector.metrics().gather_metrics() {
        Ok(text) => debug!("Final metrics:\n{text}"),
        Err(err) => warn!(error = %err, "Could not render metrics"),
    }
    outcome
}

/// Runs until Ctrl-C or until the receiver dies. `SIGHUP` reloads.
async fn supervise(collector: &mut Collector, args: &ListenArgs) -> anyhow::Result<()> {
    let mut hangup = ReloadSignal::new()?;
    let mut states = collector
        .subscribe()
        .ok_or_else(|| anyhow!("collector is not running"))?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("waiting for Ctrl-C")?;
                info!("Interrupted, shutting down");
                return Ok(());
            }
            _ = hangup.recv() => {
                info!("Reloading configuration");
                match args.load() {
                    Ok(config) => {
                        if let Err(err) = collector.reload(config).await {
                            error!(error = %err, "Reload failed");
                        }
                    }
                    Err(err) => error!(error = %err, "Keeping current configuration"),
                }
                // A restart replaces the receiver, so watch the new one.
                states = collector
                    .subscribe()
                    .ok_or_else(|| anyhow!("collector stopped during reload"))?;
            }
            changed = states.changed() => {
                if changed.is_err() || *states.borrow() == ReceiverState::Stopped {
                    bail!("receiver stopped unexpectedly");
                }
            }
        }
    }
}

struct ReloadSignal {
    #[cfg(unix)]
    inner: tokio::signal::unix::Signal,
}

impl ReloadSignal {
    #[cfg(unix)]
    fn new() -> anyhow::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        let inner = signal(SignalKind::hangup()).context("installing SIGHUP handler")?;
        Ok(Self { inner })
    }

    #[cfg(not(unix))]
    fn new() -> anyhow::Result<Self> {
        Ok(Self {})
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        self.inner.recv().await;
        #[cfg(not(unix))]
        std::future::pending::<()>().await;
    }
}
