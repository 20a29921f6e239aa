//! ## driftnet-engine::collector
//! **Supervisor for one listener pipeline**
//!
//! A pipeline is a [`Dispatcher`] with a [`DecodingHandler`] behind it and a
//! [`Receiver`] in front of it. The collector builds it from configuration,
//! applies reloads in place when it can, and replaces the whole pipeline
//! when a bind-affecting or dispatcher setting changes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use driftnet_capture::{Receiver, ReceiverSettings, ReceiverState, ReceiverTunables};
use driftnet_config::{DispatcherConfig, DriftnetConfig, ListenerConfig};
use driftnet_core::{Dispatcher, DispatcherSettings, OverflowPolicy};
use driftnet_protocols::{IpfixDecoder, PacketDecoder, Registry, SyslogDecoder};
use driftnet_telemetry::{EventLogger, MetricsRecorder};
use opentelemetry::KeyValue;
use tokio::sync::watch;
use tracing::{info, instrument};

use crate::error::EngineError;
use crate::handler::DecodingHandler;
use crate::sink::RecordSink;

struct Pipeline {
    receiver: Receiver,
    dispatcher: Arc<Dispatcher>,
}

pub struct Collector {
    config: DriftnetConfig,
    registry: Arc<Registry>,
    sink: Arc<dyn RecordSink>,
    metrics: MetricsRecorder,
    pipeline: Option<Pipeline>,
}

impl Collector {
    /// Collector over the standard element registry.
    pub fn new(config: DriftnetConfig, sink: Arc<dyn RecordSink>, metrics: MetricsRecorder) -> Self {
        Self::with_registry(config, Arc::new(Registry::standard()), sink, metrics)
    }

    pub fn with_registry(
        config: DriftnetConfig,
        registry: Arc<Registry>,
        sink: Arc<dyn RecordSink>,
        metrics: MetricsRecorder,
    ) -> Self {
        Self {
            config,
            registry,
            sink,
            metrics,
            pipeline: None,
        }
    }

    pub fn config(&self) -> &DriftnetConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    pub fn is_running(&self) -> bool {
        self.pipeline.is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.pipeline.as_ref().and_then(|p| p.receiver.local_addr())
    }

    /// Receiver state changes, for noticing a receive loop that died.
    pub fn subscribe(&self) -> Option<watch::Receiver<ReceiverState>> {
        self.pipeline.as_ref().map(|p| p.receiver.subscribe())
    }

    /// Builds and starts the pipeline. A no-op when already running.
    #[instrument(skip(self), fields(port = self.config.listener.port))]
    pub async fn start(&mut self) -> Result<SocketAddr, EngineError> {
        if let Some(addr) = self.local_addr() {
            return Ok(addr);
        }

        let decoder = self.packet_decoder(&self.config.listener)?;
        let protocol = decoder.protocol();
        let handler = DecodingHandler::new(decoder, Arc::clone(&self.sink), self.metrics.clone());
        let dispatcher = Arc::new(Dispatcher::new(
            dispatcher_settings(&self.config.dispatcher)?,
            Arc::new(handler),
            self.metrics.clone(),
        )?);

        let receiver = Receiver::new(
            receiver_settings(&self.config.listener),
            Arc::clone(&dispatcher),
            self.metrics.clone(),
        );
        let local_addr = match receiver.start() {
            Ok(addr) => addr,
            Err(err) => {
                close_dispatcher(dispatcher).await?;
                return Err(err.into());
            }
        };

        info!(%local_addr, protocol, "Collector started");
        EventLogger::log_event(
            "collector_started",
            &[
                KeyValue::new("local_addr", local_addr.to_string()),
                KeyValue::new("protocol", protocol),
            ],
        );
        self.pipeline = Some(Pipeline {
            receiver,
            dispatcher,
        });
        Ok(local_addr)
    }

    /// Applies `config`. Receiver tunables change in place; anything that
    /// affects the socket, the protocol or the dispatcher restarts the
    /// pipeline.
    #[instrument(skip_all)]
    pub async fn reload(&mut self, config: DriftnetConfig) -> Result<(), EngineError> {
        let restart = self.pipeline.is_some()
            && (self.config.listener.requires_rebind(&config.listener)
                || self.config.dispatcher != config.dispatcher);
        let previous = std::mem::replace(&mut self.config, config);

        if restart {
            info!(
                old_port = previous.listener.port,
                new_port = self.config.listener.port,
                "Reload requires a new pipeline"
            );
            self.shutdown().await?;
            self.start().await?;
        } else if let Some(pipeline) = &self.pipeline {
            pipeline
                .receiver
                .reload(&receiver_settings(&self.config.listener))?;
        }

        EventLogger::log_event("collector_reloaded", &[KeyValue::new("restart", restart)]);
        Ok(())
    }

    /// Stops the receiver, then drains and closes the dispatcher.
    #[instrument(skip_all)]
    pub async fn shutdown(&mut self) -> Result<(), EngineError> {
        let Some(pipeline) = self.pipeline.take() else {
            return Ok(());
        };
        pipeline.receiver.stop().await;
        close_dispatcher(pipeline.dispatcher).await?;
        info!("Collector stopped");
        Ok(())
    }

    fn packet_decoder(&self, listener: &ListenerConfig) -> Result<Arc<dyn PacketDecoder>, EngineError> {
        match listener.protocol.as_str() {
            "ipfix" => Ok(Arc::new(IpfixDecoder::new(Arc::clone(&self.registry)))),
            "syslog" => Ok(Arc::new(SyslogDecoder::new())),
            other => Err(EngineError::UnsupportedProtocol(other.to_owned())),
        }
    }
}

/// `close` blocks for up to the drain timeout, so it runs off the runtime.
async fn close_dispatcher(dispatcher: Arc<Dispatcher>) -> Result<(), EngineError> {
    tokio::task::spawn_blocking(move || dispatcher.close()).await?;
    Ok(())
}

pub fn dispatcher_settings(config: &DispatcherConfig) -> Result<DispatcherSettings, EngineError> {
    let overflow = match config.overflow.as_str() {
        "drop_newest" => OverflowPolicy::DropNewest,
        "drop_oldest" => OverflowPolicy::DropOldest,
        other => return Err(EngineError::UnsupportedOverflow(other.to_owned())),
    };
    Ok(DispatcherSettings {
        capacity: config.capacity,
        workers: config.workers,
        overflow,
        drain_timeout: Duration::from_millis(config.drain_timeout_ms),
    })
}

pub fn receiver_settings(config: &ListenerConfig) -> ReceiverSettings {
    let tunables = config.tunables();
    ReceiverSettings {
        address: config.address,
        port: config.port,
        tunables: ReceiverTunables {
            recv_timeout: tunables.recv_timeout,
            recv_buffer_size: tunables.recv_buffer_size,
            stop_timeout: tunables.stop_timeout,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_names_map_to_policies() {
        let mut config = DispatcherConfig {
            overflow: "drop_oldest".into(),
            ..DispatcherConfig::default()
        };
        assert_eq!(
            dispatcher_settings(&config).unwrap().overflow,
            OverflowPolicy::DropOldest
        );

        config.overflow = "block".into();
        assert!(matches!(
            dispatcher_settings(&config),
            Err(EngineError::UnsupportedOverflow(_))
        ));
    }

    #[test]
    fn receiver_settings_carry_tunables() {
        let listener = ListenerConfig {
            recv_timeout_ms: 250,
            ..ListenerConfig::default()
        };
        let settings = receiver_settings(&listener);
        assert_eq!(settings.port, 4739);
        assert_eq!(settings.address, None);
        assert_eq!(settings.tunables.recv_timeout, Duration::from_millis(250));
    }
}
