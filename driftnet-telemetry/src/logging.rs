//! ## driftnet-telemetry::logging
//! **Structured logging with tracing and OpenTelemetry key/values**
//!
//! Lifecycle events (receiver started/stopped, reloads) go through
//! [`EventLogger::log_event`]; per-record decode failures through
//! [`EventLogger::decode_failure`] so every failure carries the same field set.

use std::fmt::Display;

use opentelemetry::KeyValue;
use tracing::{info_span, warn};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber. `RUST_LOG` wins over `default_level`.
    pub fn init(default_level: &str, thread_names: bool) -> Result<(), InitError> {
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(default_level)),
            )
            .with_thread_names(thread_names)
            .with_span_events(FmtSpan::NONE)
            .try_init()
    }

    pub fn log_event(event_type: &str, metadata: &[KeyValue]) {
        let span = info_span!("pipeline_event", event_type = event_type, otel.kind = "INTERNAL");
        let _guard = span.enter();
        tracing::info!(metadata = ?metadata, "Pipeline event occurred");
    }

    /// Emits the structured decode-failure event.
    ///
    /// `element` is `None` for failures in message framing rather than in a
    /// specific information element.
    pub fn decode_failure(
        source: &dyn Display,
        element: Option<&dyn Display>,
        offset: usize,
        length: usize,
        kind: &str,
        detail: &dyn Display,
    ) {
        match element {
            Some(element) => warn!(
                source = %source,
                element = %element,
                offset,
                length,
                kind,
                "Decode failure: {detail}"
            ),
            None => warn!(
                source = %source,
                offset,
                length,
                kind,
                "Decode failure: {detail}"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_logging() {
        EventLogger::log_event("test", &[KeyValue::new("key", "value")]);
        assert!(logs_contain("Pipeline event occurred"));
    }

    #[traced_test]
    #[test]
    fn decode_failure_carries_position() {
        EventLogger::decode_failure(
            &"192.0.2.7:4739",
            Some(&"sourceIPv6Address(0/27)"),
            36,
            15,
            "length_out_of_range",
            &"length 15 outside [16, 16]",
        );
        assert!(logs_contain("offset=36"));
        assert!(logs_contain("length=15"));
        assert!(logs_contain("length_out_of_range"));
    }
}
