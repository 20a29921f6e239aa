//! # Driftnet Telemetry
//!
//! Crate for structured logging and the metric events emitted by the
//! ingestion pipeline. Exporting the registry is left to the embedding
//! process.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::MetricsRecorder;
