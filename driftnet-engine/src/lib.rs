//! # driftnet-engine
//!
//! Wires the receive path to the decoders:
//! `Receiver -> Dispatcher -> DecodingHandler -> RecordSink`.

pub mod collector;
pub mod error;
pub mod handler;
pub mod sink;

pub use collector::Collector;
pub use error::EngineError;
pub use handler::DecodingHandler;
pub use sink::{ChannelSink, LogSink, RecordSink};
