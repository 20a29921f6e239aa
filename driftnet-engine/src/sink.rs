//! Destinations for decoded records.
//!
//! Sinks are called from the dispatcher's worker threads, concurrently and
//! with no ordering between records.

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use driftnet_protocols::Record;
use tracing::{info, warn};

pub trait RecordSink: Send + Sync + 'static {
    fn accept(&self, record: Record);
}

impl<F> RecordSink for F
where
    F: Fn(Record) + Send + Sync + 'static,
{
    fn accept(&self, record: Record) {
        self(record)
    }
}

/// Writes every record to the log at `info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl RecordSink for LogSink {
    fn accept(&self, record: Record) {
        info!(
            source = %record.source,
            origin = ?record.origin,
            fields = record.values.len(),
            "{record}"
        );
    }
}

/// Forwards records to a crossbeam channel for an external consumer.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: Sender<Record>,
}

impl ChannelSink {
    /// `None` makes the channel unbounded. A full bounded channel drops the
    /// record rather than stall a decoding worker.
    pub fn new(capacity: Option<usize>) -> (Self, Receiver<Record>) {
        let (sender, receiver) = match capacity {
            Some(capacity) => channel::bounded(capacity),
            None => channel::unbounded(),
        };
        (Self { sender }, receiver)
    }
}

impl RecordSink for ChannelSink {
    fn accept(&self, record: Record) {
        match self.sender.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                warn!(source = %record.source, "Record channel full, dropping record")
            }
            // Consumer went away; nothing left to deliver to.
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}
