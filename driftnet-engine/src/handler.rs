//! Decoding stage run on the dispatcher's worker threads.

use std::fmt::Display;
use std::sync::Arc;

use driftnet_core::{Connection, ConnectionHandler};
use driftnet_protocols::{DecodeError, PacketDecoder};
use driftnet_telemetry::{EventLogger, MetricsRecorder};
use tracing::debug;

use crate::sink::RecordSink;

/// Decodes each connection and hands the records to a sink. Failures are
/// logged and counted here and go no further.
pub struct DecodingHandler {
    decoder: Arc<dyn PacketDecoder>,
    sink: Arc<dyn RecordSink>,
    metrics: MetricsRecorder,
}

impl DecodingHandler {
    pub fn new(decoder: Arc<dyn PacketDecoder>, sink: Arc<dyn RecordSink>, metrics: MetricsRecorder) -> Self {
        Self {
            decoder,
            sink,
            metrics,
        }
    }

    pub fn protocol(&self) -> &'static str {
        self.decoder.protocol()
    }

    fn report(&self, connection: &Connection, failure: &DecodeError) {
        let kind = failure.kind.label();
        self.metrics.inc_decode_failure(kind);
        EventLogger::decode_failure(
            &connection.source(),
            failure.element.as_ref().map(|id| id as &dyn Display),
            failure.offset,
            failure.length,
            kind,
            &failure.kind,
        );
    }
}

impl ConnectionHandler for DecodingHandler {
    fn handle(&self, connection: Connection) {
        let outcome = self.decoder.decode(&connection);

        for failure in &outcome.failures {
            self.report(&connection, failure);
        }

        for record in outcome.records {
            let unknown = record
                .values
                .iter()
                .filter(|value| value.element().is_opaque())
                .count();
            if unknown > 0 {
                self.metrics.unknown_elements.inc_by(unknown as u64);
                debug!(source = %record.source, unknown, "Record carries unregistered elements");
            }
            self.metrics.records_decoded.inc();
            self.sink.accept(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use driftnet_protocols::{IpfixDecoder, Payload, Record, Registry, SyslogDecoder};
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    fn collecting_sink() -> (Arc<dyn RecordSink>, Arc<Mutex<Vec<Record>>>) {
        let records = Arc::new(Mutex::new(Vec::new()));
        let target = Arc::clone(&records);
        let sink: Arc<dyn RecordSink> = Arc::new(move |record: Record| target.lock().push(record));
        (sink, records)
    }

    fn connection(payload: &'static [u8]) -> Connection {
        Connection::new("192.0.2.9:4739".parse().unwrap(), Bytes::from_static(payload))
    }

    #[test]
    fn records_reach_the_sink() {
        let (sink, records) = collecting_sink();
        let metrics = MetricsRecorder::new().unwrap();
        let handler = DecodingHandler::new(Arc::new(SyslogDecoder::new()), sink, metrics.clone());

        handler.handle(connection(b"<165>link up"));

        let records = records.lock();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].get("message").map(|v| v.payload().clone()),
            Some(Payload::String("link up".into()))
        );
        assert_eq!(metrics.records_decoded.get(), 1);
    }

    #[test]
    fn failures_are_counted_by_kind() {
        let (sink, records) = collecting_sink();
        let metrics = MetricsRecorder::new().unwrap();
        let decoder = IpfixDecoder::new(Arc::new(Registry::standard()));
        let handler = DecodingHandler::new(Arc::new(decoder), sink, metrics.clone());

        // Version 9 header.
        handler.handle(connection(&[0, 9, 0, 16, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]));
        // Data set for a template never announced.
        handler.handle(connection(&[
            0, 10, 0, 24, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 0, 0, 8, 1, 2, 3, 4,
        ]));

        assert!(records.lock().is_empty());
        assert_eq!(metrics.decode_failures.with_label_values(&["malformed"]).get(), 1);
        assert_eq!(
            metrics.decode_failures.with_label_values(&["missing_template"]).get(),
            1
        );
        assert_eq!(metrics.records_decoded.get(), 0);
    }

    #[traced_test]
    #[test]
    fn unknown_elements_are_counted() {
        let (sink, records) = collecting_sink();
        let metrics = MetricsRecorder::new().unwrap();
        let decoder = IpfixDecoder::new(Arc::new(Registry::standard()));
        let handler = DecodingHandler::new(Arc::new(decoder), sink, metrics.clone());

        // Template 256 with one enterprise field (29305/1, 2 bytes), then one record.
        handler.handle(connection(&[
            0, 10, 0, 38, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, // header
            0, 2, 0, 16, 1, 0, 0, 1, 0x80, 1, 0, 2, 0, 0, 0x72, 0x79, // template set
            1, 0, 0, 6, 0xbe, 0xef, // data set
        ]));

        assert_eq!(records.lock().len(), 1);
        assert_eq!(metrics.unknown_elements.get(), 1);
        assert!(logs_contain("Record carries unregistered elements"));
    }
}
