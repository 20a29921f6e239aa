//! ## driftnet-telemetry::metrics
//! **Prometheus counters and histograms for the ingestion path**
//!
//! Only the metric events are owned here; scraping/pushing the registry is
//! the embedding process's concern.

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub packets_received: IntCounter,
    pub packet_size: Histogram,
    pub records_decoded: IntCounter,
    pub decode_failures: IntCounterVec,
    pub unknown_elements: IntCounter,
    pub dispatch_dropped: IntCounter,
    pub queue_depth: IntGauge,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let packets_received =
            IntCounter::new("driftnet_packets_received_total", "Datagrams read from the socket")?;

        let packet_size = Histogram::with_opts(
            HistogramOpts::new("driftnet_packet_size_bytes", "Size of received datagrams")
                .buckets(vec![64.0, 128.0, 256.0, 512.0, 1024.0, 1500.0, 4096.0, 9000.0, 65535.0]),
        )?;

        let records_decoded =
            IntCounter::new("driftnet_records_decoded_total", "Records handed to the sink")?;

        let decode_failures = IntCounterVec::new(
            Opts::new("driftnet_decode_failures_total", "Malformed records and messages"),
            &["kind"],
        )?;

        let unknown_elements = IntCounter::new(
            "driftnet_unknown_elements_total",
            "Fields decoded as opaque octets because no decoder is registered",
        )?;

        let dispatch_dropped = IntCounter::new(
            "driftnet_dispatch_dropped_total",
            "Connections dropped by the dispatcher overflow policy",
        )?;

        let queue_depth =
            IntGauge::new("driftnet_dispatch_queue_depth", "Connections waiting for a worker")?;

        registry.register(Box::new(packets_received.clone()))?;
        registry.register(Box::new(packet_size.clone()))?;
        registry.register(Box::new(records_decoded.clone()))?;
        registry.register(Box::new(decode_failures.clone()))?;
        registry.register(Box::new(unknown_elements.clone()))?;
        registry.register(Box::new(dispatch_dropped.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            registry,
            packets_received,
            packet_size,
            records_decoded,
            decode_failures,
            unknown_elements,
            dispatch_dropped,
            queue_depth,
        })
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Counts one datagram and records its size.
    #[inline]
    pub fn observe_packet(&self, size: usize) {
        self.packets_received.inc();
        self.packet_size.observe(size as f64);
    }

    #[inline]
    pub fn inc_decode_failure(&self, kind: &str) {
        self.decode_failures.with_label_values(&[kind]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_observation_updates_counter_and_histogram() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.observe_packet(120);
        metrics.observe_packet(1400);

        assert_eq!(metrics.packets_received.get(), 2);
        assert_eq!(metrics.packet_size.get_sample_count(), 2);
        assert_eq!(metrics.packet_size.get_sample_sum(), 1520.0);
    }

    #[test]
    fn decode_failures_are_labelled_by_kind() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.inc_decode_failure("underrun");
        metrics.inc_decode_failure("underrun");
        metrics.inc_decode_failure("malformed");

        assert_eq!(metrics.decode_failures.with_label_values(&["underrun"]).get(), 2);
        assert_eq!(metrics.decode_failures.with_label_values(&["malformed"]).get(), 1);

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("driftnet_decode_failures_total{kind=\"underrun\"} 2"));
    }

    #[test]
    fn recorders_are_independent() {
        let a = MetricsRecorder::new().unwrap();
        let b = MetricsRecorder::new().unwrap();
        a.dispatch_dropped.inc();
        assert_eq!(b.dispatch_dropped.get(), 0);
    }
}
