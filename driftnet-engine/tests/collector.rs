use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::Receiver as RecordReceiver;
use driftnet_capture::ReceiverState;
use driftnet_config::DriftnetConfig;
use driftnet_engine::{ChannelSink, Collector};
use driftnet_protocols::{Payload, Record, RecordOrigin};
use driftnet_telemetry::MetricsRecorder;
use tokio::net::UdpSocket;

fn config(protocol: &str) -> DriftnetConfig {
    let mut config = DriftnetConfig::default();
    config.listener.address = Some(IpAddr::V4(Ipv4Addr::LOCALHOST));
    config.listener.port = 0;
    config.listener.protocol = protocol.into();
    config.listener.recv_timeout_ms = 50;
    // One worker keeps handling in arrival order.
    config.dispatcher.workers = 1;
    config.dispatcher.drain_timeout_ms = 500;
    config
}

fn collector(protocol: &str) -> (Collector, RecordReceiver<Record>) {
    let (sink, records) = ChannelSink::new(None);
    let collector = Collector::new(config(protocol), Arc::new(sink), MetricsRecorder::new().unwrap());
    (collector, records)
}

async fn send(to: SocketAddr, payload: &[u8]) {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(payload, to).await.unwrap();
}

async fn next_record(records: &RecordReceiver<Record>) -> Record {
    let records = records.clone();
    tokio::task::spawn_blocking(move || records.recv_timeout(Duration::from_secs(2)))
        .await
        .unwrap()
        .expect("no record within 2s")
}

/// Template 256 (sourceIPv4Address, destinationTransportPort) plus one record.
fn ipfix_message() -> Vec<u8> {
    let mut message = vec![
        0x00, 0x0a, 0x00, 0x00, // version, length (patched below)
        0x65, 0x00, 0x00, 0x00, // export time
        0x00, 0x00, 0x00, 0x2a, // sequence
        0x00, 0x00, 0x00, 0x01, // observation domain
        0x00, 0x02, 0x00, 0x10, // template set
        0x01, 0x00, 0x00, 0x02, 0x00, 0x08, 0x00, 0x04, 0x00, 0x0b, 0x00, 0x02,
        0x01, 0x00, 0x00, 0x0a, // data set
        10, 1, 2, 3, 0x01, 0xbb,
    ];
    let len = message.len() as u16;
    message[2..4].copy_from_slice(&len.to_be_bytes());
    message
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ipfix_datagram_becomes_a_record() {
    let (mut collector, records) = collector("ipfix");
    let local = collector.start().await.unwrap();

    send(local, &ipfix_message()).await;
    let record = next_record(&records).await;

    assert_eq!(record.source.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    assert_eq!(
        record.origin,
        RecordOrigin::Ipfix {
            observation_domain: 1,
            template_id: 256,
            export_time: 0x6500_0000,
            sequence: 42,
        }
    );
    assert_eq!(
        record.get("sourceIPv4Address").map(|v| v.payload().clone()),
        Some(Payload::Ipv4Address(Ipv4Addr::new(10, 1, 2, 3)))
    );
    assert_eq!(
        record.get("destinationTransportPort").map(|v| v.payload().clone()),
        Some(Payload::Unsigned16(443))
    );
    assert_eq!(collector.metrics().records_decoded.get(), 1);

    collector.shutdown().await.unwrap();
    assert!(!collector.is_running());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_datagram_is_counted_not_fatal() {
    let (mut collector, records) = collector("ipfix");
    let local = collector.start().await.unwrap();
    let mut states = collector.subscribe().unwrap();

    send(local, &[0x00, 0x0a, 0x00]).await;
    send(local, &ipfix_message()).await;
    next_record(&records).await;

    let underruns = collector
        .metrics()
        .decode_failures
        .with_label_values(&["underrun"])
        .get();
    assert_eq!(underruns, 1);
    assert_eq!(*states.borrow_and_update(), ReceiverState::Running);

    collector.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tunable_reload_keeps_the_socket() {
    let (mut collector, records) = collector("syslog");
    let local = collector.start().await.unwrap();

    let mut tuned = collector.config().clone();
    tuned.listener.recv_timeout_ms = 20;
    tuned.listener.stop_timeout_ms = 1000;
    collector.reload(tuned).await.unwrap();

    assert_eq!(collector.local_addr(), Some(local));
    send(local, b"<11>disk failing").await;
    let record = next_record(&records).await;
    assert_eq!(record.origin, RecordOrigin::Syslog);
    assert_eq!(record.get("severity").and_then(|v| v.payload().as_u64()), Some(3));

    collector.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn protocol_change_restarts_pipeline() {
    let (mut collector, records) = collector("ipfix");
    let first = collector.start().await.unwrap();
    let mut old_states = collector.subscribe().unwrap();

    let mut syslog = collector.config().clone();
    syslog.listener.protocol = "syslog".into();
    collector.reload(syslog).await.unwrap();

    assert_eq!(*old_states.borrow_and_update(), ReceiverState::Stopped);
    let second = collector.local_addr().unwrap();
    assert!(collector.is_running());

    send(second, b"<34>su failed").await;
    let record = next_record(&records).await;
    assert_eq!(record.get("facility").and_then(|v| v.payload().as_u64()), Some(4));
    assert_ne!(first.port(), 0);

    collector.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_without_start_is_a_no_op() {
    let (mut collector, _records) = collector("ipfix");
    collector.shutdown().await.unwrap();
    assert_eq!(collector.local_addr(), None);
}
