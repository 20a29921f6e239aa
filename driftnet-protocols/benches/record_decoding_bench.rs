#[macro_use]
extern crate criterion;

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use criterion::{black_box, Criterion};

use driftnet_core::Connection;
use driftnet_protocols::{
    decode_record, Cursor, ElementId, FieldSpec, IpfixDecoder, PacketDecoder, Registry,
    SyslogDecoder, Template,
};

// Template 256: sourceIPv4Address, destinationIPv4Address, sourceTransportPort,
// destinationTransportPort, protocolIdentifier, octetDeltaCount, interfaceName (variable)
const TEMPLATE_SET: &[u8] = &[
    0x00, 0x02, 0x00, 0x24, // set id 2, length 36
    0x01, 0x00, 0x00, 0x07, // template 256, 7 fields
    0x00, 0x08, 0x00, 0x04, 0x00, 0x0c, 0x00, 0x04, 0x00, 0x07, 0x00, 0x02, 0x00, 0x0b, 0x00, 0x02,
    0x00, 0x04, 0x00, 0x01, 0x00, 0x01, 0x00, 0x08, 0x00, 0x52, 0xff, 0xff,
];

const FLOW_RECORD: &[u8] = &[
    192, 0, 2, 10, 198, 51, 100, 20, 0xc3, 0x50, 0x01, 0xbb, 6, 0, 0, 0, 0, 0, 0, 0x05, 0xdc, 4,
    b'e', b't', b'h', b'0',
];

fn message(records: usize) -> Bytes {
    let mut data_set = vec![0x01, 0x00, 0x00, 0x00];
    for _ in 0..records {
        data_set.extend_from_slice(FLOW_RECORD);
    }
    let set_len = data_set.len() as u16;
    data_set[2..4].copy_from_slice(&set_len.to_be_bytes());

    let mut buf = vec![0x00, 0x0a, 0x00, 0x00];
    buf.extend_from_slice(&1_700_000_000u32.to_be_bytes());
    buf.extend_from_slice(&1u32.to_be_bytes());
    buf.extend_from_slice(&0u32.to_be_bytes());
    buf.extend_from_slice(TEMPLATE_SET);
    buf.extend_from_slice(&data_set);
    let len = buf.len() as u16;
    buf[2..4].copy_from_slice(&len.to_be_bytes());
    Bytes::from(buf)
}

fn bench_record(c: &mut Criterion) {
    let registry = Registry::standard();
    let template = Template::new(
        256,
        [(8u16, 4u16), (12, 4), (7, 2), (11, 2), (4, 1), (1, 8), (82, 0xffff)]
            .into_iter()
            .map(|(id, len)| FieldSpec::new(ElementId::iana(id), len))
            .collect(),
    );

    c.bench_function("decode_flow_record", |b| {
        b.iter(|| {
            let mut cursor = Cursor::new(black_box(FLOW_RECORD));
            black_box(decode_record(&registry, &template, &mut cursor)).unwrap();
        })
    });
}

fn bench_ipfix_message(c: &mut Criterion) {
    let source: SocketAddr = "192.0.2.1:4739".parse().unwrap();
    let decoder = IpfixDecoder::new(Arc::new(Registry::standard()));
    let mut group = c.benchmark_group("ipfix_message");

    for records in [1, 16, 64] {
        let connection = Connection::new(source, message(records));
        group.throughput(criterion::Throughput::Bytes(connection.len() as u64));
        group.bench_function(format!("records_{}", records), |b| {
            b.iter(|| black_box(decoder.decode(&connection)))
        });
    }
    group.finish();
}

fn bench_syslog(c: &mut Criterion) {
    let decoder = SyslogDecoder::new();
    let connection = Connection::new(
        "198.51.100.7:514".parse().unwrap(),
        Bytes::from_static(b"<34>Oct 11 22:14:15 mymachine su: 'su root' failed for lonvick on /dev/pts/8\n"),
    );

    c.bench_function("syslog_message", |b| {
        b.iter(|| black_box(decoder.decode(&connection)))
    });
}

criterion_group!(benches, bench_record, bench_ipfix_message, bench_syslog);
criterion_main!(benches);
