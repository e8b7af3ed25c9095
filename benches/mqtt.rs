use criterion::{BatchSize, Criterion, Throughput};
use heapless::Vec;
use sensornode::network::application::mqtt::client::{
    Client, MAX_PACKET_LEN, Options, QoS, Will,
};
use sensornode::network::error::Error;
use sensornode::network::{Close, Connection, Read, Write};
use std::hint::black_box;

/// Accepts every write and answers the handshake, nothing else.
struct SinkConnection {
    connack: &'static [u8],
    written: usize,
}

impl SinkConnection {
    fn new() -> Self {
        Self {
            connack: &[0x20, 0x02, 0x00, 0x00],
            written: 0,
        }
    }
}

impl Read for SinkConnection {
    type Error = Error;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let len = buf.len().min(self.connack.len());
        buf[..len].copy_from_slice(&self.connack[..len]);
        self.connack = &self.connack[len..];
        Ok(len)
    }
}

impl Write for SinkConnection {
    type Error = Error;
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.written += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Close for SinkConnection {
    type Error = Error;
    fn close(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl Connection for SinkConnection {}

const WILL: &[u8] = br#"{"sensor":"porch","value":0,"alive":false,"timestamp":0}"#;

fn options() -> Options<'static> {
    Options::new("porch")
        .will(Some(Will {
            topic: "sensors/porch",
            payload: WILL,
            qos: QoS::AtMostOnce,
            retain: true,
        }))
        .credentials(Some("device"), Some("secret"))
}

pub fn bench_connect_packet(c: &mut Criterion) {
    c.bench_function("mqtt/connect_packet", |b| {
        b.iter(|| {
            let mut out: Vec<u8, MAX_PACKET_LEN> = Vec::new();
            black_box(options()).encode(&mut out).expect("encode failed");
            out
        })
    });
}

pub fn bench_publish_framing(c: &mut Criterion) {
    let mut group = c.benchmark_group("mqtt/publish");
    let payload = br#"{"sensor":"porch","value":1,"alive":true,"timestamp":52311}"#;
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("qos0", |b| {
        b.iter_batched_ref(
            || Client::connect(SinkConnection::new(), options()).expect("connect failed"),
            |client| {
                client
                    .publish("sensors/porch", black_box(payload), QoS::AtMostOnce, false)
                    .expect("publish failed");
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}
