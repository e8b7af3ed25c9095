use criterion::{criterion_group, criterion_main};

mod mqtt;

criterion_group!(
    benches,
    telemetry::bench_encode_reading,
    telemetry::bench_encode_last_will,
    mqtt::bench_connect_packet,
    mqtt::bench_publish_framing,
);
criterion_main!(benches);
