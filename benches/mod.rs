use criterion::{criterion_group, criterion_main};

mod pubsub;

criterion_group!(
    benches,
    pubsub::bench_encode_publish,
    pubsub::bench_feed_publish_stream,
    pubsub::bench_feed_fragmented,
    pubsub::bench_registry_dispatch
);
criterion_main!(benches);
