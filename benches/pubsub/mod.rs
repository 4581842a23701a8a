use criterion::{BatchSize, Criterion, Throughput};
use libpubsub::pubsub::codec::{FrameBuffer, Packet};
use libpubsub::pubsub::{Dispatcher, Framing, Message, Mqtt311, QoS, Registry};
use std::hint::black_box;

fn publish_frame(topic: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = FrameBuffer::new();
    Mqtt311::encode(
        &Packet::Publish {
            topic,
            payload,
            qos: QoS::AtMostOnce,
            packet_id: 0,
        },
        &mut out,
    )
    .unwrap();
    out.to_vec()
}

fn stream(frames: usize) -> Vec<u8> {
    (0..frames)
        .flat_map(|i| {
            let reading = format!("{}.5", i % 40);
            publish_frame("sensors/porch/temperature", reading.as_bytes())
        })
        .collect()
}

pub fn bench_encode_publish(c: &mut Criterion) {
    let payload = [0x5Au8; 256];
    let mut out = FrameBuffer::new();

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Bytes(payload.len() as u64));
    group.bench_function("publish_256b", |b| {
        b.iter(|| {
            Mqtt311::encode(
                black_box(&Packet::Publish {
                    topic: "sensors/porch/temperature",
                    payload: &payload,
                    qos: QoS::AtLeastOnce,
                    packet_id: 7,
                }),
                &mut out,
            )
            .unwrap();
            black_box(out.len())
        })
    });
    group.finish();
}

pub fn bench_feed_publish_stream(c: &mut Criterion) {
    let bytes = stream(100);

    let mut group = c.benchmark_group("dispatcher");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("feed_100_publishes", |b| {
        b.iter_batched(
            Dispatcher::<Mqtt311>::new,
            |mut dispatcher| {
                let events = dispatcher.feed(black_box(&bytes)).count();
                events
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

pub fn bench_feed_fragmented(c: &mut Criterion) {
    let bytes = stream(100);

    let mut group = c.benchmark_group("dispatcher");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("feed_7_byte_chunks", |b| {
        b.iter_batched(
            Dispatcher::<Mqtt311>::new,
            |mut dispatcher| {
                bytes
                    .chunks(7)
                    .map(|chunk| dispatcher.feed(black_box(chunk)).count())
                    .sum::<usize>()
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

pub fn bench_registry_dispatch(c: &mut Criterion) {
    let mut handlers: Vec<_> = (0..15)
        .map(|_| {
            |m: &Message| {
                black_box(m.payload.len());
            }
        })
        .collect();
    let mut wildcard = |m: &Message| {
        black_box(m.payload.len());
    };
    let topics: Vec<String> = (0..15).map(|i| format!("devices/{i}/state")).collect();

    let mut registry = Registry::new();
    for (topic, handler) in topics.iter().zip(handlers.iter_mut()) {
        registry.subscribe(topic, QoS::AtMostOnce, handler).unwrap();
    }
    registry
        .subscribe("sensors/+/temperature", QoS::AtMostOnce, &mut wildcard)
        .unwrap();

    let exact = Message::new("devices/9/state", b"1").unwrap();
    let filtered = Message::new("sensors/porch/temperature", b"21.5").unwrap();

    let mut group = c.benchmark_group("registry");
    group.bench_function("exact", |b| b.iter(|| registry.dispatch(black_box(&exact))));
    group.bench_function("filter_fallback", |b| {
        b.iter(|| registry.dispatch(black_box(&filtered)))
    });
    group.finish();
}
