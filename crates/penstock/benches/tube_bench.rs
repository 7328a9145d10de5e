//! Tube and source hot-path benchmarks.
//!
//! Measures the per-item cost of the serialized drain under the common
//! strategies with an always-hungry subscriber.
//!
//! Run with: cargo bench --bench tube_bench

use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use parking_lot::Mutex;

use penstock::tube::{self, BackpressureStrategy, TubeConfiguration};
use penstock::{source, Publisher, StreamError, Subscriber, Subscription};

/// Subscriber that counts deliveries and keeps demand saturated.
struct Sink {
    delivered: Arc<AtomicU64>,
}

impl Subscriber<u64> for Sink {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        subscription.request(u64::MAX);
    }

    fn on_next(&self, item: u64) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        black_box(item);
    }

    fn on_error(&self, _error: StreamError) {}

    fn on_complete(&self) {}
}

fn subscribe_tube(strategy: BackpressureStrategy) -> tube::Tube<u64> {
    let slot: Arc<Mutex<Option<tube::Tube<u64>>>> = Arc::new(Mutex::new(None));
    let capture = Arc::clone(&slot);
    let config = TubeConfiguration::builder()
        .backpressure(strategy)
        .buffer_size(1024)
        .build();
    let publisher = tube::create(config, move |t| *capture.lock() = Some(t)).unwrap();
    publisher.subscribe(Sink {
        delivered: Arc::new(AtomicU64::new(0)),
    });
    slot.lock().take().expect("producer ran")
}

fn bench_tube_send(c: &mut Criterion) {
    c.bench_function("tube_send_buffer", |b| {
        let tube = subscribe_tube(BackpressureStrategy::Buffer);
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            tube.send(black_box(i));
        });
    });

    c.bench_function("tube_send_unbounded", |b| {
        let tube = subscribe_tube(BackpressureStrategy::Unbounded);
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            tube.send(black_box(i));
        });
    });
}

fn bench_source_drain(c: &mut Criterion) {
    c.bench_function("from_items_drain_1k", |b| {
        let items: Vec<u64> = (0..1024).collect();
        b.iter(|| {
            let publisher = source::from_items(items.clone());
            publisher.subscribe(Sink {
                delivered: Arc::new(AtomicU64::new(0)),
            });
        });
    });
}

criterion_group!(benches, bench_tube_send, bench_source_drain);
criterion_main!(benches);
