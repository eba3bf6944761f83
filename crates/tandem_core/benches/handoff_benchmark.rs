//! # Handoff Benchmark
//!
//! Measures the two per-tick costs that sit on the hot path:
//! 1. Slot churn in the allocator (add/remove storms)
//! 2. One full produce/consume turn at 10k bodies, per handoff mode

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tandem_core::{handoff, FrameLayout, HandoffMode, Slot, SlotAllocator, Telemetry};
use tandem_shared::{EntityId, Mat4};

fn bench_slot_churn(c: &mut Criterion) {
    let ids: Vec<EntityId> = (0..10_000).map(|i| EntityId::new(format!("body-{i}"))).collect();

    c.bench_function("slot_churn_10k", |b| {
        let mut slots = SlotAllocator::new(10_000);
        b.iter(|| {
            for id in &ids {
                let _ = black_box(slots.allocate(id.clone()));
            }
            for id in ids.iter().rev() {
                black_box(slots.free(id));
            }
        });
    });
}

fn bench_snapshot_turn(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_turn");
    let matrix = Mat4::IDENTITY;

    for mode in [HandoffMode::SharedMemory, HandoffMode::Transfer] {
        let mut pair = handoff::open(mode, FrameLayout::new(10_000, 0));

        group.bench_with_input(BenchmarkId::new("10k_bodies", format!("{mode:?}")), &mode, |b, _| {
            b.iter(|| {
                pair.simulator.produce(&mut |frame| {
                    for i in 0..10_000 {
                        if let Some(mut body) = frame.body_mut(Slot::new(i)) {
                            body.set_matrix(&matrix);
                            body.set_speeds(1.0, 0.5);
                        }
                    }
                    frame.set_telemetry(Telemetry::default());
                });
                pair.consumer.consume(&mut |frame| {
                    let mut sum = 0.0f32;
                    for i in 0..10_000 {
                        if let Some(body) = frame.body(Slot::new(i)) {
                            sum += body.linear_speed();
                        }
                    }
                    black_box(sum);
                });
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_slot_churn, bench_snapshot_turn);
criterion_main!(benches);
