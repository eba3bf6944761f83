//! # Channel Benchmark
//!
//! Costs on the consumer's frame budget:
//! 1. Pushing a burst of structural commands through the channel
//! 2. Request correlation under many replies in flight
//! 3. Byte codec for hosts that only move messages
//! 4. One full simulator tick + consumer frame at 1k bodies

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tandem_bridge::channel::{self, wire, PendingRequests};
use tandem_bridge::{session, MockPhysicsEngine, MockSceneGraph, SessionConfig};
use tandem_shared::{BodyConfig, Command, EntityId, Mat4, ShapeDescriptor, Vec3};

fn add(n: u32) -> Command {
    Command::AddRigidBody {
        id: EntityId::new(format!("body-{n}")),
        initial_transform: Mat4::from_translation(Vec3::new(n as f32, 5.0, 0.0)),
        shape: ShapeDescriptor::Sphere { radius: 0.5 },
        config: BodyConfig::default(),
    }
}

fn bench_command_burst(c: &mut Criterion) {
    let commands: Vec<Command> = (0..1_000).map(add).collect();

    c.bench_function("command_burst_1k", |b| {
        let (mut consumer, simulator) = channel::link();
        consumer.commands.mark_ready().unwrap();
        b.iter(|| {
            for command in &commands {
                consumer.commands.send(command.clone()).unwrap();
            }
            black_box(simulator.commands.try_iter().count());
        });
    });
}

fn bench_request_correlation(c: &mut Criterion) {
    c.bench_function("resolve_1k_in_flight", |b| {
        let table = PendingRequests::<u32>::new();
        b.iter(|| {
            let tickets: Vec<_> = (0..1_000).map(|_| table.ticket()).collect();
            for ticket in tickets.iter().rev() {
                black_box(table.resolve(ticket.id(), 1));
            }
        });
    });
}

fn bench_wire_codec(c: &mut Criterion) {
    let command = add(7);
    c.bench_function("wire_add_rigid_body", |b| {
        b.iter(|| {
            let bytes = wire::encode_command(black_box(&command)).unwrap();
            black_box(wire::decode_command(&bytes).unwrap());
        });
    });
}

fn bench_full_turn(c: &mut Criterion) {
    let config = SessionConfig {
        max_bodies: 1_000,
        debug_vertex_capacity: 0,
        ..SessionConfig::default()
    };
    let (mut consumer, mut simulator) = session::connect(&config, MockPhysicsEngine::new()).unwrap();
    for n in 0..1_000 {
        consumer.send(add(n)).unwrap();
    }
    simulator.pump_commands();
    consumer.pump_events();
    simulator.pump_commands();
    let mut scene = MockSceneGraph::new();

    c.bench_function("tick_and_frame_1k_bodies", |b| {
        b.iter(|| {
            simulator.tick();
            black_box(consumer.frame(&mut scene));
        });
    });
}

criterion_group!(
    benches,
    bench_command_burst,
    bench_request_correlation,
    bench_wire_codec,
    bench_full_turn
);
criterion_main!(benches);
