//! Throughput benchmarks for the roomcast core.
//!
//! These measure registry operations, membership snapshots, and
//! end-to-end broadcast fan-out through a running worker pool.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use roomcast_core::{MemberInfo, MessageDispatcher, Room, RoomRegistry, UserId, UserRegistry};
use std::sync::Arc;

/// Benchmark registry operations.
fn bench_registries(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry");

    group.bench_function("create_room", |b| {
        let rooms = RoomRegistry::new();
        let admin = UserId::from("user_admin");
        let mut i = 0u64;
        b.iter(|| {
            let name = format!("room-{i}");
            i += 1;
            rooms.create(&name, admin.clone()).unwrap();
        });
    });

    group.bench_function("get_user", |b| {
        let users = UserRegistry::new();
        let ids: Vec<_> = (0..1000)
            .map(|i| users.add_user(&format!("member-{i}")).unwrap().id().clone())
            .collect();
        let mut i = 0usize;
        b.iter(|| {
            let id = &ids[i % ids.len()];
            i += 1;
            users.get(black_box(id)).unwrap();
        });
    });

    group.finish();
}

/// Benchmark membership snapshots at varying room sizes.
fn bench_members_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("members_snapshot");

    for size in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let room = Room::new("bench", UserId::from("user_admin"));
            for i in 0..size {
                room.add_member(MemberInfo {
                    user_id: UserId::from(format!("user_{i}")),
                    display_name: format!("member-{i}"),
                });
            }
            b.iter(|| black_box(room.members()).len());
        });
    }

    group.finish();
}

/// Benchmark broadcast fan-out through a live dispatcher pool.
fn bench_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout");

    for members in [10usize, 100, 1000] {
        group.throughput(Throughput::Elements(members as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(members),
            &members,
            |b, &members| {
                let rt = tokio::runtime::Runtime::new().unwrap();
                let _guard = rt.enter();

                let users = Arc::new(UserRegistry::new());
                let rooms = Arc::new(RoomRegistry::new());
                let dispatcher = MessageDispatcher::new(Arc::clone(&users), Arc::clone(&rooms));

                let speaker = users.add_user("speaker").unwrap();
                rooms.create("bench", speaker.id().clone()).unwrap();

                for i in 0..members {
                    let user = users.add_user(&format!("member-{i}")).unwrap();
                    dispatcher.join_room("bench", user.id()).unwrap();
                    // Keep every inbox drained so the benchmark measures
                    // delivery, not drop-on-full.
                    let mut rx = user.take_inbox().unwrap();
                    rt.spawn(async move { while rx.recv().await.is_some() {} });
                }

                let _handle = dispatcher.start_room_dispatcher("bench").unwrap();

                b.iter(|| {
                    dispatcher
                        .broadcast("bench", speaker.id(), black_box("payload"))
                        .unwrap();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_registries,
    bench_members_snapshot,
    bench_fanout,
);
criterion_main!(benches);
