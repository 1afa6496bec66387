use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use logoworld_core::{AgentRef, AgentSet, Program, Value, World, WorldConfig};
use rand::Rng;
use std::hint::black_box;
use std::time::Duration;

fn populated(max: i32, turtles: usize) -> World {
    let program = Program::new().with_patches_own(["chemical"]);
    let mut world = World::with_program(
        WorldConfig::centered(max, max, true).with_seed(0xBEEF),
        program,
    )
    .expect("world");
    let ids = world.create_turtles(turtles, "turtles").expect("turtles");
    let span = f64::from(max);
    for id in ids {
        let x = world.rng().random_range(-span..span);
        let y = world.rng().random_range(-span..span);
        world.set_xy(id, x, y).expect("scatter");
    }
    for patch in 0..world.patch_count() {
        let amount = world.rng().random_range(0.0..10.0);
        world
            .set_variable(AgentRef::Patch(patch), "chemical", Value::Number(amount))
            .expect("chemical");
    }
    world
}

fn bench_in_radius(c: &mut Criterion) {
    let mut group = c.benchmark_group("in_radius");
    group.measurement_time(Duration::from_secs(5));
    let world = populated(50, 5_000);
    for radius in [2.0, 5.0, 15.0] {
        group.bench_function(format!("turtles_r{radius}"), |b| {
            b.iter(|| {
                world
                    .in_radius(AgentRef::Turtle(0), &AgentSet::Turtles, black_box(radius), true)
                    .expect("in-radius")
                    .len()
            });
        });
        group.bench_function(format!("patches_r{radius}"), |b| {
            b.iter(|| {
                world
                    .in_radius(AgentRef::Turtle(0), &AgentSet::Patches, black_box(radius), true)
                    .expect("in-radius")
                    .len()
            });
        });
    }
    group.finish();
}

fn bench_diffuse(c: &mut Criterion) {
    let mut group = c.benchmark_group("diffuse");
    for max in [25, 100] {
        group.bench_function(format!("neighbors_{}x{}", 2 * max + 1, 2 * max + 1), |b| {
            b.iter_batched(
                || populated(max, 0),
                |mut world| {
                    world.diffuse("chemical", 0.5).expect("diffuse");
                    world
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_in_radius, bench_diffuse);
criterion_main!(benches);
