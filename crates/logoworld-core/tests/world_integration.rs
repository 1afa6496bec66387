use logoworld_core::{
    AgentError, AgentKind, AgentRef, AgentSet, Point, Program, TieMode, Value, World, WorldConfig,
};
use rand::Rng;

fn seeded(seed: u64, max: i32, wrap: bool) -> World {
    World::new(WorldConfig::centered(max, max, wrap).with_seed(seed)).expect("world")
}

fn close(a: Point, b: Point) -> bool {
    (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
}

#[test]
fn killing_every_turtle_empties_every_registry() {
    let mut world = seeded(11, 8, true);
    let ids = world.create_turtles(100, "turtles").expect("create");
    for id in &ids {
        let x = f64::from(world.rng().random_range(-8..=8));
        let y = f64::from(world.rng().random_range(-8..=8));
        world.set_xy(*id, x, y).expect("scatter");
    }
    for pair in ids.chunks(2) {
        world.create_link_with(pair[0], pair[1], "links").expect("link");
    }
    assert_eq!(world.link_count(), 50);

    let mut order = AgentSet::Turtles.shufflerator(&world);
    while let Some(agent) = order.next_with(world.rng()) {
        let AgentRef::Turtle(id) = agent else {
            panic!("turtle set produced {agent}");
        };
        let corpse = world.die(id).expect("die");
        assert_eq!(corpse.id(), -1);
    }

    assert_eq!(world.turtle_count(), 0);
    assert_eq!(world.link_count(), 0);
    assert!(world.patches().iter().all(|patch| patch.turtles_here().is_empty()));
    for id in ids {
        assert!(matches!(
            world.turtle(id),
            Err(AgentError::DeadAgent {
                kind: AgentKind::Turtle
            })
        ));
        assert!(!world.is_alive(AgentRef::Turtle(id)));
    }
}

#[test]
fn a_ring_of_rigid_ties_translates_as_one_body() {
    const N: usize = 12;
    let mut world = seeded(4, 12, true);
    let ids = world.create_turtles(N, "turtles").expect("create");
    for (i, id) in ids.iter().enumerate() {
        let angle = std::f64::consts::TAU * i as f64 / N as f64;
        world
            .set_xy(*id, 4.0 * angle.cos(), 4.0 * angle.sin())
            .expect("place");
    }
    world.set_heading(ids[0], 0.0).expect("heading");
    for i in 0..N {
        let link = world
            .create_link_with(ids[i], ids[(i + 1) % N], "links")
            .expect("link");
        world.set_tie_mode(link, TieMode::Fixed).expect("tie");
    }
    let before: Vec<Point> = ids
        .iter()
        .map(|id| world.turtle(*id).expect("turtle").position())
        .collect();

    world.jump(ids[0], 1.0).expect("jump");

    for (id, old) in ids.iter().zip(&before) {
        let now = world.turtle(*id).expect("turtle").position();
        assert!(close(now, Point::new(old.x, old.y + 1.0)), "{id}: {old:?} -> {now:?}");
    }

    // Turning around a cycle must terminate and leave the pivot in place.
    let pivot = world.turtle(ids[0]).expect("root").position();
    world.right(ids[0], 30.0).expect("turn");
    assert!(close(world.turtle(ids[0]).expect("root").position(), pivot));
    assert_eq!(world.turtle_count(), N);
}

#[test]
fn diffusion_conserves_totals_on_every_topology() {
    for wrap in [true, false] {
        let program = Program::new().with_patches_own(["chemical"]);
        let mut world = World::with_program(
            WorldConfig::centered(6, 4, wrap).with_seed(21),
            program,
        )
        .expect("world");
        for patch in 0..world.patch_count() {
            let amount = world.rng().random_range(0.0..100.0);
            world
                .set_variable(AgentRef::Patch(patch), "chemical", Value::Number(amount))
                .expect("seed chemical");
        }
        let total = |world: &World| -> f64 {
            (0..world.patch_count())
                .map(|patch| {
                    world
                        .variable(AgentRef::Patch(patch), "chemical")
                        .ok()
                        .and_then(|value| value.as_number())
                        .unwrap_or_default()
                })
                .sum()
        };
        let start = total(&world);
        for _ in 0..10 {
            world.diffuse("chemical", 0.7).expect("diffuse");
            world.diffuse4("chemical", 0.3).expect("diffuse4");
        }
        assert!((total(&world) - start).abs() < 1e-6, "wrap={wrap}");
    }
}

#[test]
fn the_same_seed_replays_the_same_run() {
    let run = |seed: u64| {
        let mut world = seeded(seed, 10, true);
        world.create_turtles(30, "turtles").expect("create");
        let sampled = world.n_of(5, &AgentSet::Turtles).expect("n-of");
        let mut order = AgentSet::Turtles.shufflerator(&world);
        let mut visited = Vec::new();
        while let Some(agent) = order.next_with(world.rng()) {
            if let AgentRef::Turtle(id) = agent {
                world.forward(id, 3.5).expect("forward");
                visited.push(id);
            }
        }
        // auxiliary draws must not perturb the simulation stream
        world.random_aux();
        let picked = world.one_of(&AgentSet::Patches);
        let state: Vec<(Point, f64, Value)> = world
            .turtles()
            .map(|turtle| (turtle.position(), turtle.heading(), turtle.color().clone()))
            .collect();
        (sampled.as_slice().to_vec(), visited, picked, state)
    };
    assert_eq!(run(99), run(99));
    assert_ne!(run(99).3, run(100).3);
}

#[test]
fn recompiling_mid_run_keeps_identity() {
    let program = Program::new()
        .with_turtles_own(["energy"])
        .with_breed("sheep", "a-sheep", ["wool"]);
    let mut world =
        World::with_program(WorldConfig::centered(5, 5, true).with_seed(2), program)
            .expect("world");
    let sheep = world.create_turtles(3, "sheep").expect("sheep");
    let plain = world.create_turtles(2, "turtles").expect("turtles");
    world
        .set_variable(AgentRef::Turtle(sheep[0]), "wool", Value::Number(4.0))
        .expect("wool");
    world.jump(plain[0], 2.0).expect("jump");
    let position = world.turtle(plain[0]).expect("turtle").position();

    let next = Program::new()
        .with_turtles_own(["energy", "mood"])
        .with_breed("sheep", "a-sheep", ["wool"]);
    let report = world.recompile(next).expect("recompile");
    assert_eq!(report.doomed(), 0);
    assert_eq!(
        world.variable(AgentRef::Turtle(sheep[0]), "wool").expect("wool"),
        Value::Number(4.0)
    );
    assert_eq!(world.turtle(plain[0]).expect("turtle").position(), position);

    let report = world
        .recompile(Program::new().with_turtles_own(["energy"]))
        .expect("drop sheep");
    assert_eq!(report.doomed_turtles, sheep);
    assert_eq!(world.turtle_count(), 2);
    assert!(world.turtle(plain[1]).is_ok());
}
