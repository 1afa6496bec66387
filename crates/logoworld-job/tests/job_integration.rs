use logoworld_core::{AgentRef, AgentSet, Program, Value, World, WorldConfig};
use logoworld_job::{
    Ask, AskConcurrent, Block, Carefully, Die, FnCommand, Flow, Forward, Jump, Scheduler,
    SetVariable, Stop, YieldPoint,
};
use std::sync::{Arc, Mutex};

fn world(seed: u64) -> World {
    let program = Program::new()
        .with_globals(["caught"])
        .with_turtles_own(["steps"]);
    World::with_program(WorldConfig::centered(5, 5, true).with_seed(seed), program)
        .expect("world")
}

#[test]
fn asking_every_turtle_to_die_empties_the_world() {
    let mut world = world(1);
    world.create_turtles(100, "turtles").expect("turtles");
    let block = Block::new().then(Ask::new(
        AgentSet::Turtles,
        Block::new().then(Forward(2.0)).then(Die).then(Forward(1.0)).shared(),
    ));
    let report = Scheduler::new()
        .run_top_level(&mut world, &block)
        .expect("not fatal");
    assert_eq!(report, None);
    assert_eq!(world.turtle_count(), 0);
    assert!(world.patches().iter().all(|patch| patch.turtles_here().is_empty()));
}

#[test]
fn nested_asks_see_their_asker() {
    let mut world = world(2);
    world.create_turtles(3, "turtles").expect("turtles");
    let pairs = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&pairs);
    let inner = Block::new()
        .then(FnCommand::new("RECORD", move |_, ctx| {
            sink.lock()
                .expect("pairs")
                .push((ctx.myself(), ctx.agent()));
            Ok(Flow::Continue)
        }))
        .shared();
    let outer = Block::new()
        .then(Ask::new(AgentSet::Patches, Block::new().then(Stop).shared()))
        .then(Ask::agent(AgentRef::Turtle(0), inner).expect("single"))
        .shared();
    let block = Block::new().then(Ask::new(AgentSet::Turtles, outer));
    Scheduler::new()
        .run_top_level(&mut world, &block)
        .expect("not fatal");
    let pairs = pairs.lock().expect("pairs");
    assert_eq!(pairs.len(), 3);
    assert!(pairs.iter().all(|(_, agent)| *agent == AgentRef::Turtle(0)));
    let mut askers: Vec<_> = pairs.iter().filter_map(|(asker, _)| *asker).collect();
    askers.sort();
    assert_eq!(
        askers,
        vec![AgentRef::Turtle(0), AgentRef::Turtle(1), AgentRef::Turtle(2)]
    );
}

#[test]
fn carefully_recovers_and_the_job_continues() {
    let mut world = world(3);
    world.create_turtles(4, "turtles").expect("turtles");
    let recovery = Block::new()
        .then(SetVariable::computed("steps", |_, ctx| {
            Ok(Value::from(ctx.error_message().unwrap_or_default()))
        }))
        .shared();
    let body = Block::new()
        .then(SetVariable::new("heading", Value::from("north")))
        .then(SetVariable::new("steps", Value::Number(1.0)))
        .shared();
    let block = Block::new().then(Ask::new(
        AgentSet::Turtles,
        Block::new()
            .then(Carefully::new(body, recovery))
            .then(Jump(1.0))
            .shared(),
    ));
    let report = Scheduler::new()
        .run_top_level(&mut world, &block)
        .expect("not fatal");
    assert_eq!(report, None);
    for id in 0..4 {
        let steps = world
            .variable(AgentRef::Turtle(id), "steps")
            .expect("steps");
        let Value::Str(message) = steps else {
            panic!("recovery did not run for turtle {id}: {steps:?}");
        };
        assert!(message.contains("HEADING"), "{message}");
    }
}

#[test]
fn concurrent_asks_interleave_and_replay_by_seed() {
    let run = |seed: u64| {
        let mut world = world(seed);
        world.create_turtles(5, "turtles").expect("turtles");
        let trace = Arc::new(Mutex::new(Vec::new()));
        let record = |tag: u8| {
            let trace = Arc::clone(&trace);
            FnCommand::new("TRACE", move |_, ctx| {
                trace.lock().expect("trace").push((tag, ctx.agent()));
                Ok(Flow::Continue)
            })
        };
        let block = Block::new().then(AskConcurrent::new(
            AgentSet::Turtles,
            Block::new()
                .then(record(1))
                .then(Forward(1.0))
                .then(YieldPoint)
                .then(record(2))
                .shared(),
        ));
        Scheduler::new()
            .run_top_level(&mut world, &block)
            .expect("not fatal");
        let trace = trace.lock().expect("trace").clone();
        trace
    };
    let trace = run(7);
    assert_eq!(trace.len(), 10);
    assert!(trace[..5].iter().all(|(tag, _)| *tag == 1));
    assert!(trace[5..].iter().all(|(tag, _)| *tag == 2));
    assert_eq!(trace, run(7));
}
