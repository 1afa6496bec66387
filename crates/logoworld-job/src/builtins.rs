//! Commands the job layer itself needs, plus a few movement and variable
//! primitives that exercise the agent layer through the primitive boundary.

use crate::command::{Block, Command, Context, Flow, Nested, execute_block};
use crate::error::{CommandError, JobError};
use crate::job::{ConcurrentJob, ExclusiveJob};
use logoworld_core::{AgentError, AgentRef, AgentSet, Value, World};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// `ask`: runs a block for every member of an agentset, exclusively.
#[derive(Debug, Clone)]
pub struct Ask {
    job: ExclusiveJob,
}

impl Ask {
    #[must_use]
    pub fn new(agents: AgentSet, block: Arc<Block>) -> Self {
        Self {
            job: ExclusiveJob::new(agents, block),
        }
    }

    /// Asks a single agent.
    pub fn agent(agent: AgentRef, block: Arc<Block>) -> Result<Self, AgentError> {
        Ok(Self::new(AgentSet::of(agent.kind(), [agent])?, block))
    }
}

impl Command for Ask {
    fn name(&self) -> &str {
        "ASK"
    }

    fn perform(&self, world: &mut World, ctx: &mut Context) -> Result<Flow, CommandError> {
        self.job.run(world, ctx)?;
        Ok(Flow::Continue)
    }
}

/// `ask-concurrent`: members interleave one statement at a time.
#[derive(Debug, Clone)]
pub struct AskConcurrent {
    job: ConcurrentJob,
}

impl AskConcurrent {
    #[must_use]
    pub fn new(agents: AgentSet, block: Arc<Block>) -> Self {
        Self {
            job: ConcurrentJob::new(agents, block),
        }
    }
}

impl Command for AskConcurrent {
    fn name(&self) -> &str {
        "ASK-CONCURRENT"
    }

    fn perform(&self, world: &mut World, ctx: &mut Context) -> Result<Flow, CommandError> {
        self.job.run(world, ctx)?;
        Ok(Flow::Continue)
    }
}

/// `carefully [ body ] [ recovery ]`.
///
/// A runtime error in the body transfers control to the recovery block with the
/// message bound for `error-message`; the previous binding is restored afterwards.
/// Halts and fatal errors pass straight through. Effects the body made before
/// failing are kept.
#[derive(Debug, Clone)]
pub struct Carefully {
    body: Arc<Block>,
    recovery: Arc<Block>,
}

impl Carefully {
    #[must_use]
    pub fn new(body: Arc<Block>, recovery: Arc<Block>) -> Self {
        Self { body, recovery }
    }
}

impl Command for Carefully {
    fn name(&self) -> &str {
        "CAREFULLY"
    }

    fn nested(&self) -> Option<Nested> {
        Some(Nested {
            body: Arc::clone(&self.body),
            recovery: Some(Arc::clone(&self.recovery)),
        })
    }

    fn perform(&self, world: &mut World, ctx: &mut Context) -> Result<Flow, CommandError> {
        let message = match execute_block(world, ctx, &self.body) {
            Ok(flow) => return Ok(flow),
            Err(JobError::Runtime {
                message,
                instruction,
                ..
            }) => {
                debug!(%instruction, %message, "carefully caught an error");
                message
            }
            Err(other) => return Err(other.into()),
        };
        let previous = ctx.error_message.replace(message);
        let outcome = execute_block(world, ctx, &self.recovery);
        ctx.error_message = previous;
        Ok(outcome?)
    }
}

/// `die`: kills the running turtle or link and ends its run.
#[derive(Debug, Clone, Copy, Default)]
pub struct Die;

impl Command for Die {
    fn name(&self) -> &str {
        "DIE"
    }

    fn perform(&self, world: &mut World, ctx: &mut Context) -> Result<Flow, CommandError> {
        match ctx.agent() {
            AgentRef::Turtle(id) => {
                world.die(id)?;
            }
            AgentRef::Link(id) => {
                world.kill_link(id)?;
            }
            other => {
                return Err(AgentError::InvalidOperation(format!(
                    "a {} cannot die",
                    other.kind()
                ))
                .into());
            }
        }
        Ok(Flow::Stop)
    }
}

/// `jump d`: fails with the topology's condition when the target is off-world.
#[derive(Debug, Clone, Copy)]
pub struct Jump(pub f64);

impl Command for Jump {
    fn name(&self) -> &str {
        "JUMP"
    }

    fn perform(&self, world: &mut World, ctx: &mut Context) -> Result<Flow, CommandError> {
        let id = ctx.require_turtle(self.name())?;
        world.jump(id, self.0)?;
        Ok(Flow::Continue)
    }
}

/// `fd d`: stops quietly at a non-wrapping edge.
#[derive(Debug, Clone, Copy)]
pub struct Forward(pub f64);

impl Command for Forward {
    fn name(&self) -> &str {
        "FD"
    }

    fn perform(&self, world: &mut World, ctx: &mut Context) -> Result<Flow, CommandError> {
        let id = ctx.require_turtle(self.name())?;
        world.forward(id, self.0)?;
        Ok(Flow::Continue)
    }
}

type Reporter = Box<dyn Fn(&World, &Context) -> Result<Value, AgentError> + Send + Sync>;

/// `set name value` on the running agent.
pub struct SetVariable {
    name: String,
    value: Reporter,
}

impl fmt::Debug for SetVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetVariable")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl SetVariable {
    /// Sets the variable to a constant.
    #[must_use]
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self::computed(name, move |_, _| Ok(value.clone()))
    }

    /// Sets the variable to whatever `report` yields for the running agent.
    #[must_use]
    pub fn computed<F>(name: impl Into<String>, report: F) -> Self
    where
        F: Fn(&World, &Context) -> Result<Value, AgentError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            value: Box::new(report),
        }
    }
}

impl Command for SetVariable {
    fn name(&self) -> &str {
        "SET"
    }

    fn perform(&self, world: &mut World, ctx: &mut Context) -> Result<Flow, CommandError> {
        let value = (self.value)(world, ctx)?;
        world.set_variable(ctx.agent(), &self.name, value)?;
        Ok(Flow::Continue)
    }
}

/// `stop`: ends the running agent's run of the current block.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stop;

impl Command for Stop {
    fn name(&self) -> &str {
        "STOP"
    }

    fn perform(&self, _world: &mut World, _ctx: &mut Context) -> Result<Flow, CommandError> {
        Ok(Flow::Stop)
    }
}

/// Gives up the rest of the turn in a concurrent job, even in the middle of a
/// nested block; the strand resumes after it on its next turn. Does nothing
/// outside concurrent jobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct YieldPoint;

impl Command for YieldPoint {
    fn name(&self) -> &str {
        "YIELD"
    }

    fn perform(&self, _world: &mut World, _ctx: &mut Context) -> Result<Flow, CommandError> {
        Ok(Flow::Yield)
    }
}

type Body = Box<dyn Fn(&mut World, &mut Context) -> Result<Flow, CommandError> + Send + Sync>;

/// Adapts a closure into a command.
pub struct FnCommand {
    name: String,
    body: Body,
}

impl fmt::Debug for FnCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCommand")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl FnCommand {
    #[must_use]
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut World, &mut Context) -> Result<Flow, CommandError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: Box::new(body),
        }
    }
}

impl Command for FnCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn perform(&self, world: &mut World, ctx: &mut Context) -> Result<Flow, CommandError> {
        (self.body)(world, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::command::CommandExt;
    use crate::error::SourceSpan;
    use logoworld_core::{WorldBounds, WorldConfig};
    use std::sync::Mutex;

    fn boxed_world() -> World {
        let config = WorldConfig {
            bounds: WorldBounds::new(-2, 2, -2, 2),
            wrap_x: false,
            wrap_y: false,
            ..WorldConfig::default().with_seed(1)
        };
        World::new(config).expect("world")
    }

    fn root() -> Context {
        Context::observer(CancellationToken::new())
    }

    #[test]
    fn out_of_world_jumps_are_located_runtime_errors() {
        let mut world = boxed_world();
        let id = world.create_turtles(1, "turtles").expect("turtle")[0];
        world.set_heading(id, 0.0).expect("heading");
        let mut ctx = root().child(AgentRef::Turtle(id));
        let block = Block::new().then(Jump(5.0).at(SourceSpan::new(10, 16)));
        let err = execute_block(&mut world, &mut ctx, &block).expect_err("off the edge");
        let JobError::Runtime {
            span, instruction, ..
        } = err.clone()
        else {
            panic!("expected a runtime error, got {err:?}");
        };
        assert_eq!(span, Some(SourceSpan::new(10, 16)));
        assert_eq!(instruction, "JUMP");
        assert_eq!(world.turtle(id).expect("turtle").ycor(), 0.0);

        // forward swallows the same condition
        execute_block(&mut world, &mut ctx, &Block::new().then(Forward(5.0)))
            .expect("forward");
        assert_eq!(world.turtle(id).expect("turtle").ycor(), 2.0);
    }

    #[test]
    fn carefully_binds_and_restores_the_error_message() {
        let mut world = boxed_world();
        let id = world.create_turtles(1, "turtles").expect("turtle")[0];
        world.set_heading(id, 0.0).expect("heading");
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let recovery = Block::new()
            .then(FnCommand::new("RECORD", move |_, ctx| {
                *sink.lock().expect("seen") = ctx.error_message().map(str::to_owned);
                Ok(Flow::Continue)
            }))
            .shared();
        let body = Block::new().then(Jump(9.0)).then(Jump(1.0)).shared();
        let mut ctx = root().child(AgentRef::Turtle(id));
        let flow = Carefully::new(body, recovery)
            .perform(&mut world, &mut ctx)
            .expect("caught");
        assert_eq!(flow, Flow::Continue);
        let message = seen.lock().expect("seen").clone().expect("message bound");
        assert!(message.contains("edge"), "{message}");
        assert_eq!(ctx.error_message(), None);
        // the statement after the failure never ran
        assert_eq!(world.turtle(id).expect("turtle").ycor(), 0.0);
    }

    #[test]
    fn carefully_does_not_catch_halts() {
        let mut world = boxed_world();
        let mut ctx = root();
        let body = Block::new()
            .then(FnCommand::new("HALT", |_, ctx| {
                ctx.cancellation().cancel();
                Ok(Flow::Continue)
            }))
            .then(Stop)
            .shared();
        let result = Carefully::new(body, Block::new().shared()).perform(&mut world, &mut ctx);
        assert_eq!(result, Err(CommandError::Job(JobError::Halted)));
    }

    #[test]
    fn die_ends_the_run_and_patches_cannot_die() {
        let mut world = boxed_world();
        let id = world.create_turtles(1, "turtles").expect("turtle")[0];
        let mut ctx = root().child(AgentRef::Turtle(id));
        let block = Block::new().then(Die).then(Jump(1.0));
        assert_eq!(
            execute_block(&mut world, &mut ctx, &block).expect("die"),
            Flow::Stop
        );
        assert_eq!(world.turtle_count(), 0);

        let mut patch_ctx = root().child(AgentRef::Patch(0));
        let err = execute_block(&mut world, &mut patch_ctx, &Block::new().then(Die))
            .expect_err("patches are immortal");
        assert!(err.is_catchable());
    }

    #[test]
    fn set_variable_routes_through_the_generic_setter() {
        let mut world = boxed_world();
        let id = world.create_turtles(1, "turtles").expect("turtle")[0];
        let mut ctx = root().child(AgentRef::Turtle(id));
        let block = Block::new()
            .then(SetVariable::new("color", Value::Number(15.0)))
            .then(SetVariable::computed("heading", |world, ctx| {
                let AgentRef::Turtle(id) = ctx.agent() else {
                    return Ok(Value::Number(0.0));
                };
                Ok(Value::Number(world.turtle(id)?.heading() + 400.0))
            }))
            .then(SetVariable::new("xcor", Value::from("left")));
        let heading = world.turtle(id).expect("turtle").heading();
        let err = execute_block(&mut world, &mut ctx, &block).expect_err("wrong type");
        assert!(matches!(err, JobError::Runtime { ref instruction, .. } if instruction == "SET"));
        let turtle = world.turtle(id).expect("turtle");
        assert_eq!(turtle.color(), &Value::Number(15.0));
        assert!((turtle.heading() - (heading + 40.0).rem_euclid(360.0)).abs() < 1e-9);
    }
}
