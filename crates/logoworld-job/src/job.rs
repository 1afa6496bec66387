use crate::command::{Block, Context, Flow, execute_block, run_statement};
use crate::error::JobError;
use logoworld_core::{AgentSet, World};
use slotmap::{SlotMap, new_key_type};
use std::sync::Arc;
use tracing::{debug, trace};

new_key_type! {
    /// Handle of one agent's progress through a concurrent job.
    pub struct StrandKey;
}

/// Every member of an agentset runs the whole block in turn, in shuffled order.
///
/// The asking context is suspended until the last member finishes, so exclusive
/// jobs nest like calls.
#[derive(Debug, Clone)]
pub struct ExclusiveJob {
    agents: AgentSet,
    block: Arc<Block>,
}

impl ExclusiveJob {
    #[must_use]
    pub fn new(agents: AgentSet, block: Arc<Block>) -> Self {
        Self { agents, block }
    }

    pub fn run(&self, world: &mut World, parent: &Context) -> Result<(), JobError> {
        let mut order = self.agents.shufflerator(world);
        trace!(agents = order.remaining(), "exclusive job");
        while let Some(agent) = order.next_with(world.rng()) {
            parent.check_cancelled()?;
            // Members killed by earlier members are skipped.
            if !world.is_alive(agent) {
                continue;
            }
            let mut ctx = parent.child(agent);
            execute_block(world, &mut ctx, &self.block)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
enum Guard {
    None,
    /// Body of a `carefully`; a runtime error unwinds to here and runs the recovery.
    Body(Arc<Block>),
    /// Recovery block, holding the `error-message` binding to restore when it ends.
    Recovery(Option<String>),
}

#[derive(Debug)]
struct Frame {
    block: Arc<Block>,
    next: usize,
    guard: Guard,
}

impl Frame {
    fn new(block: Arc<Block>, guard: Guard) -> Self {
        Self {
            block,
            next: 0,
            guard,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Turn {
    Suspended,
    Finished,
}

/// One agent's progress: a stack of block cursors, the job's block at the bottom.
#[derive(Debug)]
struct Strand {
    ctx: Context,
    frames: Vec<Frame>,
}

impl Strand {
    fn new(ctx: Context, block: Arc<Block>) -> Self {
        Self {
            ctx,
            frames: vec![Frame::new(block, Guard::None)],
        }
    }

    /// Runs until the strand finishes a top-level statement, yields or ends.
    fn turn(&mut self, world: &mut World) -> Result<Turn, JobError> {
        loop {
            self.ctx.check_cancelled()?;
            if !world.is_alive(self.ctx.agent()) {
                return Ok(Turn::Finished);
            }
            let Some(frame) = self.frames.last_mut() else {
                return Ok(Turn::Finished);
            };
            let block = Arc::clone(&frame.block);
            let Some(statement) = block.statement(frame.next) else {
                self.pop();
                match self.frames.len() {
                    0 => return Ok(Turn::Finished),
                    1 => return Ok(self.suspend()),
                    _ => continue,
                }
            };
            frame.next += 1;
            if let Some(nested) = statement.nested() {
                let guard = nested.recovery.map_or(Guard::None, Guard::Body);
                self.frames.push(Frame::new(nested.body, guard));
                continue;
            }
            match run_statement(statement, world, &mut self.ctx) {
                Ok(Flow::Continue) if self.frames.len() > 1 => {}
                Ok(Flow::Continue | Flow::Yield) => return Ok(self.suspend()),
                Ok(Flow::Stop) => return Ok(Turn::Finished),
                Err(err) => self.recover(err)?,
            }
        }
    }

    /// Ends the turn, or the strand when its last top-level statement has run.
    fn suspend(&self) -> Turn {
        match self.frames.as_slice() {
            [root] if root.next >= root.block.len() => Turn::Finished,
            _ => Turn::Suspended,
        }
    }

    fn pop(&mut self) {
        if let Some(Frame {
            guard: Guard::Recovery(previous),
            ..
        }) = self.frames.pop()
        {
            self.ctx.error_message = previous;
        }
    }

    /// Unwinds a runtime error to the innermost `carefully` body and enters its
    /// recovery block; anything else, or an unguarded error, propagates.
    fn recover(&mut self, err: JobError) -> Result<(), JobError> {
        let JobError::Runtime {
            message,
            instruction,
            ..
        } = &err
        else {
            return Err(err);
        };
        let Some(depth) = self
            .frames
            .iter()
            .rposition(|frame| matches!(frame.guard, Guard::Body(_)))
        else {
            return Err(err);
        };
        let recovery = match &self.frames[depth].guard {
            Guard::Body(recovery) => Arc::clone(recovery),
            _ => return Err(err),
        };
        debug!(%instruction, %message, "carefully caught an error");
        while self.frames.len() > depth {
            self.pop();
        }
        let previous = self.ctx.error_message.replace(message.clone());
        self.frames
            .push(Frame::new(recovery, Guard::Recovery(previous)));
        Ok(())
    }
}

/// Members of an agentset advance through the block in lockstep, one top-level
/// statement per member per turn, in an order fixed by the shufflerator.
///
/// Statements that only run a nested block for the same agent (`carefully`) are
/// stepped through rather than performed whole, so a [`Flow::Yield`] inside them
/// ends the turn and the strand resumes there next time. A runtime error inside a
/// `carefully` body is caught even when the body spans several turns.
#[derive(Debug, Clone)]
pub struct ConcurrentJob {
    agents: AgentSet,
    block: Arc<Block>,
}

impl ConcurrentJob {
    #[must_use]
    pub fn new(agents: AgentSet, block: Arc<Block>) -> Self {
        Self { agents, block }
    }

    pub fn run(&self, world: &mut World, parent: &Context) -> Result<(), JobError> {
        let mut strands: SlotMap<StrandKey, Strand> = SlotMap::with_key();
        let mut turn_order = Vec::new();
        let mut order = self.agents.shufflerator(world);
        while let Some(agent) = order.next_with(world.rng()) {
            turn_order.push(strands.insert(Strand::new(
                parent.child(agent),
                Arc::clone(&self.block),
            )));
        }

        let mut turns = 0_usize;
        while !strands.is_empty() {
            turns += 1;
            for key in &turn_order {
                parent.check_cancelled()?;
                let Some(strand) = strands.get_mut(*key) else {
                    continue;
                };
                if strand.turn(world)? == Turn::Finished {
                    strands.remove(*key);
                }
            }
            turn_order.retain(|key| strands.contains_key(*key));
        }
        trace!(turns, "concurrent job finished");
        Ok(())
    }
}
