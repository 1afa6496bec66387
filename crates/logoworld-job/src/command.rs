use crate::cancel::CancellationToken;
use crate::error::{CommandError, JobError, SourceSpan};
use logoworld_core::{AgentError, AgentRef, World};
use std::fmt;
use std::sync::Arc;

/// What a statement tells the executor to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Finish the current agent's run of the block.
    Stop,
    /// End this turn; only meaningful inside concurrent jobs.
    Yield,
}

/// A block a statement runs for its own agent, which a concurrent job can
/// suspend inside and resume on a later turn.
#[derive(Debug, Clone)]
pub struct Nested {
    pub body: Arc<Block>,
    /// Runs instead of the rest of `body` when it raises a runtime error.
    pub recovery: Option<Arc<Block>>,
}

/// One compiled statement.
pub trait Command: Send + Sync {
    /// Upper-case primitive name used when reporting errors.
    fn name(&self) -> &str;

    fn span(&self) -> Option<SourceSpan> {
        None
    }

    /// The block this statement runs for the same agent, if it is nothing more
    /// than that. Concurrent jobs step through it instead of calling `perform`.
    fn nested(&self) -> Option<Nested> {
        None
    }

    fn perform(&self, world: &mut World, ctx: &mut Context) -> Result<Flow, CommandError>;
}

/// Attaches a source location to any command.
pub trait CommandExt: Command + Sized + 'static {
    fn at(self, span: SourceSpan) -> Spanned {
        Spanned {
            inner: Box::new(self),
            span,
        }
    }
}

impl<C: Command + Sized + 'static> CommandExt for C {}

pub struct Spanned {
    inner: Box<dyn Command>,
    span: SourceSpan,
}

impl Command for Spanned {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn span(&self) -> Option<SourceSpan> {
        Some(self.span)
    }

    fn nested(&self) -> Option<Nested> {
        self.inner.nested()
    }

    fn perform(&self, world: &mut World, ctx: &mut Context) -> Result<Flow, CommandError> {
        self.inner.perform(world, ctx)
    }
}

/// An ordered list of statements, shared by every agent that runs it.
#[derive(Default)]
pub struct Block {
    statements: Vec<Box<dyn Command>>,
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.statements.iter().map(|statement| statement.name()))
            .finish()
    }
}

impl Block {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn then(mut self, command: impl Command + 'static) -> Self {
        self.statements.push(Box::new(command));
        self
    }

    pub fn push(&mut self, command: Box<dyn Command>) {
        self.statements.push(command);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    #[must_use]
    pub fn statement(&self, index: usize) -> Option<&dyn Command> {
        self.statements.get(index).map(Box::as_ref)
    }

    #[must_use]
    pub fn shared(self) -> Arc<Block> {
        Arc::new(self)
    }
}

/// Execution state of one agent running a block.
#[derive(Debug, Clone)]
pub struct Context {
    agent: AgentRef,
    myself: Option<AgentRef>,
    /// Message bound by the innermost enclosing `carefully` recovery block.
    pub(crate) error_message: Option<String>,
    cancel: CancellationToken,
}

impl Context {
    /// Top-level context: the observer runs the block.
    #[must_use]
    pub fn observer(cancel: CancellationToken) -> Self {
        Self {
            agent: AgentRef::Observer,
            myself: None,
            error_message: None,
            cancel,
        }
    }

    /// Context for `agent` asked by this context's agent. The error-message
    /// binding is dynamically scoped, so the child sees it too.
    #[must_use]
    pub fn child(&self, agent: AgentRef) -> Self {
        Self {
            agent,
            myself: Some(self.agent),
            error_message: self.error_message.clone(),
            cancel: self.cancel.clone(),
        }
    }

    #[must_use]
    pub fn agent(&self) -> AgentRef {
        self.agent
    }

    /// The agent that asked this one, if any.
    #[must_use]
    pub fn myself(&self) -> Option<AgentRef> {
        self.myself
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), JobError> {
        if self.cancel.is_cancelled() {
            Err(JobError::Halted)
        } else {
            Ok(())
        }
    }

    /// Id of the running turtle, or an error naming `primitive` for other agents.
    pub fn require_turtle(&self, primitive: &str) -> Result<i64, AgentError> {
        match self.agent {
            AgentRef::Turtle(id) => Ok(id),
            other => Err(AgentError::InvalidOperation(format!(
                "{primitive} is turtle-only, but a {} is running it",
                other.kind()
            ))),
        }
    }
}

/// Runs one statement, locating any agent condition at it.
pub(crate) fn run_statement(
    command: &dyn Command,
    world: &mut World,
    ctx: &mut Context,
) -> Result<Flow, JobError> {
    command.perform(world, ctx).map_err(|err| match err {
        CommandError::Agent(err) => JobError::at_instruction(err, command.name(), command.span()),
        CommandError::Job(err) => err,
    })
}

/// Runs `block` to completion for the context's agent.
///
/// The cancellation token is polled before every statement. Once the agent has
/// died, whether by its own hand or another's, its run ends quietly. Nothing
/// here can suspend, so `Flow::Yield` is treated as `Continue`.
pub fn execute_block(world: &mut World, ctx: &mut Context, block: &Block) -> Result<Flow, JobError> {
    for statement in &block.statements {
        ctx.check_cancelled()?;
        if !world.is_alive(ctx.agent) {
            return Ok(Flow::Stop);
        }
        match run_statement(statement.as_ref(), world, ctx)? {
            Flow::Stop => return Ok(Flow::Stop),
            Flow::Continue | Flow::Yield => {}
        }
    }
    Ok(Flow::Continue)
}
