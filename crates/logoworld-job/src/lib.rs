//! Resumable jobs over LogoWorld agentsets.
//!
//! A compiled procedure is a [`Block`] of boxed [`Command`]s. `ask` runs it as an
//! [`ExclusiveJob`]: each member of the agentset runs the whole block before the
//! next starts. `ask-concurrent` runs a [`ConcurrentJob`] whose members take turns
//! one top-level statement at a time, or less when a [`YieldPoint`] inside a
//! nested block ends the turn early. Agent conditions are located at the
//! statement that raised them, [`Carefully`] is the only construct that catches
//! them, and a [`CancellationToken`] halts everything at the next statement
//! boundary. Everything runs on the caller's thread with exclusive access to the
//! world.

mod builtins;
mod cancel;
mod command;
mod error;
mod job;
mod scheduler;

pub use builtins::{
    Ask, AskConcurrent, Carefully, Die, FnCommand, Forward, Jump, SetVariable, Stop, YieldPoint,
};
pub use cancel::CancellationToken;
pub use command::{Block, Command, CommandExt, Context, Flow, Nested, Spanned, execute_block};
pub use error::{CommandError, JobError, SourceSpan};
pub use job::{ConcurrentJob, ExclusiveJob, StrandKey};
pub use scheduler::{JobReport, Scheduler};
