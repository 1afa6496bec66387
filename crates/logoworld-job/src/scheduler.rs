use crate::cancel::CancellationToken;
use crate::command::{Block, Context, execute_block};
use crate::error::{JobError, SourceSpan};
use logoworld_core::World;
use std::fmt;
use tracing::{info, warn};

/// An uncaught condition that ended a top-level job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub message: String,
    pub instruction: Option<String>,
    pub span: Option<SourceSpan>,
    pub halted: bool,
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        if let Some(instruction) = &self.instruction {
            write!(f, "\nerror while running {instruction}")?;
        }
        if let Some(span) = self.span {
            write!(f, " at {span}")?;
        }
        Ok(())
    }
}

/// Drives top-level observer jobs on a single execution stream.
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    cancel: CancellationToken,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle other threads use to halt the running job.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs `block` as the observer.
    ///
    /// A runtime error or a halt ends only this job and comes back as a report;
    /// every mutator completes or rolls back on its own, so the world stays
    /// consistent. Fatal errors are returned as errors and the world must be
    /// discarded. The cancellation flag is lowered again after a halt.
    pub fn run_top_level(
        &self,
        world: &mut World,
        block: &Block,
    ) -> Result<Option<JobReport>, JobError> {
        let mut ctx = Context::observer(self.cancel.clone());
        match execute_block(world, &mut ctx, block) {
            Ok(_) => Ok(None),
            Err(JobError::Runtime {
                message,
                span,
                instruction,
            }) => {
                info!(%instruction, %message, "job stopped by an uncaught error");
                Ok(Some(JobReport {
                    message,
                    instruction: Some(instruction),
                    span,
                    halted: false,
                }))
            }
            Err(JobError::Halted) => {
                warn!("job halted");
                self.cancel.reset();
                Ok(Some(JobReport {
                    message: JobError::Halted.to_string(),
                    instruction: None,
                    span: None,
                    halted: true,
                }))
            }
            Err(fatal @ JobError::Fatal(_)) => Err(fatal),
        }
    }
}
