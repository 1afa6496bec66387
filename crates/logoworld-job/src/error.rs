use logoworld_core::AgentError;
use std::fmt;
use thiserror::Error;

/// Byte range of an instruction in the source it was compiled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

impl SourceSpan {
    #[must_use]
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Conditions that end a job.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum JobError {
    /// A domain condition located at the primitive that raised it. `carefully` can catch it.
    #[error("{message} (while running {instruction})")]
    Runtime {
        message: String,
        span: Option<SourceSpan>,
        instruction: String,
    },
    /// The cancellation token was raised.
    #[error("job halted")]
    Halted,
    /// World invariants are broken; nothing may continue.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl JobError {
    /// Locates an agent condition at the instruction that raised it.
    #[must_use]
    pub fn at_instruction(err: AgentError, instruction: &str, span: Option<SourceSpan>) -> Self {
        if err.is_fatal() {
            return JobError::Fatal(err.to_string());
        }
        JobError::Runtime {
            message: err.to_string(),
            span,
            instruction: instruction.to_owned(),
        }
    }

    #[must_use]
    pub fn is_catchable(&self) -> bool {
        matches!(self, JobError::Runtime { .. })
    }
}

/// Failure of a single command: either a bare agent condition still to be located,
/// or a job error bubbling up from a nested job.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    Job(#[from] JobError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use logoworld_core::AgentKind;

    #[test]
    fn agent_conditions_are_located_unless_fatal() {
        let located = JobError::at_instruction(
            AgentError::DeadAgent {
                kind: AgentKind::Turtle,
            },
            "FD",
            Some(SourceSpan::new(4, 8)),
        );
        assert_eq!(
            located,
            JobError::Runtime {
                message: "that turtle is dead".into(),
                span: Some(SourceSpan::new(4, 8)),
                instruction: "FD".into(),
            }
        );
        assert!(located.is_catchable());

        let fatal =
            JobError::at_instruction(AgentError::Corrupted("twice".into()), "DIE", None);
        assert!(matches!(fatal, JobError::Fatal(_)));
        assert!(!fatal.is_catchable());
        assert!(!JobError::Halted.is_catchable());
    }
}
