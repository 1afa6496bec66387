use crate::value::AgentKind;
use logoworld_topology::TopologyError;
use thiserror::Error;

/// Conditions raised by world, agent and agentset operations.
///
/// Everything except [`AgentError::Corrupted`] is a domain condition that a
/// primitive boundary reports with its source location. `Corrupted` means an
/// internal registry invariant no longer holds and the world must not be used.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AgentError {
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error("that {kind} is dead")]
    DeadAgent { kind: AgentKind },
    #[error("there is no {kind} with id {id}")]
    NoSuchAgent { kind: AgentKind, id: i64 },
    #[error("no such breed: {0}")]
    NoSuchBreed(String),
    #[error("no such {kind} variable: {name}")]
    NoSuchVariable { kind: AgentKind, name: String },
    #[error("{kind} variable index {index} is out of range")]
    VariableOutOfRange { kind: AgentKind, index: usize },
    #[error("can't set {variable} to non-{expected} {found}")]
    WrongType {
        variable: String,
        expected: &'static str,
        found: String,
    },
    #[error("{0} is a read-only variable")]
    ReadOnlyVariable(String),
    #[error("{variable}: {message}")]
    Constraint { variable: String, message: String },
    #[error("{0}")]
    InvalidOperation(String),
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("world state corrupted: {0}")]
    Corrupted(String),
}

impl AgentError {
    /// Returns true when the condition must halt everything rather than be reported.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, AgentError::Corrupted(_))
    }

    pub(crate) fn dead(kind: AgentKind) -> Self {
        AgentError::DeadAgent { kind }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        AgentError::InvalidOperation(message.into())
    }
}
