//! Kernel error type.

use crate::kernel::history::Position;

/// Errors raised by the interpreter, the procedures it drives, and the host binding.
///
/// Every variant is fatal for the instance that raised it: it transitions to
/// `Terminated` and never steps again. A host recovers by building a new instance.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum SagaError {
    #[error("contract violation at position {position}: {reason}")]
    ContractViolation { position: Position, reason: String },
    #[error("replay diverged at position {position}: {reason}")]
    ReplayDiverged { position: Position, reason: String },
    #[error("producer rejected at position {position}: {message}")]
    Producer { position: Position, message: String },
    #[error("no tokio runtime available to drive the producer at position {position}")]
    NoRuntime { position: Position },
    #[error("history limit of {limit} steps exceeded")]
    HistoryLimit { limit: usize },
}

impl SagaError {
    pub fn contract(position: Position, reason: impl Into<String>) -> Self {
        Self::ContractViolation {
            position,
            reason: reason.into(),
        }
    }

    pub fn diverged(position: Position, reason: impl Into<String>) -> Self {
        Self::ReplayDiverged {
            position,
            reason: reason.into(),
        }
    }

    /// Stamps the interpreter's position onto a contract violation raised inside a
    /// procedure, which cannot know where in the history it is.
    pub(crate) fn at(self, position: Position) -> Self {
        match self {
            SagaError::ContractViolation { reason, .. } => {
                SagaError::ContractViolation { position, reason }
            }
            other => other,
        }
    }

    /// Position in the history where the error was raised, when there is one.
    pub fn position(&self) -> Option<Position> {
        match self {
            SagaError::ContractViolation { position, .. }
            | SagaError::ReplayDiverged { position, .. }
            | SagaError::Producer { position, .. }
            | SagaError::NoRuntime { position } => Some(*position),
            SagaError::HistoryLimit { .. } => None,
        }
    }
}

/// Error type produced by a failing `AwaitFor` producer.
pub type ProducerError = Box<dyn std::error::Error + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_position() {
        let err = SagaError::contract(3, "expected a state cell");
        assert_eq!(
            err.to_string(),
            "contract violation at position 3: expected a state cell"
        );
    }

    #[test]
    fn position_is_reported_when_known() {
        let err = SagaError::Producer {
            position: 2,
            message: "boom".into(),
        };
        assert_eq!(err.position(), Some(2));
        assert_eq!(SagaError::HistoryLimit { limit: 4 }.position(), None);
    }
}
