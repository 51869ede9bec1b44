//! Error types for agent execution.

use thiserror::Error;

/// Errors surfaced by agent construction and execution.
#[derive(Error, Debug)]
pub enum Error {
    /// Input failed the role's contract. Terminal, never retried.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A context source could not produce its contribution.
    #[error("context source '{source_name}' failed: {reason}")]
    Context {
        /// Name of the failing source.
        source_name: String,
        /// What went wrong.
        reason: String,
    },

    /// The provider gateway returned an error.
    #[error("provider error: {0}")]
    Provider(#[from] maestro_llm::Error),

    /// Every execution attempt failed.
    #[error("agent exhausted {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// Error from the final attempt.
        last: maestro_llm::Error,
    },

    /// A reply could not be mapped onto the role's output contract.
    #[error("decode error: {0}")]
    Decode(String),
}

impl Error {
    /// Whether the failure is terminal regardless of retries.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::InvalidInput(_) | Error::Decode(_))
    }

    /// Gateway attempts behind this error, when the error tracks them.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Error::RetriesExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

/// Convenience result alias for agent operations.
pub type Result<T> = std::result::Result<T, Error>;
