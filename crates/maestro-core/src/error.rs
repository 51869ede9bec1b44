//! Orchestration error types

use thiserror::Error;

/// Errors surfaced by the pipeline and workflow engines.
///
/// `InvalidFeature`, `InvalidWorkflow` and `Config` are caller-fixable and
/// are returned before any run record exists. Faults hit mid-run land in the
/// run result instead.
#[derive(Debug, Error)]
pub enum Error {
    /// The feature spec was rejected before the run started.
    #[error("invalid feature: {0}")]
    InvalidFeature(String),

    /// The workflow spec was rejected before execution.
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),

    /// The merged pipeline configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// An agent run failed.
    #[error("agent error: {0}")]
    Agent(#[from] maestro_agents::Error),

    /// The orchestrator itself broke an invariant.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_converts() {
        let source = maestro_agents::Error::InvalidInput("feature must not be empty".into());
        let error: Error = source.into();
        assert!(matches!(error, Error::Agent(_)));
        assert!(error.to_string().contains("feature must not be empty"));
    }

    #[test]
    fn test_display_names_the_fault() {
        let error = Error::Config("max_qa_iterations must be at least 1".into());
        assert!(error.to_string().starts_with("invalid configuration:"));
    }
}
