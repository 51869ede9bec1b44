//! Pipeline configuration

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::feature::QualityGates;

fn default_max_qa_iterations() -> u32 {
    3
}

fn default_max_debug_iterations() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_agent_retries() -> u32 {
    3
}

fn default_agent_timeout_secs() -> u64 {
    120
}

fn default_min_score() -> f32 {
    7.0
}

/// Knobs for a pipeline run.
///
/// Feature-level `QualityGates` override `max_qa_iterations`, `min_score`
/// and `auto_fix` per run; everything else applies as configured here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Review iterations before the run settles for a warning.
    #[serde(default = "default_max_qa_iterations")]
    pub max_qa_iterations: u32,
    /// Debugging passes before the run settles for a warning.
    #[serde(default = "default_max_debug_iterations")]
    pub max_debug_iterations: u32,
    /// Run frontend and backend stages concurrently when both are enabled.
    #[serde(default = "default_true")]
    pub parallel_execution: bool,
    /// Emit the final report even when the run did not converge.
    #[serde(default = "default_true")]
    pub continue_on_warnings: bool,
    /// Gateway attempts per agent call, the initial call included.
    #[serde(default = "default_agent_retries")]
    pub agent_retries: u32,
    /// Wall-clock budget per agent call.
    #[serde(default = "default_agent_timeout_secs")]
    pub agent_timeout_secs: u64,
    /// Score a passing review must reach, 0 to 10.
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    /// Whether failed reviews trigger a debugging pass.
    #[serde(default = "default_true")]
    pub auto_fix: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_qa_iterations: default_max_qa_iterations(),
            max_debug_iterations: default_max_debug_iterations(),
            parallel_execution: true,
            continue_on_warnings: true,
            agent_retries: default_agent_retries(),
            agent_timeout_secs: default_agent_timeout_secs(),
            min_score: default_min_score(),
            auto_fix: true,
        }
    }
}

impl PipelineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the review iteration cap.
    #[must_use]
    pub fn with_max_qa_iterations(mut self, cap: u32) -> Self {
        self.max_qa_iterations = cap;
        self
    }

    /// Sets the debugging pass cap.
    #[must_use]
    pub fn with_max_debug_iterations(mut self, cap: u32) -> Self {
        self.max_debug_iterations = cap;
        self
    }

    /// Enables or disables concurrent development stages.
    #[must_use]
    pub fn with_parallel_execution(mut self, parallel: bool) -> Self {
        self.parallel_execution = parallel;
        self
    }

    /// Controls whether an unconverged run still emits the report.
    #[must_use]
    pub fn with_continue_on_warnings(mut self, continue_on_warnings: bool) -> Self {
        self.continue_on_warnings = continue_on_warnings;
        self
    }

    /// Sets the per-call attempt budget handed to every agent.
    #[must_use]
    pub fn with_agent_retries(mut self, retries: u32) -> Self {
        self.agent_retries = retries;
        self
    }

    /// Sets the per-call timeout handed to every agent.
    #[must_use]
    pub fn with_agent_timeout_secs(mut self, secs: u64) -> Self {
        self.agent_timeout_secs = secs;
        self
    }

    /// Sets the minimum passing score.
    #[must_use]
    pub fn with_min_score(mut self, score: f32) -> Self {
        self.min_score = score;
        self
    }

    /// Enables or disables the debugging pass on failed reviews.
    #[must_use]
    pub fn with_auto_fix(mut self, auto_fix: bool) -> Self {
        self.auto_fix = auto_fix;
        self
    }

    /// Folds feature-level gate overrides over this configuration.
    #[must_use]
    pub fn apply_gates(&self, gates: &QualityGates) -> Self {
        let mut merged = self.clone();
        if let Some(cap) = gates.max_qa_iterations {
            merged.max_qa_iterations = cap;
        }
        if let Some(score) = gates.min_score {
            merged.min_score = score;
        }
        if let Some(auto_fix) = gates.auto_fix {
            merged.auto_fix = auto_fix;
        }
        merged
    }

    /// Checks the merged configuration before a run starts.
    pub fn validate(&self) -> Result<()> {
        if self.max_qa_iterations == 0 {
            return Err(Error::Config("max_qa_iterations must be at least 1".into()));
        }
        if self.agent_retries == 0 {
            return Err(Error::Config("agent_retries must be at least 1".into()));
        }
        if self.agent_timeout_secs == 0 {
            return Err(Error::Config("agent_timeout_secs must be at least 1".into()));
        }
        if !(0.0..=10.0).contains(&self.min_score) {
            return Err(Error::Config(format!(
                "min_score must be between 0 and 10, got {}",
                self.min_score
            )));
        }
        Ok(())
    }
}
