//! Feature pipeline
//!
//! Drives one feature through development, review and debugging:
//!
//! 1. Validate the feature and the merged configuration
//! 2. Development: one stage per component and endpoint, concurrent when
//!    both roles are enabled and `parallel_execution` is set
//! 3. Review loop: QA over everything produced so far; failed reviews
//!    trigger a debugging pass when `auto_fix` is on, then review again
//! 4. Finalize: render the report artifact and store the run record
//!
//! Exhausted review or debugging budgets end the run with a warning.
//! A failed run is reserved for faults in the pipeline itself.

use std::sync::Arc;

use maestro_agents::{Agent, AgentConfig, AgentRole, ContextSource};
use maestro_llm::ProviderGateway;
use tracing::{error, info, instrument};

mod dev;
mod quality;

use quality::QualityStats;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::feature::FeatureSpec;
use crate::run::{Artifact, LogLevel, PipelineRunResult, RunStatus};
use crate::store::RunStore;

/// The feature pipeline.
///
/// Holds the default configuration, the shared provider gateway, the run
/// store and the context sources handed to every agent it spawns.
pub struct Pipeline {
    /// Defaults, merged with feature-level gates per run.
    config: PipelineConfig,
    /// Shared provider gateway.
    gateway: Arc<ProviderGateway>,
    /// Registry finished runs land in.
    store: Arc<RunStore>,
    /// Context sources registered on every agent.
    sources: Vec<Arc<dyn ContextSource>>,
}

impl Pipeline {
    /// Creates a pipeline with default configuration and a fresh store.
    pub fn new(gateway: Arc<ProviderGateway>) -> Self {
        Self {
            config: PipelineConfig::default(),
            gateway,
            store: Arc::new(RunStore::new()),
            sources: Vec::new(),
        }
    }

    /// Replaces the default configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Shares an existing run store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<RunStore>) -> Self {
        self.store = store;
        self
    }

    /// Registers a context source for every agent the pipeline spawns.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn ContextSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// The default configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The run store.
    #[must_use]
    pub fn store(&self) -> &RunStore {
        &self.store
    }

    /// Runs the pipeline for one feature.
    ///
    /// Returns `Err` only for inputs the caller must fix: a rejected
    /// feature or an unusable merged configuration. Everything after that
    /// lands in the returned run record, which is also inserted into the
    /// store.
    #[instrument(skip(self, feature), fields(feature = %feature.name))]
    pub async fn run(&self, feature: &FeatureSpec) -> Result<PipelineRunResult> {
        feature.validate()?;
        let config = self.config.apply_gates(&feature.gates);
        config.validate()?;

        let mut result = PipelineRunResult::new(&feature.name);
        info!(run_id = %result.run_id, "pipeline run started");
        result.log(
            LogLevel::Info,
            format!("run started for feature '{}'", feature.name),
        );

        if let Err(fault) = self.run_development(feature, &config, &mut result).await {
            error!(error = %fault, "development phase hit a pipeline fault");
            result.fail(fault.to_string());
            return Ok(self.finalize(result));
        }

        if result.artifacts.is_empty() {
            result.add_warning("no code artifacts were produced, skipping review");
            return Ok(self.finalize(result));
        }

        let stats = self.run_quality_loop(&config, &mut result).await;

        if stats.converged || config.continue_on_warnings {
            let report = render_report(&result, &stats);
            result.add_artifact(Artifact::report("report", report));
        } else {
            result.log(
                LogLevel::Info,
                "report skipped: run did not converge and continue_on_warnings is off",
            );
        }

        Ok(self.finalize(result))
    }

    /// Spawns a role-bound agent wired to the pipeline's gateway, sources
    /// and per-call budgets.
    fn agent(&self, role: AgentRole, config: &PipelineConfig) -> Agent {
        let agent_config = AgentConfig::new()
            .with_retries(config.agent_retries)
            .with_timeout_secs(config.agent_timeout_secs);
        let mut agent = Agent::new(role, self.gateway.clone()).with_config(agent_config);
        for source in &self.sources {
            agent.add_source(source.clone());
        }
        agent
    }

    fn finalize(&self, mut result: PipelineRunResult) -> PipelineRunResult {
        if result.status == RunStatus::Running {
            result.complete();
        }
        info!(
            run_id = %result.run_id,
            status = %result.status,
            stages = result.stages.len(),
            qa_iterations = result.qa_iterations,
            debug_iterations = result.debug_iterations,
            "pipeline run finished"
        );
        self.store.insert(result.clone());
        result
    }
}

/// Renders the final report artifact body.
fn render_report(result: &PipelineRunResult, stats: &QualityStats) -> String {
    let mut lines = vec![
        format!("# Feature report: {}", result.feature_name),
        String::new(),
        "## Stages".to_string(),
    ];
    for stage in &result.stages {
        lines.push(format!(
            "- {} [{}] {}ms",
            stage.stage, stage.status, stage.duration_ms
        ));
    }
    lines.push(String::new());
    lines.push("## Review".to_string());
    lines.push(format!("- QA iterations: {}", result.qa_iterations));
    lines.push(format!("- Debug iterations: {}", result.debug_iterations));
    match result.final_score {
        Some(score) => lines.push(format!("- Final score: {score:.1}/10")),
        None => lines.push("- Final score: no review ran".to_string()),
    }
    lines.push(format!(
        "- Quality bar: {}",
        if stats.converged { "met" } else { "not met" }
    ));
    if !stats.severity_counts.is_empty() {
        lines.push(String::new());
        lines.push("## Findings by severity".to_string());
        for (severity, count) in &stats.severity_counts {
            lines.push(format!("- {severity}: {count}"));
        }
    }
    if !stats.category_counts.is_empty() {
        lines.push(String::new());
        lines.push("## Fixes by category".to_string());
        for (category, count) in &stats.category_counts {
            lines.push(format!("- {category}: {count}"));
        }
    }
    if !result.warnings.is_empty() {
        lines.push(String::new());
        lines.push("## Warnings".to_string());
        for warning in &result.warnings {
            lines.push(format!("- {warning}"));
        }
    }
    lines.join("\n")
}
