use std::time::Instant;

use maestro_agents::{AgentInput, AgentRole, BackendInput, FrontendInput};
use tracing::{debug, info, warn};

use super::Pipeline;
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::feature::FeatureSpec;
use crate::run::{Artifact, PipelineRunResult, StageResult};

struct UnitOutcome {
    stage: String,
    role: AgentRole,
    run: maestro_agents::Result<maestro_agents::AgentRunResult>,
    elapsed_ms: u64,
}

impl Pipeline {
    /// Development phase: one stage per component and endpoint, components
    /// first. Every stage runs on a fresh agent so sibling histories never
    /// bleed into each other, and a failed stage never aborts its siblings.
    ///
    /// Returns `Err` only for pipeline faults; provider failures become
    /// failure stages plus a warning on the run.
    pub(super) async fn run_development(
        &self,
        feature: &FeatureSpec,
        config: &PipelineConfig,
        result: &mut PipelineRunResult,
    ) -> Result<()> {
        let units = development_units(feature);
        if units.is_empty() {
            debug!("no development units to run");
            return Ok(());
        }

        let parallel =
            config.parallel_execution && feature.frontend.enabled && feature.backend.enabled;
        info!(units = units.len(), parallel, "development phase started");

        let outcomes = if parallel {
            let futures: Vec<_> = units
                .into_iter()
                .map(|(stage, input)| self.run_development_unit(config, stage, input))
                .collect();
            futures::future::join_all(futures).await
        } else {
            let mut outcomes = Vec::with_capacity(units.len());
            for (stage, input) in units {
                outcomes.push(self.run_development_unit(config, stage, input).await);
            }
            outcomes
        };

        for outcome in outcomes {
            match outcome.run {
                Ok(run) => {
                    if let Some(code) = run.output.as_code() {
                        result.add_artifact(Artifact::code(
                            &outcome.stage,
                            &code.language,
                            &code.code,
                        ));
                    }
                    result.record_stage(StageResult::success(&outcome.stage, outcome.role, &run));
                }
                Err(err) if err.is_terminal() => {
                    // The feature was validated up front, so a rejected
                    // input here is a pipeline bug, not a provider hiccup.
                    return Err(Error::Internal(format!(
                        "stage {} rejected its input: {err}",
                        outcome.stage
                    )));
                }
                Err(err) => {
                    warn!(stage = %outcome.stage, error = %err, "development stage failed");
                    result.record_stage(StageResult::failure(
                        &outcome.stage,
                        outcome.role,
                        &err,
                        err.attempts().unwrap_or(0),
                        outcome.elapsed_ms,
                    ));
                    result.add_warning(format!("stage {} failed: {err}", outcome.stage));
                }
            }
        }
        Ok(())
    }

    async fn run_development_unit(
        &self,
        config: &PipelineConfig,
        stage: String,
        input: AgentInput,
    ) -> UnitOutcome {
        let role = input.role();
        let mut agent = self.agent(role, config);
        debug!(stage = %stage, agent_id = %agent.id(), "development stage started");
        let started = Instant::now();
        let run = agent.run(input).await;
        UnitOutcome {
            stage,
            role,
            run,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Stage list for a feature: frontend components first, then backend
/// endpoints, in declaration order.
fn development_units(feature: &FeatureSpec) -> Vec<(String, AgentInput)> {
    let mut units = Vec::new();
    if feature.frontend.enabled {
        for component in &feature.frontend.components {
            let input = FrontendInput {
                feature: feature.description.clone(),
                component: component.clone(),
                framework: feature.frontend.framework.clone(),
                styling: feature.frontend.styling.clone(),
            };
            units.push((format!("frontend:{component}"), AgentInput::Frontend(input)));
        }
    }
    if feature.backend.enabled {
        for endpoint in &feature.backend.endpoints {
            let input = BackendInput {
                feature: feature.description.clone(),
                method: endpoint.method.clone(),
                route: endpoint.route.clone(),
                framework: feature.backend.framework.clone(),
            };
            units.push((
                format!(
                    "backend:{} {}",
                    endpoint.method.to_uppercase(),
                    endpoint.route
                ),
                AgentInput::Backend(input),
            ));
        }
    }
    units
}
