use std::collections::BTreeMap;
use std::time::Instant;

use maestro_agents::{AgentInput, AgentRole, DebuggerInput, QaInput, QaOutput};
use tracing::{debug, info, warn};

use super::Pipeline;
use crate::config::PipelineConfig;
use crate::run::{Artifact, LogLevel, PipelineRunResult, StageResult};

/// What the review loop learned, for the final report.
#[derive(Default)]
pub(super) struct QualityStats {
    /// Whether the last review passed at or above the minimum score.
    pub(super) converged: bool,
    /// Review findings per severity, across all iterations.
    pub(super) severity_counts: BTreeMap<&'static str, u32>,
    /// Debugger diagnoses per bug category.
    pub(super) category_counts: BTreeMap<&'static str, u32>,
}

impl Pipeline {
    /// The review loop.
    ///
    /// Each iteration reviews the full code bundle, fixes included, so a
    /// debugging pass is judged together with the code it patched. A fix is
    /// only attempted while another review remains to judge it. The loop
    /// exits on convergence or when a budget runs out; budget exhaustion is
    /// a warning on the run, never a failure.
    pub(super) async fn run_quality_loop(
        &self,
        config: &PipelineConfig,
        result: &mut PipelineRunResult,
    ) -> QualityStats {
        // One agent per role for the whole loop, so a later iteration sees
        // the exchanges that led to it.
        let mut qa_agent = self.agent(AgentRole::Qa, config);
        let mut debug_agent = self.agent(AgentRole::Debugger, config);
        let mut stats = QualityStats::default();

        while result.qa_iterations < config.max_qa_iterations {
            let iteration = result.qa_iterations + 1;
            let stage = format!("qa:{iteration}");
            debug!(stage = %stage, "review iteration started");

            let started = Instant::now();
            let review_run = match qa_agent
                .run(AgentInput::Qa(QaInput::new(result.code_bundle())))
                .await
            {
                Ok(run) => run,
                Err(err) => {
                    warn!(stage = %stage, error = %err, "review unavailable");
                    result.record_stage(StageResult::failure(
                        &stage,
                        AgentRole::Qa,
                        &err,
                        err.attempts().unwrap_or(0),
                        started.elapsed().as_millis() as u64,
                    ));
                    result.add_warning(format!("review unavailable: {err}"));
                    return stats;
                }
            };
            result.qa_iterations = iteration;

            let Some(review) = review_run.output.as_qa().cloned() else {
                result.record_stage(StageResult::failure(
                    &stage,
                    AgentRole::Qa,
                    "review produced a non-review output",
                    review_run.attempts,
                    review_run.duration_ms,
                ));
                result.add_warning("review produced a non-review output");
                return stats;
            };

            for issue in &review.issues {
                *stats
                    .severity_counts
                    .entry(issue.severity.as_str())
                    .or_insert(0) += 1;
            }

            result.final_score = Some(review.score);
            let converged = review.passed() && review.score >= config.min_score;
            result.qa_passed = converged;

            if converged {
                info!(stage = %stage, score = review.score, "review passed");
                result.record_stage(StageResult::success(&stage, AgentRole::Qa, &review_run));
                result.log(
                    LogLevel::Info,
                    format!("review passed with score {:.1}", review.score),
                );
                stats.converged = true;
                return stats;
            }

            info!(
                stage = %stage,
                score = review.score,
                issues = review.issues.len(),
                "review fell short"
            );
            result.record_stage(StageResult::warning(&stage, AgentRole::Qa, &review_run));

            if !config.auto_fix {
                result.add_warning("review fell short and auto_fix is disabled");
                return stats;
            }
            // Last allowed review: a fix made now could never be re-reviewed.
            if result.qa_iterations == config.max_qa_iterations {
                break;
            }
            if result.debug_iterations >= config.max_debug_iterations {
                result.add_warning(format!(
                    "debugging budget of {} passes exhausted",
                    config.max_debug_iterations
                ));
                return stats;
            }
            let Some(summary) = blocking_summary(&review) else {
                result.add_warning(
                    "review fell short with no critical or major findings, nothing to debug",
                );
                return stats;
            };

            let debug_stage = format!("debug:{}", result.debug_iterations + 1);
            let started = Instant::now();
            match debug_agent
                .run(AgentInput::Debugger(DebuggerInput::new(
                    summary,
                    result.code_bundle(),
                )))
                .await
            {
                Ok(run) => {
                    result.debug_iterations += 1;
                    if let Some(diagnosis) = run.output.as_debugger() {
                        *stats
                            .category_counts
                            .entry(diagnosis.category.as_str())
                            .or_insert(0) += 1;
                        for fix in &diagnosis.fixes {
                            if !fix.patch.is_empty() {
                                result.add_artifact(Artifact::fix(&debug_stage, &fix.patch));
                            }
                        }
                    }
                    result.record_stage(StageResult::success(
                        &debug_stage,
                        AgentRole::Debugger,
                        &run,
                    ));
                }
                Err(err) => {
                    warn!(stage = %debug_stage, error = %err, "debugging pass failed");
                    result.record_stage(StageResult::failure(
                        &debug_stage,
                        AgentRole::Debugger,
                        &err,
                        err.attempts().unwrap_or(0),
                        started.elapsed().as_millis() as u64,
                    ));
                    result.add_warning(format!("debugging pass failed: {err}"));
                    return stats;
                }
            }
        }

        result.add_warning(format!(
            "quality bar not met after {} review iterations",
            result.qa_iterations
        ));
        stats
    }
}

/// One line per critical or major finding, `None` when there are none.
fn blocking_summary(review: &QaOutput) -> Option<String> {
    let blocking = review.blocking_issues();
    if blocking.is_empty() {
        return None;
    }
    Some(
        blocking
            .iter()
            .map(|issue| format!("[{}] {}: {}", issue.severity, issue.category, issue.message))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}
