//! Run records
//!
//! Everything a finished pipeline run leaves behind: per-stage results,
//! artifacts, ordered log entries, warnings and aggregate counters. The
//! record is built incrementally while the run executes and frozen by
//! `complete` or `fail`.

use chrono::{DateTime, Utc};
use maestro_agents::{AgentRole, AgentRunResult};
use maestro_llm::TokenUsage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// The run is still executing.
    Running,
    /// The run finished; warnings may be attached.
    Completed,
    /// The orchestrator hit a fault it could not work around.
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Outcome of a single pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// The agent ran and its output met the stage's bar.
    Success,
    /// The agent ran but the output fell short, e.g. a failed review.
    Warning,
    /// The agent call itself failed.
    Failure,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StageStatus::Success => "success",
            StageStatus::Warning => "warning",
            StageStatus::Failure => "failure",
        };
        write!(f, "{name}")
    }
}

/// Record of one pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage name, e.g. `frontend:TaskCard` or `qa:2`.
    pub stage: String,
    /// Role that executed the stage.
    pub role: AgentRole,
    /// How the stage ended.
    pub status: StageStatus,
    /// Decoded agent output, absent when the call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// Error text when the call failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Gateway calls made for this stage.
    pub attempts: u32,
    /// Token usage of the stage, zero when the call failed.
    pub usage: TokenUsage,
    /// Stage duration in milliseconds.
    pub duration_ms: u64,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// When the stage finished.
    pub completed_at: DateTime<Utc>,
}

fn stage_window(duration_ms: u64) -> (DateTime<Utc>, DateTime<Utc>) {
    let completed = Utc::now();
    let started = completed - chrono::Duration::milliseconds(duration_ms as i64);
    (started, completed)
}

impl StageResult {
    fn from_run(stage: String, role: AgentRole, status: StageStatus, run: &AgentRunResult) -> Self {
        let (started_at, completed_at) = stage_window(run.duration_ms);
        Self {
            stage,
            role,
            status,
            output: serde_json::to_value(&run.output).ok(),
            error: None,
            attempts: run.attempts,
            usage: run.usage,
            duration_ms: run.duration_ms,
            started_at,
            completed_at,
        }
    }

    /// Records a stage whose output met the bar.
    #[must_use]
    pub fn success(stage: impl Into<String>, role: AgentRole, run: &AgentRunResult) -> Self {
        Self::from_run(stage.into(), role, StageStatus::Success, run)
    }

    /// Records a stage that ran but fell short, e.g. a failed review.
    #[must_use]
    pub fn warning(stage: impl Into<String>, role: AgentRole, run: &AgentRunResult) -> Self {
        Self::from_run(stage.into(), role, StageStatus::Warning, run)
    }

    /// Records a stage whose agent call failed.
    #[must_use]
    pub fn failure(
        stage: impl Into<String>,
        role: AgentRole,
        error: impl std::fmt::Display,
        attempts: u32,
        duration_ms: u64,
    ) -> Self {
        let (started_at, completed_at) = stage_window(duration_ms);
        Self {
            stage: stage.into(),
            role,
            status: StageStatus::Failure,
            output: None,
            error: Some(error.to_string()),
            attempts,
            usage: TokenUsage::default(),
            duration_ms,
            started_at,
            completed_at,
        }
    }
}

/// Kind of artifact a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Generated source from a development stage.
    Code,
    /// A patch proposed by the debugger.
    Fix,
    /// The final run report.
    Report,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ArtifactKind::Code => "code",
            ArtifactKind::Fix => "fix",
            ArtifactKind::Report => "report",
        };
        write!(f, "{name}")
    }
}

/// An artifact produced during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Artifact id.
    pub id: Uuid,
    /// What kind of artifact this is.
    pub kind: ArtifactKind,
    /// Stage that produced it.
    pub stage: String,
    /// Language tag for code artifacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Suggested file path, when one applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Artifact body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// When the artifact was produced.
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    fn new(kind: ArtifactKind, stage: String, language: Option<String>, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            stage,
            language,
            path: None,
            content: Some(content),
            created_at: Utc::now(),
        }
    }

    /// Code produced by a development stage.
    #[must_use]
    pub fn code(
        stage: impl Into<String>,
        language: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(
            ArtifactKind::Code,
            stage.into(),
            Some(language.into()),
            content.into(),
        )
    }

    /// A patch proposed by a debugging stage.
    #[must_use]
    pub fn fix(stage: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(ArtifactKind::Fix, stage.into(), None, content.into())
    }

    /// The final run report.
    #[must_use]
    pub fn report(stage: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(ArtifactKind::Report, stage.into(), None, content.into())
    }

    /// Attaches a suggested file path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Severity of a run log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Normal progress.
    Info,
    /// Something fell short but the run went on.
    Warn,
    /// The run failed.
    Error,
}

/// One entry of the run's ordered log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was written.
    pub at: DateTime<Utc>,
    /// Entry severity.
    pub level: LogLevel,
    /// What happened.
    pub message: String,
}

/// Aggregate counters over a run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Stages that met their bar.
    pub stages_succeeded: u32,
    /// Stages that ran but fell short.
    pub stages_warned: u32,
    /// Stages whose agent call failed.
    pub stages_failed: u32,
    /// Token usage across all stages.
    pub usage: TokenUsage,
}

/// The full record of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunResult {
    /// Run id.
    pub run_id: Uuid,
    /// Name of the feature that was built.
    pub feature_name: String,
    /// Final run status.
    pub status: RunStatus,
    /// Per-stage results in execution order.
    pub stages: Vec<StageResult>,
    /// Artifacts in production order.
    pub artifacts: Vec<Artifact>,
    /// Ordered log of the run.
    pub logs: Vec<LogEntry>,
    /// Warnings attached along the way.
    pub warnings: Vec<String>,
    /// Review iterations executed.
    pub qa_iterations: u32,
    /// Debugging passes executed.
    pub debug_iterations: u32,
    /// Score of the last review, if any review ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_score: Option<f32>,
    /// Whether the last review met the quality bar.
    pub qa_passed: bool,
    /// Aggregate counters.
    pub summary: RunSummary,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Total run duration in milliseconds.
    pub duration_ms: u64,
    /// Fault description when the run failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineRunResult {
    /// Starts a fresh run record.
    #[must_use]
    pub fn new(feature_name: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            feature_name: feature_name.into(),
            status: RunStatus::Running,
            stages: Vec::new(),
            artifacts: Vec::new(),
            logs: Vec::new(),
            warnings: Vec::new(),
            qa_iterations: 0,
            debug_iterations: 0,
            final_score: None,
            qa_passed: false,
            summary: RunSummary::default(),
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: 0,
            error: None,
        }
    }

    /// Appends a log entry.
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(LogEntry {
            at: Utc::now(),
            level,
            message: message.into(),
        });
    }

    /// Records a finished stage and folds it into the counters.
    pub fn record_stage(&mut self, stage: StageResult) {
        match stage.status {
            StageStatus::Success => self.summary.stages_succeeded += 1,
            StageStatus::Warning => self.summary.stages_warned += 1,
            StageStatus::Failure => self.summary.stages_failed += 1,
        }
        self.summary.usage.add(&stage.usage);
        self.log(
            match stage.status {
                StageStatus::Failure => LogLevel::Warn,
                _ => LogLevel::Info,
            },
            format!("stage {} finished: {}", stage.stage, stage.status),
        );
        self.stages.push(stage);
    }

    /// Adds a produced artifact.
    pub fn add_artifact(&mut self, artifact: Artifact) {
        self.log(
            LogLevel::Info,
            format!("artifact produced by {}: {}", artifact.stage, artifact.kind),
        );
        self.artifacts.push(artifact);
    }

    /// Attaches a warning and logs it.
    pub fn add_warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.log(LogLevel::Warn, message.clone());
        self.warnings.push(message);
    }

    /// All code and fix artifact bodies concatenated, in production order.
    ///
    /// This is what each review iteration sees, so fixes from earlier
    /// debugging passes are reviewed together with the original code.
    #[must_use]
    pub fn code_bundle(&self) -> String {
        self.artifacts
            .iter()
            .filter(|artifact| artifact.kind != ArtifactKind::Report)
            .filter_map(|artifact| artifact.content.as_deref())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Finds the result of a named stage.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|stage| stage.stage == name)
    }

    /// Marks the run completed.
    pub fn complete(&mut self) {
        self.status = RunStatus::Completed;
        self.log(LogLevel::Info, "run completed");
        self.finish();
    }

    /// Marks the run failed with an orchestrator-level fault.
    pub fn fail(&mut self, error: impl Into<String>) {
        let error = error.into();
        self.status = RunStatus::Failed;
        self.log(LogLevel::Error, error.clone());
        self.error = Some(error);
        self.finish();
    }

    fn finish(&mut self) {
        let finished = Utc::now();
        self.finished_at = Some(finished);
        self.duration_ms = (finished - self.started_at).num_milliseconds().max(0) as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_agents::{AgentOutput, DecodePath, GeneratedCode};

    fn sample_run(code: &str) -> AgentRunResult {
        AgentRunResult {
            output: AgentOutput::Frontend(GeneratedCode {
                code: code.to_string(),
                language: "tsx".to_string(),
                notes: Vec::new(),
            }),
            path: DecodePath::Strict,
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            attempts: 1,
            duration_ms: 42,
        }
    }

    #[test]
    fn test_record_stage_updates_counters_and_usage() {
        let mut result = PipelineRunResult::new("task-board");
        result.record_stage(StageResult::success(
            "frontend:TaskCard",
            AgentRole::Frontend,
            &sample_run("const a = 1;"),
        ));
        result.record_stage(StageResult::failure(
            "backend:GET /api/tasks",
            AgentRole::Backend,
            "retries exhausted",
            3,
            100,
        ));

        assert_eq!(result.summary.stages_succeeded, 1);
        assert_eq!(result.summary.stages_failed, 1);
        assert_eq!(result.summary.usage.total_tokens, 15);
        assert_eq!(result.stages.len(), 2);
        assert!(result.stages[0].started_at <= result.stages[0].completed_at);
        // Each stage leaves a log entry behind
        assert!(result.logs.iter().any(|entry| entry
            .message
            .contains("frontend:TaskCard finished: success")));
    }

    #[test]
    fn test_code_bundle_skips_reports() {
        let mut result = PipelineRunResult::new("task-board");
        result.add_artifact(Artifact::code("frontend:TaskCard", "tsx", "const a = 1;"));
        result.add_artifact(Artifact::fix("debug:1", "const a = 2;"));
        result.add_artifact(Artifact::report("report", "all good"));

        let bundle = result.code_bundle();
        assert_eq!(bundle, "const a = 1;\n\nconst a = 2;");
    }

    #[test]
    fn test_complete_freezes_the_record() {
        let mut result = PipelineRunResult::new("task-board");
        result.complete();
        assert_eq!(result.status, RunStatus::Completed);
        assert!(result.finished_at.is_some());
        assert!(result.error.is_none());
    }

    #[test]
    fn test_fail_records_the_fault() {
        let mut result = PipelineRunResult::new("task-board");
        result.fail("development input rejected");
        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("development input rejected"));
        assert!(matches!(
            result.logs.last().map(|entry| entry.level),
            Some(LogLevel::Error)
        ));
    }

    #[test]
    fn test_warning_is_logged_and_listed() {
        let mut result = PipelineRunResult::new("task-board");
        result.add_warning("quality bar not met after 3 review iterations");
        assert_eq!(result.warnings.len(), 1);
        assert!(matches!(result.logs[0].level, LogLevel::Warn));
    }

    #[test]
    fn test_stage_lookup_by_name() {
        let mut result = PipelineRunResult::new("task-board");
        result.record_stage(StageResult::success(
            "qa:1",
            AgentRole::Qa,
            &sample_run("x"),
        ));
        assert!(result.stage("qa:1").is_some());
        assert!(result.stage("qa:2").is_none());
    }

    #[test]
    fn test_statuses_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&RunStatus::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(
            serde_json::to_string(&StageStatus::Warning).unwrap(),
            "\"warning\""
        );
        assert_eq!(
            serde_json::to_string(&ArtifactKind::Fix).unwrap(),
            "\"fix\""
        );
    }
}
