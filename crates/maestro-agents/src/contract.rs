//! Input and output contracts for each agent role.
//!
//! Inputs and outputs are closed enums dispatched by role. The executor
//! validates an input before any provider call and decodes every reply into
//! the matching output variant, so downstream code can match exhaustively
//! instead of probing loosely-typed maps.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::role::AgentRole;

/// HTTP methods accepted on backend endpoint inputs.
const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

fn default_frontend_framework() -> String {
    "react".to_string()
}

fn default_styling() -> String {
    "tailwind".to_string()
}

fn default_backend_framework() -> String {
    "node".to_string()
}

fn default_confidence() -> u8 {
    60
}

/// Input for the frontend role: one component of a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontendInput {
    /// Feature description the component belongs to.
    pub feature: String,
    /// Name of the component to generate.
    pub component: String,
    /// Target UI framework.
    #[serde(default = "default_frontend_framework")]
    pub framework: String,
    /// Styling approach.
    #[serde(default = "default_styling")]
    pub styling: String,
}

impl FrontendInput {
    /// Creates an input with the default framework and styling.
    pub fn new(feature: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            feature: feature.into(),
            component: component.into(),
            framework: default_frontend_framework(),
            styling: default_styling(),
        }
    }
}

/// Input for the backend role: one endpoint of a feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendInput {
    /// Feature description the endpoint belongs to.
    pub feature: String,
    /// HTTP method, case-insensitive.
    pub method: String,
    /// Route path, e.g. `/api/tasks`.
    pub route: String,
    /// Target server framework.
    #[serde(default = "default_backend_framework")]
    pub framework: String,
}

impl BackendInput {
    /// Creates an input with the default framework.
    pub fn new(
        feature: impl Into<String>,
        method: impl Into<String>,
        route: impl Into<String>,
    ) -> Self {
        Self {
            feature: feature.into(),
            method: method.into(),
            route: route.into(),
            framework: default_backend_framework(),
        }
    }
}

/// Input for the QA role: code to review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaInput {
    /// The code under review.
    pub code: String,
    /// Optional focus area, e.g. "security".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
}

impl QaInput {
    /// Creates a review input with no particular focus.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            focus: None,
        }
    }
}

/// Input for the debugger role: a failure and the code it refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebuggerInput {
    /// What went wrong, e.g. a QA issue summary or a stack trace.
    pub summary: String,
    /// The code the failure occurred in.
    #[serde(default)]
    pub code: String,
}

impl DebuggerInput {
    /// Creates a debugging input.
    pub fn new(summary: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            code: code.into(),
        }
    }
}

/// Role-dispatched agent input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum AgentInput {
    /// Component generation request.
    Frontend(FrontendInput),
    /// Endpoint generation request.
    Backend(BackendInput),
    /// Code review request.
    Qa(QaInput),
    /// Failure diagnosis request.
    Debugger(DebuggerInput),
}

impl AgentInput {
    /// The role this input is addressed to.
    pub fn role(&self) -> AgentRole {
        match self {
            AgentInput::Frontend(_) => AgentRole::Frontend,
            AgentInput::Backend(_) => AgentRole::Backend,
            AgentInput::Qa(_) => AgentRole::Qa,
            AgentInput::Debugger(_) => AgentRole::Debugger,
        }
    }

    /// Checks the role's contract. Failures are terminal, never retried.
    pub fn validate(&self) -> Result<()> {
        match self {
            AgentInput::Frontend(input) => {
                require(&input.feature, "feature")?;
                require(&input.component, "component")?;
            }
            AgentInput::Backend(input) => {
                require(&input.feature, "feature")?;
                require(&input.route, "route")?;
                let method = input.method.to_uppercase();
                if !HTTP_METHODS.contains(&method.as_str()) {
                    return Err(Error::InvalidInput(format!(
                        "unknown http method '{}'",
                        input.method
                    )));
                }
                if !input.route.starts_with('/') {
                    return Err(Error::InvalidInput(format!(
                        "route '{}' must start with '/'",
                        input.route
                    )));
                }
            }
            AgentInput::Qa(input) => {
                require(&input.code, "code")?;
            }
            AgentInput::Debugger(input) => {
                require(&input.summary, "summary")?;
            }
        }
        Ok(())
    }

    /// Renders the user turn sent to the provider.
    pub fn render(&self) -> String {
        match self {
            AgentInput::Frontend(input) => format!(
                "Feature: {}\nComponent: {}\nFramework: {}\nStyling: {}",
                input.feature, input.component, input.framework, input.styling
            ),
            AgentInput::Backend(input) => format!(
                "Feature: {}\nEndpoint: {} {}\nFramework: {}",
                input.feature,
                input.method.to_uppercase(),
                input.route,
                input.framework
            ),
            AgentInput::Qa(input) => match &input.focus {
                Some(focus) => format!(
                    "Review the following code with a focus on {}:\n\n{}",
                    focus, input.code
                ),
                None => format!("Review the following code:\n\n{}", input.code),
            },
            AgentInput::Debugger(input) => {
                if input.code.is_empty() {
                    format!("Failure summary:\n{}", input.summary)
                } else {
                    format!("Failure summary:\n{}\n\nCode:\n{}", input.summary, input.code)
                }
            }
        }
    }
}

fn require(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(Error::InvalidInput(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

/// Severity scale shared by QA issues and debugger diagnoses.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// Blocks the release.
    Critical,
    /// Must be fixed, does not block other work.
    Major,
    /// Cosmetic or stylistic.
    #[default]
    Minor,
}

impl IssueSeverity {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueSeverity::Critical => "critical",
            IssueSeverity::Major => "major",
            IssueSeverity::Minor => "minor",
        }
    }

    /// Whether this severity should trigger a debugging pass.
    pub fn is_blocking(&self) -> bool {
        matches!(self, IssueSeverity::Critical | IssueSeverity::Major)
    }
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// QA verdict over a body of code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QaVerdict {
    /// The code meets the bar.
    Pass,
    /// The code needs work.
    Fail,
}

impl std::fmt::Display for QaVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QaVerdict::Pass => write!(f, "pass"),
            QaVerdict::Fail => write!(f, "fail"),
        }
    }
}

/// A single finding from a QA review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaIssue {
    /// How bad it is.
    pub severity: IssueSeverity,
    /// Short category, e.g. "error handling".
    #[serde(default)]
    pub category: String,
    /// What is wrong and where.
    pub message: String,
    /// How to fix it.
    #[serde(default)]
    pub recommendation: String,
}

/// Output contract for the QA role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaOutput {
    /// Overall verdict.
    pub overall_status: QaVerdict,
    /// Quality score from 0 to 10.
    pub score: f32,
    /// Individual findings, possibly empty.
    #[serde(default)]
    pub issues: Vec<QaIssue>,
}

impl QaOutput {
    /// Whether the review passed.
    pub fn passed(&self) -> bool {
        self.overall_status == QaVerdict::Pass
    }

    /// Critical and major findings, the ones worth a debugging pass.
    pub fn blocking_issues(&self) -> Vec<&QaIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.severity.is_blocking())
            .collect()
    }
}

/// Bug categories the debugger classifies failures into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BugCategory {
    /// Wrong or missing types.
    TypeError,
    /// Crashes and unhandled exceptions.
    RuntimeError,
    /// Correct execution, wrong answer.
    LogicError,
    /// Exploitable weaknesses.
    SecurityIssue,
    /// Too slow or too hungry.
    PerformanceIssue,
    /// Mismatches between components.
    IntegrationIssue,
    /// Everything else.
    #[default]
    General,
}

impl BugCategory {
    /// Stable kebab-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            BugCategory::TypeError => "type-error",
            BugCategory::RuntimeError => "runtime-error",
            BugCategory::LogicError => "logic-error",
            BugCategory::SecurityIssue => "security-issue",
            BugCategory::PerformanceIssue => "performance-issue",
            BugCategory::IntegrationIssue => "integration-issue",
            BugCategory::General => "general",
        }
    }
}

impl std::fmt::Display for BugCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A concrete fix proposed by the debugger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedFix {
    /// What the fix does.
    pub description: String,
    /// Code or diff implementing it, possibly empty.
    #[serde(default)]
    pub patch: String,
    /// What changes when applied.
    #[serde(default)]
    pub impact: String,
    /// Confidence from 0 to 100.
    #[serde(default = "default_confidence")]
    pub confidence: u8,
}

/// Output contract for the debugger role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebuggerOutput {
    /// Root cause analysis.
    pub diagnosis: String,
    /// How bad the underlying bug is.
    #[serde(default)]
    pub severity: IssueSeverity,
    /// What kind of bug it is.
    #[serde(default)]
    pub category: BugCategory,
    /// Proposed fixes, possibly empty.
    #[serde(default)]
    pub fixes: Vec<ProposedFix>,
}

/// Output contract for the code-producing roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedCode {
    /// The generated source.
    pub code: String,
    /// Language tag, e.g. "tsx".
    #[serde(default)]
    pub language: String,
    /// Implementation notes, possibly empty.
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Role-dispatched agent output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AgentOutput {
    /// Component source from the frontend role.
    Frontend(GeneratedCode),
    /// Endpoint source from the backend role.
    Backend(GeneratedCode),
    /// Review findings from the QA role.
    Qa(QaOutput),
    /// Diagnosis and fixes from the debugger role.
    Debugger(DebuggerOutput),
}

impl AgentOutput {
    /// The role that produced this output.
    pub fn role(&self) -> AgentRole {
        match self {
            AgentOutput::Frontend(_) => AgentRole::Frontend,
            AgentOutput::Backend(_) => AgentRole::Backend,
            AgentOutput::Qa(_) => AgentRole::Qa,
            AgentOutput::Debugger(_) => AgentRole::Debugger,
        }
    }

    /// The generated code, if this is a code-producing output.
    pub fn as_code(&self) -> Option<&GeneratedCode> {
        match self {
            AgentOutput::Frontend(code) | AgentOutput::Backend(code) => Some(code),
            _ => None,
        }
    }

    /// The QA review, if this is a QA output.
    pub fn as_qa(&self) -> Option<&QaOutput> {
        match self {
            AgentOutput::Qa(output) => Some(output),
            _ => None,
        }
    }

    /// The debugger diagnosis, if this is a debugger output.
    pub fn as_debugger(&self) -> Option<&DebuggerOutput> {
        match self {
            AgentOutput::Debugger(output) => Some(output),
            _ => None,
        }
    }

    /// Plain-text rendering, used when one agent's result feeds another's
    /// context.
    pub fn summary(&self) -> String {
        match self {
            AgentOutput::Frontend(code) | AgentOutput::Backend(code) => code.code.clone(),
            AgentOutput::Qa(output) => {
                let mut text = format!(
                    "QA verdict: {} (score {:.1}/10)",
                    output.overall_status, output.score
                );
                for issue in &output.issues {
                    text.push_str(&format!(
                        "\n- [{}] {}: {}",
                        issue.severity, issue.category, issue.message
                    ));
                }
                text
            }
            AgentOutput::Debugger(output) => {
                let mut text = format!(
                    "Diagnosis ({}, {}): {}",
                    output.severity, output.category, output.diagnosis
                );
                for fix in &output.fixes {
                    text.push_str(&format!("\n- fix: {}", fix.description));
                }
                text
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frontend_input_validates_required_fields() {
        let input = AgentInput::Frontend(FrontendInput::new("task board", "TaskCard"));
        assert!(input.validate().is_ok());

        let empty = AgentInput::Frontend(FrontendInput::new("", "TaskCard"));
        let err = empty.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(err.to_string().contains("feature"));
    }

    #[test]
    fn test_backend_input_rejects_unknown_method() {
        let input = AgentInput::Backend(BackendInput::new("task board", "FETCH", "/api/tasks"));
        assert!(input.validate().is_err());

        let lowercase = AgentInput::Backend(BackendInput::new("task board", "post", "/api/tasks"));
        assert!(lowercase.validate().is_ok());
    }

    #[test]
    fn test_backend_input_rejects_relative_route() {
        let input = AgentInput::Backend(BackendInput::new("task board", "GET", "api/tasks"));
        let err = input.validate().unwrap_err();
        assert!(err.to_string().contains("start with"));
    }

    #[test]
    fn test_render_uppercases_method() {
        let input = AgentInput::Backend(BackendInput::new("task board", "post", "/api/tasks"));
        assert!(input.render().contains("POST /api/tasks"));
    }

    #[test]
    fn test_input_role_dispatch() {
        assert_eq!(
            AgentInput::Qa(QaInput::new("fn main() {}")).role(),
            AgentRole::Qa
        );
        assert_eq!(
            AgentInput::Debugger(DebuggerInput::new("panic", "")).role(),
            AgentRole::Debugger
        );
    }

    #[test]
    fn test_qa_output_blocking_issues() {
        let output = QaOutput {
            overall_status: QaVerdict::Fail,
            score: 4.0,
            issues: vec![
                QaIssue {
                    severity: IssueSeverity::Critical,
                    category: "security".into(),
                    message: "sql injection".into(),
                    recommendation: "parameterize".into(),
                },
                QaIssue {
                    severity: IssueSeverity::Minor,
                    category: "style".into(),
                    message: "long line".into(),
                    recommendation: String::new(),
                },
            ],
        };
        assert!(!output.passed());
        assert_eq!(output.blocking_issues().len(), 1);
    }

    #[test]
    fn test_severity_orders_critical_first() {
        assert!(IssueSeverity::Critical < IssueSeverity::Major);
        assert!(IssueSeverity::Major < IssueSeverity::Minor);
        assert!(IssueSeverity::Major.is_blocking());
        assert!(!IssueSeverity::Minor.is_blocking());
    }

    #[test]
    fn test_bug_category_serde_uses_kebab_case() {
        let json = serde_json::to_string(&BugCategory::TypeError).unwrap();
        assert_eq!(json, "\"type-error\"");
        let back: BugCategory = serde_json::from_str("\"security-issue\"").unwrap();
        assert_eq!(back, BugCategory::SecurityIssue);
    }

    #[test]
    fn test_output_summary_renders_issues() {
        let output = AgentOutput::Qa(QaOutput {
            overall_status: QaVerdict::Fail,
            score: 3.0,
            issues: vec![QaIssue {
                severity: IssueSeverity::Major,
                category: "logic".into(),
                message: "off by one in pagination".into(),
                recommendation: String::new(),
            }],
        });
        let text = output.summary();
        assert!(text.contains("fail"));
        assert!(text.contains("[major] logic: off by one"));
    }

    #[test]
    fn test_strict_json_decodes_into_qa_output() {
        let json = r#"{"overall_status": "pass", "score": 8, "issues": []}"#;
        let output: QaOutput = serde_json::from_str(json).unwrap();
        assert!(output.passed());
        assert_eq!(output.score, 8.0);
    }
}
