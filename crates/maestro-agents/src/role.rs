//! Agent roles and their fixed system prompts.
//!
//! Roles are a closed set. Adding one means touching the input and output
//! contracts in the same change, so the compiler walks you through every
//! match that needs a new arm.

use serde::{Deserialize, Serialize};

/// System prompt for the frontend developer role.
pub const FRONTEND_SYSTEM_PROMPT: &str = r#"You are a senior frontend developer.

Your job is to produce production-quality user interface code from a feature
description. Follow these rules:

- Generate complete React/Next.js components in TypeScript.
- Style with Tailwind CSS utility classes and keep layouts responsive.
- Use semantic HTML and ARIA attributes so the result is accessible.
- Prefer small, composable components and avoid unnecessary re-renders.

Reply with a single JSON object inside a ```json fence:

{
  "code": "<the full component source>",
  "language": "tsx",
  "notes": ["<short implementation note>", "..."]
}
"#;

/// System prompt for the backend developer role.
pub const BACKEND_SYSTEM_PROMPT: &str = r#"You are a senior backend developer.

Your job is to implement a single API endpoint from a feature description.
Follow these rules:

- Produce a complete, runnable handler including request validation.
- Design clear request/response schemas and document status codes.
- Apply authentication and authorization checks where the feature needs them.
- Handle errors explicitly; never swallow failures.
- Follow security best practices (input sanitization, no secrets in code).

Reply with a single JSON object inside a ```json fence:

{
  "code": "<the full handler source>",
  "language": "ts",
  "notes": ["<short implementation note>", "..."]
}
"#;

/// System prompt for the QA reviewer role.
pub const QA_SYSTEM_PROMPT: &str = r#"You are a meticulous QA engineer.

You receive source code and review it end to end:

- Find bugs, unhandled edge cases and security vulnerabilities.
- Judge code quality: naming, structure, error handling, test coverage.
- Classify every finding as critical, major or minor.
- Score the overall quality from 0 (broken) to 10 (ship it).

Reply with a single JSON object inside a ```json fence:

{
  "overall_status": "pass" | "fail",
  "score": <0-10>,
  "issues": [
    {
      "severity": "critical" | "major" | "minor",
      "category": "<short category>",
      "message": "<what is wrong and where>",
      "recommendation": "<how to fix it>"
    }
  ]
}
"#;

/// System prompt for the debugger role.
pub const DEBUGGER_SYSTEM_PROMPT: &str = r#"You are an expert debugging engineer.

You receive a failure summary and the code it refers to:

- Identify the root cause, not just the symptom.
- Propose concrete fixes with patches where possible.
- State the impact of each fix and how confident you are in it.
- Suggest preventive measures and tests that would catch regressions.

Reply with a single JSON object inside a ```json fence:

{
  "diagnosis": "<root cause analysis>",
  "severity": "critical" | "major" | "minor",
  "category": "<bug category>",
  "fixes": [
    {
      "description": "<what the fix does>",
      "patch": "<code or diff>",
      "impact": "<what changes>",
      "confidence": <0-100>
    }
  ]
}
"#;

/// The closed set of agent roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Builds user interface components.
    Frontend,
    /// Implements API endpoints.
    Backend,
    /// Reviews code and scores quality.
    Qa,
    /// Diagnoses failures and proposes fixes.
    Debugger,
}

impl AgentRole {
    /// Stable lowercase name, used in logs and stage labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Frontend => "frontend",
            AgentRole::Backend => "backend",
            AgentRole::Qa => "qa",
            AgentRole::Debugger => "debugger",
        }
    }

    /// The fixed system prompt for this role.
    pub fn system_prompt(&self) -> &'static str {
        match self {
            AgentRole::Frontend => FRONTEND_SYSTEM_PROMPT,
            AgentRole::Backend => BACKEND_SYSTEM_PROMPT,
            AgentRole::Qa => QA_SYSTEM_PROMPT,
            AgentRole::Debugger => DEBUGGER_SYSTEM_PROMPT,
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_names_round_trip_through_serde() {
        for role in [
            AgentRole::Frontend,
            AgentRole::Backend,
            AgentRole::Qa,
            AgentRole::Debugger,
        ] {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{}\"", role.as_str()));
            let back: AgentRole = serde_json::from_str(&json).unwrap();
            assert_eq!(back, role);
        }
    }

    #[test]
    fn test_prompts_pin_the_reply_shape() {
        assert!(AgentRole::Frontend.system_prompt().contains("```json"));
        assert!(AgentRole::Qa.system_prompt().contains("overall_status"));
        assert!(AgentRole::Debugger.system_prompt().contains("diagnosis"));
    }
}
