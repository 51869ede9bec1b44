//! Feature specifications
//!
//! A `FeatureSpec` is the unit of work a pipeline run builds: a described
//! feature, the frontend components and backend endpoints it needs, and
//! optional per-feature overrides of the quality gates. Validation happens
//! once, before the run starts; unit inputs are checked against the same
//! contracts the agents enforce so a bad endpoint is rejected up front
//! instead of mid-run.

use maestro_agents::{AgentInput, BackendInput, FrontendInput};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_true() -> bool {
    true
}

fn default_frontend_framework() -> String {
    "react".to_string()
}

fn default_styling() -> String {
    "tailwind".to_string()
}

fn default_backend_framework() -> String {
    "node".to_string()
}

/// One HTTP endpoint the backend role should produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSpec {
    /// HTTP method, case-insensitive.
    pub method: String,
    /// Route path, e.g. `/api/tasks`.
    pub route: String,
}

impl EndpointSpec {
    /// Creates an endpoint spec.
    pub fn new(method: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            route: route.into(),
        }
    }
}

/// Frontend half of a feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendSpec {
    /// Whether the frontend role participates in the run.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Components to generate, one development stage each.
    #[serde(default)]
    pub components: Vec<String>,
    /// Target UI framework.
    #[serde(default = "default_frontend_framework")]
    pub framework: String,
    /// Styling approach.
    #[serde(default = "default_styling")]
    pub styling: String,
}

impl Default for FrontendSpec {
    fn default() -> Self {
        Self {
            enabled: true,
            components: Vec::new(),
            framework: default_frontend_framework(),
            styling: default_styling(),
        }
    }
}

/// Backend half of a feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSpec {
    /// Whether the backend role participates in the run.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Endpoints to generate, one development stage each.
    #[serde(default)]
    pub endpoints: Vec<EndpointSpec>,
    /// Target server framework.
    #[serde(default = "default_backend_framework")]
    pub framework: String,
}

impl Default for BackendSpec {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoints: Vec::new(),
            framework: default_backend_framework(),
        }
    }
}

/// Per-feature overrides of the pipeline quality gates.
///
/// Unset fields fall back to the `PipelineConfig` defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QualityGates {
    /// Review iteration cap override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_qa_iterations: Option<u32>,
    /// Minimum passing score override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,
    /// Whether failed reviews trigger a debugging pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_fix: Option<bool>,
}

/// A feature for the pipeline to build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureSpec {
    /// Short feature name, used in logs and the run record.
    pub name: String,
    /// What the feature does, fed to every generating agent.
    pub description: String,
    /// Frontend work.
    #[serde(default)]
    pub frontend: FrontendSpec,
    /// Backend work.
    #[serde(default)]
    pub backend: BackendSpec,
    /// Quality gate overrides for this feature.
    #[serde(default)]
    pub gates: QualityGates,
}

impl FeatureSpec {
    /// Creates a feature with both roles enabled and no units yet.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            frontend: FrontendSpec::default(),
            backend: BackendSpec::default(),
            gates: QualityGates::default(),
        }
    }

    /// Adds a frontend component.
    #[must_use]
    pub fn with_component(mut self, name: impl Into<String>) -> Self {
        self.frontend.components.push(name.into());
        self
    }

    /// Adds a backend endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, method: impl Into<String>, route: impl Into<String>) -> Self {
        self.backend.endpoints.push(EndpointSpec::new(method, route));
        self
    }

    /// Replaces the quality gate overrides.
    #[must_use]
    pub fn with_gates(mut self, gates: QualityGates) -> Self {
        self.gates = gates;
        self
    }

    /// Disables the frontend role.
    #[must_use]
    pub fn backend_only(mut self) -> Self {
        self.frontend.enabled = false;
        self
    }

    /// Disables the backend role.
    #[must_use]
    pub fn frontend_only(mut self) -> Self {
        self.backend.enabled = false;
        self
    }

    /// Checks the feature before a run starts.
    ///
    /// Each enabled unit is validated against the same contract its agent
    /// would enforce, so `run()` rejects a malformed endpoint instead of
    /// burning a development stage on it.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidFeature("name must not be empty".into()));
        }
        if self.description.trim().is_empty() {
            return Err(Error::InvalidFeature("description must not be empty".into()));
        }
        if !self.frontend.enabled && !self.backend.enabled {
            return Err(Error::InvalidFeature(
                "at least one of frontend and backend must be enabled".into(),
            ));
        }
        if let Some(0) = self.gates.max_qa_iterations {
            return Err(Error::InvalidFeature(
                "max_qa_iterations gate must be at least 1".into(),
            ));
        }
        if let Some(score) = self.gates.min_score {
            if !(0.0..=10.0).contains(&score) {
                return Err(Error::InvalidFeature(format!(
                    "min_score gate must be between 0 and 10, got {score}"
                )));
            }
        }
        if self.frontend.enabled {
            for component in &self.frontend.components {
                AgentInput::Frontend(FrontendInput::new(&self.description, component))
                    .validate()
                    .map_err(|e| Error::InvalidFeature(format!("component '{component}': {e}")))?;
            }
        }
        if self.backend.enabled {
            for endpoint in &self.backend.endpoints {
                AgentInput::Backend(BackendInput::new(
                    &self.description,
                    &endpoint.method,
                    &endpoint.route,
                ))
                .validate()
                .map_err(|e| {
                    Error::InvalidFeature(format!(
                        "endpoint {} {}: {e}",
                        endpoint.method, endpoint.route
                    ))
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_feature_passes() {
        let feature = FeatureSpec::new("task-board", "A kanban task board")
            .with_component("TaskCard")
            .with_endpoint("GET", "/api/tasks");
        assert!(feature.validate().is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let feature = FeatureSpec::new("  ", "A kanban task board");
        let err = feature.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidFeature(_)));
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_empty_description_rejected() {
        let feature = FeatureSpec::new("task-board", "");
        assert!(feature.validate().is_err());
    }

    #[test]
    fn test_both_roles_disabled_rejected() {
        let mut feature = FeatureSpec::new("task-board", "A kanban task board");
        feature.frontend.enabled = false;
        feature.backend.enabled = false;
        let err = feature.validate().unwrap_err();
        assert!(err.to_string().contains("at least one"));
    }

    #[test]
    fn test_gate_bounds_rejected() {
        let zero_cap = FeatureSpec::new("f", "d").with_gates(QualityGates {
            max_qa_iterations: Some(0),
            ..Default::default()
        });
        assert!(zero_cap.validate().is_err());

        let wild_score = FeatureSpec::new("f", "d").with_gates(QualityGates {
            min_score: Some(42.0),
            ..Default::default()
        });
        assert!(wild_score.validate().is_err());
    }

    #[test]
    fn test_bad_endpoint_rejected_up_front() {
        let feature =
            FeatureSpec::new("task-board", "A kanban task board").with_endpoint("TELEPORT", "/api/tasks");
        let err = feature.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidFeature(_)));
        assert!(err.to_string().contains("TELEPORT"));
    }

    #[test]
    fn test_disabled_role_units_are_not_checked() {
        let mut feature =
            FeatureSpec::new("api", "A task api").with_endpoint("TELEPORT", "/api/tasks");
        feature.backend.enabled = false;
        // The bad endpoint sits on a disabled role, so it never runs.
        assert!(feature.validate().is_ok());
    }

    #[test]
    fn test_serde_defaults_fill_missing_sections() {
        let feature: FeatureSpec =
            serde_json::from_str(r#"{"name": "n", "description": "d"}"#).unwrap();
        assert!(feature.frontend.enabled);
        assert!(feature.backend.enabled);
        assert_eq!(feature.frontend.framework, "react");
        assert_eq!(feature.backend.framework, "node");
        assert!(feature.gates.max_qa_iterations.is_none());
    }
}
