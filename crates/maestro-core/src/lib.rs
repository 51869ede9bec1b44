//! Maestro Core - orchestration over role-bound agents
//!
//! This crate drives the Maestro agent runtime:
//! - Pipeline: develop a feature, review it, debug it, report on it
//! - WorkflowEngine: sequential, parallel and dependency-graph task sets
//! - RunStore: concurrent registry of finished run records

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod feature;
pub mod pipeline;
pub mod run;
pub mod store;
pub mod workflow;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use feature::{BackendSpec, EndpointSpec, FeatureSpec, FrontendSpec, QualityGates};
pub use pipeline::Pipeline;
pub use run::{
    Artifact, ArtifactKind, LogEntry, LogLevel, PipelineRunResult, RunStatus, RunSummary,
    StageResult, StageStatus,
};
pub use store::RunStore;
pub use workflow::{
    TaskResult, TaskSpec, WorkflowEngine, WorkflowKind, WorkflowOutcome, WorkflowSpec,
    WorkflowStatus,
};
