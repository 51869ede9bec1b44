//! Agent layer for Maestro
//!
//! Role-bound agents that execute against the provider gateway:
//! - [`role`]: the closed role set and its fixed system prompts
//! - [`contract`]: typed input and output contracts per role
//! - [`decode`]: strict JSON decoding with total heuristic recovery
//! - [`context`]: pluggable context sources gathered before each run
//! - [`executor`]: the shared execution template with retries

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod context;
pub mod contract;
pub mod decode;
pub mod error;
pub mod executor;
pub mod role;

pub use context::{
    gather_context, ContextSource, FileSource, GeneratedSource, MemorySource, MemoryStore,
    RemoteSource, StaticSource,
};
pub use contract::{
    AgentInput, AgentOutput, BackendInput, BugCategory, DebuggerInput, DebuggerOutput,
    FrontendInput, GeneratedCode, IssueSeverity, ProposedFix, QaInput, QaIssue, QaOutput,
    QaVerdict,
};
pub use decode::{decode_output, Decoded, DecodePath};
pub use error::{Error, Result};
pub use executor::{Agent, AgentConfig, AgentRunResult, AgentStatus};
pub use role::AgentRole;
