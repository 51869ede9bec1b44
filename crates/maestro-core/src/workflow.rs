//! Generic agent workflows
//!
//! Runs arbitrary task sets over the same role-bound agents the pipeline
//! uses, in one of three shapes:
//!
//! - **Sequential**: declaration order; each task sees the outputs of the
//!   completed tasks before it. A failed task stops the chain unless it was
//!   a review task.
//! - **Parallel**: everything at once; failures never touch siblings.
//! - **Graph**: tasks wait on declared dependencies and see the outputs of
//!   those that succeeded. Dependents of a failed task still run.
//!
//! A spec is validated before anything executes, so cycles, unknown
//! dependencies and malformed inputs are rejected up front.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use futures::future::join_all;
use maestro_agents::{
    Agent, AgentConfig, AgentInput, AgentOutput, AgentRole, ContextSource, StaticSource,
};
use maestro_llm::ProviderGateway;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};

/// Execution shape of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowKind {
    /// Tasks run one after another, feeding forward.
    Sequential,
    /// Tasks run concurrently and independently.
    Parallel,
    /// Tasks run as soon as their dependencies finish.
    Graph,
}

impl std::fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkflowKind::Sequential => "sequential",
            WorkflowKind::Parallel => "parallel",
            WorkflowKind::Graph => "graph",
        };
        write!(f, "{name}")
    }
}

/// One task in a workflow. The input determines the role that runs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Task id, unique within the workflow.
    pub id: String,
    /// Role-dispatched input.
    pub input: AgentInput,
    /// Ids of tasks that must finish first. Graph workflows only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl TaskSpec {
    /// Creates a task with no dependencies.
    pub fn new(id: impl Into<String>, input: AgentInput) -> Self {
        Self {
            id: id.into(),
            input,
            depends_on: Vec::new(),
        }
    }

    /// Adds a dependency on another task.
    #[must_use]
    pub fn after(mut self, task_id: impl Into<String>) -> Self {
        self.depends_on.push(task_id.into());
        self
    }

    /// The role that will run this task.
    #[must_use]
    pub fn role(&self) -> AgentRole {
        self.input.role()
    }
}

/// A workflow to execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
    /// Workflow id, used in logs and the outcome.
    pub id: String,
    /// Execution shape.
    pub kind: WorkflowKind,
    /// Tasks in declaration order.
    pub tasks: Vec<TaskSpec>,
}

impl WorkflowSpec {
    /// Creates an empty workflow of the given kind.
    pub fn new(id: impl Into<String>, kind: WorkflowKind) -> Self {
        Self {
            id: id.into(),
            kind,
            tasks: Vec::new(),
        }
    }

    /// Creates an empty sequential workflow.
    pub fn sequential(id: impl Into<String>) -> Self {
        Self::new(id, WorkflowKind::Sequential)
    }

    /// Creates an empty parallel workflow.
    pub fn parallel(id: impl Into<String>) -> Self {
        Self::new(id, WorkflowKind::Parallel)
    }

    /// Creates an empty graph workflow.
    pub fn graph(id: impl Into<String>) -> Self {
        Self::new(id, WorkflowKind::Graph)
    }

    /// Appends a task.
    #[must_use]
    pub fn with_task(mut self, task: TaskSpec) -> Self {
        self.tasks.push(task);
        self
    }

    /// Checks the workflow before execution.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidWorkflow("workflow id must not be empty".into()));
        }
        if self.tasks.is_empty() {
            return Err(Error::InvalidWorkflow("workflow has no tasks".into()));
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for task in &self.tasks {
            if task.id.trim().is_empty() {
                return Err(Error::InvalidWorkflow("task ids must not be empty".into()));
            }
            if !seen.insert(task.id.as_str()) {
                return Err(Error::InvalidWorkflow(format!(
                    "duplicate task id '{}'",
                    task.id
                )));
            }
            task.input
                .validate()
                .map_err(|e| Error::InvalidWorkflow(format!("task '{}': {e}", task.id)))?;
        }

        for task in &self.tasks {
            for dep in &task.depends_on {
                if self.kind != WorkflowKind::Graph {
                    return Err(Error::InvalidWorkflow(format!(
                        "task '{}' declares dependencies but the workflow kind is {}",
                        task.id, self.kind
                    )));
                }
                if dep == &task.id {
                    return Err(Error::InvalidWorkflow(format!(
                        "task '{}' depends on itself",
                        task.id
                    )));
                }
                if !seen.contains(dep.as_str()) {
                    return Err(Error::InvalidWorkflow(format!(
                        "task '{}' depends on unknown task '{}'",
                        task.id, dep
                    )));
                }
            }
        }

        if self.kind == WorkflowKind::Graph {
            if let Some(cycle) = dependency_cycle(&self.tasks) {
                return Err(Error::InvalidWorkflow(format!(
                    "dependency cycle involving tasks: {}",
                    cycle.join(", ")
                )));
            }
        }
        Ok(())
    }
}

/// Ids that can never start because of a dependency cycle, sorted.
fn dependency_cycle(tasks: &[TaskSpec]) -> Option<Vec<String>> {
    let mut indegree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
    for task in tasks {
        indegree.insert(task.id.as_str(), task.depends_on.len());
        for dep in &task.depends_on {
            dependents.entry(dep.as_str()).or_default().push(task.id.as_str());
        }
    }

    let mut ready: VecDeque<&str> = indegree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    while let Some(id) = ready.pop_front() {
        indegree.remove(id);
        if let Some(children) = dependents.get(id) {
            for child in children {
                if let Some(degree) = indegree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(child);
                    }
                }
            }
        }
    }

    if indegree.is_empty() {
        return None;
    }
    let mut stuck: Vec<String> = indegree.keys().map(|id| id.to_string()).collect();
    stuck.sort();
    Some(stuck)
}

/// Outcome of one workflow task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    /// Task id.
    pub task_id: String,
    /// Role that ran the task.
    pub role: AgentRole,
    /// Decoded output, absent when the task failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<AgentOutput>,
    /// Error text when the task failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Gateway calls made.
    pub attempts: u32,
    /// Task duration in milliseconds.
    pub duration_ms: u64,
}

impl TaskResult {
    /// Whether the task produced an output.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Overall workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    /// Every executed task succeeded.
    Completed,
    /// Some tasks succeeded, some failed or never ran.
    Partial,
    /// No task succeeded.
    Failed,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Partial => "partial",
            WorkflowStatus::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Outcome of a workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    /// Workflow id.
    pub id: String,
    /// Overall status.
    pub status: WorkflowStatus,
    /// Per-task results in declaration order. Tasks skipped by a sequential
    /// break are absent.
    pub task_results: Vec<TaskResult>,
    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl WorkflowOutcome {
    fn conclude(id: String, total_tasks: usize, results: Vec<TaskResult>, duration_ms: u64) -> Self {
        let succeeded = results.iter().filter(|result| result.succeeded()).count();
        let status = if succeeded == 0 {
            WorkflowStatus::Failed
        } else if succeeded == total_tasks {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::Partial
        };
        Self {
            id,
            status,
            task_results: results,
            duration_ms,
        }
    }
}

/// A one-shot completion flag a graph task raises for its dependents.
struct TaskEvent {
    done: AtomicBool,
    notify: Notify,
}

impl TaskEvent {
    fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    fn signal(&self) {
        self.done.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        loop {
            if self.done.load(Ordering::Acquire) {
                return;
            }
            // Register before the re-check so a signal between the check
            // and the await still wakes us.
            notified.as_mut().enable();
            if self.done.load(Ordering::Acquire) {
                return;
            }
            notified.as_mut().await;
            notified.set(self.notify.notified());
        }
    }
}

/// Executes workflow specs over role-bound agents.
pub struct WorkflowEngine {
    gateway: Arc<ProviderGateway>,
    agent_config: AgentConfig,
    sources: Vec<Arc<dyn ContextSource>>,
}

impl WorkflowEngine {
    /// Creates an engine with default agent settings.
    pub fn new(gateway: Arc<ProviderGateway>) -> Self {
        Self {
            gateway,
            agent_config: AgentConfig::default(),
            sources: Vec::new(),
        }
    }

    /// Replaces the agent settings used for every task.
    #[must_use]
    pub fn with_agent_config(mut self, config: AgentConfig) -> Self {
        self.agent_config = config;
        self
    }

    /// Registers a context source for every agent the engine spawns.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn ContextSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Executes a workflow.
    ///
    /// Returns `Err` only when the spec itself is rejected; task failures
    /// land in the outcome.
    #[instrument(skip(self, spec), fields(workflow_id = %spec.id, kind = %spec.kind))]
    pub async fn execute(&self, spec: &WorkflowSpec) -> Result<WorkflowOutcome> {
        spec.validate()?;
        info!(tasks = spec.tasks.len(), "workflow started");

        let started = Instant::now();
        let results = match spec.kind {
            WorkflowKind::Sequential => self.execute_sequential(spec).await,
            WorkflowKind::Parallel => self.execute_parallel(spec).await,
            WorkflowKind::Graph => self.execute_graph(spec).await,
        };

        let outcome = WorkflowOutcome::conclude(
            spec.id.clone(),
            spec.tasks.len(),
            results,
            started.elapsed().as_millis() as u64,
        );
        info!(status = %outcome.status, "workflow finished");
        Ok(outcome)
    }

    async fn execute_sequential(&self, spec: &WorkflowSpec) -> Vec<TaskResult> {
        let mut results: Vec<TaskResult> = Vec::new();
        for task in &spec.tasks {
            let mut agent = self.agent(task.role());
            if let Some(context) = completed_outputs(results.iter()) {
                agent.add_source(Arc::new(StaticSource::new("previous tasks", context)));
            }

            let result = self.run_task(agent, task).await;
            let stop = !result.succeeded() && task.role() != AgentRole::Qa;
            results.push(result);
            // A failed build stops the chain; a failed review does not.
            if stop {
                warn!(task_id = %task.id, "sequential workflow stopped early");
                break;
            }
        }
        results
    }

    async fn execute_parallel(&self, spec: &WorkflowSpec) -> Vec<TaskResult> {
        let futures: Vec<_> = spec
            .tasks
            .iter()
            .map(|task| self.run_task(self.agent(task.role()), task))
            .collect();
        join_all(futures).await
    }

    async fn execute_graph(&self, spec: &WorkflowSpec) -> Vec<TaskResult> {
        let events: HashMap<&str, TaskEvent> = spec
            .tasks
            .iter()
            .map(|task| (task.id.as_str(), TaskEvent::new()))
            .collect();
        let finished: DashMap<String, TaskResult> = DashMap::new();
        let events_ref = &events;
        let finished_ref = &finished;

        let futures: Vec<_> = spec
            .tasks
            .iter()
            .map(|task| async move {
                for dep in &task.depends_on {
                    if let Some(event) = events_ref.get(dep.as_str()) {
                        event.wait().await;
                    }
                }

                let mut agent = self.agent(task.role());
                let guards: Vec<_> = task
                    .depends_on
                    .iter()
                    .filter_map(|dep| finished_ref.get(dep.as_str()))
                    .collect();
                if let Some(context) = completed_outputs(guards.iter().map(|entry| entry.value()))
                {
                    agent.add_source(Arc::new(StaticSource::new("dependencies", context)));
                }
                drop(guards);

                let result = self.run_task(agent, task).await;
                finished_ref.insert(task.id.clone(), result);
                // Dependents wait on completion, not success.
                if let Some(event) = events_ref.get(task.id.as_str()) {
                    event.signal();
                }
            })
            .collect();
        join_all(futures).await;

        spec.tasks
            .iter()
            .filter_map(|task| finished.remove(task.id.as_str()).map(|(_, result)| result))
            .collect()
    }

    async fn run_task(&self, mut agent: Agent, task: &TaskSpec) -> TaskResult {
        debug!(task_id = %task.id, role = %task.role(), "workflow task started");
        let started = Instant::now();
        match agent.run(task.input.clone()).await {
            Ok(run) => TaskResult {
                task_id: task.id.clone(),
                role: task.role(),
                output: Some(run.output),
                error: None,
                attempts: run.attempts,
                duration_ms: run.duration_ms,
            },
            Err(err) => {
                warn!(task_id = %task.id, error = %err, "workflow task failed");
                TaskResult {
                    task_id: task.id.clone(),
                    role: task.role(),
                    output: None,
                    error: Some(err.to_string()),
                    attempts: err.attempts().unwrap_or(0),
                    duration_ms: started.elapsed().as_millis() as u64,
                }
            }
        }
    }

    fn agent(&self, role: AgentRole) -> Agent {
        let mut agent =
            Agent::new(role, self.gateway.clone()).with_config(self.agent_config.clone());
        for source in &self.sources {
            agent.add_source(source.clone());
        }
        agent
    }
}

/// Labelled outputs of the given completed tasks, `None` when empty.
fn completed_outputs<'a>(results: impl Iterator<Item = &'a TaskResult>) -> Option<String> {
    let parts: Vec<String> = results
        .filter(|result| result.succeeded())
        .filter_map(|result| {
            result
                .output
                .as_ref()
                .map(|output| format!("[{}]\n{}", result.task_id, output.summary()))
        })
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}
