//! Workflow engine runs against a scripted provider.

use std::sync::Arc;

use maestro_agents::{AgentConfig, AgentInput, AgentRole, BackendInput, FrontendInput, QaInput};
use maestro_core::{TaskSpec, WorkflowEngine, WorkflowSpec, WorkflowStatus};
use maestro_llm::{GatewayConfig, MockProvider, ProviderGateway};

const FRONTEND_REPLY: &str = "```json\n{\"code\": \"export const TaskCard = () => <div>task</div>;\", \"language\": \"tsx\", \"notes\": []}\n```";

const BACKEND_REPLY: &str = "```json\n{\"code\": \"app.get('/api/tasks', (req, res) => res.json([]));\", \"language\": \"js\", \"notes\": []}\n```";

const QA_PASS_REPLY: &str =
    "```json\n{\"overall_status\": \"pass\", \"score\": 8, \"issues\": []}\n```";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("maestro_core=debug,maestro_agents=debug")
        .with_test_writer()
        .try_init();
}

fn scripted_gateway(provider: Arc<MockProvider>) -> Arc<ProviderGateway> {
    let config = GatewayConfig::default()
        .with_retry_attempts(1)
        .with_fallback(false);
    let mut gateway = ProviderGateway::new(config);
    gateway.register_instance("mock", provider);
    Arc::new(gateway)
}

fn engine(gateway: Arc<ProviderGateway>) -> WorkflowEngine {
    WorkflowEngine::new(gateway).with_agent_config(AgentConfig::new().with_retries(1))
}

fn frontend_task(id: &str) -> TaskSpec {
    TaskSpec::new(
        id,
        AgentInput::Frontend(FrontendInput::new("a task board", "TaskCard")),
    )
}

fn backend_task(id: &str) -> TaskSpec {
    TaskSpec::new(
        id,
        AgentInput::Backend(BackendInput::new("a task board", "GET", "/api/tasks")),
    )
}

fn review_task(id: &str) -> TaskSpec {
    TaskSpec::new(id, AgentInput::Qa(QaInput::new("see attached context")))
}

#[tokio::test]
async fn test_sequential_chain_feeds_outputs_forward() {
    init_tracing();

    let provider = Arc::new(MockProvider::new("mock"));
    provider.queue_response(FRONTEND_REPLY);
    provider.queue_response(QA_PASS_REPLY);

    let spec = WorkflowSpec::sequential("card-then-review")
        .with_task(frontend_task("card"))
        .with_task(review_task("review"));

    let outcome = engine(scripted_gateway(provider.clone()))
        .execute(&spec)
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Completed);
    assert_eq!(outcome.task_results.len(), 2);
    assert!(outcome.task_results.iter().all(|result| result.succeeded()));

    let review = &outcome.task_results[1];
    assert_eq!(review.role, AgentRole::Qa);
    assert!(review.output.as_ref().unwrap().as_qa().unwrap().passed());

    // The review agent saw the card task's code in its context block.
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    let review_turn = &requests[1].messages.last().unwrap().content;
    assert!(review_turn.contains("[previous tasks]"));
    assert!(review_turn.contains("[card]\nexport const TaskCard"));
    assert!(review_turn.contains("Review the following code:"));
}

#[tokio::test]
async fn test_sequential_stops_at_the_first_failed_build_task() {
    let provider = Arc::new(MockProvider::new("mock"));
    provider.queue_error(maestro_llm::Error::RateLimit);
    provider.queue_response(BACKEND_REPLY);

    let spec = WorkflowSpec::sequential("build")
        .with_task(frontend_task("card"))
        .with_task(backend_task("api"));

    let outcome = engine(scripted_gateway(provider.clone()))
        .execute(&spec)
        .await
        .unwrap();

    // The second task never ran and is absent from the results.
    assert_eq!(outcome.status, WorkflowStatus::Failed);
    assert_eq!(outcome.task_results.len(), 1);
    let failed = &outcome.task_results[0];
    assert_eq!(failed.task_id, "card");
    assert!(!failed.succeeded());
    assert!(failed.error.is_some());
    assert_eq!(failed.attempts, 1);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_sequential_continues_past_a_failed_review() {
    let provider = Arc::new(MockProvider::new("mock"));
    provider.queue_response(FRONTEND_REPLY);
    provider.queue_error(maestro_llm::Error::RateLimit);
    provider.queue_response(BACKEND_REPLY);

    let spec = WorkflowSpec::sequential("build-with-review")
        .with_task(frontend_task("card"))
        .with_task(review_task("review"))
        .with_task(backend_task("api"));

    let outcome = engine(scripted_gateway(provider.clone()))
        .execute(&spec)
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Partial);
    assert_eq!(outcome.task_results.len(), 3);
    assert!(outcome.task_results[0].succeeded());
    assert!(!outcome.task_results[1].succeeded());
    assert!(outcome.task_results[2].succeeded());
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn test_parallel_tasks_fail_independently() {
    let provider = Arc::new(MockProvider::new("mock"));
    // One of the three concurrent calls hits the error; which one depends
    // on scheduling, so the assertions count outcomes instead of naming them.
    provider.queue_response(FRONTEND_REPLY);
    provider.queue_error(maestro_llm::Error::RateLimit);
    provider.queue_response(FRONTEND_REPLY);

    let spec = WorkflowSpec::parallel("fan-out")
        .with_task(frontend_task("a"))
        .with_task(frontend_task("b"))
        .with_task(frontend_task("c"));

    let outcome = engine(scripted_gateway(provider.clone()))
        .execute(&spec)
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Partial);
    assert_eq!(outcome.task_results.len(), 3);
    let succeeded = outcome
        .task_results
        .iter()
        .filter(|result| result.succeeded())
        .count();
    assert_eq!(succeeded, 2);
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn test_parallel_workflow_completes_when_every_task_passes() {
    let provider = Arc::new(MockProvider::new("mock"));
    provider.queue_response(FRONTEND_REPLY);
    provider.queue_response(FRONTEND_REPLY);

    let spec = WorkflowSpec::parallel("fan-out")
        .with_task(frontend_task("a"))
        .with_task(frontend_task("b"));

    let outcome = engine(scripted_gateway(provider.clone()))
        .execute(&spec)
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Completed);
    let ids: Vec<&str> = outcome
        .task_results
        .iter()
        .map(|result| result.task_id.as_str())
        .collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(provider.calls(), 2);
}

#[tokio::test]
async fn test_graph_chain_runs_dependents_of_a_failed_task() {
    init_tracing();

    let provider = Arc::new(MockProvider::new("mock"));
    // The chain a -> b -> c serializes the calls, so the queue order is
    // deterministic even though the tasks are spawned together.
    provider.queue_error(maestro_llm::Error::RateLimit);
    provider.queue_response(BACKEND_REPLY);
    provider.queue_response(QA_PASS_REPLY);

    let spec = WorkflowSpec::graph("chain")
        .with_task(frontend_task("a"))
        .with_task(backend_task("b").after("a"))
        .with_task(review_task("c").after("b"));

    let outcome = engine(scripted_gateway(provider.clone()))
        .execute(&spec)
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Partial);
    let ids: Vec<&str> = outcome
        .task_results
        .iter()
        .map(|result| result.task_id.as_str())
        .collect();
    assert_eq!(ids, vec!["a", "b", "c"]);

    assert!(!outcome.task_results[0].succeeded());
    let api = outcome.task_results[1].output.as_ref().unwrap();
    assert_eq!(api.as_code().unwrap().language, "js");
    assert!(outcome.task_results[2].succeeded());
    assert_eq!(provider.calls(), 3);

    let requests = provider.requests();
    // b's only dependency failed, so it ran without a context block.
    let api_turn = &requests[1].messages.last().unwrap().content;
    assert!(api_turn.contains("Endpoint: GET /api/tasks"));
    assert!(!api_turn.contains("Context:"));
    // c's dependency succeeded and its code was folded in.
    let review_turn = &requests[2].messages.last().unwrap().content;
    assert!(review_turn.contains("[dependencies]"));
    assert!(review_turn.contains("[b]\napp.get('/api/tasks'"));
}

#[tokio::test]
async fn test_graph_fan_in_waits_for_every_dependency() {
    let provider = Arc::new(MockProvider::new("mock"));
    // base first, then left/right in either order, then the review.
    provider.queue_response(FRONTEND_REPLY);
    provider.queue_response(FRONTEND_REPLY);
    provider.queue_response(FRONTEND_REPLY);
    provider.queue_response(QA_PASS_REPLY);

    let spec = WorkflowSpec::graph("diamond")
        .with_task(frontend_task("base"))
        .with_task(frontend_task("left").after("base"))
        .with_task(frontend_task("right").after("base"))
        .with_task(review_task("review").after("left").after("right"));

    let outcome = engine(scripted_gateway(provider.clone()))
        .execute(&spec)
        .await
        .unwrap();

    assert_eq!(outcome.status, WorkflowStatus::Completed);
    assert_eq!(outcome.task_results.len(), 4);
    assert_eq!(provider.calls(), 4);

    // The review ran last and saw both of its dependencies.
    let requests = provider.requests();
    let review_turn = &requests[3].messages.last().unwrap().content;
    assert!(review_turn.contains("[left]"));
    assert!(review_turn.contains("[right]"));
    assert!(!review_turn.contains("[base]"));
}
