use maestro_llm::{
    CompletionRequest, Error, GatewayConfig, LlmProvider, Message, MockProvider, ProviderGateway,
    SelectionPolicy,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn fast_config() -> GatewayConfig {
    GatewayConfig::default()
        .with_retry_attempts(3)
        .with_backoff_base(Duration::from_millis(1))
        .with_request_timeout(Duration::from_secs(5))
}

fn request() -> CompletionRequest {
    CompletionRequest::new("").with_message(Message::user("generate something"))
}

#[tokio::test]
async fn test_execute_uses_selected_backend() {
    let mut gateway = ProviderGateway::new(fast_config());
    let primary = Arc::new(MockProvider::new("primary"));
    primary.queue_response("from primary");
    gateway.register_instance("primary", primary.clone());

    let response = gateway.execute(request()).await.unwrap();
    assert_eq!(response.content, "from primary");
    assert_eq!(primary.calls(), 1);
}

#[tokio::test]
async fn test_retry_then_success_on_same_backend() {
    let mut gateway = ProviderGateway::new(fast_config());
    let flaky = Arc::new(MockProvider::new("flaky"));
    flaky.queue_error(Error::Network("connection reset".into()));
    flaky.queue_error(Error::RateLimit);
    flaky.queue_response("third time lucky");
    gateway.register_instance("flaky", flaky.clone());

    let response = gateway.execute(request()).await.unwrap();
    assert_eq!(response.content, "third time lucky");
    assert_eq!(flaky.calls(), 3);
}

#[tokio::test]
async fn test_fallback_to_secondary_skips_third() {
    let config = fast_config().with_retry_attempts(2);
    let mut gateway = ProviderGateway::new(config);

    let primary = Arc::new(MockProvider::new("primary"));
    primary.queue_error(Error::Network("down".into()));
    primary.queue_error(Error::Network("still down".into()));

    let secondary = Arc::new(MockProvider::new("secondary"));
    secondary.queue_response("secondary wins");

    let third = Arc::new(MockProvider::new("third"));

    gateway.register_instance("primary", primary.clone());
    gateway.register_instance("secondary", secondary.clone());
    gateway.register_instance("third", third.clone());

    let response = gateway.execute(request()).await.unwrap();

    assert_eq!(response.content, "secondary wins");
    assert_eq!(primary.calls(), 2);
    assert_eq!(secondary.calls(), 1);
    // Second backend succeeded, third is never touched
    assert_eq!(third.calls(), 0);
}

#[tokio::test]
async fn test_all_backends_exhausted() {
    let config = fast_config().with_retry_attempts(2);
    let mut gateway = ProviderGateway::new(config);

    for id in ["a", "b"] {
        let provider = Arc::new(MockProvider::new(id));
        provider.queue_error(Error::Network("down".into()));
        provider.queue_error(Error::Network("down".into()));
        gateway.register_instance(id, provider);
    }

    let result = gateway.execute(request()).await;
    match result {
        Err(Error::Exhausted { attempts, last }) => {
            assert_eq!(attempts, 4);
            assert!(matches!(*last, Error::Network(_)));
        }
        other => panic!("expected exhausted error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_fallback_disabled_fails_after_primary() {
    let config = fast_config().with_retry_attempts(2).with_fallback(false);
    let mut gateway = ProviderGateway::new(config);

    let primary = Arc::new(MockProvider::new("primary"));
    primary.queue_error(Error::Network("down".into()));
    primary.queue_error(Error::Network("down".into()));
    let secondary = Arc::new(MockProvider::new("secondary"));

    gateway.register_instance("primary", primary);
    gateway.register_instance("secondary", secondary.clone());

    let result = gateway.execute(request()).await;
    assert!(matches!(result, Err(Error::Exhausted { attempts: 2, .. })));
    assert_eq!(secondary.calls(), 0);
}

#[tokio::test]
async fn test_non_retryable_error_fails_fast_to_fallback() {
    let config = fast_config().with_retry_attempts(3);
    let mut gateway = ProviderGateway::new(config);

    let broken = Arc::new(MockProvider::new("broken"));
    broken.queue_error(Error::InvalidResponse("garbage".into()));
    let healthy = Arc::new(MockProvider::new("healthy"));
    healthy.queue_response("recovered");

    gateway.register_instance("broken", broken.clone());
    gateway.register_instance("healthy", healthy.clone());

    let response = gateway.execute(request()).await.unwrap();
    assert_eq!(response.content, "recovered");
    // Non-retryable: a single attempt on the broken backend
    assert_eq!(broken.calls(), 1);
}

#[tokio::test]
async fn test_round_robin_spreads_calls() {
    let mut gateway = ProviderGateway::new(fast_config());
    let a = Arc::new(MockProvider::new("a"));
    let b = Arc::new(MockProvider::new("b"));
    gateway.register_instance("a", a.clone());
    gateway.register_instance("b", b.clone());

    for _ in 0..4 {
        gateway.execute(request()).await.unwrap();
    }

    assert_eq!(a.calls(), 2);
    assert_eq!(b.calls(), 2);
}

#[tokio::test]
async fn test_fixed_policy_pins_backend() {
    let config = fast_config()
        .with_policy(SelectionPolicy::Fixed)
        .with_default_provider("b");
    let mut gateway = ProviderGateway::new(config);
    let a = Arc::new(MockProvider::new("a"));
    let b = Arc::new(MockProvider::new("b"));
    gateway.register_instance("a", a.clone());
    gateway.register_instance("b", b.clone());

    for _ in 0..3 {
        gateway.execute(request()).await.unwrap();
    }

    assert_eq!(a.calls(), 0);
    assert_eq!(b.calls(), 3);
}

#[tokio::test]
async fn test_lazy_construction_once_per_backend() {
    let mut gateway = ProviderGateway::new(fast_config());
    let constructions = Arc::new(AtomicUsize::new(0));
    let counter = constructions.clone();

    gateway.register("lazy", move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockProvider::new("lazy")) as Arc<dyn LlmProvider>)
    });

    assert_eq!(constructions.load(Ordering::SeqCst), 0);

    let gateway = Arc::new(gateway);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let gw = gateway.clone();
        handles.push(tokio::spawn(async move { gw.execute(request()).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Concurrent first use may build a spare copy, never more
    assert!(constructions.load(Ordering::SeqCst) <= 2);
    gateway.execute(request()).await.unwrap();
    assert!(constructions.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_factory_failure_falls_back() {
    let mut gateway = ProviderGateway::new(fast_config());
    gateway.register("unconfigured", || {
        Err(Error::NotConfigured("MISSING_API_KEY".into()))
    });
    let healthy = Arc::new(MockProvider::new("healthy"));
    healthy.queue_response("built fine");
    gateway.register_instance("healthy", healthy);

    let response = gateway.execute(request()).await.unwrap();
    assert_eq!(response.content, "built fine");
}

#[tokio::test]
async fn test_execute_with_targets_specific_backend() {
    let mut gateway = ProviderGateway::new(fast_config());
    let a = Arc::new(MockProvider::new("a"));
    let b = Arc::new(MockProvider::new("b"));
    b.queue_response("direct");
    gateway.register_instance("a", a.clone());
    gateway.register_instance("b", b.clone());

    let response = gateway.execute_with("b", request()).await.unwrap();
    assert_eq!(response.content, "direct");
    assert_eq!(a.calls(), 0);
}
