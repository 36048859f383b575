//! Pipelines over the real HTTP transport against local mock backends.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use url::Url;

use resilient_call::config::parse_config;
use resilient_call::resilience::{
    AttemptFailure, BreakerPolicy, CircuitState, OutcomeClassifier, Pipeline, PolicyError, RetryPolicy,
};
use resilient_call::transport::HttpTransport;
use resilient_call::{DownstreamRegistry, RequestDescriptor, TransportFault};

mod common;

fn transport(addr: SocketAddr) -> Arc<HttpTransport> {
    Arc::new(HttpTransport::new(
        Url::parse(&format!("http://{}/api/products/", addr)).unwrap(),
    ))
}

fn counting_backend(fail_first: u32, fail_status: u16) -> (Arc<AtomicU32>, impl Fn() -> std::future::Ready<(u16, String)> + Send + Sync + 'static) {
    let calls = Arc::new(AtomicU32::new(0));
    let cc = calls.clone();
    let f = move || {
        let count = cc.fetch_add(1, Ordering::SeqCst);
        if count < fail_first {
            std::future::ready((fail_status, "unavailable".to_string()))
        } else {
            std::future::ready((200, "Success".to_string()))
        }
    };
    (calls, f)
}

#[tokio::test]
async fn test_retry_on_service_unavailable() {
    let backend_addr: SocketAddr = "127.0.0.1:28181".parse().unwrap();
    let (calls, backend) = counting_backend(2, 503);
    common::start_programmable_backend(backend_addr, backend).await;

    let pipeline = Pipeline::builder("products", transport(backend_addr))
        .circuit_breaker(BreakerPolicy::default())
        .retry(RetryPolicy::fixed(3, Duration::from_millis(20)))
        .attempt_timeout(Duration::from_secs(5))
        .build();

    let response = pipeline.execute(&RequestDescriptor::get("1")).await.expect("should succeed after retries");
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "Success");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(pipeline.breaker().unwrap().state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_connection_refused_opens_circuit() {
    // Nothing listens here.
    let dead_addr: SocketAddr = "127.0.0.1:28191".parse().unwrap();

    let pipeline = Pipeline::builder("products", transport(dead_addr))
        .circuit_breaker(BreakerPolicy::Consecutive {
            failure_threshold: 2,
            open_duration: Duration::from_secs(10),
        })
        .build();

    for _ in 0..2 {
        match pipeline.execute(&RequestDescriptor::get("1")).await {
            Err(PolicyError::ExhaustedRetries { last: AttemptFailure::Fault(fault), .. }) => {
                assert!(matches!(fault, TransportFault::Connect(_)), "{fault:?}");
            }
            other => panic!("expected connection failure, got {other:?}"),
        }
    }

    let err = pipeline.execute(&RequestDescriptor::get("1")).await.unwrap_err();
    assert!(matches!(err, PolicyError::BrokenCircuit(_)));
}

#[tokio::test]
async fn test_not_found_retried_only_when_configured() {
    let backend_addr: SocketAddr = "127.0.0.1:28281".parse().unwrap();
    let (calls, backend) = counting_backend(u32::MAX, 404);
    common::start_programmable_backend(backend_addr, backend).await;

    let plain = Pipeline::builder("products", transport(backend_addr))
        .retry(RetryPolicy::fixed(3, Duration::from_millis(10)))
        .build();
    let response = plain.execute(&RequestDescriptor::get("7")).await.unwrap();
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let eventual = Pipeline::builder("products", transport(backend_addr))
        .classifier(OutcomeClassifier::default().with_transient_status(404))
        .retry(RetryPolicy::fixed(3, Duration::from_millis(10)))
        .build();
    match eventual.execute(&RequestDescriptor::get("7")).await {
        Err(PolicyError::ExhaustedRetries { attempts, last: AttemptFailure::Response(r), .. }) => {
            assert_eq!(attempts, 3);
            assert_eq!(r.status, StatusCode::NOT_FOUND);
        }
        other => panic!("expected exhausted retries, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_registry_pipeline_end_to_end() {
    let backend_addr: SocketAddr = "127.0.0.1:28381".parse().unwrap();
    let (calls, backend) = counting_backend(1, 500);
    common::start_programmable_backend(backend_addr, backend).await;

    let config = parse_config(&format!(
        r#"
        [[downstreams]]
        name = "products"
        base_url = "http://{}/api/products/"
        circuit_breaker = {{ kind = "consecutive", failure_threshold = 3 }}
        retry = {{ max_attempts = 2, backoff = {{ kind = "fixed", delay_ms = 10 }} }}
        "#,
        backend_addr
    ))
    .unwrap();

    let registry = DownstreamRegistry::from_config(&config).unwrap();
    let pipeline = registry.get("products").unwrap();

    let response = pipeline.execute(&RequestDescriptor::get("1")).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let snapshot = registry.snapshot();
    assert_eq!(snapshot[0].circuit.as_ref().unwrap().state, CircuitState::Closed);
}

#[tokio::test]
async fn test_registry_observer_sees_transitions() {
    // Nothing listens here.
    let dead_addr: SocketAddr = "127.0.0.1:28391".parse().unwrap();
    let config = parse_config(&format!(
        r#"
        [[downstreams]]
        name = "reviews"
        base_url = "http://{}/"
        circuit_breaker = {{ kind = "consecutive", failure_threshold = 1 }}
        retry = {{ enabled = false }}
        "#,
        dead_addr
    ))
    .unwrap();

    let observer = Arc::new(common::RecordingObserver::default());
    let registry = DownstreamRegistry::from_config_with_observer(&config, Some(observer.clone())).unwrap();
    let pipeline = registry.get("reviews").unwrap();

    assert!(pipeline.execute(&RequestDescriptor::get("1")).await.is_err());
    let err = pipeline.execute(&RequestDescriptor::get("1")).await.unwrap_err();
    assert!(err.is_unavailable());

    let events = observer.events();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], common::Event::Opened(CircuitState::Closed, _)));
}
