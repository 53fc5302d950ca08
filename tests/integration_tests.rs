use attempt_guard::{
    config::{load_config_from_yaml, ServiceConfig},
    format_retry_message,
    http::{router, AppState},
    limiter::{AttemptDecision, LimiterSettings, RateLimiter},
    metrics::Metrics,
    service::RateLimitService,
    store::{AttemptStore, MemoryStore},
    utils::ManualClock,
};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use std::{sync::Arc, time::Duration};
use tower::ServiceExt;

const START: i64 = 1_700_000_000_000;

fn minute_limiter(store: Arc<MemoryStore>, clock: Arc<ManualClock>) -> RateLimiter {
    let settings = LimiterSettings::new(3, Duration::from_millis(60_000), "test_rate_limiter").unwrap();
    RateLimiter::new(settings, store, clock)
}

fn create_app() -> (Router, Arc<MemoryStore>, Arc<ManualClock>) {
    let store = Arc::new(MemoryStore::default());
    let clock = Arc::new(ManualClock::new(START));
    let service = RateLimitService::from_config(
        &ServiceConfig::default(),
        store.clone(),
        clock.clone(),
        Arc::new(Metrics::new().unwrap()),
    )
    .unwrap();

    let app = router(AppState {
        service: Arc::new(service),
    });
    (app, store, clock)
}

async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, Option<String>, serde_json::Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };

    (status, retry_after, body)
}

#[tokio::test]
async fn test_lockout_then_recovery() {
    let store = Arc::new(MemoryStore::default());
    let clock = Arc::new(ManualClock::new(START));
    let limiter = minute_limiter(store, clock.clone());

    assert_eq!(
        limiter.can_attempt().await,
        AttemptDecision::Allowed { remaining_attempts: 2 }
    );
    for _ in 0..3 {
        limiter.record_attempt().await;
    }
    assert_eq!(
        limiter.can_attempt().await,
        AttemptDecision::Blocked { retry_after_secs: 60 }
    );

    clock.advance(Duration::from_millis(61_000));
    assert_eq!(
        limiter.can_attempt().await,
        AttemptDecision::Allowed { remaining_attempts: 2 }
    );
}

#[tokio::test]
async fn test_full_cycle_repeats() {
    let store = Arc::new(MemoryStore::default());
    let clock = Arc::new(ManualClock::new(START));
    let limiter = minute_limiter(store, clock.clone());

    for _ in 0..3 {
        for _ in 0..3 {
            assert!(limiter.can_attempt().await.is_allowed());
            limiter.record_attempt().await;
        }
        let decision = limiter.can_attempt().await;
        assert!(!decision.is_allowed());
        assert!(format_retry_message(decision.retry_after_secs().unwrap()).contains("1 minuto "));

        clock.advance(Duration::from_secs(60));
    }
}

#[tokio::test]
async fn test_garbage_under_key_is_harmless() {
    let store = Arc::new(MemoryStore::default());
    let clock = Arc::new(ManualClock::new(START));
    let limiter = minute_limiter(store.clone(), clock);

    store.write("test_rate_limiter", "\u{0}\u{1}garbage").await.unwrap();
    assert_eq!(
        limiter.can_attempt().await,
        AttemptDecision::Allowed { remaining_attempts: 2 }
    );
}

#[tokio::test]
async fn test_http_order_lockout() {
    let (app, _, _) = create_app();

    let (status, _, body) = send(&app, Method::GET, "/limits/orders?subject=10.0.0.7").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);
    assert_eq!(body["decision"], "allowed");
    assert_eq!(body["remaining_attempts"], 2);

    for _ in 0..3 {
        let (status, _, _) = send(&app, Method::POST, "/limits/orders/attempts?subject=10.0.0.7").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    let (status, retry_after, body) = send(&app, Method::GET, "/limits/orders?subject=10.0.0.7").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(retry_after.as_deref(), Some("3600"));
    assert_eq!(body["allowed"], false);
    assert_eq!(body["retry_after_secs"], 3_600);
    assert!(body["message"].as_str().unwrap().contains("1 hora "));

    // Another subject is unaffected
    let (status, _, _) = send(&app, Method::GET, "/limits/orders?subject=10.0.0.8").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_http_clear_unblocks() {
    let (app, _, _) = create_app();

    for _ in 0..5 {
        send(&app, Method::POST, "/limits/contact/attempts").await;
    }
    let (status, _, _) = send(&app, Method::GET, "/limits/contact").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (status, _, _) = send(&app, Method::DELETE, "/limits/contact").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _, body) = send(&app, Method::GET, "/limits/contact").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["remaining_attempts"], 4);
}

#[tokio::test]
async fn test_http_lockout_expires() {
    let (app, _, clock) = create_app();

    for _ in 0..3 {
        send(&app, Method::POST, "/limits/orders/attempts").await;
    }
    let (status, _, _) = send(&app, Method::GET, "/limits/orders").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    clock.advance(Duration::from_secs(30 * 60));
    let (_, retry_after, body) = send(&app, Method::GET, "/limits/orders").await;
    assert_eq!(retry_after.as_deref(), Some("1800"));
    assert!(body["message"].as_str().unwrap().contains("30 minutos"));

    clock.advance(Duration::from_secs(30 * 60));
    let (status, _, _) = send(&app, Method::GET, "/limits/orders").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_http_unknown_limiter() {
    let (app, _, _) = create_app();

    let (status, _, body) = send(&app, Method::GET, "/limits/newsletter").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("newsletter"));

    let (status, _, _) = send(&app, Method::POST, "/limits/newsletter/attempts").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_http_health_and_metrics() {
    let (app, _, _) = create_app();

    let (status, _, body) = send(&app, Method::GET, "/healthcheck").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    send(&app, Method::GET, "/limits/orders").await;
    let (status, _, body) = send(&app, Method::GET, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body
        .as_str()
        .unwrap()
        .contains("ratelimit_attempt_checks_total"));
}

#[tokio::test]
async fn test_service_from_yaml() {
    let yaml = r#"
limiters:
  - name: newsletter
    max_attempts: 1
    window_secs: 86400
    storage_key: rate_limit_boletin
"#;
    let config = load_config_from_yaml(yaml).unwrap();
    let store = Arc::new(MemoryStore::default());
    let clock = Arc::new(ManualClock::new(START));
    let service = RateLimitService::from_config(
        &config,
        store.clone(),
        clock.clone(),
        Arc::new(Metrics::new().unwrap()),
    )
    .unwrap();

    assert_eq!(service.limiter_names(), vec!["newsletter"]);

    service.record("newsletter", Some("ana@example.com")).await.unwrap();
    let decision = service.check("newsletter", Some("ana@example.com")).await.unwrap();
    assert_eq!(decision.retry_after_secs(), Some(86_400));
    assert!(format_retry_message(86_400).contains("24 horas"));
    assert!(store
        .read("rate_limit_boletin:ana@example.com")
        .await
        .unwrap()
        .is_some());
}
