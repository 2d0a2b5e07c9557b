//! End-to-end fallback tests: real backends, real proxy, real client.

use std::time::Duration;

use axum::http::StatusCode;
use fallback_proxy::fallback::ResolutionState;
use fallback_proxy::http::X_REQUEST_ID;

mod common;

use common::{client, closed_addr, fallback_config, start_mock_backend, start_programmable_backend, start_proxy};

#[tokio::test]
async fn test_404_is_served_by_fallback_once() {
    let legacy = start_mock_backend(404, "legacy").await;
    let modern = start_mock_backend(200, "modern").await;
    let proxy = start_proxy(fallback_config(legacy.addr, modern.addr, "404")).await;

    let res = client().get(proxy.url("/catalog")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "modern");

    assert_eq!(legacy.hits(), 1);
    assert_eq!(modern.hits(), 1);

    // Counted against the service the client was routed to.
    let legacy_svc = proxy.registry.get("legacy").unwrap();
    let modern_svc = proxy.registry.get("modern").unwrap();
    assert_eq!(legacy_svc.stats().requests(), 1);
    assert_eq!(legacy_svc.stats().handoffs(), 1);
    assert_eq!(modern_svc.stats().requests(), 0);
    assert_eq!(legacy_svc.fallback().state(), ResolutionState::Resolved);
}

#[tokio::test]
async fn test_non_matching_status_passes_through() {
    let legacy = start_mock_backend(500, "legacy broke").await;
    let modern = start_mock_backend(200, "modern").await;
    let proxy = start_proxy(fallback_config(legacy.addr, modern.addr, "404,410")).await;

    let res = client().get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.text().await.unwrap(), "legacy broke");
    assert_eq!(modern.hits(), 0);
}

#[tokio::test]
async fn test_request_with_body_is_never_handed_off() {
    let legacy = start_mock_backend(404, "legacy").await;
    let modern = start_mock_backend(200, "modern").await;
    let proxy = start_proxy(fallback_config(legacy.addr, modern.addr, "404")).await;

    let res = client()
        .post(proxy.url("/orders"))
        .body("0123456789")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.text().await.unwrap(), "legacy");
    assert_eq!(modern.hits(), 0);
    assert_eq!(proxy.registry.get("legacy").unwrap().stats().handoffs(), 0);
}

#[tokio::test]
async fn test_negated_condition() {
    let legacy = start_programmable_backend(|n| match n {
        0 => (200, "legacy ok".to_string()),
        _ => (503, "legacy down".to_string()),
    })
    .await;
    let modern = start_mock_backend(200, "modern").await;
    let proxy = start_proxy(fallback_config(legacy.addr, modern.addr, "!200,302")).await;
    let client = client();

    let res = client.get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "legacy ok");
    assert_eq!(modern.hits(), 0);

    let res = client.get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "modern");
    assert_eq!(modern.hits(), 1);
}

#[tokio::test]
async fn test_disabled_fallback_degrades_then_recovers() {
    let legacy = start_mock_backend(404, "legacy").await;
    let modern = start_mock_backend(200, "modern").await;
    let mut config = fallback_config(legacy.addr, modern.addr, "404");
    config.services[1].enabled = false;
    let proxy = start_proxy(config).await;
    let client = client();

    let res = client.get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.text().await.unwrap(), "legacy");
    assert_eq!(
        proxy.registry.get("legacy").unwrap().fallback().state(),
        ResolutionState::Failed
    );

    proxy.registry.enable("modern").unwrap();

    let res = client.get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "modern");
    assert_eq!(modern.hits(), 1);
}

#[tokio::test]
async fn test_unreachable_fallback_backend() {
    let legacy = start_mock_backend(404, "legacy").await;
    let proxy = start_proxy(fallback_config(legacy.addr, closed_addr().await, "404")).await;

    let res = client().get(proxy.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(proxy.registry.get("legacy").unwrap().stats().requests(), 1);
    assert_eq!(proxy.registry.get("modern").unwrap().stats().requests(), 0);
}

#[tokio::test]
async fn test_request_id_reaches_both_backends() {
    let legacy = start_mock_backend(404, "legacy").await;
    let modern = start_mock_backend(200, "modern").await;
    let proxy = start_proxy(fallback_config(legacy.addr, modern.addr, "404")).await;

    let res = client().get(proxy.url("/")).send().await.unwrap();
    let id = res.headers()[X_REQUEST_ID].to_str().unwrap().to_string();
    assert!(uuid::Uuid::parse_str(&id).is_ok());

    assert_eq!(legacy.request_ids(), vec![id.clone()]);
    assert_eq!(modern.request_ids(), vec![id]);
}

#[tokio::test]
async fn test_discarded_primary_body_keeps_connection_alive() {
    let large = "x".repeat(200_000);
    let legacy = start_programmable_backend(move |_| (404, large.clone())).await;
    let modern = start_mock_backend(200, "modern").await;
    let proxy = start_proxy(fallback_config(legacy.addr, modern.addr, "404")).await;
    let client = client();

    for _ in 0..3 {
        let res = client.get(proxy.url("/")).send().await.unwrap();
        assert_eq!(res.text().await.unwrap(), "modern");
        // Let the background drain finish before the next request.
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert_eq!(legacy.hits(), 3);
    assert_eq!(legacy.connections(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_fall_back_independently() {
    let legacy = start_mock_backend(404, "legacy").await;
    let modern = start_mock_backend(200, "modern").await;
    let proxy = start_proxy(fallback_config(legacy.addr, modern.addr, "404")).await;
    let client = client();

    let requests = (0..32).map(|i| {
        let client = client.clone();
        let url = proxy.url(&format!("/item/{i}"));
        tokio::spawn(async move {
            let res = client.get(url).send().await.unwrap();
            (res.status(), res.text().await.unwrap())
        })
    });
    let results: Vec<_> = futures_join(requests).await;

    for (status, body) in results {
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "modern");
    }
    assert_eq!(legacy.hits(), 32);
    assert_eq!(modern.hits(), 32);

    let legacy_svc = proxy.registry.get("legacy").unwrap();
    assert_eq!(legacy_svc.stats().requests(), 32);
    assert_eq!(legacy_svc.stats().handoffs(), 32);
}

async fn futures_join<T>(handles: impl Iterator<Item = tokio::task::JoinHandle<T>>) -> Vec<T> {
    let mut results = Vec::new();
    for handle in handles.collect::<Vec<_>>() {
        results.push(handle.await.unwrap());
    }
    results
}
