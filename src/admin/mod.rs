//! Admin API.
//!
//! # Responsibilities
//! - Report service state, fallback resolution and per-service counters
//! - Enable/disable services at runtime
//!
//! Every route requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::service::ServiceRegistry;

#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<ServiceRegistry>,
    pub api_key: Arc<str>,
}

pub fn router(registry: Arc<ServiceRegistry>, api_key: String) -> Router {
    let state = AdminState {
        registry,
        api_key: api_key.into(),
    };

    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/services", get(get_services))
        .route("/admin/services/{name}/enable", post(enable_service))
        .route("/admin/services/{name}/disable", post(disable_service))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProxyConfig, ServiceConfig};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    const KEY: &str = "test-key";

    fn admin() -> (Arc<ServiceRegistry>, Router) {
        let mut config = ProxyConfig::default();
        config.services.push(ServiceConfig::reverse_proxy("legacy").with_fallback("modern", "404,410"));
        let mut modern = ServiceConfig::reverse_proxy("modern");
        modern.enabled = false;
        config.services.push(modern);

        let registry = Arc::new(ServiceRegistry::from_config(&config).unwrap());
        (Arc::clone(&registry), router(registry, KEY.to_string()))
    }

    fn request(method: &str, uri: &str, key: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_rejects_missing_or_wrong_key() {
        let (_, app) = admin();

        let res = app.clone().oneshot(request("GET", "/admin/status", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

        let res = app.oneshot(request("GET", "/admin/status", Some("nope"))).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_lists_services_with_fallback_details() {
        let (_, app) = admin();

        let res = app.oneshot(request("GET", "/admin/services", Some(KEY))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let body = json(res).await;
        let services = body.as_array().unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0]["name"], "legacy");
        assert_eq!(services[0]["fallback_service"], "modern");
        assert_eq!(services[0]["fallback_if_rc"], "404,410");
        assert_eq!(services[0]["fallback_state"], "not_attempted");
        assert_eq!(services[1]["name"], "modern");
        assert_eq!(services[1]["enabled"], false);
        assert!(services[1]["fallback_service"].is_null());
    }

    #[tokio::test]
    async fn test_enable_and_disable() {
        let (registry, app) = admin();

        let res = app
            .clone()
            .oneshot(request("POST", "/admin/services/modern/enable", Some(KEY)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = json(res).await;
        assert_eq!(body["enabled"], true);
        assert_eq!(body["changed"], true);
        assert!(registry.lookup("modern").is_some());

        let res = app
            .clone()
            .oneshot(request("POST", "/admin/services/modern/disable", Some(KEY)))
            .await
            .unwrap();
        assert_eq!(json(res).await["changed"], true);
        assert!(registry.lookup("modern").is_none());

        let res = app
            .oneshot(request("POST", "/admin/services/missing/enable", Some(KEY)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
