//! HTTP gateway for MailMate.
//!
//! Exposes the relay over JSON and NDJSON endpoints, plus health and
//! banner routes.
//!
//! Built on Axum for high performance async HTTP.

pub mod api;
pub mod wire;

use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Request},
    http::{HeaderValue, Method, header},
    middleware::{self, Next},
    response::{Json, Response},
    routing::get,
};
use mailmate_config::{AppConfig, GatewayConfig};
use mailmate_relay::{RelayController, TaskMode};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{Instrument, info, info_span, warn};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<RelayController>,
}

impl AppState {
    pub fn new(controller: Arc<RelayController>) -> Self {
        Self { controller }
    }
}

/// Build the full router.
///
/// Layers applied:
/// - CORS (any origin unless origins are configured)
/// - Request body size limit
/// - Per-request id, as a tracing span and an `x-request-id` header
/// - HTTP trace logging
pub fn build_router(state: AppState, config: &GatewayConfig) -> Router {
    Router::new()
        .route("/", get(banner_handler))
        .route("/health", get(health_handler))
        .merge(api::relay_router())
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http())
}

/// Start the gateway HTTP server and run until Ctrl-C.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let provider = mailmate_providers::build_from_config(&config)?;
    let controller = Arc::new(RelayController::from_config(provider, &config));
    let app = build_router(AppState::new(controller), &config.gateway);

    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    info!(
        addr = %addr,
        provider = %config.provider.name,
        model = %config.provider.model,
        "Gateway starting"
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C; serving until killed");
        std::future::pending::<()>().await;
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Tag every request with a fresh id.
async fn request_id_middleware(req: Request, next: Next) -> Response {
    let id = uuid::Uuid::new_v4().to_string();
    let span = info_span!(
        "request",
        id = %id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    let mut response = next.run(req).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct BannerResponse {
    service: &'static str,
    version: &'static str,
    modes: Vec<&'static str>,
    endpoints: Vec<String>,
}

async fn banner_handler() -> Json<BannerResponse> {
    let mut endpoints = vec!["POST /chat".to_string(), "POST /chat/stream".to_string()];
    for mode in TaskMode::ALL.iter().filter(|m| **m != TaskMode::Chat) {
        endpoints.push(format!("POST /{mode}"));
        endpoints.push(format!("POST /{mode}/stream"));
    }
    endpoints.push("GET /health".into());

    Json(BannerResponse {
        service: "MailMate email assistant",
        version: env!("CARGO_PKG_VERSION"),
        modes: TaskMode::ALL.iter().map(TaskMode::as_str).collect(),
        endpoints,
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::{MockProvider, router_with};
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app() -> Router {
        router_with(Arc::new(MockProvider::new(&["ok"])))
    }

    #[tokio::test]
    async fn health_endpoint() {
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn banner_lists_mode_endpoints() {
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();

        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let endpoints = json["endpoints"].as_array().unwrap();
        assert!(endpoints.iter().any(|e| e == "POST /translate/stream"));
        assert!(endpoints.iter().any(|e| e == "POST /follow_up"));
        assert_eq!(json["modes"].as_array().unwrap().len(), TaskMode::ALL.len());
    }

    #[tokio::test]
    async fn responses_carry_request_id() {
        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(req).await.unwrap();
        let id = response.headers().get("x-request-id").unwrap();
        assert_eq!(id.to_str().unwrap().len(), 36);
    }

    #[tokio::test]
    async fn permissive_cors_by_default() {
        let req = Request::builder()
            .uri("/health")
            .header("origin", "http://example.com")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(req).await.unwrap();
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn configured_cors_rejects_other_origins() {
        let config = GatewayConfig {
            allowed_origins: vec!["https://mail.example.com".into()],
            ..GatewayConfig::default()
        };
        let state = test_support::state_with(Arc::new(MockProvider::new(&["ok"])));
        let app = build_router(state, &config);

        let req = Request::builder()
            .uri("/health")
            .header("origin", "https://evil.example.com")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert!(response.headers().get("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let config = GatewayConfig {
            max_body_bytes: 64,
            ..GatewayConfig::default()
        };
        let provider = Arc::new(MockProvider::new(&["ok"]));
        let app = build_router(test_support::state_with(provider.clone()), &config);

        let body = serde_json::json!({ "message": "x".repeat(500) });
        let req = Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_ne!(response.status(), StatusCode::OK);
        assert_eq!(provider.calls(), 0);
    }
}
