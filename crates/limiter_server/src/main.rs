pub mod config;
pub mod http;
pub mod metrics;
pub mod middleware;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request, Response, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::routing::{any, get};
use axum::{Json, Router};
use limiter_core::{AdmissionGate, OperationClass};
use serde_json::json;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::metrics::LimiterMetrics;
use crate::middleware::rate_limit::{identity, rate_limit_middleware};

#[derive(Clone)]
pub struct AppState {
    pub client: reqwest::Client,
    pub gate: Arc<AdmissionGate>,
    pub metrics: Arc<LimiterMetrics>,
    pub upstream_base_url: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("refusing to start: {err}");
            std::process::exit(1);
        }
    };

    // from_env already validated the table.
    let gate = Arc::new(
        AdmissionGate::new(config.limits.clone()).expect("limit table validated at startup"),
    );

    let state = AppState {
        client: reqwest::Client::new(),
        gate: Arc::clone(&gate),
        metrics: Arc::new(LimiterMetrics::new()),
        upstream_base_url: config.upstream_base_url.clone(),
    };

    let bucket_ttl = config.bucket_ttl;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(bucket_ttl);
        loop {
            interval.tick().await;
            gate.cleanup(bucket_ttl);
        }
    });

    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .route("/rate-limit/status", get(status_handler))
        .route("/{*path}", any(proxy_handler))
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state.clone());

    info!("starting admission gateway on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind the address");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server failed");
}

async fn health() -> &'static str {
    "OK"
}

async fn metrics_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!(state.metrics.snapshot()))
}

/// Per-class quota view for the calling identity, for client-side
/// "requests remaining" displays. Reading it never spends a token.
async fn status_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    let identity = identity(&headers, &addr);

    let mut classes = serde_json::Map::new();
    for class in OperationClass::ALL {
        let snapshot = state.gate.status(&identity, class);
        classes.insert(
            class.to_string(),
            json!({ "limit": snapshot.limit, "remaining": snapshot.remaining }),
        );
    }

    Json(json!({ "identity": identity, "classes": classes }))
}

/// Forwards an admitted request to the upstream data API unchanged.
async fn proxy_handler(
    State(state): State<AppState>,
    req: Request<Body>,
) -> Result<Response<Body>, StatusCode> {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let headers = req.headers().clone();

    let body = to_bytes(req.into_body(), usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let full_url = format!("{}{}", state.upstream_base_url.trim_end_matches('/'), uri);

    let upstream = state
        .client
        .request(method, full_url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|err| {
            error!("upstream request failed: {err}");
            StatusCode::BAD_GATEWAY
        })?;

    let status = upstream.status();
    let body = upstream
        .bytes()
        .await
        .map_err(|_| StatusCode::BAD_GATEWAY)?;

    Response::builder()
        .status(status)
        .body(Body::from(body))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
