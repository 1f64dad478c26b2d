//! HTTP server bootstrap for the verification engine.
//!
//! This module wires together:
//! - configuration
//! - authentication (API keys, rate limiting)
//! - the engine with its in-memory infrastructure
//! - the Axum router

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::auth::{
    auth_middleware, ApiKeyRecord, ApiKeyValidator, AuthMiddlewareState, Authenticator,
    Capabilities, RateLimiter,
};
use crate::domain::{RawInterpretation, UserId};
use crate::engine::{
    DispatcherConfig, EngineConfig, IntakeConfig, TrustPolicy, VerificationEngine,
    DEFAULT_INTERPRETATION_TIMEOUT_SECS,
};
use crate::infra::{
    serve_with_shutdown, shutdown_signal, ComponentHealth, GracefulShutdownConfig, LogNotifier,
    MemoryBlobStore, MemoryStore, ScriptedInterpreter, ShutdownCoordinator,
};
use crate::metrics::MetricsRegistry;
use crate::telemetry::{init_telemetry, TelemetryConfig};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server listen address.
    pub listen_addr: SocketAddr,
    /// Engine tunables (media intake, interpretation timeout, trust policy).
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid listen address {host}:{port}: {e}"))?;

        let mut intake = IntakeConfig::default();
        if let Some(max_bytes) = std::env::var("VPROOF_MAX_MEDIA_BYTES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            intake.max_bytes = max_bytes;
        }
        if let Ok(types) = std::env::var("VPROOF_ALLOWED_MEDIA_TYPES") {
            let types: Vec<String> = types
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !types.is_empty() {
                intake.allowed_types = types;
            }
        }

        let timeout_secs = std::env::var("VPROOF_INTERPRETATION_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_INTERPRETATION_TIMEOUT_SECS);
        let dispatcher = DispatcherConfig {
            timeout: Duration::from_secs(timeout_secs),
        };

        let trust = match std::env::var("VPROOF_REVIEW_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
        {
            Some(threshold) => TrustPolicy::new(threshold)
                .map_err(|e| anyhow::anyhow!("VPROOF_REVIEW_THRESHOLD: {e}"))?,
            None => TrustPolicy::default(),
        };

        Ok(Self {
            listen_addr,
            engine: EngineConfig {
                intake,
                dispatcher,
                trust,
            },
        })
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<VerificationEngine>,
    pub metrics: Arc<MetricsRegistry>,
}

/// Start the HTTP server.
pub async fn run() -> anyhow::Result<()> {
    init_telemetry(&TelemetryConfig::from_env())
        .map_err(|e| anyhow::anyhow!("telemetry init failed: {e}"))?;

    info!("Starting vproof-engine v{}", env!("CARGO_PKG_VERSION"));

    // Auth configuration
    let auth_mode = std::env::var("VPROOF_AUTH_MODE").unwrap_or_else(|_| "required".to_string());
    let require_auth = auth_mode != "disabled";

    let api_key_validator = Arc::new(ApiKeyValidator::new());
    let mut any_auth_configured = false;

    if let Ok(bootstrap_key) = std::env::var("VPROOF_BOOTSTRAP_API_KEY") {
        let key_hash = ApiKeyValidator::hash_key(&bootstrap_key);
        api_key_validator.register_key(ApiKeyRecord {
            key_hash,
            user_id: UserId::from_uuid(Uuid::nil()),
            capabilities: Capabilities::service(),
            label: "bootstrap".to_string(),
            active: true,
            rate_limit: None,
        });
        any_auth_configured = true;
        info!("Bootstrap service API key is configured");
    }

    if require_auth && !any_auth_configured {
        anyhow::bail!(
            "VPROOF_AUTH_MODE=required but no auth is configured; set VPROOF_BOOTSTRAP_API_KEY (or set VPROOF_AUTH_MODE=disabled for local dev)"
        );
    }

    let authenticator = Arc::new(Authenticator::new(api_key_validator));

    let rate_limiter = std::env::var("VPROOF_RATE_LIMIT_PER_MINUTE")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|v| *v > 0)
        .map(|rpm| Arc::new(RateLimiter::new(rpm)));

    let auth_state = AuthMiddlewareState {
        authenticator,
        require_auth,
        rate_limiter,
    };

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Max media bytes: {}", config.engine.intake.max_bytes);
    info!(
        "  Interpretation timeout: {:?}",
        config.engine.dispatcher.timeout
    );

    // In-memory infrastructure; durable stores plug in behind the same traits
    let store = Arc::new(MemoryStore::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let interpreter = Arc::new(ScriptedInterpreter::new(dev_interpretation()));
    let notifier = Arc::new(LogNotifier);
    let metrics = Arc::new(MetricsRegistry::new());
    info!("Using in-memory stores with the scripted dev interpreter");

    let engine = Arc::new(VerificationEngine::new(
        store.clone(),
        store.clone(),
        store,
        blobs,
        interpreter,
        notifier,
        metrics.clone(),
        config.engine.clone(),
    ));

    // Create application state
    let state = AppState { engine, metrics };

    // Build router
    let app = build_router(auth_state)?.with_state(state);

    // Start server
    info!("Starting HTTP server on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    let coordinator = Arc::new(ShutdownCoordinator::new());
    let signal_coordinator = coordinator.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_coordinator.shutdown().await;
    });

    info!("vproof-engine is ready to accept connections");
    serve_with_shutdown(listener, app, coordinator, GracefulShutdownConfig::default()).await?;

    Ok(())
}

/// Fixed interpretation script served by the dev interpreter.
fn dev_interpretation() -> RawInterpretation {
    RawInterpretation {
        glosses: vec!["yes".to_string(), "confirm".to_string()],
        confidences: vec![0.97, 0.94],
        media_duration_secs: 2.4,
        frame_count: 72,
        processing_ms: 350,
    }
}

/// Assemble the application router: the authenticated `/v1` API plus the
/// unauthenticated health and metrics endpoints.
pub fn build_router(auth_state: AuthMiddlewareState) -> anyhow::Result<Router<AppState>> {
    let api = crate::api::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        auth_middleware,
    ));

    let mut router = Router::new()
        .merge(api)
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .layer(TraceLayer::new_for_http());

    if let Some(cors_layer) = cors_layer_from_env()? {
        router = router.layer(cors_layer);
    }

    Ok(router)
}

fn cors_layer_from_env() -> anyhow::Result<Option<CorsLayer>> {
    let origins = match std::env::var("CORS_ALLOW_ORIGINS") {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };

    let origins = origins.trim();
    if origins.is_empty() {
        return Ok(None);
    }

    let allow_origin = if origins == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("Invalid CORS origin {s:?}: {e}"))
            })
            .collect::<anyhow::Result<_>>()?;
        AllowOrigin::list(origins)
    };

    Ok(Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([
                axum::http::header::AUTHORIZATION,
                axum::http::header::CONTENT_TYPE,
            ]),
    ))
}

fn component_json(component: &ComponentHealth) -> serde_json::Value {
    match component {
        ComponentHealth::Healthy => serde_json::json!({ "status": "healthy" }),
        ComponentHealth::Degraded { reason } => {
            serde_json::json!({ "status": "degraded", "reason": reason })
        }
        ComponentHealth::Unhealthy { reason } => {
            serde_json::json!({ "status": "unhealthy", "reason": reason })
        }
    }
}

/// Health check endpoint.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.engine.health().await;
    let status = if health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "status": if health.is_healthy() { "healthy" } else { "unhealthy" },
            "service": "vproof-engine",
            "version": env!("CARGO_PKG_VERSION"),
            "components": {
                "session_store": component_json(&health.session_store),
                "blob_store": component_json(&health.blob_store),
                "interpreter": component_json(&health.interpreter),
            },
        })),
    )
}

/// Prometheus metrics endpoint.
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.metrics.to_prometheus().await;
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
