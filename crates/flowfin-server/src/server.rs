use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{Router, extract::DefaultBodyLimit, middleware, routing::get};
use flowfin_security::{CsrfConfig, CsrfService, SecurityHeaders};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::{config::AppConfig, handlers, middleware as app_middleware};

/// Shared state for handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub csrf: CsrfService,
    pub csrf_config: Arc<CsrfConfig>,
    pub security_headers: Arc<SecurityHeaders>,
    /// Set for production deployments; controls `Secure` cookies.
    pub production: bool,
}

impl AppState {
    /// Builds state with an in-memory token store.
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::with_csrf_service(cfg, CsrfService::in_memory(&cfg.security.csrf))
    }

    /// Builds state around an existing CSRF service, e.g. one backed by a
    /// shared store or a manual clock.
    pub fn with_csrf_service(cfg: &AppConfig, csrf: CsrfService) -> Self {
        let production = cfg.is_production();
        Self {
            csrf,
            csrf_config: Arc::new(cfg.security.csrf.clone()),
            security_headers: Arc::new(SecurityHeaders::compose(
                &cfg.security.headers,
                production,
            )),
            production,
        }
    }
}

/// Routes served by this process.
pub fn routes() -> Router<AppState> {
    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        // Token issuance
        .route("/api/csrf-token", get(handlers::issue_csrf_token))
}

pub fn build_app(cfg: &AppConfig) -> Router {
    build_app_with_state(cfg, AppState::from_config(cfg))
}

pub fn build_app_with_state(cfg: &AppConfig, state: AppState) -> Router {
    with_security_layers(routes(), cfg, state)
}

/// Wraps `router` in the security boundary.
///
/// Layer order, innermost first: CSRF guard, access log, request id, body
/// limit, panic recovery, security headers. The header layer is outermost
/// so no response leaves without it.
pub fn with_security_layers(router: Router<AppState>, cfg: &AppConfig, state: AppState) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    router
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::csrf_protection,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<axum::body::Body>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<app_middleware::RequestId>()
                        .and_then(|id| id.0.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri().path(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<axum::body::Body>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(app_middleware::request_id))
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .layer(CatchPanicLayer::custom(handlers::panic_response))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::security_headers,
        ))
        .with_state(state)
}

/// Spawns the periodic token sweep.
///
/// Returns `None` when `interval` is zero. Lazy removal on validation keeps
/// expiry correct either way; the sweep only bounds memory.
pub fn spawn_token_sweeper(csrf: CsrfService, interval: Duration) -> Option<JoinHandle<()>> {
    if interval.is_zero() {
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = csrf.sweep().await {
                tracing::warn!(error = %e, "CSRF token sweep failed");
            }
        }
    }))
}

pub struct FlowfinServer {
    addr: SocketAddr,
    app: Router,
    csrf: CsrfService,
    sweep_interval: Duration,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    csrf: Option<CsrfService>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            csrf: None,
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Uses a caller-provided CSRF service instead of an in-memory one.
    pub fn with_csrf_service(mut self, csrf: CsrfService) -> Self {
        self.csrf = Some(csrf);
        self
    }

    pub fn build(self) -> FlowfinServer {
        let csrf = self
            .csrf
            .unwrap_or_else(|| CsrfService::in_memory(&self.config.security.csrf));
        let state = AppState::with_csrf_service(&self.config, csrf.clone());
        let app = build_app_with_state(&self.config, state);

        FlowfinServer {
            addr: self.addr,
            app,
            csrf,
            sweep_interval: self.config.security.csrf.sweep_interval,
        }
    }
}

impl FlowfinServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);

        let sweeper = spawn_token_sweeper(self.csrf, self.sweep_interval);
        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        if let Some(handle) = sweeper {
            handle.abort();
        }
        served?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
