//! HTTP API Module
//!
//! Plain-HTTP surface of the bridge: streaming query execution, actions,
//! refresh, schema introspection, catalog listing and the template store.

pub mod dto;
pub mod error;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Extension, Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::Instrument;

use crate::config::HttpConfig;
use crate::protocol::Handler;

use self::handlers::{action, admin, catalog, execute, schema, templates};

/// Middleware: one span per request, tagged with a fresh request id.
async fn request_span(req: Request<Body>, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!(
        "http_request",
        %request_id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    async move {
        let response = next.run(req).await;
        tracing::debug!(status = response.status().as_u16(), "request_completed");
        response
    }
    .instrument(span)
    .await
}

fn cors_layer(config: &HttpConfig) -> Option<CorsLayer> {
    if !config.cors_origins.is_empty() {
        // Explicit origins configured: restrict to those
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|s| {
                let parsed = s.parse();
                if parsed.is_err() {
                    tracing::warn!(origin = %s, "invalid_cors_origin_ignored");
                }
                parsed.ok()
            })
            .collect();
        Some(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else if config.cors_allow_all {
        // Explicit dev mode opt-in: allow all origins
        Some(CorsLayer::permissive())
    } else {
        // Default: same-origin only
        None
    }
}

/// Creates the Axum router
pub fn create_router(handler: Arc<Handler>, config: &HttpConfig) -> Router {
    let mut app = Router::new()
        .route("/health", get(admin::health))
        .route("/execute", post(execute::execute))
        .route("/execute/local", post(execute::execute_local))
        .route("/list", get(catalog::list))
        .route("/action", post(action::run_action))
        .route("/refresh", post(action::refresh))
        .route("/schema", get(schema::get_schema))
        .route(
            "/templates",
            get(templates::list_templates).post(templates::save_template),
        )
        .route("/templates/:slug", get(templates::get_template))
        .layer(Extension(handler))
        .layer(middleware::from_fn(request_span));

    if let Some(cors) = cors_layer(config) {
        app = app.layer(cors);
    }

    app
}

/// Starts the HTTP server with graceful shutdown support.
///
/// Listens for SIGINT (ctrl-c) and SIGTERM to trigger graceful shutdown.
/// Streams still in flight are cut when their connections close.
pub async fn start_http_server(
    handler: Arc<Handler>,
    config: &HttpConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let location = handler.location().to_string();
    let app = create_router(handler, config);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!(%addr, upstream = %location, "http_server_listening");

    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4()?
    } else {
        tokio::net::TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let listener = socket.listen(1024)?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("http_server_stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    () = ctrl_c => tracing::info!(signal = "SIGINT", "shutdown_requested"),
                    _ = sigterm.recv() => tracing::info!(signal = "SIGTERM", "shutdown_requested"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "sigterm_handler_unavailable");
                ctrl_c.await;
                tracing::info!(signal = "SIGINT", "shutdown_requested");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
        tracing::info!(signal = "SIGINT", "shutdown_requested");
    }
}
