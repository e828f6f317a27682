//! HTTP server setup.
//!
//! [`app`] builds the complete axum application from a validated
//! [`Config`]: the executor, the routes and the middleware stack. [`serve`]
//! binds it and runs until the shutdown future completes.

use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, MatchedPath};
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::files::FileExecutor;
use crate::router::{build_router, AppState};

/// Build the application for a configuration.
///
/// The managed root is created if it does not exist yet.
pub fn app(config: &Config) -> anyhow::Result<Router> {
    let prefix = config.route_prefix()?;

    std::fs::create_dir_all(&config.file.root).with_context(|| {
        format!(
            "Failed to create root directory: {}",
            config.file.root.display()
        )
    })?;

    let executor = FileExecutor::new(&config.file).with_context(|| {
        format!("Failed to open root directory: {}", config.file.root.display())
    })?;
    tracing::info!(root = ?executor.resolver().root(), prefix = %prefix, "file_manager_ready");

    let body_limit = usize::try_from(config.file.max_request_size).unwrap_or(usize::MAX);
    let timeout = Duration::from_secs(config.server.request_timeout_secs);

    Ok(build_router(AppState::new(executor, prefix))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|request: &Request<Body>| {
                            let path = request.uri().path();
                            let matched_path = request
                                .extensions()
                                .get::<MatchedPath>()
                                .map(MatchedPath::as_str)
                                .unwrap_or(path);

                            tracing::info_span!(
                                "http_request",
                                method = %request.method(),
                                http.route = %matched_path,
                            )
                        })
                        .on_request(|request: &Request<Body>, _span: &tracing::Span| {
                            tracing::info!(
                                method = %request.method(),
                                path = %request.uri().path(),
                                "http_request_started"
                            );
                        })
                        .on_response(
                            |response: &Response<Body>, latency: Duration, span: &tracing::Span| {
                                tracing::info!(
                                    parent: span,
                                    http_status = %response.status().as_u16(),
                                    latency_ms = %latency.as_millis(),
                                    "http_request_finished"
                                );
                            },
                        )
                        .on_failure(
                            |failure_class: ServerErrorsFailureClass,
                             latency: Duration,
                             span: &tracing::Span| {
                                tracing::error!(
                                    parent: span,
                                    failure_class = ?failure_class,
                                    latency_ms = %latency.as_millis(),
                                    "http_request_failed"
                                );
                            },
                        ),
                )
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    timeout,
                )),
        ))
}

/// Bind the configured address and serve until `shutdown` completes.
pub async fn serve<F>(config: &Config, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config.bind_addr()?;
    let app = app(config)?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(addr = %listener.local_addr()?, "server_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")?;

    tracing::info!("server_stopped");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
pub async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to register SIGTERM handler");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            }
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            }
            tracing::info!("Received SIGINT");
        }
    }
}
