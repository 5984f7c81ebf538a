use std::{any::Any, future::Future, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::shutdown::ShutdownCoordinator;
use crate::state::AppState;
use crate::{auth, health};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .nest(
            "/login",
            Router::new()
                .merge(health::router())
                .merge(auth::router()),
        )
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = detail, "handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"success": false, "message": "Internal server error"})),
    )
        .into_response()
}

pub async fn serve<F>(listener: tokio::net::TcpListener, app: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Startup and lifecycle: nothing is bound or served until the discovery backend has
/// answered, and the instance is registered before the first request is accepted. A shutdown
/// requested before registration ends startup cleanly without advertising the instance. On
/// shutdown after that a supervisor deregisters (bounded) while in-flight requests drain.
pub async fn run(
    state: AppState,
    addr: SocketAddr,
    coordinator: Arc<ShutdownCoordinator>,
) -> anyhow::Result<()> {
    let config = state.config.clone();

    let startup = async {
        state
            .registry
            .wait_for_backend(config.consul.wait_attempts, config.consul.wait_interval)
            .await
            .context("discovery backend unavailable")?;
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind {addr}"))
    };

    let listener = tokio::select! {
        biased;
        _ = coordinator.subscribe().recv() => {
            info!("shutdown requested during startup; not registering");
            return Ok(());
        }
        listener = startup => listener?,
    };

    // A signal landing between bind and here must not register the instance either.
    // Once registration is under way it runs to completion and the supervisor cleans up.
    if coordinator.is_triggered() {
        info!("shutdown requested during startup; not registering");
        return Ok(());
    }

    let registration = config.service.registration();
    let instance_id = registration.instance_id.clone();
    state
        .registry
        .register(registration)
        .await
        .context("register with discovery backend")?;

    let supervisor = tokio::spawn({
        let registry = state.registry.clone();
        let listener = coordinator.subscribe();
        let timeout = config.shutdown_timeout;
        async move {
            listener.recv().await;
            info!("shutting down login service");
            registry.deregister_best_effort(&instance_id, timeout).await;
        }
    });

    let result = serve(listener, build_app(state), coordinator.subscribe().recv()).await;

    // serve may also end on its own (I/O error); the supervisor still has to run
    coordinator.shutdown();
    if let Err(e) = supervisor.await {
        error!(error = %e, "shutdown supervisor failed");
    }
    info!("login service shutdown complete");
    result
}
