pub mod error;
pub mod routes;
pub mod state;
pub mod tracker;

use std::path::Path;

use axum::routing::{get, post};
use axum::Router;
use pedimentos_core::Config;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health))
        // Primary service + automatic follow-ups
        .route(
            "/services/pedimento_completo",
            post(routes::services::pedimento_completo),
        )
        .route(
            "/services/status/{pedimento_id}",
            get(routes::services::status),
        )
        .route("/services/runs", get(routes::runs::list_runs))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the server on `server.host:server.port` from `config`.
pub async fn serve(root: &Path, config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(root, config, listener).await
}

/// Start the server on a pre-bound listener.
///
/// Accepts a `TcpListener` that was already bound so the caller can read the
/// actual port before starting (useful when `port = 0`).
pub async fn serve_on(
    root: &Path,
    config: Config,
    listener: tokio::net::TcpListener,
) -> anyhow::Result<()> {
    let actual = listener.local_addr()?;
    let app_state = AppState::from_config(root, config)?;
    let tracker = app_state.tracker.clone();
    let app = build_router(app_state);

    tracing::info!("pedimentos server listening on http://{actual}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    let aborted = tracker.abort_all().await;
    if aborted > 0 {
        tracing::warn!(aborted, "shutdown interrupted automatic services");
    }
    Ok(())
}
