//! HTTP surface for `cipher-core`'s three request handlers: route wiring,
//! auth middleware, Prometheus metrics, and environment-based
//! configuration. Exposed as a library (in addition to the `cipher-server`
//! binary) so integration tests can exercise the full router without a
//! bound TCP listener.

pub mod auth;
pub mod config;
pub mod error;
pub mod metrics_mw;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

use cipher_core::lru_caches::LruCaches;
use cipher_core::orchestrator::SolverOrchestrator;
use cipher_core::player_cache::PlayerCache;
use cipher_core::pool::WorkerPool;
use cipher_core::stub;

pub use config::AppConfig;
pub use state::AppState;

/// Builds the full `AppState` (player cache, LRU caches, worker pool,
/// orchestrator, stub solver/preprocessor) from a resolved `AppConfig`.
/// Runs the player-file cache's startup sweep before returning.
pub async fn build_state(config: &AppConfig) -> AppState {
    let player_cache = Arc::new(PlayerCache::new(config.cache_dir.clone(), config.ignore_script_region));
    if let Err(err) = player_cache.sweep_stale_entries().await {
        tracing::warn!(error = %err, "startup cache sweep failed");
    }

    let caches = Arc::new(LruCaches::new(
        config.preprocessed_cache_size,
        config.solver_cache_size,
        config.sts_cache_size,
    ));

    let pool = WorkerPool::new(config.pool.clone(), stub::preprocess());
    let orchestrator = Arc::new(SolverOrchestrator::new(
        player_cache,
        caches,
        pool,
        stub::solver_factory(),
    ));

    AppState {
        orchestrator,
        api_token: config.api_token.clone().map(Arc::from),
    }
}

/// Assembles the router: public routes, the auth-gated POST routes,
/// `/metrics` (when a recorder handle is supplied), request metrics, and
/// request tracing. `metrics_handle` is `None` in tests that don't install
/// a process-wide Prometheus recorder.
pub fn build_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let protected = routes::protected_router().layer(middleware::from_fn_with_state(
        state.clone(),
        auth::require_token,
    ));

    let mut app = Router::new().merge(routes::public_router()).merge(protected);

    if let Some(handle) = metrics_handle {
        app = app.route("/metrics", get(move || render_metrics(handle.clone())));
    }

    app = app.route_layer(middleware::from_fn(metrics_mw::record));

    app.fallback(routes::not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn render_metrics(handle: PrometheusHandle) -> String {
    handle.render()
}
