mod handlers;
mod state;

pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/weather", get(handlers::weather_by_grid))
        .route("/weather/{level1}", get(handlers::weather_by_path))
        .route("/weather/{level1}/{level2}", get(handlers::weather_by_path))
        .route("/weather/{level1}/{level2}/{level3}", get(handlers::weather_by_path))
        .route("/region", get(handlers::weather_by_region))
        .route("/regions", get(handlers::region_list))
        .route("/regions/refresh", post(handlers::refresh_regions))
        .route("/health", get(handlers::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start(state: AppState, addr: &str) -> std::io::Result<()> {
    let app = build_router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("gridcast listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}
