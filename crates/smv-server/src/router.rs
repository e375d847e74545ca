//! Axum router construction.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::routes;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/process", post(routes::jobs::process))
        .route("/status", get(routes::jobs::status))
        .route("/cancel", post(routes::jobs::cancel))
        .route("/capabilities", get(routes::system::capabilities))
        .route("/tools", get(routes::system::tools))
        .route("/health", get(routes::system::health));

    Router::new()
        .nest("/api", api)
        .route("/download/{filename}", get(routes::download::download))
        .route("/video/{filename}", get(routes::download::video))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
