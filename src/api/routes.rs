use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/volumes/add", post(handlers::volumes::add_volume))
        .route("/volumes/list", get(handlers::volumes::list_volumes))
        .route("/volumes/remove", delete(handlers::volumes::remove_volume))
        .route("/ingest/start", post(handlers::ingest::start_ingest))
        .route("/ingest/status", get(handlers::ingest::ingest_status))
        .route("/search", post(handlers::search::search))
        .route("/search/quick", get(handlers::search::quick_search))
        .route("/evidence/assets/all", get(handlers::evidence::all_assets))
        .route(
            "/evidence/chunk/{chunk_id}",
            get(handlers::evidence::chunk_evidence),
        )
        .route(
            "/evidence/chunk/{chunk_id}/annotation",
            get(handlers::evidence::chunk_annotation),
        )
        .route("/evidence/{asset_id}", get(handlers::evidence::asset_evidence))
        .route("/universe/snapshot", get(handlers::universe::snapshot))
        .route("/universe/focus", post(handlers::universe::focus))
        .route("/concepts/list", get(handlers::concepts::list_concepts))
        .route("/concepts/refine", post(handlers::concepts::refine_concept))
        .route("/concepts/{concept_id}", get(handlers::concepts::get_concept))
        .route(
            "/concepts/{concept_id}/why",
            get(handlers::concepts::concept_why),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
