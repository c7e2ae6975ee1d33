use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::*;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/duties", get(list_duties).post(create_duty))
        .route("/api/v1/duties/current", get(current_duties))
        .route("/api/v1/duties/:duty_id", delete(delete_duty))
        .route("/api/v1/duties/:duty_id/status", put(update_duty_status))
        .route("/api/v1/officers", get(list_officers))
        .route("/api/v1/vehicles", get(list_vehicles))
        .route("/api/v1/activities", get(list_activities))
        .route("/api/v1/map", get(map_scene))
        .route("/api/v1/sweep", post(run_sweep))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
