use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn doctor_routes(state: Arc<AppConfig>) -> Router {
    let public_routes = Router::new()
        .route("/{doctor_id}/working-hours", get(handlers::get_working_hours_public))
        .route("/{doctor_id}/available-slots", get(handlers::get_available_slots_public));

    let protected_routes = Router::new()
        .route(
            "/me/working-hours",
            get(handlers::get_my_working_hours).post(handlers::set_my_working_hours),
        )
        .route("/{doctor_id}/working-hours", post(handlers::set_doctor_working_hours))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
