use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use doctor_cell::router::doctor_routes;
use shared_config::AppConfig;

pub fn create_router(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic Scheduling API is running!" }))
        .nest("/doctors", doctor_routes(state.clone()))
        .nest("/appointments", appointment_routes(state))
}
