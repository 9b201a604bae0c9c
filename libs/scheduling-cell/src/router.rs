use std::sync::Arc;

use axum::{routing::get, Router};

use shared_config::AppConfig;

use crate::handlers;

pub fn scheduling_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/doctors/{doctor_id}/slots", get(handlers::get_day_slots))
        .route(
            "/doctors/{doctor_id}/days",
            get(handlers::get_day_bookability_range),
        )
        .route(
            "/doctors/{doctor_id}/schedule",
            get(handlers::get_doctor_schedule),
        )
        .with_state(state)
}
