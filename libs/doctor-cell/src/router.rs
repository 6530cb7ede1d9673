use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put, delete},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn doctor_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        // Doctor registry
        .route("/", post(handlers::create_doctor))
        .route("/", get(handlers::list_doctors))
        .route("/specializations", get(handlers::list_specializations))
        .route("/{doctor_id}", get(handlers::get_doctor))
        .route("/{doctor_id}", put(handlers::update_doctor))
        .route("/{doctor_id}", delete(handlers::delete_doctor))

        // Availability management
        .route("/{doctor_id}/availability/recurring", post(handlers::set_recurring_availability))
        .route("/{doctor_id}/availability/override", post(handlers::set_date_override))
        .route("/{doctor_id}/availability/bulk", post(handlers::bulk_generate_availability))
        .route("/{doctor_id}/availability/month", get(handlers::get_month_availability))
        .route("/{doctor_id}/availability/day", get(handlers::get_day_availability))
        .route("/{doctor_id}/availability", delete(handlers::clear_availability))

        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
