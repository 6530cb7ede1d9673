use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, patch},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn appointment_routes(state: Arc<AppConfig>) -> Router {
    Router::new()
        // List views
        .route("/requests", get(handlers::list_requests))
        .route("/accommodated", get(handlers::list_accommodated))
        .route("/completed", get(handlers::list_completed))
        .route("/{appointment_id}", get(handlers::get_appointment))

        // Lifecycle transitions
        .route("/{appointment_id}/approve", post(handlers::approve_appointment))
        .route("/{appointment_id}/decline", post(handlers::decline_appointment))
        .route("/{appointment_id}/complete", post(handlers::complete_appointment))

        // Side-effect records
        .route("/{appointment_id}/prescription", post(handlers::save_draft_prescription))
        .route("/{appointment_id}/billing", post(handlers::save_draft_billing))
        .route("/{appointment_id}/billing/status", patch(handlers::update_billing_status))
        .route("/{appointment_id}/billing/field", patch(handlers::update_billing_field))

        // Reports & calendar
        .route("/reports/daily", get(handlers::daily_stats))
        .route("/reports/doctors", get(handlers::doctor_reports))
        .route("/calendar", get(handlers::calendar_month))

        // Background refresh control
        .route("/refresh", get(handlers::refresh_state))
        .route("/refresh/suppress", post(handlers::set_refresh_suppressed))

        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
