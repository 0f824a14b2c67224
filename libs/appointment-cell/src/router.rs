// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch, post},
    middleware,
};

use shared_utils::extractor::tenant_middleware;

use crate::handlers;
use crate::services::booking::AppointmentBookingService;

pub fn appointment_routes(service: Arc<AppointmentBookingService>) -> Router {
    // Every appointment operation is scoped to the caller's tenant
    let tenant_routes = Router::new()
        .route("/", post(handlers::create_appointment).get(handlers::list_appointments))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment)
                .put(handlers::update_appointment)
                .delete(handlers::delete_appointment),
        )
        .route("/{appointment_id}/reschedule", patch(handlers::reschedule_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/conflicts/check", get(handlers::check_appointment_conflicts))
        .layer(middleware::from_fn(tenant_middleware));

    Router::new()
        .merge(tenant_routes)
        .with_state(service)
}
