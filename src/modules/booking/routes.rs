use axum::{routing::post, Router};

use super::handlers::{approve_booking, cancel_booking, create_booking};
use crate::app_state::AppState;

pub fn booking_routes() -> Router<AppState> {
    Router::new()
        .route("/availability/book", post(create_booking))
        .route("/availability/bookings/:id/approve", post(approve_booking))
        .route("/availability/bookings/:id/cancel", post(cancel_booking))
}
