use axum::{routing::post, Router};

use super::handlers::{calendar_webhook, connect_calendar, disconnect_calendar};
use crate::app_state::AppState;

pub fn calendar_routes() -> Router<AppState> {
    Router::new()
        .route("/availability/webhook/calendar", post(calendar_webhook))
        .route(
            "/availability/instructor/calendar",
            post(connect_calendar).delete(disconnect_calendar),
        )
}
