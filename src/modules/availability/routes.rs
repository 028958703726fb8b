use axum::{
    routing::{get, post, put},
    Router,
};

use super::handlers::{
    create_manual_block, create_weekly_hours, delete_weekly_hours, get_availability,
    list_weekly_hours, update_weekly_hours,
};
use crate::app_state::AppState;

pub fn availability_routes() -> Router<AppState> {
    Router::new()
        .route("/availability/:date", get(get_availability))
        .route("/availability/manual-block", post(create_manual_block))
        .route(
            "/availability/instructor/weekly-hours",
            get(list_weekly_hours).post(create_weekly_hours),
        )
        .route(
            "/availability/instructor/weekly-hours/:id",
            put(update_weekly_hours).delete(delete_weekly_hours),
        )
}
