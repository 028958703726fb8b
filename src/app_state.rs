use std::sync::Arc;

use sqlx::PgPool;

use crate::availability::AvailabilityEngine;
use crate::booking::BookingCoordinator;
use crate::calendar::CalendarBridge;
use crate::config::Config;
use crate::store::{InstructorStore, ManualBlockStore, TemplateStore};

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub env: &'static Config,
    pub engine: Arc<AvailabilityEngine>,
    pub coordinator: Arc<BookingCoordinator>,
    pub bridge: Arc<CalendarBridge>,
    pub instructors: Arc<dyn InstructorStore>,
    pub templates: Arc<dyn TemplateStore>,
    pub blocks: Arc<dyn ManualBlockStore>,
}
