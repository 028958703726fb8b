use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tracing::info;

mod app;
mod app_state;
mod availability;
mod booking;
mod calendar;
mod config;
mod db;
mod error;
mod middleware;
mod modules;
mod store;
mod telemetry;
#[cfg(test)]
mod testing;

use availability::AvailabilityEngine;
use booking::BookingCoordinator;
use calendar::{renewal::spawn_renewal_task, CalendarBridge, GoogleCalendarProvider};
use db::repositories::{
    PgAppointmentTypeStore, PgBookingLedger, PgBusyCacheStore, PgCalendarLinkStore,
    PgInstructorStore, PgManualBlockStore, PgTemplateStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = config::init().context("Failed to load configuration")?;

    let _telemetry = telemetry::init_telemetry(None)
        .await
        .context("Failed to initialize telemetry")?;

    let pool = db::init_pool()
        .await
        .context("Failed to initialize database")?;

    let instructors = Arc::new(PgInstructorStore::new(pool.clone()));
    let appointment_types = Arc::new(PgAppointmentTypeStore::new(pool.clone()));
    let templates = Arc::new(PgTemplateStore::new(pool.clone()));
    let blocks = Arc::new(PgManualBlockStore::new(pool.clone()));
    let ledger = Arc::new(PgBookingLedger::new(pool.clone()));
    let links = Arc::new(PgCalendarLinkStore::new(pool.clone()));
    let busy_cache = Arc::new(PgBusyCacheStore::new(pool.clone()));

    let engine = Arc::new(AvailabilityEngine::new(
        templates.clone(),
        blocks.clone(),
        busy_cache.clone(),
        ledger.clone(),
    ));

    let provider = Arc::new(GoogleCalendarProvider::from_config(&config.calendar));
    let bridge = Arc::new(CalendarBridge::new(
        provider,
        links,
        busy_cache,
        config.calendar.sync_horizon_days,
    ));

    let coordinator = Arc::new(BookingCoordinator::new(
        engine.clone(),
        ledger,
        appointment_types,
        bridge.clone(),
    ));

    spawn_renewal_task(
        bridge.clone(),
        std::time::Duration::from_secs(config.calendar.renewal_check_interval_secs),
        time::Duration::minutes(config.calendar.channel_renewal_lead_minutes),
    );

    let state = app_state::AppState {
        db: pool,
        env: config,
        engine,
        coordinator,
        bridge,
        instructors,
        templates,
        blocks,
    };

    let router = app::create_router(state);

    let addr = config.server_addr();
    info!("{} listening on {}", config.app.name, addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("Failed to serve application")?;

    Ok(())
}
