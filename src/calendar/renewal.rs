use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::calendar::bridge::CalendarBridge;

/// Spawn the background sweep that re-subscribes webhook channels before
/// they lapse. Runs for the life of the process.
pub fn spawn_renewal_task(
    bridge: Arc<CalendarBridge>,
    check_interval: std::time::Duration,
    lead: time::Duration,
) -> JoinHandle<()> {
    info!(
        check_interval_secs = check_interval.as_secs(),
        lead_minutes = lead.whole_minutes(),
        "starting channel renewal task"
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = bridge.renew_channels(lead).await {
                error!(%err, "channel renewal sweep failed");
            }
        }
    })
}
