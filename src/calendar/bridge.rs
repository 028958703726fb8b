//! External calendar bridge.
//!
//! Owns the `ExternalCalendarLink` lifecycle and keeps the busy-interval
//! cache near-real-time via provider push notifications, so availability
//! queries never poll the provider.

use std::sync::Arc;

use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::availability::Interval;
use crate::calendar::provider::{CalendarProvider, ProviderBusyEvent, ProviderError};
use crate::db::models::{BookingRecord, ExternalBusyEvent, ExternalCalendarLink};
use crate::db::DatabaseError;
use crate::store::{BusyCacheStore, CalendarLinkStore};

/// State value of the provider's subscription handshake message.
const SYNC_STATE: &str = "sync";

const PULL_ATTEMPTS: u32 = 3;
const PULL_BACKOFF: std::time::Duration = std::time::Duration::from_millis(200);

/// Cap on provider calls made on the booking path; mirroring must never
/// stall a committed booking.
const MIRROR_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Notification for a resource we never subscribed to.
    #[error("unknown webhook resource")]
    UnknownResource,

    /// Resource found but the channel id does not match the stored one;
    /// possibly a forged or stale message.
    #[error("webhook channel identity mismatch")]
    ChannelMismatch,

    #[error("no calendar link for instructor")]
    NotLinked,

    #[error(transparent)]
    Store(#[from] DatabaseError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// Subscription handshake; acknowledged without a cache refresh.
    Handshake,
    /// Identity verified; a busy-interval refresh has been scheduled.
    RefreshScheduled,
}

pub struct CalendarBridge {
    provider: Arc<dyn CalendarProvider>,
    links: Arc<dyn CalendarLinkStore>,
    busy_cache: Arc<dyn BusyCacheStore>,
    sync_horizon: Duration,
}

impl CalendarBridge {
    pub fn new(
        provider: Arc<dyn CalendarProvider>,
        links: Arc<dyn CalendarLinkStore>,
        busy_cache: Arc<dyn BusyCacheStore>,
        sync_horizon_days: i64,
    ) -> Self {
        Self {
            provider,
            links,
            busy_cache,
            sync_horizon: Duration::days(sync_horizon_days),
        }
    }

    /// Exchange an authorization grant for durable credentials, open a
    /// push channel and persist the link. Priming the busy cache is
    /// best-effort; the webhook will catch us up.
    pub async fn connect(&self, instructor_id: Uuid, auth_code: &str) -> Result<(), BridgeError> {
        let grant = self.provider.exchange_grant(auth_code).await?;
        let lease = self.provider.open_channel(&grant.access_token).await?;

        let link = ExternalCalendarLink {
            instructor_id,
            provider_account_id: grant.provider_account_id,
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            token_expiry: grant.token_expiry,
            webhook_channel_id: lease.channel_id,
            webhook_resource_id: lease.resource_id,
            channel_expiry: lease.expiry,
            created_at: OffsetDateTime::now_utc(),
        };
        self.links.upsert(link).await?;
        info!(%instructor_id, "external calendar connected");

        if let Err(err) = self.refresh_busy(instructor_id).await {
            warn!(%instructor_id, %err, "initial busy-interval pull failed");
        }
        Ok(())
    }

    /// Handle a provider push notification. The sender is untrusted:
    /// identity is established by looking up the resource id and
    /// comparing the stored channel id, before any side effect.
    pub fn on_notification(
        self: &Arc<Self>,
        resource_id: &str,
        channel_id: &str,
        state: &str,
    ) -> impl std::future::Future<Output = Result<NotificationOutcome, BridgeError>> {
        let bridge = Arc::clone(self);
        let resource_id = resource_id.to_string();
        let channel_id = channel_id.to_string();
        let state = state.to_string();
        async move {
            let link = bridge
                .links
                .find_by_resource(&resource_id)
                .await?
                .ok_or(BridgeError::UnknownResource)?;

            if link.webhook_channel_id != channel_id {
                warn!(
                    resource_id,
                    notified_channel = channel_id,
                    stored_channel = link.webhook_channel_id,
                    instructor_id = %link.instructor_id,
                    "webhook channel mismatch; possible forged or stale notification"
                );
                return Err(BridgeError::ChannelMismatch);
            }

            if state == SYNC_STATE {
                return Ok(NotificationOutcome::Handshake);
            }

            // Refresh off the request path so the provider gets its ack
            // promptly; a slow pull must not suspend the subscription.
            let instructor_id = link.instructor_id;
            tokio::spawn(async move {
                if let Err(err) = bridge.refresh_busy(instructor_id).await {
                    error!(%instructor_id, %err, "webhook-triggered busy refresh failed");
                }
            });
            Ok(NotificationOutcome::RefreshScheduled)
        }
    }

    /// Pull busy intervals for the sync window and replace the cache.
    pub async fn refresh_busy(&self, instructor_id: Uuid) -> Result<(), BridgeError> {
        let link = self
            .links
            .get(instructor_id)
            .await?
            .ok_or(BridgeError::NotLinked)?;

        let token = match self.ensure_token(&link).await {
            Ok(token) => token,
            Err(ProviderError::AuthRevoked) => {
                self.handle_revoked(&link).await?;
                return Err(BridgeError::Provider(ProviderError::AuthRevoked));
            }
            Err(err) => return Err(err.into()),
        };

        let events = match self.pull_with_retry(&token, self.sync_window()).await {
            Ok(events) => events,
            Err(ProviderError::AuthRevoked) => {
                self.handle_revoked(&link).await?;
                return Err(BridgeError::Provider(ProviderError::AuthRevoked));
            }
            Err(err) => return Err(err.into()),
        };

        let rows = events
            .into_iter()
            .map(|e| ExternalBusyEvent {
                id: Uuid::now_v7(),
                instructor_id,
                event_id: e.event_id,
                start_time: e.start,
                end_time: e.end,
            })
            .collect::<Vec<_>>();
        let count = rows.len();
        self.busy_cache.replace(instructor_id, rows).await?;
        info!(%instructor_id, events = count, "busy-interval cache refreshed");
        Ok(())
    }

    /// Re-subscribe every channel expiring before `now + lead`. A link
    /// whose renewal fails degrades to "no external data": its cache is
    /// purged so queries fall back to templates/blocks/ledger instead of
    /// serving stale intervals.
    pub async fn renew_channels(&self, lead: Duration) -> Result<(), DatabaseError> {
        let cutoff = OffsetDateTime::now_utc() + lead;
        let expiring = self.links.expiring_before(cutoff).await?;

        for link in expiring {
            let instructor_id = link.instructor_id;
            match self.renew_one(&link).await {
                Ok(()) => info!(%instructor_id, "webhook channel renewed"),
                Err(BridgeError::Provider(ProviderError::AuthRevoked)) => {
                    // handle_revoked already dropped the link.
                    warn!(%instructor_id, "grant revoked upstream; link disconnected");
                }
                Err(err) => {
                    warn!(%instructor_id, %err, "channel renewal failed; degrading to no external data");
                    self.busy_cache.purge(instructor_id).await?;
                }
            }
        }
        Ok(())
    }

    async fn renew_one(&self, link: &ExternalCalendarLink) -> Result<(), BridgeError> {
        let token = match self.ensure_token(link).await {
            Ok(token) => token,
            Err(ProviderError::AuthRevoked) => {
                self.handle_revoked(link).await?;
                return Err(BridgeError::Provider(ProviderError::AuthRevoked));
            }
            Err(err) => return Err(err.into()),
        };

        if let Err(err) = self
            .provider
            .stop_channel(&token, &link.webhook_channel_id, &link.webhook_resource_id)
            .await
        {
            // The old channel may already be gone; renewal proceeds.
            warn!(instructor_id = %link.instructor_id, %err, "stopping expiring channel failed");
        }

        let lease = self.provider.open_channel(&token).await?;
        self.links
            .update_channel(
                link.instructor_id,
                &lease.channel_id,
                &lease.resource_id,
                lease.expiry,
            )
            .await?;
        Ok(())
    }

    /// Revoke credentials best-effort and delete the link. Upstream
    /// revocation failure is logged, never fatal.
    pub async fn disconnect(&self, instructor_id: Uuid) -> Result<(), BridgeError> {
        let link = self
            .links
            .get(instructor_id)
            .await?
            .ok_or(BridgeError::NotLinked)?;

        if let Ok(token) = self.ensure_token(&link).await {
            if let Err(err) = self
                .provider
                .stop_channel(&token, &link.webhook_channel_id, &link.webhook_resource_id)
                .await
            {
                warn!(%instructor_id, %err, "stopping webhook channel failed during disconnect");
            }
        }
        if let Err(err) = self.provider.revoke(&link.refresh_token).await {
            warn!(%instructor_id, %err, "upstream credential revocation failed");
        }

        self.links.delete(instructor_id).await?;
        self.busy_cache.purge(instructor_id).await?;
        info!(%instructor_id, "external calendar disconnected");
        Ok(())
    }

    /// Mirror a committed booking onto the instructor's calendar.
    /// Strictly best-effort and time-bounded: the ledger insert is
    /// authoritative and has already happened.
    pub async fn mirror_booking(&self, booking: &BookingRecord) -> Option<String> {
        let link = match self.links.get(booking.instructor_id).await {
            Ok(Some(link)) => link,
            Ok(None) => return None,
            Err(err) => {
                warn!(booking_id = %booking.id, %err, "link lookup failed; booking not mirrored");
                return None;
            }
        };
        let token = match self.ensure_token(&link).await {
            Ok(token) => token,
            Err(err) => {
                warn!(booking_id = %booking.id, %err, "token refresh failed; booking not mirrored");
                return None;
            }
        };

        let summary = format!("Lesson: {}", booking.student_name);
        let window = Interval::new(booking.start_time, booking.end_time);
        match tokio::time::timeout(
            MIRROR_TIMEOUT,
            self.provider.create_event(&token, &summary, window),
        )
        .await
        {
            Ok(Ok(event_id)) => Some(event_id),
            Ok(Err(err)) => {
                warn!(booking_id = %booking.id, %err, "booking mirror failed");
                None
            }
            Err(_) => {
                warn!(booking_id = %booking.id, "booking mirror timed out");
                None
            }
        }
    }

    /// Remove the mirrored event after a cancellation. Best-effort.
    pub async fn unmirror_booking(&self, booking: &BookingRecord) {
        let Some(event_id) = booking.external_event_id.as_deref() else {
            return;
        };
        let link = match self.links.get(booking.instructor_id).await {
            Ok(Some(link)) => link,
            _ => return,
        };
        let token = match self.ensure_token(&link).await {
            Ok(token) => token,
            Err(err) => {
                warn!(booking_id = %booking.id, %err, "token refresh failed; mirror not removed");
                return;
            }
        };
        match tokio::time::timeout(
            MIRROR_TIMEOUT,
            self.provider.delete_event(&token, event_id),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(booking_id = %booking.id, %err, "mirror removal failed"),
            Err(_) => warn!(booking_id = %booking.id, "mirror removal timed out"),
        }
    }

    /// A valid access token for the link, refreshing when expired.
    async fn ensure_token(&self, link: &ExternalCalendarLink) -> Result<String, ProviderError> {
        if !link.token_expired(OffsetDateTime::now_utc()) {
            return Ok(link.access_token.clone());
        }
        let refreshed = self
            .provider
            .refresh_access_token(&link.refresh_token)
            .await?;
        if let Err(err) = self
            .links
            .update_tokens(
                link.instructor_id,
                &refreshed.access_token,
                refreshed.token_expiry,
            )
            .await
        {
            warn!(instructor_id = %link.instructor_id, %err, "persisting refreshed token failed");
        }
        Ok(refreshed.access_token)
    }

    /// Hard auth failure: the grant is gone upstream. The link flips to
    /// disconnected and the cache is purged; never silently swallowed.
    async fn handle_revoked(&self, link: &ExternalCalendarLink) -> Result<(), DatabaseError> {
        error!(
            instructor_id = %link.instructor_id,
            "provider grant revoked upstream; disconnecting link"
        );
        self.links.delete(link.instructor_id).await?;
        self.busy_cache.purge(link.instructor_id).await?;
        Ok(())
    }

    async fn pull_with_retry(
        &self,
        token: &str,
        window: Interval,
    ) -> Result<Vec<ProviderBusyEvent>, ProviderError> {
        let mut delay = PULL_BACKOFF;
        let mut attempt = 1;
        loop {
            match self.provider.list_busy(token, window).await {
                Ok(events) => return Ok(events),
                Err(err) if err.is_transient() && attempt < PULL_ATTEMPTS => {
                    warn!(attempt, %err, "transient provider error; retrying busy pull");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn sync_window(&self) -> Interval {
        let start = OffsetDateTime::now_utc()
            .date()
            .midnight()
            .assume_utc();
        Interval::new(start, start + self.sync_horizon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, InMemoryStores, MockProvider};
    use time::macros::datetime;

    fn bridge(stores: &InMemoryStores, provider: Arc<MockProvider>) -> Arc<CalendarBridge> {
        Arc::new(CalendarBridge::new(
            provider,
            stores.links.clone(),
            stores.busy_cache.clone(),
            60,
        ))
    }

    #[tokio::test]
    async fn unknown_resource_is_rejected_without_side_effects() {
        let stores = InMemoryStores::new();
        let provider = Arc::new(MockProvider::default());
        let bridge = bridge(&stores, provider.clone());

        let err = bridge
            .on_notification("res-unknown", "chan-1", "exists")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnknownResource));
        assert_eq!(provider.list_busy_calls(), 0);
    }

    #[tokio::test]
    async fn channel_mismatch_is_rejected() {
        let stores = InMemoryStores::new();
        let instructor = fixtures::instructor_id();
        stores.add_link(instructor, "res-1", "chan-good").await;
        let provider = Arc::new(MockProvider::default());
        let bridge = bridge(&stores, provider.clone());

        let err = bridge
            .on_notification("res-1", "chan-forged", "exists")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::ChannelMismatch));
        assert_eq!(provider.list_busy_calls(), 0);
    }

    #[tokio::test]
    async fn sync_handshake_acks_without_refresh() {
        let stores = InMemoryStores::new();
        let instructor = fixtures::instructor_id();
        stores.add_link(instructor, "res-1", "chan-1").await;
        let provider = Arc::new(MockProvider::default());
        let bridge = bridge(&stores, provider.clone());

        let outcome = bridge
            .on_notification("res-1", "chan-1", "sync")
            .await
            .unwrap();
        assert_eq!(outcome, NotificationOutcome::Handshake);
        assert_eq!(provider.list_busy_calls(), 0);
    }

    #[tokio::test]
    async fn verified_change_notification_schedules_refresh() {
        let stores = InMemoryStores::new();
        let instructor = fixtures::instructor_id();
        stores.add_link(instructor, "res-1", "chan-1").await;
        let provider = Arc::new(MockProvider::default());
        let bridge = bridge(&stores, provider.clone());

        let outcome = bridge
            .on_notification("res-1", "chan-1", "exists")
            .await
            .unwrap();
        assert_eq!(outcome, NotificationOutcome::RefreshScheduled);
    }

    #[tokio::test]
    async fn refresh_replaces_cache_from_provider() {
        let stores = InMemoryStores::new();
        let instructor = fixtures::instructor_id();
        stores.add_link(instructor, "res-1", "chan-1").await;
        // A stale cached interval that the refresh must displace.
        stores
            .add_busy_event(instructor, datetime!(2026-03-01 08:00 UTC), datetime!(2026-03-01 09:00 UTC))
            .await;

        let provider = Arc::new(MockProvider::default());
        provider
            .set_busy(vec![(
                "evt-1",
                datetime!(2026-03-02 10:00 UTC),
                datetime!(2026-03-02 11:00 UTC),
            )]);
        let bridge = bridge(&stores, provider.clone());

        bridge.refresh_busy(instructor).await.unwrap();

        let cached = stores.all_busy(instructor).await;
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].event_id, "evt-1");
        assert_eq!(cached[0].start_time, datetime!(2026-03-02 10:00 UTC));
    }

    #[tokio::test]
    async fn transient_pull_failures_retry_then_succeed() {
        let stores = InMemoryStores::new();
        let instructor = fixtures::instructor_id();
        stores.add_link(instructor, "res-1", "chan-1").await;

        let provider = Arc::new(MockProvider::default());
        provider.fail_list_busy_times(2);
        let bridge = bridge(&stores, provider.clone());

        bridge.refresh_busy(instructor).await.unwrap();
        assert_eq!(provider.list_busy_calls(), 3);
    }

    #[tokio::test]
    async fn revoked_grant_disconnects_link_and_purges_cache() {
        let stores = InMemoryStores::new();
        let instructor = fixtures::instructor_id();
        stores
            .add_expired_token_link(instructor, "res-1", "chan-1")
            .await;
        stores
            .add_busy_event(instructor, datetime!(2026-03-02 10:00 UTC), datetime!(2026-03-02 11:00 UTC))
            .await;

        let provider = Arc::new(MockProvider::default());
        provider.revoke_grant();
        let bridge = bridge(&stores, provider.clone());

        let err = bridge.refresh_busy(instructor).await.unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Provider(ProviderError::AuthRevoked)
        ));
        assert!(stores.links.get(instructor).await.unwrap().is_none());
        assert!(stores.all_busy(instructor).await.is_empty());
    }

    #[tokio::test]
    async fn failed_renewal_degrades_to_no_external_data() {
        let stores = InMemoryStores::new();
        let instructor = fixtures::instructor_id();
        stores.add_link(instructor, "res-1", "chan-1").await;
        stores
            .add_busy_event(instructor, datetime!(2026-03-02 10:00 UTC), datetime!(2026-03-02 11:00 UTC))
            .await;

        let provider = Arc::new(MockProvider::default());
        provider.fail_open_channel();
        let bridge = bridge(&stores, provider.clone());

        bridge.renew_channels(Duration::days(365)).await.unwrap();

        // Link survives for a later retry, but no stale busy data is served.
        assert!(stores.links.get(instructor).await.unwrap().is_some());
        assert!(stores.all_busy(instructor).await.is_empty());
    }

    #[tokio::test]
    async fn renewal_rewrites_channel_identity() {
        let stores = InMemoryStores::new();
        let instructor = fixtures::instructor_id();
        stores.add_link(instructor, "res-old", "chan-old").await;

        let provider = Arc::new(MockProvider::default());
        let bridge = bridge(&stores, provider.clone());

        bridge.renew_channels(Duration::days(365)).await.unwrap();

        let link = stores.links.get(instructor).await.unwrap().unwrap();
        assert_ne!(link.webhook_resource_id, "res-old");
        assert_ne!(link.webhook_channel_id, "chan-old");
        assert!(link.channel_expiry > OffsetDateTime::now_utc());
    }

    #[tokio::test]
    async fn connect_persists_link_and_primes_cache() {
        let stores = InMemoryStores::new();
        let instructor = fixtures::instructor_id();
        let provider = Arc::new(MockProvider::default());
        provider.set_busy(vec![(
            "evt-9",
            datetime!(2026-03-02 10:00 UTC),
            datetime!(2026-03-02 11:00 UTC),
        )]);
        let bridge = bridge(&stores, provider.clone());

        bridge.connect(instructor, "auth-code").await.unwrap();

        let link = stores.links.get(instructor).await.unwrap().unwrap();
        assert_eq!(link.instructor_id, instructor);
        assert_eq!(stores.all_busy(instructor).await.len(), 1);
    }

    #[tokio::test]
    async fn disconnect_survives_upstream_revocation_failure() {
        let stores = InMemoryStores::new();
        let instructor = fixtures::instructor_id();
        stores.add_link(instructor, "res-1", "chan-1").await;

        let provider = Arc::new(MockProvider::default());
        provider.fail_revoke();
        let bridge = bridge(&stores, provider.clone());

        bridge.disconnect(instructor).await.unwrap();
        assert!(stores.links.get(instructor).await.unwrap().is_none());
    }
}
