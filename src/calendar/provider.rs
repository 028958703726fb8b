//! Calendar provider client.
//!
//! `CalendarProvider` is the seam between the bridge and the outside
//! world; `GoogleCalendarProvider` implements it against the Calendar v3
//! API (events list, push channels, OAuth token endpoint).

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretBox};
use serde_json::json;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};
use uuid::Uuid;

use crate::availability::Interval;
use crate::config::CalendarConfig;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("access token rejected by provider")]
    Unauthorized,

    #[error("authorization grant revoked upstream")]
    AuthRevoked,

    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Worth retrying with backoff: network trouble or a 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http(_) => true,
            ProviderError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Durable credentials handed back for an authorization grant.
#[derive(Debug, Clone)]
pub struct GrantExchange {
    pub provider_account_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expiry: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct TokenRefresh {
    pub access_token: String,
    pub token_expiry: OffsetDateTime,
}

/// A provider-managed push-notification registration.
#[derive(Debug, Clone)]
pub struct ChannelLease {
    pub channel_id: String,
    pub resource_id: String,
    pub expiry: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct ProviderBusyEvent {
    pub event_id: String,
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn exchange_grant(&self, auth_code: &str) -> Result<GrantExchange, ProviderError>;

    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenRefresh, ProviderError>;

    /// Open a push channel delivering change notifications to our
    /// webhook endpoint.
    async fn open_channel(&self, access_token: &str) -> Result<ChannelLease, ProviderError>;

    async fn stop_channel(
        &self,
        access_token: &str,
        channel_id: &str,
        resource_id: &str,
    ) -> Result<(), ProviderError>;

    /// Busy intervals on the primary calendar inside `window`.
    async fn list_busy(
        &self,
        access_token: &str,
        window: Interval,
    ) -> Result<Vec<ProviderBusyEvent>, ProviderError>;

    async fn create_event(
        &self,
        access_token: &str,
        summary: &str,
        window: Interval,
    ) -> Result<String, ProviderError>;

    async fn delete_event(&self, access_token: &str, event_id: &str)
        -> Result<(), ProviderError>;

    async fn revoke(&self, refresh_token: &str) -> Result<(), ProviderError>;
}

pub struct GoogleCalendarProvider {
    http: Client,
    client_id: String,
    client_secret: SecretBox<String>,
    redirect_uri: String,
    webhook_address: String,
    api_base: String,
    token_url: String,
    revoke_url: String,
}

impl GoogleCalendarProvider {
    pub fn from_config(config: &CalendarConfig) -> Self {
        Self {
            http: Client::new(),
            client_id: config.client_id.clone(),
            client_secret: SecretBox::new(Box::new(
                config.client_secret.expose_secret().clone(),
            )),
            redirect_uri: config.redirect_uri.clone(),
            webhook_address: config.webhook_address.clone(),
            api_base: config
                .api_base_override
                .clone()
                .unwrap_or_else(|| "https://www.googleapis.com/calendar/v3".to_string()),
            token_url: config
                .token_url_override
                .clone()
                .unwrap_or_else(|| "https://oauth2.googleapis.com/token".to_string()),
            revoke_url: config
                .revoke_url_override
                .clone()
                .unwrap_or_else(|| "https://oauth2.googleapis.com/revoke".to_string()),
        }
    }

    async fn checked(response: Response) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ProviderError::Unauthorized);
        }
        let message = response.text().await.unwrap_or_default();
        if message.contains("invalid_grant") {
            return Err(ProviderError::AuthRevoked);
        }
        Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        })
    }

    fn parse_expires_in(body: &serde_json::Value) -> OffsetDateTime {
        let seconds = body["expires_in"].as_i64().unwrap_or(3600);
        OffsetDateTime::now_utc() + Duration::seconds(seconds)
    }

    /// Google sends event boundaries either as `dateTime` (RFC 3339) or,
    /// for all-day events, as `date` (exclusive end).
    fn parse_boundary(value: &serde_json::Value) -> Result<OffsetDateTime, ProviderError> {
        if let Some(s) = value["dateTime"].as_str() {
            return OffsetDateTime::parse(s, &Rfc3339)
                .map_err(|_| ProviderError::Malformed(format!("bad dateTime: {s}")));
        }
        if let Some(s) = value["date"].as_str() {
            let date = Date::parse(s, format_description!("[year]-[month]-[day]"))
                .map_err(|_| ProviderError::Malformed(format!("bad date: {s}")))?;
            return Ok(date.midnight().assume_utc());
        }
        Err(ProviderError::Malformed(
            "event boundary missing dateTime/date".to_string(),
        ))
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendarProvider {
    async fn exchange_grant(&self, auth_code: &str) -> Result<GrantExchange, ProviderError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("code", auth_code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret().as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;
        let body: serde_json::Value = Self::checked(response).await?.json().await?;

        let access_token = body["access_token"]
            .as_str()
            .ok_or_else(|| ProviderError::Malformed("missing access_token".to_string()))?
            .to_string();
        let refresh_token = body["refresh_token"]
            .as_str()
            .ok_or_else(|| ProviderError::Malformed("missing refresh_token".to_string()))?
            .to_string();
        let token_expiry = Self::parse_expires_in(&body);

        // The primary calendar's id is the account identity.
        let response = self
            .http
            .get(format!("{}/calendars/primary", self.api_base))
            .bearer_auth(&access_token)
            .send()
            .await?;
        let calendar: serde_json::Value = Self::checked(response).await?.json().await?;
        let provider_account_id = calendar["id"]
            .as_str()
            .ok_or_else(|| ProviderError::Malformed("missing calendar id".to_string()))?
            .to_string();

        Ok(GrantExchange {
            provider_account_id,
            access_token,
            refresh_token,
            token_expiry,
        })
    }

    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<TokenRefresh, ProviderError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret().as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;
        let body: serde_json::Value = Self::checked(response).await?.json().await?;

        let access_token = body["access_token"]
            .as_str()
            .ok_or_else(|| ProviderError::Malformed("missing access_token".to_string()))?
            .to_string();
        Ok(TokenRefresh {
            access_token,
            token_expiry: Self::parse_expires_in(&body),
        })
    }

    async fn open_channel(&self, access_token: &str) -> Result<ChannelLease, ProviderError> {
        let channel_id = Uuid::now_v7().to_string();
        let response = self
            .http
            .post(format!("{}/calendars/primary/events/watch", self.api_base))
            .bearer_auth(access_token)
            .json(&json!({
                "id": channel_id,
                "type": "web_hook",
                "address": self.webhook_address,
            }))
            .send()
            .await?;
        let body: serde_json::Value = Self::checked(response).await?.json().await?;

        let resource_id = body["resourceId"]
            .as_str()
            .ok_or_else(|| ProviderError::Malformed("missing resourceId".to_string()))?
            .to_string();
        // `expiration` is epoch milliseconds, serialized as a string.
        let expiry = body["expiration"]
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .or_else(|| body["expiration"].as_i64())
            .and_then(|ms| OffsetDateTime::from_unix_timestamp(ms / 1000).ok())
            .ok_or_else(|| ProviderError::Malformed("missing expiration".to_string()))?;

        Ok(ChannelLease {
            channel_id,
            resource_id,
            expiry,
        })
    }

    async fn stop_channel(
        &self,
        access_token: &str,
        channel_id: &str,
        resource_id: &str,
    ) -> Result<(), ProviderError> {
        let response = self
            .http
            .post(format!("{}/channels/stop", self.api_base))
            .bearer_auth(access_token)
            .json(&json!({ "id": channel_id, "resourceId": resource_id }))
            .send()
            .await?;
        // A channel that already lapsed is as good as stopped.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::checked(response).await.map(|_| ())
    }

    async fn list_busy(
        &self,
        access_token: &str,
        window: Interval,
    ) -> Result<Vec<ProviderBusyEvent>, ProviderError> {
        let time_min = window
            .start
            .format(&Rfc3339)
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let time_max = window
            .end
            .format(&Rfc3339)
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let response = self
            .http
            .get(format!("{}/calendars/primary/events", self.api_base))
            .bearer_auth(access_token)
            .query(&[
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
            ])
            .send()
            .await?;
        let body: serde_json::Value = Self::checked(response).await?.json().await?;

        let items = body["items"]
            .as_array()
            .ok_or_else(|| ProviderError::Malformed("missing items".to_string()))?;

        let mut events = Vec::with_capacity(items.len());
        for item in items {
            if item["status"].as_str() == Some("cancelled") {
                continue;
            }
            // Transparent events do not block time.
            if item["transparency"].as_str() == Some("transparent") {
                continue;
            }
            let event_id = item["id"]
                .as_str()
                .ok_or_else(|| ProviderError::Malformed("missing event id".to_string()))?
                .to_string();
            events.push(ProviderBusyEvent {
                event_id,
                start: Self::parse_boundary(&item["start"])?,
                end: Self::parse_boundary(&item["end"])?,
            });
        }
        Ok(events)
    }

    async fn create_event(
        &self,
        access_token: &str,
        summary: &str,
        window: Interval,
    ) -> Result<String, ProviderError> {
        let start = window
            .start
            .format(&Rfc3339)
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let end = window
            .end
            .format(&Rfc3339)
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let response = self
            .http
            .post(format!("{}/calendars/primary/events", self.api_base))
            .bearer_auth(access_token)
            .json(&json!({
                "summary": summary,
                "start": { "dateTime": start },
                "end": { "dateTime": end },
            }))
            .send()
            .await?;
        let body: serde_json::Value = Self::checked(response).await?.json().await?;

        body["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Malformed("missing event id".to_string()))
    }

    async fn delete_event(
        &self,
        access_token: &str,
        event_id: &str,
    ) -> Result<(), ProviderError> {
        let response = self
            .http
            .delete(format!(
                "{}/calendars/primary/events/{}",
                self.api_base, event_id
            ))
            .bearer_auth(access_token)
            .send()
            .await?;
        // Already-gone events are fine; this is a best-effort mirror.
        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::GONE) {
            return Ok(());
        }
        Self::checked(response).await.map(|_| ())
    }

    async fn revoke(&self, refresh_token: &str) -> Result<(), ProviderError> {
        let response = self
            .http
            .post(&self.revoke_url)
            .form(&[("token", refresh_token)])
            .send()
            .await?;
        Self::checked(response).await.map(|_| ())
    }
}
