pub mod bridge;
pub mod provider;
pub mod renewal;

pub use bridge::{BridgeError, CalendarBridge, NotificationOutcome};
pub use provider::{CalendarProvider, GoogleCalendarProvider, ProviderError};
