use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, Time};
use uuid::Uuid;
use validator::Validate;

/// Recurring weekly availability window. Several templates may share a
/// weekday; the engine unions them. `day_of_week` runs 0..=6, 0 = Sunday.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct WeeklyAvailabilityTemplate {
    pub id: Uuid,
    pub instructor_id: Uuid,
    pub day_of_week: i16,
    #[serde(with = "hms")]
    pub start_time: Time,
    #[serde(with = "hms")]
    pub end_time: Time,
    pub active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewWeeklyTemplate {
    #[validate(range(min = 0, max = 6, message = "day_of_week must be 0..=6"))]
    pub day_of_week: i16,
    #[serde(with = "hms")]
    pub start_time: Time,
    #[serde(with = "hms")]
    pub end_time: Time,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateWeeklyTemplate {
    #[validate(range(min = 0, max = 6, message = "day_of_week must be 0..=6"))]
    pub day_of_week: Option<i16>,
    #[serde(default, with = "hms::option")]
    pub start_time: Option<Time>,
    #[serde(default, with = "hms::option")]
    pub end_time: Option<Time>,
    pub active: Option<bool>,
}

/// Wall-clock times travel as `HH:MM:SS`; `HH:MM` is accepted on input.
pub mod hms {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use time::format_description::FormatItem;
    use time::macros::format_description;
    use time::Time;

    const FULL: &[FormatItem<'static>] = format_description!("[hour]:[minute]:[second]");
    const SHORT: &[FormatItem<'static>] = format_description!("[hour]:[minute]");

    pub fn parse(value: &str) -> Result<Time, time::error::Parse> {
        Time::parse(value, &FULL).or_else(|_| Time::parse(value, &SHORT))
    }

    pub fn format(value: &Time) -> String {
        value.format(&FULL).unwrap_or_else(|_| value.to_string())
    }

    pub fn serialize<S: Serializer>(value: &Time, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Time, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(|_| de::Error::custom(format!("invalid time of day: {raw}")))
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<Time>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(t) => serializer.serialize_some(&super::format(t)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Time>, D::Error> {
            let raw: Option<String> = Option::deserialize(deserializer)?;
            raw.map(|s| {
                super::parse(&s).map_err(|_| de::Error::custom(format!("invalid time of day: {s}")))
            })
            .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::hms;
    use time::macros::time;

    #[test]
    fn parses_with_and_without_seconds() {
        assert_eq!(hms::parse("09:30").unwrap(), time!(09:30));
        assert_eq!(hms::parse("09:30:15").unwrap(), time!(09:30:15));
        assert!(hms::parse("9am").is_err());
    }

    #[test]
    fn formats_normalized_to_hms() {
        assert_eq!(hms::format(&time!(17:00)), "17:00:00");
    }
}
