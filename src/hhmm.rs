//! Serde adapter storing a time of day as `"HH:MM"`.
//!
//! Older snapshots written by the browser dashboard hold full ISO timestamps
//! for time-restriction bounds; those are read back as their local time of day.

use chrono::{DateTime, Local, NaiveTime, Timelike};
use serde::{de, Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.format("%H:%M").to_string())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse(&raw).ok_or_else(|| de::Error::custom(format!("invalid time of day `{raw}`")))
}

/// Parse `HH:MM`, `HH:MM:SS` or an RFC 3339 timestamp, truncated to the minute.
pub fn parse(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    let time = NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&Local).time())
        })?;
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0)
}

/// Minutes since midnight.
pub fn minutes(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}
