use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::hhmm;
use crate::permissions::AccessPolicy;

pub mod service;
pub mod store;

pub use service::{DeviceError, DeviceService, DeviceSummary, ToggleOutcome};
pub use store::DeviceStore;

// ─── Enumerations ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Light,
    Thermostat,
    Security,
    Camera,
    Lock,
    Sensor,
}

impl DeviceType {
    pub const ALL: [DeviceType; 6] = [
        DeviceType::Light,
        DeviceType::Thermostat,
        DeviceType::Security,
        DeviceType::Camera,
        DeviceType::Lock,
        DeviceType::Sensor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Light => "light",
            DeviceType::Thermostat => "thermostat",
            DeviceType::Security => "security",
            DeviceType::Camera => "camera",
            DeviceType::Lock => "lock",
            DeviceType::Sensor => "sensor",
        }
    }
}

impl FromStr for DeviceType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        DeviceType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or(())
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Room {
    LivingRoom,
    Kitchen,
    Bedroom,
    Bathroom,
    Office,
    Garage,
    Outdoor,
}

impl Room {
    pub const ALL: [Room; 7] = [
        Room::LivingRoom,
        Room::Kitchen,
        Room::Bedroom,
        Room::Bathroom,
        Room::Office,
        Room::Garage,
        Room::Outdoor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Room::LivingRoom => "living_room",
            Room::Kitchen => "kitchen",
            Room::Bedroom => "bedroom",
            Room::Bathroom => "bathroom",
            Room::Office => "office",
            Room::Garage => "garage",
            Room::Outdoor => "outdoor",
        }
    }
}

/// Accepts both the stored value (`living_room`) and the display label (`Living Room`).
impl FromStr for Room {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Room::ALL
            .into_iter()
            .find(|r| r.as_str() == wanted)
            .ok_or(())
    }
}

impl<'de> Deserialize<'de> for Room {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse()
            .map_err(|()| serde::de::Error::custom(format!("unknown room '{raw}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    On,
    #[default]
    Off,
}

impl PowerState {
    pub fn flipped(self) -> Self {
        match self {
            PowerState::On => PowerState::Off,
            PowerState::Off => PowerState::On,
        }
    }
}

/// Weekday, serialized by its full English name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Day {
    #[serde(alias = "Sun")]
    Sunday,
    #[serde(alias = "Mon")]
    Monday,
    #[serde(alias = "Tue")]
    Tuesday,
    #[serde(alias = "Wed")]
    Wednesday,
    #[serde(alias = "Thu")]
    Thursday,
    #[serde(alias = "Fri")]
    Friday,
    #[serde(alias = "Sat")]
    Saturday,
}

impl Day {
    pub fn name(&self) -> &'static str {
        match self {
            Day::Sunday => "Sunday",
            Day::Monday => "Monday",
            Day::Tuesday => "Tuesday",
            Day::Wednesday => "Wednesday",
            Day::Thursday => "Thursday",
            Day::Friday => "Friday",
            Day::Saturday => "Saturday",
        }
    }
}

impl From<chrono::Weekday> for Day {
    fn from(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Sun => Day::Sunday,
            chrono::Weekday::Mon => Day::Monday,
            chrono::Weekday::Tue => Day::Tuesday,
            chrono::Weekday::Wed => Day::Wednesday,
            chrono::Weekday::Thu => Day::Thursday,
            chrono::Weekday::Fri => Day::Friday,
            chrono::Weekday::Sat => Day::Saturday,
        }
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub action: PowerState,
    #[serde(default)]
    pub days: BTreeSet<Day>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Per-device preferences from the device settings dialog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DevicePreferences {
    pub auto_off: bool,
    /// Minutes
    pub auto_off_duration: u32,
    pub notify_on_state: bool,
    /// 0-100
    pub brightness: u8,
    pub color: String,
}

impl Default for DevicePreferences {
    fn default() -> Self {
        DevicePreferences {
            auto_off: false,
            auto_off_duration: 60,
            notify_on_state: false,
            brightness: 100,
            color: "#ffffff".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(deserialize_with = "text_or_number")]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DeviceType,
    pub room: Room,
    #[serde(default)]
    pub status: PowerState,
    #[serde(default)]
    pub power_consumption: f64,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parental_controls: Option<AccessPolicy>,
    #[serde(default)]
    pub settings: DevicePreferences,
    #[serde(default)]
    pub added_at: String,
}

/// Ids written by older clients may be bare millisecond timestamps.
fn text_or_number<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

impl Device {
    /// True when an enabled parental-control policy is attached.
    pub fn is_restricted(&self) -> bool {
        self.parental_controls.as_ref().is_some_and(|p| p.enabled)
    }

    /// Check the invariants a stored record must hold.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = ValidationError::default();
        if self.name.trim().is_empty() {
            errors.add("name", "Name is required");
        }
        if !self.power_consumption.is_finite() || self.power_consumption < 0.0 {
            errors.add("powerConsumption", "Power consumption must be a non-negative number");
        }
        validate_preferences(&self.settings, &mut errors);
        if let Some(policy) = &self.parental_controls {
            validate_policy(policy, &mut errors);
        }
        errors.into_result()
    }
}

pub(crate) fn validate_preferences(prefs: &DevicePreferences, errors: &mut ValidationError) {
    if prefs.brightness > 100 {
        errors.add("settings.brightness", "Brightness must be between 0 and 100");
    }
    let hex = prefs.color.strip_prefix('#').unwrap_or("");
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        errors.add("settings.color", "Color must look like #rrggbb");
    }
}

pub(crate) fn validate_policy(policy: &AccessPolicy, errors: &mut ValidationError) {
    if !policy.max_usage_hours.is_finite() || !(0.0..=24.0).contains(&policy.max_usage_hours) {
        errors.add(
            "parentalControls.maxUsageHours",
            "Maximum usage must be between 0 and 24 hours",
        );
    }
    if policy.override_.enabled && policy.override_.password.is_empty() {
        errors.add(
            "parentalControls.override.password",
            "An override password is required when override is enabled",
        );
    }
}

/// Fields a caller supplies when adding a device. Type and room arrive as
/// free text so unknown values can be reported per field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewDevice {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub room: String,
    pub power_consumption: Option<f64>,
    pub schedule: Vec<ScheduleEntry>,
    pub settings: Option<DevicePreferences>,
}

impl NewDevice {
    /// Validate and build the stored record with system-assigned fields.
    pub fn into_device(self, id: String, added_at: String) -> Result<Device, ValidationError> {
        let mut errors = ValidationError::default();

        let kind = if self.kind.trim().is_empty() {
            errors.add("type", "Device type is required");
            None
        } else {
            let parsed = self.kind.parse::<DeviceType>().ok();
            if parsed.is_none() {
                errors.add("type", format!("Unknown device type '{}'", self.kind));
            }
            parsed
        };

        let room = if self.room.trim().is_empty() {
            errors.add("room", "Room is required");
            None
        } else {
            let parsed = self.room.parse::<Room>().ok();
            if parsed.is_none() {
                errors.add("room", format!("Unknown room '{}'", self.room));
            }
            parsed
        };

        if self.name.trim().is_empty() {
            errors.add("name", "Name is required");
        }

        let (Some(kind), Some(room)) = (kind, room) else {
            return Err(errors);
        };

        let device = Device {
            id,
            name: self.name.trim().to_string(),
            kind,
            room,
            status: PowerState::Off,
            power_consumption: self.power_consumption.unwrap_or(0.0),
            schedule: self.schedule,
            parental_controls: Some(AccessPolicy::default()),
            settings: self.settings.unwrap_or_default(),
            added_at,
        };

        if let Err(more) = device.validate() {
            errors.merge(more);
        }
        errors.into_result().map(|()| device)
    }
}

// ─── Validation errors ───────────────────────────────────────────────────────

/// Field-level validation messages, keyed by the JSON field name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("validation failed: {}", describe(.fields))]
pub struct ValidationError {
    pub fields: BTreeMap<String, String>,
}

fn describe(fields: &BTreeMap<String, String>) -> String {
    fields
        .iter()
        .map(|(field, msg)| format!("{field}: {msg}"))
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn merge(&mut self, other: ValidationError) {
        for (field, message) in other.fields {
            self.fields.entry(field).or_insert(message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}
