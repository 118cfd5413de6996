use chrono::{Datelike, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::devices::{Day, Device};
use crate::hhmm;

/// How strictly a device is supervised once its policy is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// Never togglable
    Blocked,
    /// Togglable outside blocked days and time windows
    #[default]
    #[serde(alias = "unrestricted")]
    Supervised,
    /// Same gating as supervised; usage is only observed
    Monitored,
}

/// A daily window during which toggling is denied. Both bounds are inclusive.
/// A window whose end is before its start runs overnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn contains(&self, at: NaiveTime) -> bool {
        let now = hhmm::minutes(at);
        let start = hhmm::minutes(self.start);
        let end = hhmm::minutes(self.end);
        if start <= end {
            start <= now && now <= end
        } else {
            now >= start || now <= end
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Override {
    pub enabled: bool,
    pub password: String,
}

/// Parental-control configuration attached to a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AccessPolicy {
    pub enabled: bool,
    pub access_level: AccessLevel,
    pub blocked_days: BTreeSet<Day>,
    pub time_restrictions: Vec<TimeWindow>,
    /// Advisory only: usage is not accumulated anywhere.
    pub max_usage_hours: f64,
    pub notifications: bool,
    #[serde(rename = "override")]
    pub override_: Override,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        AccessPolicy {
            enabled: false,
            access_level: AccessLevel::Supervised,
            blocked_days: BTreeSet::new(),
            time_restrictions: Vec::new(),
            max_usage_hours: 2.0,
            notifications: true,
            override_: Override::default(),
        }
    }
}

impl AccessPolicy {
    /// True when `password` unlocks this policy's override.
    pub fn override_accepts(&self, password: Option<&str>) -> bool {
        match password {
            Some(given) => {
                self.override_.enabled
                    && !self.override_.password.is_empty()
                    && self.override_.password == given
            }
            None => false,
        }
    }
}

// ─── Evaluation ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenyReason {
    Blocked,
    BlockedDay {
        day: Day,
    },
    TimeRestricted {
        #[serde(with = "hhmm")]
        start: NaiveTime,
        #[serde(with = "hhmm")]
        end: NaiveTime,
    },
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::Blocked => write!(f, "device access is blocked"),
            DenyReason::BlockedDay { day } => write!(f, "device is blocked on {day}"),
            DenyReason::TimeRestricted { start, end } => write!(
                f,
                "device is restricted between {} and {}",
                start.format("%H:%M"),
                end.format("%H:%M")
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Permitted,
    /// Denied by policy, but the caller presented the override password
    Overridden(DenyReason),
    Denied(DenyReason),
}

impl AccessDecision {
    pub fn is_permitted(&self) -> bool {
        !matches!(self, AccessDecision::Denied(_))
    }
}

/// Decide whether a toggle is allowed at local time `now` under `policy`.
pub fn evaluate(policy: Option<&AccessPolicy>, now: NaiveDateTime) -> AccessDecision {
    let policy = match policy {
        Some(p) if p.enabled => p,
        _ => return AccessDecision::Permitted,
    };

    if policy.access_level == AccessLevel::Blocked {
        return AccessDecision::Denied(DenyReason::Blocked);
    }

    let today = Day::from(now.weekday());
    if policy.blocked_days.contains(&today) {
        return AccessDecision::Denied(DenyReason::BlockedDay { day: today });
    }

    let at = now.time();
    match policy.time_restrictions.iter().find(|w| w.contains(at)) {
        Some(window) => AccessDecision::Denied(DenyReason::TimeRestricted {
            start: window.start,
            end: window.end,
        }),
        None => AccessDecision::Permitted,
    }
}

/// Like [`evaluate`], but a denial is lifted when `override_password` matches.
pub fn evaluate_with_override(
    policy: Option<&AccessPolicy>,
    now: NaiveDateTime,
    override_password: Option<&str>,
) -> AccessDecision {
    match evaluate(policy, now) {
        AccessDecision::Denied(reason)
            if policy.is_some_and(|p| p.override_accepts(override_password)) =>
        {
            AccessDecision::Overridden(reason)
        }
        decision => decision,
    }
}

/// Whether `device` may change power state at local time `now`.
pub fn can_toggle(device: &Device, now: NaiveDateTime) -> bool {
    evaluate(device.parental_controls.as_ref(), now).is_permitted()
}
