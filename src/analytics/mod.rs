//! Mock usage figures for the dashboard charts. Nothing here is measured;
//! every number is drawn from the supplied RNG.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::devices::{Device, DeviceType, PowerState};

/// USD per kWh used for the cost estimate
const PRICE_PER_KWH: f64 = 0.12;
/// A type consuming this much more than the per-type average is flagged
const ABNORMAL_FACTOR: f64 = 1.2;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStats {
    /// Watts
    pub power_usage: u32,
    /// Hours
    pub runtime: u32,
    pub last_updated: String,
}

/// Simulated live stats: zero while the device is off.
pub fn device_stats<R: Rng>(device: &Device, rng: &mut R, now: DateTime<Utc>) -> DeviceStats {
    let (power_usage, runtime) = match device.status {
        PowerState::On => (rng.gen_range(5..=100), rng.gen_range(1..=24)),
        PowerState::Off => (0, 0),
    };
    DeviceStats {
        power_usage,
        runtime,
        last_updated: now.to_rfc3339(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Consumer {
    #[serde(rename = "type")]
    pub kind: DeviceType,
    pub consumption: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PowerReport {
    /// Watts per device type
    pub by_type: BTreeMap<DeviceType, f64>,
    /// Watts per hour of day, 24 entries
    pub hourly: Vec<f64>,
    pub total: f64,
    pub highest_consumer: Option<Consumer>,
    pub abnormal_types: Vec<DeviceType>,
    /// Daily cost in USD
    pub cost_estimate: f64,
}

/// (base watts, variance) for each type
fn base_load(kind: DeviceType) -> (f64, f64) {
    match kind {
        DeviceType::Light => (10.0, 5.0),
        DeviceType::Thermostat => (1000.0, 500.0),
        DeviceType::Security => (5.0, 2.0),
        DeviceType::Camera => (15.0, 5.0),
        DeviceType::Lock => (5.0, 2.0),
        DeviceType::Sensor => (2.0, 1.0),
    }
}

/// Build a simulated daily consumption report for `devices`. With no devices a
/// small default household is assumed so the charts are never empty.
pub fn power_report<R: Rng>(devices: &[Device], rng: &mut R) -> PowerReport {
    // busier between 07:00 and 22:00
    let pattern: Vec<f64> = (0..24)
        .map(|hour| {
            if (7..=22).contains(&hour) {
                0.8 + rng.gen::<f64>() * 0.4
            } else {
                0.3 + rng.gen::<f64>() * 0.3
            }
        })
        .collect();

    let mut by_type: BTreeMap<DeviceType, f64> = BTreeMap::new();
    if devices.is_empty() {
        for (kind, count) in [
            (DeviceType::Light, 5.0),
            (DeviceType::Thermostat, 1.0),
            (DeviceType::Security, 2.0),
        ] {
            by_type.insert(kind, base_load(kind).0 * count);
        }
    } else {
        for device in devices {
            let (base, variance) = base_load(device.kind);
            let load = base + (rng.gen::<f64>() - 0.5) * variance;
            *by_type.entry(device.kind).or_default() += load;
        }
    }

    let total: f64 = by_type.values().sum();
    let hourly = pattern.iter().map(|factor| total * factor).collect();

    let highest_consumer = by_type
        .iter()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(kind, consumption)| Consumer {
            kind: *kind,
            consumption: *consumption,
        });

    let average = total / by_type.len() as f64;
    let abnormal_types = by_type
        .iter()
        .filter(|(_, c)| **c > average * ABNORMAL_FACTOR)
        .map(|(kind, _)| *kind)
        .collect();

    PowerReport {
        by_type,
        hourly,
        total,
        highest_consumer,
        abnormal_types,
        cost_estimate: total * 24.0 * PRICE_PER_KWH / 1000.0,
    }
}
