// Mysa REST response types
//
// The REST API speaks PascalCase JSON keyed by device id. Most fields vary
// by model and firmware, so nearly everything is optional and unknown keys
// land in `extra`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Devices ──────────────────────────────────────────────────────────

/// Response of `GET /devices`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Devices {
    #[serde(rename = "DevicesObj", default)]
    pub devices: BTreeMap<String, DeviceBase>,
}

/// A device registered to the account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceBase {
    pub id: String,
    /// Model identifier, e.g. `BB-V1-1`, `BB-V2-0`, `BB-V2-0-L`.
    pub model: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub voltage: Option<f64>,
    #[serde(default)]
    pub max_current: Option<String>,
    #[serde(default)]
    pub heater_type: Option<String>,
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub allowed_users: Option<Vec<String>>,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub min_setpoint: Option<f64>,
    #[serde(default)]
    pub max_setpoint: Option<f64>,
    #[serde(default)]
    pub min_brightness: Option<f64>,
    #[serde(default)]
    pub max_brightness: Option<f64>,
    #[serde(default)]
    pub mode: Option<ModeObj>,
    #[serde(default)]
    pub last_paired: Option<i64>,
    #[serde(default)]
    pub measured_voltage: Option<f64>,
    #[serde(default)]
    pub is_thermostatic: Option<bool>,
    #[serde(default)]
    pub setup_required: Option<bool>,
    /// Present on AC controllers.
    #[serde(default)]
    pub brand: Option<BrandInfo>,
    /// Present on AC controllers.
    #[serde(default)]
    pub supported_caps: Option<SupportedCaps>,
    #[serde(default)]
    pub code_num: Option<i64>,
    /// Catch-all for button tuning, animation and other rarely used keys.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModeObj {
    #[serde(rename = "Id")]
    pub id: i64,
}

/// Manufacturer details for AC units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrandInfo {
    #[serde(rename = "Brand")]
    pub brand: String,
    #[serde(rename = "Id")]
    pub id: i64,
    #[serde(rename = "remoteModelNumber", default)]
    pub remote_model_number: Option<String>,
    #[serde(rename = "OEMBrand", default)]
    pub oem_brand: Option<String>,
}

/// Operating envelope of an AC unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedCaps {
    /// `[min, max]` in device units.
    pub temp_range: (f64, f64),
    #[serde(default)]
    pub modes: BTreeMap<String, ModeCaps>,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub keys: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeCaps {
    #[serde(default)]
    pub temperatures: Vec<f64>,
}

// ── Firmware ─────────────────────────────────────────────────────────

/// Response of `GET /devices/firmware`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Firmwares {
    #[serde(rename = "Firmware", default)]
    pub firmware: BTreeMap<String, FirmwareDevice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FirmwareDevice {
    pub device: String,
    pub installed_version: String,
}

// ── State ────────────────────────────────────────────────────────────

/// Response of `GET /devices/state`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceStates {
    #[serde(rename = "DeviceStatesObj", default)]
    pub states: BTreeMap<String, DeviceState>,
}

/// A reading paired with the epoch second it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimestampedValue<T> {
    pub t: i64,
    pub v: T,
}

/// Last reported state of one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceState {
    pub device: String,
    pub timestamp: i64,
    #[serde(default)]
    pub on_time: Option<TimestampedValue<f64>>,
    #[serde(default)]
    pub off_time: Option<TimestampedValue<f64>>,
    #[serde(default)]
    pub set_point: Option<TimestampedValue<f64>>,
    #[serde(default)]
    pub brightness: Option<TimestampedValue<f64>>,
    #[serde(default)]
    pub schedule_mode: Option<TimestampedValue<f64>>,
    #[serde(default)]
    pub hold_time: Option<TimestampedValue<f64>>,
    #[serde(default)]
    pub rssi: Option<TimestampedValue<f64>>,
    #[serde(default)]
    pub tstat_mode: Option<TimestampedValue<f64>>,
    #[serde(default)]
    pub free_heap: Option<TimestampedValue<f64>>,
    #[serde(default)]
    pub sensor_temp: Option<TimestampedValue<f64>>,
    #[serde(default)]
    pub mode: Option<TimestampedValue<f64>>,
    #[serde(default)]
    pub voltage: Option<TimestampedValue<f64>>,
    #[serde(default)]
    pub corrected_temp: Option<TimestampedValue<f64>>,
    #[serde(default)]
    pub duty: Option<TimestampedValue<f64>>,
    #[serde(default)]
    pub heat_sink: Option<TimestampedValue<f64>>,
    #[serde(default)]
    pub connected: Option<TimestampedValue<bool>>,
    #[serde(default)]
    pub current: Option<TimestampedValue<f64>>,
    #[serde(default)]
    pub humidity: Option<TimestampedValue<f64>>,
    #[serde(default)]
    pub lock: Option<TimestampedValue<f64>>,
    #[serde(default)]
    pub fan_speed: Option<TimestampedValue<f64>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}
