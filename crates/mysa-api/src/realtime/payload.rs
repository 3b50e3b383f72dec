// Realtime wire types
//
// Thermostats speak two JSON dialects over MQTT. First-generation firmware
// uses flat PascalCase objects discriminated by `MsgType`; current firmware
// uses nested camelCase objects discriminated by `msg`. Both are modeled
// here in their native shapes, and the codec picks between them.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

// ── Message codes ────────────────────────────────────────────────────

/// `MsgType` codes carried by the flat (first-generation) schema.
pub mod msg_type {
    pub const DEVICE_V1_STATUS: i64 = 0;
    pub const DEVICE_SETPOINT_CHANGE: i64 = 1;
    pub const DEVICE_LOG: i64 = 4;
    pub const DEVICE_POST_BOOT: i64 = 10;
    pub const START_PUBLISHING_DEVICE_STATUS: i64 = 11;
}

/// `msg` codes carried by the nested (current) schema.
pub mod msg {
    pub const DEVICE_V2_STATUS: i64 = 40;
    /// Shared by the device report and the cloud-to-device command.
    pub const DEVICE_STATE_CHANGE: i64 = 44;
}

// ── Common pieces ────────────────────────────────────────────────────

/// `src` / `dest` addressing in the nested schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(rename = "ref")]
    pub reference: String,
    /// Devices omit this on some reports.
    #[serde(rename = "type", default)]
    pub kind: i64,
}

/// Thermostat operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeviceMode {
    Off,
    Heat,
    Cool,
    Dry,
    FanOnly,
    Auto,
}

impl DeviceMode {
    /// The `md` code sent to the device. Only `off` and `heat` have one.
    pub fn wire_code(self) -> Option<i64> {
        match self {
            Self::Off => Some(1),
            Self::Heat => Some(3),
            Self::Cool | Self::Dry | Self::FanOnly | Self::Auto => None,
        }
    }

    /// Map a reported `md` code back to a mode.
    pub fn from_wire_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Off),
            3 => Some(Self::Heat),
            _ => None,
        }
    }
}

// ── Device reports: flat schema ──────────────────────────────────────

/// Periodic status from first-generation thermostats (`MsgType` 0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceV1Status {
    pub device: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
    pub main_temp: f64,
    #[serde(default)]
    pub thermistor_temp: Option<f64>,
    #[serde(default)]
    pub combo_temp: Option<f64>,
    pub humidity: f64,
    #[serde(default)]
    pub current: Option<f64>,
    pub set_point: f64,
    #[serde(default)]
    pub stream: Option<i64>,
}

/// Set-point adjustment (`MsgType` 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceSetpointChange {
    pub device: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub source: Option<i64>,
    pub prev: f64,
    pub next: f64,
}

/// Firmware log line (`MsgType` 4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceLog {
    pub device: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub message: String,
}

/// Sent once after the device boots (`MsgType` 10).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DevicePostBoot {
    pub device: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

// ── Device reports: nested schema ────────────────────────────────────

/// Periodic status from current thermostats (`msg` 40).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceV2Status {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub ver: Option<String>,
    pub src: Endpoint,
    pub body: V2StatusBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V2StatusBody {
    pub amb_temp: f64,
    #[serde(default)]
    pub dty_cycle: Option<f64>,
    pub hum: f64,
    pub stpt: f64,
}

/// State report after a change (`msg` 44).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStateChange {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub ver: Option<String>,
    pub src: Endpoint,
    pub body: StateChangeBody,
}

/// Only `state.sp` is interpreted; the remaining numbers are carried as
/// reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangeBody {
    pub state: ReportedState,
    #[serde(default)]
    pub success: Option<f64>,
    #[serde(default)]
    pub trig_src: Option<f64>,
    #[serde(rename = "type", default)]
    pub kind: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedState {
    /// Brightness.
    #[serde(default)]
    pub br: Option<f64>,
    #[serde(default)]
    pub ho: Option<f64>,
    /// Lock.
    #[serde(default)]
    pub lk: Option<f64>,
    /// Mode code, see [`DeviceMode::from_wire_code`].
    #[serde(default)]
    pub md: Option<i64>,
    pub sp: f64,
    /// Fan speed, AC controllers only.
    #[serde(rename = "fn", default)]
    pub fan: Option<i64>,
}

/// A typed device report.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    V1Status(DeviceV1Status),
    SetpointChange(DeviceSetpointChange),
    Log(DeviceLog),
    PostBoot(DevicePostBoot),
    V2Status(DeviceV2Status),
    StateChange(DeviceStateChange),
    /// A well-formed envelope with a code this client does not interpret.
    Unrecognized { code: i64 },
}

// ── Commands: cloud to device ────────────────────────────────────────

/// Asks the device to stream status for `timeout` seconds (`MsgType` 11).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StartPublishingDeviceStatus {
    pub msg_type: i64,
    pub device: String,
    pub timestamp: i64,
    pub timeout: u64,
}

/// Set-point / mode command (`msg` 44).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeDeviceState {
    pub msg: i64,
    /// Milliseconds since the epoch.
    pub id: i64,
    /// Seconds since the epoch.
    pub time: i64,
    pub ver: String,
    pub src: Endpoint,
    pub dest: Endpoint,
    pub resp: i64,
    pub body: ChangeStateBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeStateBody {
    pub ver: i64,
    /// Hardware revision code.
    #[serde(rename = "type")]
    pub kind: i64,
    pub cmd: Vec<StateCommand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateCommand {
    pub tm: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md: Option<i64>,
}

/// Anything that can be published to `/v1/dev/{id}/in`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundCommand {
    StartPublishing(StartPublishingDeviceStatus),
    ChangeState(ChangeDeviceState),
}

impl From<StartPublishingDeviceStatus> for OutboundCommand {
    fn from(cmd: StartPublishingDeviceStatus) -> Self {
        Self::StartPublishing(cmd)
    }
}

impl From<ChangeDeviceState> for OutboundCommand {
    fn from(cmd: ChangeDeviceState) -> Self {
        Self::ChangeState(cmd)
    }
}

// ── Topics ───────────────────────────────────────────────────────────

/// Topic a device publishes its reports on.
pub fn device_out_topic(device_id: &str) -> String {
    format!("/v1/dev/{device_id}/out")
}

/// Topic a device listens for commands on.
pub fn device_in_topic(device_id: &str) -> String {
    format!("/v1/dev/{device_id}/in")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use std::str::FromStr;

    use super::*;

    #[test]
    fn mode_wire_codes() {
        assert_eq!(DeviceMode::Off.wire_code(), Some(1));
        assert_eq!(DeviceMode::Heat.wire_code(), Some(3));
        assert_eq!(DeviceMode::Cool.wire_code(), None);
        assert_eq!(DeviceMode::from_wire_code(3), Some(DeviceMode::Heat));
        assert_eq!(DeviceMode::from_wire_code(2), None);
    }

    #[test]
    fn mode_parses_from_snake_case() {
        assert_eq!(DeviceMode::from_str("fan_only").unwrap(), DeviceMode::FanOnly);
        assert_eq!(DeviceMode::Heat.to_string(), "heat");
        assert!(DeviceMode::from_str("turbo").is_err());
    }

    #[test]
    fn topics() {
        assert_eq!(device_out_topic("abc"), "/v1/dev/abc/out");
        assert_eq!(device_in_topic("abc"), "/v1/dev/abc/in");
    }
}
