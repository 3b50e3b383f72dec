// ── Device command encoding ──
//
// Builds the typed commands published to a device's `/in` topic. Pure
// functions of their inputs: the caller supplies the clock reading.

use chrono::{DateTime, Utc};

use mysa_api::DeviceMode;
use mysa_api::realtime::payload::{
    ChangeDeviceState, ChangeStateBody, Endpoint, StartPublishingDeviceStatus, StateCommand, msg,
    msg_type,
};
use mysa_api::rest::models::DeviceBase;

/// `src.type` for commands issued by a user account.
const SOURCE_TYPE_USER: i64 = 100;
/// `dest.type` for a thermostat.
const DEST_TYPE_DEVICE: i64 = 1;
/// Ask the device to acknowledge with a state report.
const RESPONSE_REQUESTED: i64 = 2;
const ENVELOPE_VERSION: &str = "1.0";
const BODY_VERSION: i64 = 1;
/// Sent as-is in every state command; the device ignores its value.
const TM_SENTINEL: i64 = -1;

/// Builds outbound device commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceCommandEncoder;

impl DeviceCommandEncoder {
    /// A set-point / mode change for `device`, issued by `username`.
    ///
    /// Modes without a wire code are left out of the command.
    pub fn change_state(
        device: &DeviceBase,
        username: &str,
        set_point: Option<f64>,
        mode: Option<DeviceMode>,
        now: DateTime<Utc>,
    ) -> ChangeDeviceState {
        ChangeDeviceState {
            msg: msg::DEVICE_STATE_CHANGE,
            id: now.timestamp_millis(),
            time: now.timestamp(),
            ver: ENVELOPE_VERSION.into(),
            src: Endpoint {
                reference: username.to_owned(),
                kind: SOURCE_TYPE_USER,
            },
            dest: Endpoint {
                reference: device.id.clone(),
                kind: DEST_TYPE_DEVICE,
            },
            resp: RESPONSE_REQUESTED,
            body: ChangeStateBody {
                ver: BODY_VERSION,
                kind: Self::body_type_for_model(&device.model),
                cmd: vec![StateCommand {
                    tm: TM_SENTINEL,
                    sp: set_point,
                    md: mode.and_then(DeviceMode::wire_code),
                }],
            },
        }
    }

    /// Ask `device_id` to stream status reports for `timeout_secs`.
    pub fn start_publishing(
        device_id: &str,
        timeout_secs: u64,
        now: DateTime<Utc>,
    ) -> StartPublishingDeviceStatus {
        StartPublishingDeviceStatus {
            msg_type: msg_type::START_PUBLISHING_DEVICE_STATUS,
            device: device_id.to_owned(),
            timestamp: now.timestamp(),
            timeout: timeout_secs,
        }
    }

    /// Hardware revision code carried in `body.type`.
    pub fn body_type_for_model(model: &str) -> i64 {
        if model.starts_with("BB-V1") {
            1
        } else if model.starts_with("BB-V2") {
            if model.ends_with("-L") { 5 } else { 4 }
        } else {
            0
        }
    }
}
