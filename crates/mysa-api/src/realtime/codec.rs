// Realtime payload codec
//
// Inbound decoding happens in two steps. `parse` only checks that the bytes
// are a UTF-8 JSON object, which is enough to publish the raw message.
// `classify` then picks the schema from which discriminator key is present
// and decodes the typed variant. Codes this client does not interpret are
// reported as `Unrecognized`, never as errors.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::realtime::payload::{
    DeviceLog, DevicePostBoot, DeviceSetpointChange, DeviceStateChange, DeviceV1Status,
    DeviceV2Status, InboundMessage, OutboundCommand, msg, msg_type,
};

const LEGACY_KEY: &str = "MsgType";
const CURRENT_KEY: &str = "msg";

/// A decoded but not yet classified inbound payload: always a JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InboundEnvelope(Map<String, Value>);

impl InboundEnvelope {
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// The raw discriminator value for the envelope's schema.
    pub fn code(&self) -> Option<&Value> {
        match discriminate(self) {
            Schema::Legacy => self.0.get(LEGACY_KEY),
            Schema::Current => self.0.get(CURRENT_KEY),
            Schema::Ignored => None,
        }
    }
}

/// Which of the two payload dialects an envelope uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum Schema {
    /// Flat PascalCase objects keyed by `MsgType`.
    Legacy,
    /// Nested objects keyed by `msg`.
    Current,
    /// Neither or both discriminators present.
    Ignored,
}

/// Decode raw bytes into an envelope.
pub fn parse(bytes: &[u8]) -> Result<InboundEnvelope, Error> {
    let text = std::str::from_utf8(bytes).map_err(|e| Error::Decode {
        message: format!("payload is not UTF-8: {e}"),
    })?;
    let value: Value = serde_json::from_str(text).map_err(|e| Error::Decode {
        message: format!("payload is not JSON: {e}"),
    })?;
    match value {
        Value::Object(map) => Ok(InboundEnvelope(map)),
        other => Err(Error::Decode {
            message: format!("payload is not a JSON object: {}", kind_of(&other)),
        }),
    }
}

/// Pick the schema from the discriminator keys.
pub fn discriminate(envelope: &InboundEnvelope) -> Schema {
    let map = envelope.as_map();
    match (map.contains_key(LEGACY_KEY), map.contains_key(CURRENT_KEY)) {
        (true, false) => Schema::Legacy,
        (false, true) => Schema::Current,
        _ => Schema::Ignored,
    }
}

/// Decode the typed message an envelope carries.
///
/// Returns `Ok(None)` for envelopes that belong to neither schema.
pub fn classify(envelope: &InboundEnvelope) -> Result<Option<InboundMessage>, Error> {
    let schema = discriminate(envelope);
    let key = match schema {
        Schema::Legacy => LEGACY_KEY,
        Schema::Current => CURRENT_KEY,
        Schema::Ignored => return Ok(None),
    };

    let code = envelope
        .as_map()
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::Decode {
            message: format!("'{key}' is not an integer"),
        })?;

    let message = match (schema, code) {
        (Schema::Legacy, msg_type::DEVICE_V1_STATUS) => {
            InboundMessage::V1Status(typed::<DeviceV1Status>(envelope, code)?)
        }
        (Schema::Legacy, msg_type::DEVICE_SETPOINT_CHANGE) => {
            InboundMessage::SetpointChange(typed::<DeviceSetpointChange>(envelope, code)?)
        }
        (Schema::Legacy, msg_type::DEVICE_LOG) => {
            InboundMessage::Log(typed::<DeviceLog>(envelope, code)?)
        }
        (Schema::Legacy, msg_type::DEVICE_POST_BOOT) => {
            InboundMessage::PostBoot(typed::<DevicePostBoot>(envelope, code)?)
        }
        (Schema::Current, msg::DEVICE_V2_STATUS) => {
            InboundMessage::V2Status(typed::<DeviceV2Status>(envelope, code)?)
        }
        (Schema::Current, msg::DEVICE_STATE_CHANGE) => {
            InboundMessage::StateChange(typed::<DeviceStateChange>(envelope, code)?)
        }
        _ => InboundMessage::Unrecognized { code },
    };
    Ok(Some(message))
}

/// Encode a command as UTF-8 JSON.
pub fn serialize(command: &OutboundCommand) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(command).map_err(|e| Error::Encode {
        message: e.to_string(),
    })
}

fn typed<T: DeserializeOwned>(envelope: &InboundEnvelope, code: i64) -> Result<T, Error> {
    serde_json::from_value(Value::Object(envelope.0.clone())).map_err(|e| Error::Decode {
        message: format!("message code {code}: {e}"),
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Tests ────────────────────────────────────────────────────────────
