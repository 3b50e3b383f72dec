// Realtime message layer
//
// Wire types for both firmware dialects and the codec that turns raw MQTT
// payloads into typed messages and outbound commands into bytes.

pub mod codec;
pub mod payload;

pub use codec::{InboundEnvelope, Schema};
pub use payload::{DeviceMode, InboundMessage, OutboundCommand};
