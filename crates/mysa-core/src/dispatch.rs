// Realtime payload dispatch
//
// Runs inline on the transport's reader task for every message on a
// device's `/out` topic. Each parsed payload is published raw first, then
// the typed event derived from it. Decode failures are logged and
// dropped; they never reach the transport or other devices.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use mysa_api::DeviceMode;
use mysa_api::realtime::{InboundMessage, codec};

use crate::events::{EventBus, SetPointChange, StateChange, Status};

/// Decode one payload and emit the resulting events.
pub fn handle_payload(events: &EventBus, payload: &[u8]) {
    let envelope = match codec::parse(payload) {
        Ok(envelope) => Arc::new(envelope),
        Err(e) => {
            warn!(error = %e, "discarding undecodable realtime payload");
            return;
        }
    };

    events.emit_raw_message(Arc::clone(&envelope));

    match codec::classify(&envelope) {
        Ok(Some(message)) => route(events, message),
        Ok(None) => trace!("envelope carries no usable discriminator"),
        Err(e) => warn!(error = %e, "discarding malformed realtime payload"),
    }
}

fn route(events: &EventBus, message: InboundMessage) {
    match message {
        InboundMessage::V1Status(s) => events.emit_status(Status {
            device_id: s.device,
            temperature: s.main_temp,
            humidity: s.humidity,
            set_point: s.set_point,
            current: s.current,
            duty_cycle: None,
        }),
        InboundMessage::SetpointChange(c) => events.emit_set_point_change(SetPointChange {
            device_id: c.device,
            new_set_point: c.next,
            previous_set_point: c.prev,
        }),
        InboundMessage::V2Status(s) => events.emit_status(Status {
            device_id: s.src.reference,
            temperature: s.body.amb_temp,
            humidity: s.body.hum,
            set_point: s.body.stpt,
            current: None,
            duty_cycle: s.body.dty_cycle,
        }),
        InboundMessage::StateChange(c) => events.emit_state_change(StateChange {
            device_id: c.src.reference,
            mode: c.body.state.md.and_then(DeviceMode::from_wire_code),
            set_point: c.body.state.sp,
            fan_speed: c.body.state.fan,
        }),
        InboundMessage::Log(log) => {
            debug!(device_id = %log.device, level = %log.level, "device log: {}", log.message);
        }
        InboundMessage::PostBoot(boot) => info!(device_id = %boot.device, "device rebooted"),
        InboundMessage::Unrecognized { code } => trace!(code, "unhandled realtime message"),
    }
}
