// ── Event bus ──
//
// One bus per client. Each named event is its own broadcast channel, so
// every subscriber gets an independent receiver: a lagging or dropped
// consumer loses only its own messages and never blocks the emitter.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use mysa_api::DeviceMode;
use mysa_api::realtime::InboundEnvelope;

use crate::session::Session;

const DEFAULT_CAPACITY: usize = 256;

/// Current readings from either device schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub device_id: String,
    pub temperature: f64,
    pub humidity: f64,
    pub set_point: f64,
    /// Heater current, legacy schema only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
    /// Heater duty cycle, current schema only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duty_cycle: Option<f64>,
}

/// A set-point change reported by a legacy device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPointChange {
    pub device_id: String,
    pub new_set_point: f64,
    pub previous_set_point: f64,
}

/// A mode / set-point change reported by a current-schema device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChange {
    pub device_id: String,
    /// `None` when the device reports a mode code this client does not map.
    pub mode: Option<DeviceMode>,
    pub set_point: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_speed: Option<i64>,
}

/// Typed publish/subscribe hub for client events.
#[derive(Debug, Clone)]
pub struct EventBus {
    session_changed: broadcast::Sender<Option<Session>>,
    raw_message: broadcast::Sender<Arc<InboundEnvelope>>,
    status_changed: broadcast::Sender<Status>,
    set_point_changed: broadcast::Sender<SetPointChange>,
    state_changed: broadcast::Sender<StateChange>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus whose channels each buffer `capacity` events per
    /// receiver before the slowest receiver starts lagging.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            session_changed: broadcast::channel(capacity).0,
            raw_message: broadcast::channel(capacity).0,
            status_changed: broadcast::channel(capacity).0,
            set_point_changed: broadcast::channel(capacity).0,
            state_changed: broadcast::channel(capacity).0,
        }
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// `Some` after a login or refresh, `None` when a login begins.
    pub fn session_changed(&self) -> broadcast::Receiver<Option<Session>> {
        self.session_changed.subscribe()
    }

    /// Every parsed realtime payload, before typed dispatch.
    pub fn raw_message(&self) -> broadcast::Receiver<Arc<InboundEnvelope>> {
        self.raw_message.subscribe()
    }

    pub fn status_changed(&self) -> broadcast::Receiver<Status> {
        self.status_changed.subscribe()
    }

    pub fn set_point_changed(&self) -> broadcast::Receiver<SetPointChange> {
        self.set_point_changed.subscribe()
    }

    pub fn state_changed(&self) -> broadcast::Receiver<StateChange> {
        self.state_changed.subscribe()
    }

    // ── Emission ─────────────────────────────────────────────────────
    //
    // `send` only fails when nobody is listening, which is not an error.

    pub(crate) fn emit_session_changed(&self, session: Option<Session>) {
        if self.session_changed.send(session).is_err() {
            trace!("session_changed emitted with no subscribers");
        }
    }

    pub(crate) fn emit_raw_message(&self, envelope: Arc<InboundEnvelope>) {
        let _ = self.raw_message.send(envelope);
    }

    pub(crate) fn emit_status(&self, status: Status) {
        let _ = self.status_changed.send(status);
    }

    pub(crate) fn emit_set_point_change(&self, change: SetPointChange) {
        let _ = self.set_point_changed.send(change);
    }

    pub(crate) fn emit_state_change(&self, change: StateChange) {
        let _ = self.state_changed.send(change);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn status(device: &str, temperature: f64) -> Status {
        Status {
            device_id: device.into(),
            temperature,
            humidity: 40.0,
            set_point: 21.0,
            current: None,
            duty_cycle: None,
        }
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.emit_status(status("a", 20.0));
        bus.emit_session_changed(None);
    }

    #[test]
    fn every_subscriber_sees_every_event_in_order() {
        let bus = EventBus::default();
        let mut first = bus.status_changed();
        let mut second = bus.status_changed();

        bus.emit_status(status("a", 20.0));
        bus.emit_status(status("a", 20.5));

        for rx in [&mut first, &mut second] {
            assert_eq!(rx.try_recv().unwrap().temperature, 20.0);
            assert_eq!(rx.try_recv().unwrap().temperature, 20.5);
        }
    }

    #[test]
    fn dropped_subscriber_does_not_affect_others() {
        let bus = EventBus::default();
        let dropped = bus.state_changed();
        let mut kept = bus.state_changed();
        drop(dropped);

        bus.emit_state_change(StateChange {
            device_id: "a".into(),
            mode: Some(DeviceMode::Heat),
            set_point: 19.0,
            fan_speed: None,
        });
        assert_eq!(kept.try_recv().unwrap().mode, Some(DeviceMode::Heat));
    }

    #[test]
    fn lagging_subscriber_only_loses_its_own_backlog() {
        let bus = EventBus::new(2);
        let mut slow = bus.status_changed();
        let mut fast = bus.status_changed();

        for i in 0..3 {
            bus.emit_status(status("a", f64::from(i)));
            assert_eq!(fast.try_recv().unwrap().temperature, f64::from(i));
        }
        assert!(matches!(
            slow.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(1))
        ));
        assert_eq!(slow.try_recv().unwrap().temperature, 1.0);
    }

    #[test]
    fn status_serializes_camel_case_without_empty_fields() {
        let json = serde_json::to_value(status("dev", 21.5)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "deviceId": "dev",
                "temperature": 21.5,
                "humidity": 40.0,
                "setPoint": 21.0,
            })
        );
    }
}
