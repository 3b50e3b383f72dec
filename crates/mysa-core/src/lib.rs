//! Session, realtime transport and event layer between `mysa-api` and
//! consumers such as the `mysa` CLI.
//!
//! - **[`MysaClient`]**: the account-level facade, assembled by
//!   [`ClientBuilder`]. It owns one of each component below and exposes
//!   REST reads, [`set_device_state`](MysaClient::set_device_state), serial
//!   lookups and realtime start/stop.
//!
//! - **[`SessionManager`]**: holds the Cognito token set, refreshes it
//!   single-flight when the JWT expiry passes, and announces every change
//!   on the [`EventBus`]. Snapshots ([`Session`]) are what callers persist.
//!
//! - **[`TransportConnection`]**: one lazily opened MQTT connection
//!   (`Disconnected`, `Connecting` with a shared future, `Connected`) that
//!   clears itself when the broker drops it. Publishes retry once on a
//!   lost connection.
//!
//! - **[`SubscriptionManager`]**: per-device `/out` subscriptions plus a
//!   cancellable keepalive task that re-requests streaming before the
//!   device's window lapses.
//!
//! - **[`EventBus`]**: per-client broadcast channels for session changes,
//!   raw payloads, [`Status`], [`SetPointChange`] and [`StateChange`].
//!
//! - **[`DeviceCommandEncoder`]**: builds the outbound state-change and
//!   start-publishing commands for a device model.

pub mod client;
pub mod command;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod session;
pub mod subscription;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::{ClientBuilder, MysaClient};
pub use command::DeviceCommandEncoder;
pub use config::{ClientConfig, MqttTuning, RealtimeConfig};
pub use connection::{ConnectionStatus, TransportConnection};
pub use error::CoreError;
pub use events::{EventBus, SetPointChange, StateChange, Status};
pub use session::{Clock, Session, SessionManager, SystemClock};
pub use subscription::SubscriptionManager;

// Wire types callers need to drive the client.
pub use mysa_api::realtime::InboundEnvelope;
pub use mysa_api::rest::models::{
    DeviceBase, DeviceState, DeviceStates, Devices, FirmwareDevice, Firmwares, TimestampedValue,
};
pub use mysa_api::{DeviceMode, ThingDescription};
