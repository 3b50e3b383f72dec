// MQTT transport
//
// The realtime layer talks to AWS IoT over MQTT 3.1.1 tunnelled through a
// SigV4-presigned WebSocket. Higher layers only see the `MqttConnector` and
// `MqttConnection` traits, so they can run against an in-memory fake.

pub mod packet;
pub mod websocket;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::credentials::TransportCredentials;
use crate::error::Error;

pub use packet::{QoS, topic_matches};
pub use websocket::{AwsIotConnector, WsMqttConnection};

/// Parameters for one connection attempt.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Broker host, e.g. `xxxx-ats.iot.us-east-1.amazonaws.com`.
    pub endpoint: String,
    pub region: String,
    pub client_id: String,
    pub clean_session: bool,
    pub keep_alive: Duration,
    /// How long to wait for PINGRESP before declaring the link dead.
    pub ping_timeout: Duration,
    /// Deadline for CONNACK, SUBACK, UNSUBACK and PUBACK.
    pub operation_timeout: Duration,
}

/// Callback for messages on a subscribed topic: `(topic, payload)`.
///
/// Invoked on the connection's reader task in arrival order, so it must
/// not block.
pub type MessageHandler = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Opens authenticated broker connections.
#[async_trait]
pub trait MqttConnector: Send + Sync {
    async fn connect(
        &self,
        options: &ConnectOptions,
        credentials: &TransportCredentials,
    ) -> Result<Arc<dyn MqttConnection>, Error>;
}

/// An open broker connection.
#[async_trait]
pub trait MqttConnection: Send + Sync {
    /// Publish a message. At-least-once waits for the broker's PUBACK.
    async fn publish(&self, topic: &str, payload: Bytes, qos: QoS) -> Result<(), Error>;

    /// Subscribe to `filter`, routing matching messages to `handler`.
    /// Re-subscribing the same filter replaces its handler.
    async fn subscribe(&self, filter: &str, qos: QoS, handler: MessageHandler)
    -> Result<(), Error>;

    async fn unsubscribe(&self, filter: &str) -> Result<(), Error>;

    /// Cancelled once the connection is gone, for whatever reason.
    fn closed(&self) -> CancellationToken;

    /// Send DISCONNECT and close the socket.
    async fn disconnect(&self) -> Result<(), Error>;
}
