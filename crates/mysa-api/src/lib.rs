//! Async wire layer for the Mysa thermostat cloud.
//!
//! - **[`RestClient`]**: the Mysa REST API (devices, firmware, states),
//!   authorized with the Cognito id token.
//!
//! - **[`Authenticator`]** / **[`CognitoAuthenticator`]**: user pool login
//!   and refresh, yielding a [`TokenSet`] whose expiry comes from the JWT
//!   `exp` claims.
//!
//! - **[`CredentialBroker`]** / **[`CognitoIdentityBroker`]**: exchanges the
//!   id token for short-lived [`TransportCredentials`].
//!
//! - **[`IotClient`]**: the IoT thing registry, used for serial numbers.
//!
//! - **[`mqtt`]**: MQTT 3.1.1 over a SigV4-presigned WebSocket behind the
//!   [`MqttConnector`] and [`MqttConnection`] traits.
//!
//! - **[`realtime`]**: the inbound and outbound payload types for both
//!   wire dialects, plus the codec that parses and classifies them.
//!
//! The AWS services share one `SdkConfig` built by [`sdk_config`].

pub mod auth;
mod aws;
pub mod credentials;
pub mod error;
pub mod http;
pub mod iot;
pub mod mqtt;
pub mod realtime;
pub mod rest;
pub mod sigv4;

pub use auth::{Authenticator, CognitoAuthenticator, TokenSet};
pub use aws::sdk_config;
pub use credentials::{CognitoIdentityBroker, CredentialBroker, TransportCredentials};
pub use error::Error;
pub use http::HttpConfig;
pub use iot::{IotClient, ThingDescription};
pub use mqtt::{ConnectOptions, MessageHandler, MqttConnection, MqttConnector, QoS};
pub use realtime::{DeviceMode, InboundEnvelope, InboundMessage, OutboundCommand, Schema};
pub use rest::RestClient;
