// ── MysaClient ──
//
// The public facade. Wires the session manager, REST client, transport
// connection and subscription manager around one event bus, and exposes
// the account-level operations. Cheaply cloneable; clones share all
// state.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use secrecy::SecretString;
use tracing::{debug, info, warn};
use url::Url;

use mysa_api::mqtt::websocket::AwsIotConnector;
use mysa_api::realtime::codec;
use mysa_api::realtime::payload::device_in_topic;
use mysa_api::rest::models::{DeviceStates, Devices, Firmwares};
use mysa_api::{
    Authenticator, CognitoAuthenticator, CognitoIdentityBroker, CredentialBroker, DeviceMode,
    IotClient, MqttConnector, RestClient,
};

use crate::command::DeviceCommandEncoder;
use crate::config::ClientConfig;
use crate::connection::TransportConnection;
use crate::error::CoreError;
use crate::events::EventBus;
use crate::session::{Clock, Session, SessionManager, SystemClock};
use crate::subscription::SubscriptionManager;

// ── Builder ──────────────────────────────────────────────────────────

/// Assembles a [`MysaClient`]. Every collaborator defaults to the
/// production implementation derived from the [`ClientConfig`].
pub struct ClientBuilder {
    config: ClientConfig,
    events: Option<EventBus>,
    authenticator: Option<Arc<dyn Authenticator>>,
    broker: Option<Arc<dyn CredentialBroker>>,
    connector: Option<Arc<dyn MqttConnector>>,
    clock: Option<Arc<dyn Clock>>,
    rest: Option<RestClient>,
    iot: Option<IotClient>,
    session: Option<Session>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            events: None,
            authenticator: None,
            broker: None,
            connector: None,
            clock: None,
            rest: None,
            iot: None,
            session: None,
        }
    }

    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn credential_broker(mut self, broker: Arc<dyn CredentialBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn connector(mut self, connector: Arc<dyn MqttConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn rest_client(mut self, rest: RestClient) -> Self {
        self.rest = Some(rest);
        self
    }

    pub fn iot_client(mut self, iot: IotClient) -> Self {
        self.iot = Some(iot);
        self
    }

    /// Start from a previously persisted session instead of logging in.
    pub fn session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn build(self) -> Result<MysaClient, CoreError> {
        let config = self.config;
        let http = config.http();

        let sdk = mysa_api::sdk_config(&config.region, &http, None);

        let authenticator: Arc<dyn Authenticator> = self.authenticator.unwrap_or_else(|| {
            Arc::new(CognitoAuthenticator::new(&sdk, config.app_client_id.clone()))
        });
        let broker: Arc<dyn CredentialBroker> = self.broker.unwrap_or_else(|| {
            Arc::new(CognitoIdentityBroker::new(
                &sdk,
                config.identity_pool_id.clone(),
                &config.user_pool_id,
            ))
        });
        let connector: Arc<dyn MqttConnector> = self
            .connector
            .unwrap_or_else(|| Arc::new(AwsIotConnector::new()));
        let rest = match self.rest {
            Some(r) => r,
            None => {
                let base = Url::parse(&config.api_base_url).map_err(|e| CoreError::Config {
                    message: format!("invalid API base URL '{}': {e}", config.api_base_url),
                })?;
                RestClient::new(base, &http)?
            }
        };
        let iot = self.iot.unwrap_or_else(|| IotClient::new(&sdk));
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let events = self.events.unwrap_or_default();

        let session = Arc::new(SessionManager::new(
            authenticator,
            events.clone(),
            Arc::clone(&clock),
        ));
        if let Some(persisted) = self.session {
            session.restore(persisted);
        }

        let transport = TransportConnection::new(
            Arc::clone(&session),
            Arc::clone(&broker),
            connector,
            config.clone(),
        );
        let subscriptions = SubscriptionManager::new(
            transport.clone(),
            events.clone(),
            config.realtime.clone(),
            Arc::clone(&clock),
        );

        Ok(MysaClient {
            inner: Arc::new(ClientInner {
                events,
                session,
                rest,
                iot,
                broker,
                transport,
                subscriptions,
                clock,
                devices: ArcSwapOption::empty(),
            }),
        })
    }
}

// ── Client ───────────────────────────────────────────────────────────

struct ClientInner {
    events: EventBus,
    session: Arc<SessionManager>,
    rest: RestClient,
    iot: IotClient,
    broker: Arc<dyn CredentialBroker>,
    transport: TransportConnection,
    subscriptions: SubscriptionManager,
    clock: Arc<dyn Clock>,
    /// Filled by the first state command, read by later ones.
    devices: ArcSwapOption<Devices>,
}

/// Client for one Mysa account.
#[derive(Clone)]
pub struct MysaClient {
    inner: Arc<ClientInner>,
}

impl MysaClient {
    /// A client wired to the production services described by `config`.
    pub fn new(config: ClientConfig) -> Result<Self, CoreError> {
        ClientBuilder::new(config).build()
    }

    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn transport(&self) -> &TransportConnection {
        &self.inner.transport
    }

    // ── Session ──────────────────────────────────────────────────────

    pub async fn login(&self, username: &str, password: &SecretString) -> Result<(), CoreError> {
        self.inner.session.login(username, password).await
    }

    /// The current session, suitable for persisting.
    pub fn session(&self) -> Option<Session> {
        self.inner.session.current_snapshot()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.session.is_authenticated()
    }

    /// Forget the session and the cached device list.
    pub fn logout(&self) {
        self.inner.session.clear();
        self.invalidate_device_cache();
    }

    // ── REST ─────────────────────────────────────────────────────────

    pub async fn get_devices(&self) -> Result<Devices, CoreError> {
        let tokens = self.inner.session.fresh_token_set().await?;
        Ok(self.inner.rest.get_devices(&tokens.id_token).await?)
    }

    pub async fn get_device_firmwares(&self) -> Result<Firmwares, CoreError> {
        let tokens = self.inner.session.fresh_token_set().await?;
        Ok(self.inner.rest.get_device_firmwares(&tokens.id_token).await?)
    }

    pub async fn get_device_states(&self) -> Result<DeviceStates, CoreError> {
        let tokens = self.inner.session.fresh_token_set().await?;
        Ok(self.inner.rest.get_device_states(&tokens.id_token).await?)
    }

    /// The hardware serial number from the IoT thing registry.
    ///
    /// Registry failures are logged and reported as `None`; only a missing
    /// session is an error.
    pub async fn get_device_serial_number(
        &self,
        device_id: &str,
    ) -> Result<Option<String>, CoreError> {
        let tokens = self.inner.session.fresh_token_set().await?;

        let credentials = match self.inner.broker.exchange(&tokens.id_token).await {
            Ok(c) => c,
            Err(e) => {
                warn!(device_id, error = %e, "credential exchange for serial lookup failed");
                return Ok(None);
            }
        };
        match self.inner.iot.describe_thing(device_id, &credentials).await {
            Ok(thing) => Ok(thing.serial_number().map(str::to_owned)),
            Err(e) => {
                warn!(device_id, error = %e, "unable to describe device thing");
                Ok(None)
            }
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Change a device's set point and/or mode.
    pub async fn set_device_state(
        &self,
        device_id: &str,
        set_point: Option<f64>,
        mode: Option<DeviceMode>,
    ) -> Result<(), CoreError> {
        let devices = self.cached_devices().await?;
        let device = devices
            .devices
            .get(device_id)
            .ok_or_else(|| CoreError::DeviceNotFound {
                device_id: device_id.to_owned(),
            })?;
        let username = self
            .inner
            .session
            .username()
            .ok_or_else(|| CoreError::unauthenticated("No user is logged in."))?;

        if let Some(mode) = mode.filter(|m| m.wire_code().is_none()) {
            warn!(device_id, %mode, "mode has no device code and is not sent");
        }

        let command = DeviceCommandEncoder::change_state(
            device,
            &username,
            set_point,
            mode,
            self.inner.clock.now(),
        );
        debug!(device_id, ?set_point, ?mode, "sending state change");
        let payload = codec::serialize(&command.into())?;
        self.inner
            .transport
            .publish(&device_in_topic(device_id), payload, true)
            .await
    }

    /// Forget the cached device list; the next command refetches it.
    pub fn invalidate_device_cache(&self) {
        self.inner.devices.store(None);
    }

    async fn cached_devices(&self) -> Result<Arc<Devices>, CoreError> {
        if let Some(devices) = self.inner.devices.load_full() {
            return Ok(devices);
        }
        let devices = Arc::new(self.get_devices().await?);
        self.inner.devices.store(Some(Arc::clone(&devices)));
        Ok(devices)
    }

    // ── Realtime ─────────────────────────────────────────────────────

    pub async fn start_realtime_updates(&self, device_id: &str) -> Result<(), CoreError> {
        self.inner.subscriptions.start(device_id).await
    }

    pub async fn stop_realtime_updates(&self, device_id: &str) -> Result<(), CoreError> {
        self.inner.subscriptions.stop(device_id).await
    }

    /// Stop then start, re-establishing the subscription on the current
    /// connection.
    pub async fn restart_realtime_updates(&self, device_id: &str) -> Result<(), CoreError> {
        self.inner.subscriptions.stop(device_id).await?;
        self.inner.subscriptions.start(device_id).await
    }

    pub async fn realtime_devices(&self) -> Vec<String> {
        self.inner.subscriptions.active_devices().await
    }

    /// Stop every realtime subscription and close the transport.
    pub async fn shutdown(&self) -> Result<(), CoreError> {
        info!("shutting down");
        if let Err(e) = self.inner.subscriptions.stop_all().await {
            warn!(error = %e, "some subscriptions did not stop cleanly");
        }
        self.inner.transport.disconnect().await
    }
}
