// Shared fakes for mysa-core integration tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;

use mysa_api::mqtt::{topic_matches, ConnectOptions, MessageHandler, MqttConnection, MqttConnector, QoS};
use mysa_api::{Authenticator, CredentialBroker, Error, TokenSet, TransportCredentials};
use mysa_core::{Clock, ClientConfig, EventBus, SessionManager, TransportConnection};

pub const USERNAME: &str = "user@example.com";
pub const PASSWORD: &str = "hunter2";

// ── Clock ───────────────────────────────────────────────────────────

pub struct FakeClock(Mutex<DateTime<Utc>>);

impl FakeClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self(Mutex::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        )))
    }

    pub fn advance(&self, by: TimeDelta) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

// ── Authenticator ───────────────────────────────────────────────────

pub struct FakeAuthenticator {
    clock: Arc<FakeClock>,
    pub lifetime: TimeDelta,
    pub refresh_delay: Duration,
    pub logins: AtomicUsize,
    pub refreshes: AtomicUsize,
    pub fail_refresh: AtomicBool,
    issued: AtomicUsize,
}

impl FakeAuthenticator {
    pub fn new(clock: Arc<FakeClock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            lifetime: TimeDelta::hours(1),
            refresh_delay: Duration::from_millis(50),
            logins: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            fail_refresh: AtomicBool::new(false),
            issued: AtomicUsize::new(0),
        })
    }

    fn issue(&self, refresh_token: &str) -> TokenSet {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        TokenSet {
            id_token: SecretString::from(format!("id-{n}")),
            access_token: SecretString::from(format!("access-{n}")),
            refresh_token: SecretString::from(refresh_token.to_owned()),
            expires_at: self.clock.now() + self.lifetime,
        }
    }
}

#[async_trait]
impl Authenticator for FakeAuthenticator {
    async fn authenticate(&self, _username: &str, password: &SecretString) -> Result<TokenSet, Error> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        if password.expose_secret() != PASSWORD {
            return Err(Error::Authentication {
                message: "Incorrect username or password.".into(),
            });
        }
        Ok(self.issue("refresh-token"))
    }

    async fn refresh(&self, _username: &str, refresh_token: &SecretString) -> Result<TokenSet, Error> {
        tokio::time::sleep(self.refresh_delay).await;
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(Error::SessionExpired {
                message: "Refresh Token has expired".into(),
            });
        }
        Ok(self.issue(refresh_token.expose_secret()))
    }
}

// ── Credential broker ───────────────────────────────────────────────

#[derive(Default)]
pub struct FakeBroker {
    pub exchanges: AtomicUsize,
    pub fail: AtomicBool,
    pub last_id_token: Mutex<Option<String>>,
}

#[async_trait]
impl CredentialBroker for FakeBroker {
    async fn exchange(&self, id_token: &SecretString) -> Result<TransportCredentials, Error> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        *self.last_id_token.lock().unwrap() = Some(id_token.expose_secret().to_owned());
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Aws {
                service: "cognito-identity",
                kind: "NotAuthorizedException".into(),
                message: "Invalid login token.".into(),
            });
        }
        Ok(TransportCredentials {
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: SecretString::from("secret".to_owned()),
            session_token: SecretString::from("session".to_owned()),
            expiration: None,
        })
    }
}

// ── MQTT ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub topic: String,
    pub payload: serde_json::Value,
    pub qos: QoS,
}

#[derive(Default)]
pub struct FakeConnection {
    published: Mutex<Vec<Published>>,
    handlers: Mutex<HashMap<String, MessageHandler>>,
    unsubscribed: Mutex<Vec<String>>,
    /// Number of upcoming publishes that fail.
    pub failing_publishes: AtomicUsize,
    closed: CancellationToken,
}

impl FakeConnection {
    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.handlers.lock().unwrap().keys().cloned().collect();
        topics.sort();
        topics
    }

    pub fn unsubscribed(&self) -> Vec<String> {
        self.unsubscribed.lock().unwrap().clone()
    }

    /// Route an inbound message to matching handlers, like the reader task.
    pub fn deliver(&self, topic: &str, payload: &[u8]) {
        let handlers: Vec<MessageHandler> = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .filter(|(filter, _)| topic_matches(filter, topic))
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(topic, payload);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Simulate the broker dropping the connection.
    pub fn close(&self) {
        self.closed.cancel();
    }
}

#[async_trait]
impl MqttConnection for FakeConnection {
    async fn publish(&self, topic: &str, payload: Bytes, qos: QoS) -> Result<(), Error> {
        if self.closed.is_cancelled() {
            return Err(Error::ConnectionClosed);
        }
        let failing = self.failing_publishes.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_publishes.store(failing - 1, Ordering::SeqCst);
            return Err(Error::Timeout {
                operation: "publish",
                timeout_ms: 60_000,
            });
        }
        self.published.lock().unwrap().push(Published {
            topic: topic.to_owned(),
            payload: serde_json::from_slice(&payload).unwrap(),
            qos,
        });
        Ok(())
    }

    async fn subscribe(&self, filter: &str, _qos: QoS, handler: MessageHandler) -> Result<(), Error> {
        if self.closed.is_cancelled() {
            return Err(Error::ConnectionClosed);
        }
        self.handlers.lock().unwrap().insert(filter.to_owned(), handler);
        Ok(())
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), Error> {
        if self.closed.is_cancelled() {
            return Err(Error::ConnectionClosed);
        }
        self.handlers.lock().unwrap().remove(filter);
        self.unsubscribed.lock().unwrap().push(filter.to_owned());
        Ok(())
    }

    fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    async fn disconnect(&self) -> Result<(), Error> {
        self.closed.cancel();
        Ok(())
    }
}

pub struct FakeConnector {
    pub connect_delay: Duration,
    /// Number of upcoming connects that fail.
    pub failing_connects: AtomicUsize,
    connections: Mutex<Vec<Arc<FakeConnection>>>,
    options: Mutex<Vec<ConnectOptions>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connect_delay: Duration::from_millis(20),
            failing_connects: AtomicUsize::new(0),
            connections: Mutex::new(Vec::new()),
            options: Mutex::new(Vec::new()),
        })
    }

    pub fn connects(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn connection(&self, index: usize) -> Arc<FakeConnection> {
        Arc::clone(&self.connections.lock().unwrap()[index])
    }

    pub fn latest(&self) -> Arc<FakeConnection> {
        Arc::clone(self.connections.lock().unwrap().last().unwrap())
    }

    pub fn options(&self) -> Vec<ConnectOptions> {
        self.options.lock().unwrap().clone()
    }
}

#[async_trait]
impl MqttConnector for FakeConnector {
    async fn connect(
        &self,
        options: &ConnectOptions,
        _credentials: &TransportCredentials,
    ) -> Result<Arc<dyn MqttConnection>, Error> {
        tokio::time::sleep(self.connect_delay).await;
        self.options.lock().unwrap().push(options.clone());

        let failing = self.failing_connects.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_connects.store(failing - 1, Ordering::SeqCst);
            return Err(Error::MqttConnect("connection refused".into()));
        }
        let conn = Arc::new(FakeConnection::default());
        self.connections.lock().unwrap().push(Arc::clone(&conn));
        Ok(conn)
    }
}

// ── Harness ─────────────────────────────────────────────────────────

pub struct Harness {
    pub clock: Arc<FakeClock>,
    pub auth: Arc<FakeAuthenticator>,
    pub broker: Arc<FakeBroker>,
    pub connector: Arc<FakeConnector>,
    pub events: EventBus,
    pub session: Arc<SessionManager>,
    pub transport: TransportConnection,
}

impl Harness {
    pub fn new() -> Self {
        let clock = FakeClock::new();
        let auth = FakeAuthenticator::new(Arc::clone(&clock));
        let broker = Arc::new(FakeBroker::default());
        let connector = FakeConnector::new();
        let events = EventBus::default();
        let session = Arc::new(SessionManager::new(
            auth.clone(),
            events.clone(),
            clock.clone(),
        ));
        let transport = TransportConnection::new(
            Arc::clone(&session),
            broker.clone(),
            connector.clone(),
            ClientConfig::default(),
        );
        Self {
            clock,
            auth,
            broker,
            connector,
            events,
            session,
            transport,
        }
    }

    pub async fn logged_in() -> Self {
        let harness = Self::new();
        harness
            .session
            .login(USERNAME, &SecretString::from(PASSWORD.to_owned()))
            .await
            .unwrap();
        harness
    }
}

/// Let spawned tasks (close watchers, keepalives) run.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
