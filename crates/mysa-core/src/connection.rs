// ── Realtime transport connection ──
//
// Owns at most one broker connection and opens it on demand. The state
// machine is `Disconnected -> Connecting(shared future) -> Connected`:
// concurrent callers during `Connecting` all await the same future, so a
// burst of operations opens exactly one connection. A watcher on the
// connection's close token resets the state when the broker drops us;
// each attempt carries an id so a stale watcher never clears a newer
// connection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use mysa_api::mqtt::{ConnectOptions, MessageHandler, MqttConnection, MqttConnector, QoS};
use mysa_api::CredentialBroker;

use crate::config::ClientConfig;
use crate::error::CoreError;
use crate::session::SessionManager;

/// Publishes are retried once on a fresh connection when the cached one
/// turns out to be gone.
const MAX_PUBLISH_ATTEMPTS: u32 = 2;

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

type Connection = Arc<dyn MqttConnection>;
type ConnectFuture = Shared<BoxFuture<'static, Result<Connection, CoreError>>>;

enum State {
    Disconnected,
    Connecting { attempt: u64, future: ConnectFuture },
    Connected { attempt: u64, connection: Connection },
}

struct Inner {
    session: Arc<SessionManager>,
    broker: Arc<dyn CredentialBroker>,
    connector: Arc<dyn MqttConnector>,
    config: ClientConfig,
    state: Mutex<State>,
    next_attempt: AtomicU64,
    status: watch::Sender<ConnectionStatus>,
}

/// Lazily connected, shared handle to the realtime broker.
///
/// Cheaply cloneable; clones share the same connection.
#[derive(Clone)]
pub struct TransportConnection {
    inner: Arc<Inner>,
}

impl TransportConnection {
    pub fn new(
        session: Arc<SessionManager>,
        broker: Arc<dyn CredentialBroker>,
        connector: Arc<dyn MqttConnector>,
        config: ClientConfig,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            inner: Arc::new(Inner {
                session,
                broker,
                connector,
                config,
                state: Mutex::new(State::Disconnected),
                next_attempt: AtomicU64::new(1),
                status,
            }),
        }
    }

    /// The open connection, establishing one if necessary.
    pub async fn get_connection(&self) -> Result<Connection, CoreError> {
        self.connection_with_attempt().await.map(|(_, conn)| conn)
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.inner.lock_state(), State::Connected { .. })
    }

    /// Subscribe to connection state transitions.
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    // ── Operations ───────────────────────────────────────────────────

    pub async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        at_least_once: bool,
    ) -> Result<(), CoreError> {
        let payload = Bytes::from(payload);
        let mut attempts = 0;
        loop {
            attempts += 1;
            let (attempt, conn) = self.connection_with_attempt().await?;
            debug!(topic, attempt = attempts, "publishing");
            match conn.publish(topic, payload.clone(), qos(at_least_once)).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_connection_lost() => {
                    self.inner.clear_if_current(attempt);
                    if attempts >= MAX_PUBLISH_ATTEMPTS {
                        return Err(CoreError::TransportPublish {
                            attempts,
                            cause: e.to_string(),
                        });
                    }
                    warn!(topic, error = %e, "publish hit a closed connection, retrying");
                }
                Err(e) => {
                    return Err(CoreError::TransportPublish {
                        attempts,
                        cause: e.to_string(),
                    });
                }
            }
        }
    }

    pub async fn subscribe(
        &self,
        topic: &str,
        at_least_once: bool,
        handler: MessageHandler,
    ) -> Result<(), CoreError> {
        let (attempt, conn) = self.connection_with_attempt().await?;
        debug!(topic, "subscribing");
        conn.subscribe(topic, qos(at_least_once), handler)
            .await
            .map_err(|e| self.inner.transport_error(attempt, &e))
    }

    pub async fn unsubscribe(&self, topic: &str) -> Result<(), CoreError> {
        let (attempt, conn) = self.connection_with_attempt().await?;
        debug!(topic, "unsubscribing");
        conn.unsubscribe(topic)
            .await
            .map_err(|e| self.inner.transport_error(attempt, &e))
    }

    /// Close the connection (if any) and return to `Disconnected`.
    pub async fn disconnect(&self) -> Result<(), CoreError> {
        let previous = std::mem::replace(&mut *self.inner.lock_state(), State::Disconnected);
        self.inner.status.send_replace(ConnectionStatus::Disconnected);

        if let State::Connected { connection, .. } = previous {
            connection.disconnect().await?;
            info!("realtime transport disconnected");
        }
        Ok(())
    }

    // ── Internals ────────────────────────────────────────────────────

    async fn connection_with_attempt(&self) -> Result<(u64, Connection), CoreError> {
        let (attempt, future) = {
            let mut state = self.inner.lock_state();
            match &*state {
                State::Connected {
                    attempt,
                    connection,
                } => return Ok((*attempt, Arc::clone(connection))),
                State::Connecting { attempt, future } => (*attempt, future.clone()),
                State::Disconnected => {
                    let (attempt, future) = self.inner.begin_attempt();
                    *state = State::Connecting {
                        attempt,
                        future: future.clone(),
                    };
                    self.inner.status.send_replace(ConnectionStatus::Connecting);
                    (attempt, future)
                }
            }
        };
        future.await.map(|conn| (attempt, conn))
    }
}

fn qos(at_least_once: bool) -> QoS {
    if at_least_once {
        QoS::AtLeastOnce
    } else {
        QoS::AtMostOnce
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_attempt(self: &Arc<Self>) -> (u64, ConnectFuture) {
        let attempt = self.next_attempt.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(self);
        let future = async move { inner.establish(attempt).await }
            .boxed()
            .shared();
        (attempt, future)
    }

    async fn establish(self: Arc<Self>, attempt: u64) -> Result<Connection, CoreError> {
        let result = self.open().await;
        self.finish(attempt, result)
    }

    async fn open(&self) -> Result<Connection, CoreError> {
        let tokens = self.session.fresh_token_set().await?;
        let credentials = self.broker.exchange(&tokens.id_token).await?;

        let options = ConnectOptions {
            endpoint: self.config.iot_endpoint.clone(),
            region: self.config.region.clone(),
            client_id: format!("{}-{}", self.config.client_id_prefix, Uuid::new_v4()),
            clean_session: self.config.mqtt.clean_session,
            keep_alive: self.config.mqtt.keep_alive,
            ping_timeout: self.config.mqtt.ping_timeout,
            operation_timeout: self.config.mqtt.operation_timeout,
        };
        info!(client_id = %options.client_id, endpoint = %options.endpoint, "connecting realtime transport");
        Ok(self.connector.connect(&options, &credentials).await?)
    }

    /// Install the outcome of `attempt`, unless the state moved on.
    fn finish(
        self: &Arc<Self>,
        attempt: u64,
        result: Result<Connection, CoreError>,
    ) -> Result<Connection, CoreError> {
        let mut state = self.lock_state();
        let current = matches!(&*state, State::Connecting { attempt: a, .. } if *a == attempt);

        match result {
            Ok(connection) => {
                if current {
                    *state = State::Connected {
                        attempt,
                        connection: Arc::clone(&connection),
                    };
                    self.status.send_replace(ConnectionStatus::Connected);
                    spawn_close_watcher(Arc::downgrade(self), attempt, connection.closed());
                    info!(attempt, "realtime transport connected");
                } else {
                    debug!(attempt, "connection finished after a reset, not caching it");
                }
                Ok(connection)
            }
            Err(e) => {
                if current {
                    *state = State::Disconnected;
                    self.status.send_replace(ConnectionStatus::Disconnected);
                }
                error!(attempt, error = %e, "realtime transport connection failed");
                Err(e)
            }
        }
    }

    /// Drop the cached connection if it still belongs to `attempt`.
    fn clear_if_current(&self, attempt: u64) -> bool {
        let mut state = self.lock_state();
        if matches!(&*state, State::Connected { attempt: a, .. } if *a == attempt) {
            *state = State::Disconnected;
            self.status.send_replace(ConnectionStatus::Disconnected);
            true
        } else {
            false
        }
    }

    fn transport_error(&self, attempt: u64, err: &mysa_api::Error) -> CoreError {
        if err.is_connection_lost() {
            self.clear_if_current(attempt);
        }
        CoreError::Transport {
            message: err.to_string(),
        }
    }
}

fn spawn_close_watcher(inner: Weak<Inner>, attempt: u64, closed: CancellationToken) {
    tokio::spawn(async move {
        closed.cancelled().await;
        if let Some(inner) = inner.upgrade() {
            if inner.clear_if_current(attempt) {
                warn!(attempt, "realtime connection closed by the broker");
            }
        }
    });
}
