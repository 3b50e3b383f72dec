// ── Realtime subscriptions ──
//
// Per-device streaming. A device only streams status for a fixed window
// after a "start publishing" request, so every active device gets a
// keepalive task that re-sends the request shortly before the window
// closes. Each entry owns its keepalive through a handle that cancels the
// task when dropped.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mysa_api::MessageHandler;
use mysa_api::realtime::codec;
use mysa_api::realtime::payload::{device_in_topic, device_out_topic};

use crate::command::DeviceCommandEncoder;
use crate::config::RealtimeConfig;
use crate::connection::TransportConnection;
use crate::dispatch;
use crate::error::CoreError;
use crate::events::EventBus;
use crate::session::Clock;

/// Owns one device's keepalive task.
struct KeepaliveHandle {
    cancel: CancellationToken,
}

impl Drop for KeepaliveHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub struct SubscriptionManager {
    transport: TransportConnection,
    events: EventBus,
    config: RealtimeConfig,
    clock: Arc<dyn Clock>,
    active: Mutex<HashMap<String, KeepaliveHandle>>,
}

impl SubscriptionManager {
    pub fn new(
        transport: TransportConnection,
        events: EventBus,
        config: RealtimeConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            transport,
            events,
            config,
            clock,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Start streaming updates from `device_id`. A no-op if already active.
    pub async fn start(&self, device_id: &str) -> Result<(), CoreError> {
        let mut active = self.active.lock().await;
        if active.contains_key(device_id) {
            debug!(device_id, "realtime updates already running");
            return Ok(());
        }

        info!(device_id, "starting realtime updates");
        let out_topic = device_out_topic(device_id);
        let events = self.events.clone();
        let handler: MessageHandler =
            Arc::new(move |_topic: &str, payload: &[u8]| dispatch::handle_payload(&events, payload));
        self.transport.subscribe(&out_topic, true, handler).await?;

        if let Err(e) = send_start_publishing(
            &self.transport,
            self.clock.as_ref(),
            device_id,
            self.config.status_timeout_secs(),
        )
        .await
        {
            warn!(device_id, error = %e, "initial start-publishing request failed");
            if let Err(unsub) = self.transport.unsubscribe(&out_topic).await {
                debug!(device_id, error = %unsub, "cleanup unsubscribe failed");
            }
            return Err(e);
        }

        active.insert(device_id.to_owned(), self.spawn_keepalive(device_id));
        Ok(())
    }

    /// Stop streaming updates from `device_id`. A no-op if not active.
    pub async fn stop(&self, device_id: &str) -> Result<(), CoreError> {
        let mut active = self.active.lock().await;
        if !active.contains_key(device_id) {
            warn!(device_id, "no realtime updates running for device");
            return Ok(());
        }

        info!(device_id, "stopping realtime updates");
        self.transport
            .unsubscribe(&device_out_topic(device_id))
            .await?;
        // Dropping the handle cancels the keepalive.
        active.remove(device_id);
        Ok(())
    }

    /// Stop every active device, returning the first failure.
    pub async fn stop_all(&self) -> Result<(), CoreError> {
        let mut first_error = None;
        for device_id in self.active_devices().await {
            if let Err(e) = self.stop(&device_id).await {
                warn!(device_id = %device_id, error = %e, "failed to stop realtime updates");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Device ids with realtime updates running, sorted.
    pub async fn active_devices(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn is_active(&self, device_id: &str) -> bool {
        self.active.lock().await.contains_key(device_id)
    }

    fn spawn_keepalive(&self, device_id: &str) -> KeepaliveHandle {
        let cancel = CancellationToken::new();
        tokio::spawn(keepalive_loop(
            self.transport.clone(),
            Arc::clone(&self.clock),
            device_id.to_owned(),
            self.config.clone(),
            cancel.clone(),
        ));
        KeepaliveHandle { cancel }
    }
}

async fn send_start_publishing(
    transport: &TransportConnection,
    clock: &dyn Clock,
    device_id: &str,
    timeout_secs: u64,
) -> Result<(), CoreError> {
    let command = DeviceCommandEncoder::start_publishing(device_id, timeout_secs, clock.now());
    let payload = codec::serialize(&command.into())?;
    transport
        .publish(&device_in_topic(device_id), payload, true)
        .await
}

async fn keepalive_loop(
    transport: TransportConnection,
    clock: Arc<dyn Clock>,
    device_id: String,
    config: RealtimeConfig,
    cancel: CancellationToken,
) {
    let period = config.keepalive_interval();
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut failures: u32 = 0;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        debug!(device_id = %device_id, "sending keepalive");
        let sent = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            r = send_start_publishing(&transport, clock.as_ref(), &device_id, config.status_timeout_secs()) => r,
        };

        match sent {
            Ok(()) => failures = 0,
            Err(e) => {
                failures = failures.saturating_add(1);
                warn!(
                    device_id = %device_id,
                    consecutive_failures = failures,
                    error = %e,
                    "keepalive publish failed"
                );
            }
        }
    }

    debug!(device_id = %device_id, "keepalive stopped");
}
