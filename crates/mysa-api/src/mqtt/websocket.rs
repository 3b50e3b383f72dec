// MQTT over WebSocket
//
// One background task owns the socket. It writes queued packets, reads
// and decodes broker packets, invokes subscription handlers inline (which
// keeps per-topic ordering), resolves pending acknowledgements, and sends
// keepalive pings. When the task exits for any reason it cancels the
// connection's close token and drops every pending acknowledgement.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep_until, timeout};
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::packet::{self, Connect, Packet, Publish, QoS, SUBACK_FAILURE, topic_matches};
use super::{ConnectOptions, MessageHandler, MqttConnection, MqttConnector};
use crate::credentials::TransportCredentials;
use crate::error::Error;
use crate::sigv4;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SUB_PROTOCOL: &str = "mqtt";

// ── AwsIotConnector ──────────────────────────────────────────────────

/// Connects to the AWS IoT device gateway with SigV4-presigned URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct AwsIotConnector;

impl AwsIotConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MqttConnector for AwsIotConnector {
    async fn connect(
        &self,
        options: &ConnectOptions,
        credentials: &TransportCredentials,
    ) -> Result<Arc<dyn MqttConnection>, Error> {
        let url = sigv4::presign_iot_websocket(
            &options.endpoint,
            &options.region,
            credentials,
            SystemTime::now(),
        )?;

        debug!(endpoint = %options.endpoint, client_id = %options.client_id, "opening MQTT WebSocket");
        let connection = WsMqttConnection::connect(url.as_str(), options).await?;
        Ok(Arc::new(connection))
    }
}

// ── Shared connection state ──────────────────────────────────────────

#[derive(Debug)]
enum Ack {
    Published,
    Subscribed(Vec<u8>),
    Unsubscribed,
}

enum Outbound {
    Packet(Bytes),
    /// Write the packet, then close the socket.
    Disconnect(Bytes),
}

struct Shared {
    pending: Mutex<HashMap<u16, oneshot::Sender<Ack>>>,
    handlers: RwLock<Vec<(String, MessageHandler)>>,
    next_packet_id: AtomicU16,
    closed: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn next_packet_id(&self) -> u16 {
        loop {
            let id = self.next_packet_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    fn complete(&self, packet_id: u16, ack: Ack) {
        match lock(&self.pending).remove(&packet_id) {
            Some(tx) => {
                let _ = tx.send(ack);
            }
            None => trace!(packet_id, "acknowledgement for unknown packet id"),
        }
    }

    fn dispatch(&self, topic: &str, payload: &[u8]) {
        let matching: Vec<MessageHandler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(filter, _)| topic_matches(filter, topic))
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        if matching.is_empty() {
            trace!(topic, "message on topic without handler");
        }
        for handler in matching {
            handler(topic, payload);
        }
    }

    fn remove_handler(&self, filter: &str) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(f, _)| f != filter);
    }

    fn shutdown(&self) {
        self.closed.cancel();
        lock(&self.pending).clear();
    }
}

// ── WsMqttConnection ─────────────────────────────────────────────────

/// An MQTT session over a WebSocket, driven by a background task.
///
/// Dropping the connection cancels its close token, which stops the task.
pub struct WsMqttConnection {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Outbound>,
    operation_timeout: Duration,
}

impl WsMqttConnection {
    /// Open the WebSocket at `url`, perform the MQTT handshake, and spawn
    /// the I/O task.
    pub async fn connect(url: &str, options: &ConnectOptions) -> Result<Self, Error> {
        let uri: tungstenite::http::Uri = url.parse().map_err(
            |e: tungstenite::http::uri::InvalidUri| Error::MqttConnect(e.to_string()),
        )?;
        let request = ClientRequestBuilder::new(uri).with_sub_protocol(SUB_PROTOCOL);

        let (mut ws, _response) = with_deadline(
            "connect",
            options.operation_timeout,
            tokio_tungstenite::connect_async(request),
        )
        .await?
        .map_err(|e| Error::MqttConnect(e.to_string()))?;

        let connect = Packet::Connect(Connect {
            client_id: options.client_id.clone(),
            keep_alive: u16::try_from(options.keep_alive.as_secs()).unwrap_or(u16::MAX),
            clean_session: options.clean_session,
        });
        write_packet(&mut ws, connect.to_bytes()?).await?;

        let mut read_buf = BytesMut::new();
        let reply = with_deadline(
            "connect",
            options.operation_timeout,
            read_packet(&mut ws, &mut read_buf),
        )
        .await??;

        match reply {
            Packet::ConnAck { return_code: 0, .. } => {}
            Packet::ConnAck { return_code, .. } => {
                let _ = ws.close(None).await;
                return Err(Error::MqttRefused { code: return_code });
            }
            other => {
                let _ = ws.close(None).await;
                return Err(Error::MqttProtocol(format!(
                    "expected CONNACK, got {other:?}"
                )));
            }
        }

        info!(client_id = %options.client_id, "MQTT connected");

        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            handlers: RwLock::new(Vec::new()),
            next_packet_id: AtomicU16::new(1),
            closed: CancellationToken::new(),
        });
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(run(
            ws,
            outbound_rx,
            Arc::clone(&shared),
            read_buf,
            options.keep_alive,
            options.ping_timeout,
        ));

        Ok(Self {
            shared,
            outbound,
            operation_timeout: options.operation_timeout,
        })
    }

    fn send(&self, packet: &Packet) -> Result<(), Error> {
        if self.shared.closed.is_cancelled() {
            return Err(Error::ConnectionClosed);
        }
        self.outbound
            .send(Outbound::Packet(packet.to_bytes()?))
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Send a packet and wait for the acknowledgement carrying `packet_id`.
    async fn request(
        &self,
        packet_id: u16,
        packet: &Packet,
        operation: &'static str,
    ) -> Result<Ack, Error> {
        let (tx, rx) = oneshot::channel();
        lock(&self.shared.pending).insert(packet_id, tx);
        let _pending = PendingAck {
            shared: &self.shared,
            packet_id,
        };

        self.send(packet)?;

        let closed = self.shared.closed.clone();
        let wait = async move {
            tokio::select! {
                biased;
                ack = rx => ack.map_err(|_| Error::ConnectionClosed),
                () = closed.cancelled() => Err(Error::ConnectionClosed),
            }
        };

        with_deadline(operation, self.operation_timeout, wait)
            .await
            .and_then(|r| r)
    }
}

/// Removes a pending acknowledgement slot when its request finishes or
/// is dropped before the broker answers.
struct PendingAck<'a> {
    shared: &'a Shared,
    packet_id: u16,
}

impl Drop for PendingAck<'_> {
    fn drop(&mut self) {
        lock(&self.shared.pending).remove(&self.packet_id);
    }
}

impl Drop for WsMqttConnection {
    fn drop(&mut self) {
        self.shared.closed.cancel();
    }
}

#[async_trait]
impl MqttConnection for WsMqttConnection {
    async fn publish(&self, topic: &str, payload: Bytes, qos: QoS) -> Result<(), Error> {
        match qos {
            QoS::AtMostOnce => self.send(&Packet::Publish(Publish {
                topic: topic.to_owned(),
                payload,
                qos,
                packet_id: None,
                dup: false,
                retain: false,
            })),
            QoS::AtLeastOnce => {
                let packet_id = self.shared.next_packet_id();
                let packet = Packet::Publish(Publish {
                    topic: topic.to_owned(),
                    payload,
                    qos,
                    packet_id: Some(packet_id),
                    dup: false,
                    retain: false,
                });
                self.request(packet_id, &packet, "publish").await?;
                trace!(topic, packet_id, "publish acknowledged");
                Ok(())
            }
        }
    }

    async fn subscribe(
        &self,
        filter: &str,
        qos: QoS,
        handler: MessageHandler,
    ) -> Result<(), Error> {
        // Install first so messages right behind the SUBACK are not lost.
        {
            let mut handlers = self
                .shared
                .handlers
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            handlers.retain(|(f, _)| f != filter);
            handlers.push((filter.to_owned(), handler));
        }

        let packet_id = self.shared.next_packet_id();
        let packet = Packet::Subscribe {
            packet_id,
            filters: vec![(filter.to_owned(), qos)],
        };

        match self.request(packet_id, &packet, "subscribe").await {
            Ok(Ack::Subscribed(codes)) if codes.first().is_some_and(|c| *c != SUBACK_FAILURE) => {
                debug!(filter, granted = ?codes, "subscribed");
                Ok(())
            }
            Ok(_) => {
                self.shared.remove_handler(filter);
                Err(Error::SubscribeRejected {
                    topic: filter.to_owned(),
                })
            }
            Err(e) => {
                self.shared.remove_handler(filter);
                Err(e)
            }
        }
    }

    async fn unsubscribe(&self, filter: &str) -> Result<(), Error> {
        self.shared.remove_handler(filter);

        let packet_id = self.shared.next_packet_id();
        let packet = Packet::Unsubscribe {
            packet_id,
            filters: vec![filter.to_owned()],
        };
        self.request(packet_id, &packet, "unsubscribe").await?;
        debug!(filter, "unsubscribed");
        Ok(())
    }

    fn closed(&self) -> CancellationToken {
        self.shared.closed.clone()
    }

    async fn disconnect(&self) -> Result<(), Error> {
        if self.shared.closed.is_cancelled() {
            return Ok(());
        }
        let bytes = Packet::Disconnect.to_bytes()?;
        if self.outbound.send(Outbound::Disconnect(bytes)).is_err() {
            return Ok(());
        }
        with_deadline(
            "disconnect",
            self.operation_timeout,
            self.shared.closed.cancelled(),
        )
        .await
    }
}

// ── I/O task ─────────────────────────────────────────────────────────

async fn run(
    mut ws: WsStream,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    shared: Arc<Shared>,
    mut read_buf: BytesMut,
    keep_alive: Duration,
    ping_timeout: Duration,
) {
    let result = io_loop(
        &mut ws,
        &mut outbound,
        &shared,
        &mut read_buf,
        keep_alive,
        ping_timeout,
    )
    .await;

    match result {
        Ok(()) => info!("MQTT connection closed"),
        Err(e) => warn!(error = %e, "MQTT connection lost"),
    }

    let _ = ws.close(None).await;
    shared.shutdown();
}

async fn io_loop(
    ws: &mut WsStream,
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
    shared: &Shared,
    read_buf: &mut BytesMut,
    keep_alive: Duration,
    ping_timeout: Duration,
) -> Result<(), Error> {
    let mut ping = tokio::time::interval_at(Instant::now() + keep_alive, keep_alive);
    let mut pong_deadline: Option<Instant> = None;

    loop {
        let pong_wait = async move {
            match pong_deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            () = shared.closed.cancelled() => return Ok(()),
            () = pong_wait => {
                return Err(Error::Timeout {
                    operation: "ping",
                    timeout_ms: millis(ping_timeout),
                });
            }
            msg = outbound.recv() => match msg {
                Some(Outbound::Packet(bytes)) => write_packet(ws, bytes).await?,
                Some(Outbound::Disconnect(bytes)) => {
                    write_packet(ws, bytes).await?;
                    debug!("sent DISCONNECT");
                    return Ok(());
                }
                None => return Ok(()),
            },
            _ = ping.tick() => {
                if pong_deadline.is_none() {
                    write_packet(ws, Packet::PingReq.to_bytes()?).await?;
                    pong_deadline = Some(Instant::now() + ping_timeout);
                    trace!("PINGREQ sent");
                }
            }
            frame = ws.next() => match frame {
                Some(Ok(Message::Binary(data))) => {
                    read_buf.extend_from_slice(&data);
                    while let Some(packet) = packet::decode(read_buf)? {
                        if let Some(reply) = handle_packet(shared, packet, &mut pong_deadline)? {
                            write_packet(ws, reply).await?;
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "WebSocket close frame received");
                    return Err(Error::ConnectionClosed);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(Error::MqttConnect(e.to_string())),
                None => return Err(Error::ConnectionClosed),
            },
        }
    }
}

/// Apply one broker packet; returns a packet to write back, if any.
fn handle_packet(
    shared: &Shared,
    packet: Packet,
    pong_deadline: &mut Option<Instant>,
) -> Result<Option<Bytes>, Error> {
    match packet {
        Packet::Publish(publish) => {
            shared.dispatch(&publish.topic, &publish.payload);
            if let (QoS::AtLeastOnce, Some(packet_id)) = (publish.qos, publish.packet_id) {
                return Packet::PubAck { packet_id }.to_bytes().map(Some);
            }
        }
        Packet::PubAck { packet_id } => shared.complete(packet_id, Ack::Published),
        Packet::SubAck {
            packet_id,
            return_codes,
        } => shared.complete(packet_id, Ack::Subscribed(return_codes)),
        Packet::UnsubAck { packet_id } => shared.complete(packet_id, Ack::Unsubscribed),
        Packet::PingResp => {
            trace!("PINGRESP received");
            *pong_deadline = None;
        }
        Packet::Disconnect => return Err(Error::ConnectionClosed),
        other => warn!(packet = ?other, "ignoring unexpected packet from broker"),
    }
    Ok(None)
}

// ── Helpers ──────────────────────────────────────────────────────────

async fn write_packet(ws: &mut WsStream, bytes: Bytes) -> Result<(), Error> {
    ws.send(Message::Binary(bytes))
        .await
        .map_err(|e| Error::MqttConnect(e.to_string()))
}

async fn read_packet(ws: &mut WsStream, buf: &mut BytesMut) -> Result<Packet, Error> {
    loop {
        if let Some(packet) = packet::decode(buf)? {
            return Ok(packet);
        }
        match ws.next().await {
            Some(Ok(Message::Binary(data))) => buf.extend_from_slice(&data),
            Some(Ok(Message::Close(_))) | None => return Err(Error::ConnectionClosed),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(Error::MqttConnect(e.to_string())),
        }
    }
}

async fn with_deadline<F: Future>(
    operation: &'static str,
    limit: Duration,
    fut: F,
) -> Result<F::Output, Error> {
    timeout(limit, fut).await.map_err(|_| Error::Timeout {
        operation,
        timeout_ms: millis(limit),
    })
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
    use tokio_tungstenite::tungstenite::http::HeaderValue;

    use super::*;

    /// A broker that accepts the session and never acknowledges anything.
    async fn silent_broker() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let callback = |_: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
                resp.headers_mut()
                    .insert("Sec-WebSocket-Protocol", HeaderValue::from_static(SUB_PROTOCOL));
                Ok(resp)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                let Message::Binary(data) = msg else { continue };
                if data[0] == 0x10 {
                    let connack = Bytes::from_static(&[0x20, 2, 0, 0]);
                    if ws.send(Message::Binary(connack)).await.is_err() {
                        return;
                    }
                }
            }
        });
        format!("ws://{addr}/mqtt")
    }

    fn options() -> ConnectOptions {
        ConnectOptions {
            endpoint: "localhost".into(),
            region: "us-east-1".into(),
            client_id: "mysa-test".into(),
            clean_session: true,
            keep_alive: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(3),
            operation_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn abandoned_publish_releases_its_ack_slot() {
        let url = silent_broker().await;
        let conn = WsMqttConnection::connect(&url, &options()).await.unwrap();

        let publish = conn.publish("/v1/dev/dev1/in", Bytes::from_static(b"{}"), QoS::AtLeastOnce);
        assert!(timeout(Duration::from_millis(50), publish).await.is_err());

        assert!(lock(&conn.shared.pending).is_empty());
    }

    #[tokio::test]
    async fn timed_out_request_releases_its_ack_slot() {
        let url = silent_broker().await;
        let options = ConnectOptions {
            operation_timeout: Duration::from_millis(100),
            ..options()
        };
        let conn = WsMqttConnection::connect(&url, &options).await.unwrap();

        let err = conn.unsubscribe("/v1/dev/dev1/out").await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }), "got: {err:?}");
        assert!(lock(&conn.shared.pending).is_empty());
    }
}
