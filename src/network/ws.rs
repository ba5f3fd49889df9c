//! WebSocket Gateway
//!
//! Owns one long-lived STOMP connection in a spawned task. The task
//! reconnects after a fixed delay whenever the link fails. Heartbeat periods
//! are negotiated in the CONNECT/CONNECTED exchange; the link is declared
//! dead when the broker stays silent for twice its agreed period.
//!
//! The handle side ([`WsGateway`]) never touches the socket. Frames are
//! queued to the task; link changes and deliveries come back as
//! [`LinkEvent`]s on the client's event queue.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, timeout, Instant, Interval, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, instrument, warn};

use crate::config::ClientConfig;
use crate::core::ids::LocalIdentity;
use crate::network::gateway::{Gateway, GatewayError, LinkEvent, SubscriptionTable};
use crate::network::protocol::{BrokerFrame, ClientFrame};
use crate::network::stomp::HeartBeat;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long the broker has to answer CONNECT.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long shutdown waits for queued frames to reach the broker.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Connection settings the task needs.
#[derive(Debug, Clone)]
struct LinkSettings {
    url: String,
    host: String,
    reconnect_delay: Duration,
    heart_beat: HeartBeat,
    identity: LocalIdentity,
}

/// Why a connection ended.
#[derive(Debug)]
enum LinkEnd {
    /// Orderly shutdown; do not reconnect.
    Shutdown,
    /// Link failed; reconnect after the delay.
    Lost(String),
}

/// Gateway over a WebSocket broker connection.
#[derive(Debug)]
pub struct WsGateway {
    frames: mpsc::Sender<ClientFrame>,
    closing: watch::Sender<bool>,
    connected: bool,
    table: SubscriptionTable,
    task: JoinHandle<()>,
}

impl WsGateway {
    /// Start the connection task. Link events are pushed into `events`,
    /// which is usually the client's own event queue.
    pub fn spawn<E>(config: &ClientConfig, identity: &LocalIdentity, events: mpsc::Sender<E>) -> Self
    where
        E: From<LinkEvent> + Send + 'static,
    {
        let settings = LinkSettings {
            url: config.broker_url.clone(),
            host: host_of(&config.broker_url).to_string(),
            reconnect_delay: config.reconnect_delay,
            heart_beat: config.heart_beat(),
            identity: identity.clone(),
        };
        let (frames, frame_rx) = mpsc::channel(config.event_queue_capacity);
        let (closing, closing_rx) = watch::channel(false);
        let task = tokio::spawn(run_link(settings, frame_rx, closing_rx, events));

        Self {
            frames,
            closing,
            connected: false,
            table: SubscriptionTable::new(),
            task,
        }
    }

    /// Say goodbye to the broker and stop the task.
    ///
    /// Frames queued before the call (a presence withdrawal, a `Disconnect`
    /// sent through [`Gateway::disconnect`]) are flushed before the socket
    /// closes, as long as the link is up and the broker keeps reading.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.disconnect() {
            debug!("Disconnect frame not queued: {}", e);
        }
        self.closing.send_replace(true);
        if timeout(SHUTDOWN_GRACE, &mut self.task).await.is_err() {
            warn!("Connection task did not stop in time");
        }
        self.task.abort();
    }
}

impl Drop for WsGateway {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl Gateway for WsGateway {
    fn send_frame(&mut self, frame: ClientFrame) -> Result<(), GatewayError> {
        self.frames.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => GatewayError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => GatewayError::Closed,
        })
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    fn table(&self) -> &SubscriptionTable {
        &self.table
    }

    fn table_mut(&mut self) -> &mut SubscriptionTable {
        &mut self.table
    }
}

// =============================================================================
// CONNECTION TASK
// =============================================================================

/// Connect, drive, and reconnect until shutdown.
#[instrument(skip_all, fields(url = %settings.url))]
async fn run_link<E: From<LinkEvent>>(
    settings: LinkSettings,
    mut frames: mpsc::Receiver<ClientFrame>,
    mut closing: watch::Receiver<bool>,
    events: mpsc::Sender<E>,
) {
    let mut attempt: u64 = 0;
    loop {
        if *closing.borrow() {
            return;
        }
        attempt += 1;
        info!(attempt, "Connecting to broker");

        let reason = match connect_async(settings.url.as_str()).await {
            Ok((socket, _)) => {
                // Frames queued while the link was down are stale.
                let mut stale = 0usize;
                while frames.try_recv().is_ok() {
                    stale += 1;
                }
                if stale > 0 {
                    debug!(stale, "Dropped frames queued before connect");
                }

                match drive(socket, &settings, &mut frames, &mut closing, &events).await {
                    LinkEnd::Shutdown => {
                        info!("Broker link closed");
                        return;
                    }
                    LinkEnd::Lost(reason) => {
                        attempt = 0;
                        reason
                    }
                }
            }
            Err(e) => e.to_string(),
        };

        warn!(%reason, "Broker link down, retrying in {:?}", settings.reconnect_delay);
        if events.send(LinkEvent::Disconnected { reason }.into()).await.is_err() {
            return;
        }

        // Fixed delay. Anything queued meanwhile is dropped.
        let deadline = Instant::now() + settings.reconnect_delay;
        loop {
            tokio::select! {
                _ = sleep_until(deadline) => break,
                _ = closing.changed() => return,
                frame = frames.recv() => match frame {
                    Some(ClientFrame::Disconnect) | None => return,
                    Some(frame) => debug!(?frame, "Dropping frame while disconnected"),
                },
            }
        }
    }
}

/// Run one connected session until it ends.
async fn drive<E: From<LinkEvent>>(
    socket: Socket,
    settings: &LinkSettings,
    frames: &mut mpsc::Receiver<ClientFrame>,
    closing: &mut watch::Receiver<bool>,
    events: &mpsc::Sender<E>,
) -> LinkEnd {
    let (mut sink, mut stream) = socket.split();

    let hello = ClientFrame::Connect {
        participant_id: settings.identity.id.clone(),
        display_name: settings.identity.display_name.clone(),
        host: settings.host.clone(),
        heart_beat: settings.heart_beat,
    };
    if let Err(reason) = send(&mut sink, &hello).await {
        return LinkEnd::Lost(reason);
    }
    let offered = match timeout(HANDSHAKE_TIMEOUT, handshake(&mut stream)).await {
        Ok(Ok(offered)) => offered,
        Ok(Err(reason)) => return LinkEnd::Lost(reason),
        Err(_) => return LinkEnd::Lost(format!("no CONNECTED within {HANDSHAKE_TIMEOUT:?}")),
    };
    let (send_ms, expect_ms) = settings.heart_beat.negotiate(&offered);
    let liveness_timeout = (expect_ms > 0).then(|| Duration::from_millis(expect_ms * 2));

    if events.send(LinkEvent::Connected.into()).await.is_err() {
        return LinkEnd::Shutdown;
    }
    info!(send_ms, expect_ms, "Connected to broker");

    let mut heartbeat = ticker(Duration::from_millis(send_ms));
    let mut liveness = liveness_timeout.and_then(|timeout| ticker(timeout / 2));
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else {
                    let _ = sink.close().await;
                    return LinkEnd::Shutdown;
                };
                let goodbye = matches!(frame, ClientFrame::Disconnect);
                if let Err(reason) = send(&mut sink, &frame).await {
                    return LinkEnd::Lost(reason);
                }
                if goodbye {
                    let _ = sink.close().await;
                    return LinkEnd::Shutdown;
                }
            }

            _ = closing.changed() => {
                // Flush what was queued before the close request.
                let mut said_goodbye = false;
                while let Ok(frame) = frames.try_recv() {
                    said_goodbye |= matches!(frame, ClientFrame::Disconnect);
                    if send(&mut sink, &frame).await.is_err() || said_goodbye {
                        break;
                    }
                }
                if !said_goodbye {
                    let _ = send(&mut sink, &ClientFrame::Disconnect).await;
                }
                let _ = sink.close().await;
                return LinkEnd::Shutdown;
            }

            _ = tick(&mut heartbeat) => {
                if let Err(reason) = send(&mut sink, &ClientFrame::Heartbeat).await {
                    return LinkEnd::Lost(reason);
                }
            }

            _ = tick(&mut liveness) => {
                if let Some(timeout) = liveness_timeout {
                    if last_seen.elapsed() > timeout {
                        return LinkEnd::Lost(format!("no traffic from broker for {timeout:?}"));
                    }
                }
            }

            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        last_seen = Instant::now();
                        let decoded = match BrokerFrame::decode(&text) {
                            Ok(decoded) => decoded,
                            Err(e) => {
                                debug!("Unparseable broker frame: {}", e);
                                continue;
                            }
                        };
                        for frame in decoded {
                            let event = match frame {
                                BrokerFrame::Message { destination, body } => LinkEvent::Message { destination, body },
                                BrokerFrame::Error { message } => LinkEvent::BrokerError(message),
                                BrokerFrame::Heartbeat | BrokerFrame::Connected { .. } => continue,
                            };
                            if events.send(event.into()).await.is_err() {
                                return LinkEnd::Shutdown;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        last_seen = Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        return LinkEnd::Lost("closed by broker".to_string());
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        return LinkEnd::Lost(e.to_string());
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

/// Wait for CONNECTED and return the broker's heartbeat offer.
async fn handshake<S>(stream: &mut S) -> Result<HeartBeat, String>
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg) = stream.next().await {
        let text = match msg.map_err(|e| e.to_string())? {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        for frame in BrokerFrame::decode(&text).map_err(|e| e.to_string())? {
            match frame {
                BrokerFrame::Connected { heart_beat } => return Ok(heart_beat),
                BrokerFrame::Error { message } => return Err(format!("broker refused session: {message}")),
                BrokerFrame::Heartbeat | BrokerFrame::Message { .. } => {}
            }
        }
    }
    Err("closed during handshake".to_string())
}

async fn send<S>(sink: &mut S, frame: &ClientFrame) -> Result<(), String>
where
    S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    sink.send(Message::Text(frame.encode())).await.map_err(|e| e.to_string())
}

/// Host part of a `ws://host:port/path` URL, for the CONNECT `host` header.
fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?']).next().unwrap_or(rest);
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    match authority.strip_prefix('[') {
        Some(v6) => v6.split(']').next().unwrap_or(v6),
        None => authority.split(':').next().unwrap_or(authority),
    }
}

/// Interval whose first tick is one period away. `None` for a zero period.
fn ticker(period: Duration) -> Option<Interval> {
    if period.is_zero() {
        return None;
    }
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    Some(interval)
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    const WAIT: Duration = Duration::from_secs(5);

    fn config(url: String) -> ClientConfig {
        ClientConfig {
            broker_url: url,
            reconnect_delay: Duration::from_millis(50),
            heartbeat_outgoing: Duration::from_secs(30),
            heartbeat_incoming: Duration::ZERO,
            event_queue_capacity: 32,
        }
    }

    async fn listen() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        (listener, url)
    }

    /// Accept one client and answer its CONNECT with `offer`.
    async fn accept_stomp(listener: &TcpListener, offer: HeartBeat) -> WebSocketStream<TcpStream> {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        loop {
            let Some(Ok(Message::Text(text))) = ws.next().await else {
                panic!("client left before CONNECT");
            };
            if let Some(ClientFrame::Connect { host, .. }) = ClientFrame::decode(&text).unwrap().first() {
                assert_eq!(host, "127.0.0.1");
                break;
            }
        }
        ws.send(Message::Text(BrokerFrame::Connected { heart_beat: offer }.encode()))
            .await
            .unwrap();
        ws
    }

    async fn next_event(events: &mut mpsc::Receiver<LinkEvent>) -> LinkEvent {
        timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for link event")
            .expect("link task ended")
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("ws://localhost:8080/ws"), "localhost");
        assert_eq!(host_of("wss://user@chess.example.org/ws?x=1"), "chess.example.org");
        assert_eq!(host_of("ws://[::1]:9000/ws"), "::1");
        assert_eq!(host_of("broker"), "broker");
    }

    #[tokio::test]
    async fn test_reconnect_replays_subscriptions() {
        let (listener, url) = listen().await;
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<(usize, String)>();

        // Broker: first connection is dropped after two subscriptions,
        // second stays open.
        tokio::spawn(async move {
            for conn in 0..2usize {
                let mut ws = accept_stomp(&listener, HeartBeat::default()).await;
                let mut subs = 0;
                while let Some(Ok(msg)) = ws.next().await {
                    let Message::Text(text) = msg else { continue };
                    for frame in ClientFrame::decode(&text).unwrap() {
                        if let ClientFrame::Subscribe { destination } = frame {
                            seen_tx.send((conn, destination)).unwrap();
                            subs += 1;
                        }
                    }
                    if subs == 2 && conn == 0 {
                        break;
                    }
                }
                drop(ws);
            }
        });

        let identity = LocalIdentity::new("u1", "alice");
        let (events_tx, mut events) = mpsc::channel(32);
        let mut gateway = WsGateway::spawn(&config(url), &identity, events_tx);
        gateway.subscribe("/topic/online-players").unwrap();
        gateway.subscribe("/topic/online-count").unwrap();

        assert_eq!(next_event(&mut events).await, LinkEvent::Connected);
        gateway.on_link_up().unwrap();

        assert!(matches!(next_event(&mut events).await, LinkEvent::Disconnected { .. }));
        gateway.on_link_down();
        assert!(matches!(
            gateway.publish("/app/game/find", "{}".into()),
            Err(GatewayError::NotConnected)
        ));

        assert_eq!(next_event(&mut events).await, LinkEvent::Connected);
        gateway.on_link_up().unwrap();

        let mut per_conn = [BTreeSet::new(), BTreeSet::new()];
        while per_conn[1].len() < 2 {
            let (conn, destination) = timeout(WAIT, seen_rx.recv()).await.unwrap().unwrap();
            per_conn[conn].insert(destination);
        }
        assert_eq!(per_conn[0], per_conn[1]);
        assert_eq!(per_conn[1], gateway.subscriptions());
    }

    #[tokio::test]
    async fn test_deliveries_and_silent_broker() {
        let (listener, url) = listen().await;

        // Broker promises 50 ms heartbeats, sends one delivery, then goes
        // quiet without closing.
        tokio::spawn(async move {
            let mut ws = accept_stomp(&listener, HeartBeat::new(50, 0)).await;
            let delivery = BrokerFrame::Message {
                destination: "/topic/online-count".into(),
                body: "3".into(),
            };
            ws.send(Message::Text(delivery.encode())).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let mut config = config(url);
        config.heartbeat_incoming = Duration::from_millis(50);
        config.reconnect_delay = Duration::from_secs(60);
        let identity = LocalIdentity::new("u1", "alice");
        let (events_tx, mut events) = mpsc::channel(32);
        let gateway = WsGateway::spawn(&config, &identity, events_tx);

        assert_eq!(next_event(&mut events).await, LinkEvent::Connected);
        assert_eq!(
            next_event(&mut events).await,
            LinkEvent::Message {
                destination: "/topic/online-count".into(),
                body: "3".into(),
            }
        );
        match next_event(&mut events).await {
            LinkEvent::Disconnected { reason } => assert!(reason.contains("no traffic")),
            other => panic!("expected disconnect, got {other:?}"),
        }
        drop(gateway);
    }

    #[tokio::test]
    async fn test_outgoing_heartbeats_follow_negotiated_period() {
        let (listener, url) = listen().await;
        let (beats_tx, mut beats) = mpsc::unbounded_channel::<Instant>();

        // Broker asks for a heartbeat every 40 ms and counts them.
        tokio::spawn(async move {
            let mut ws = accept_stomp(&listener, HeartBeat::new(0, 40)).await;
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(text) = msg {
                    if ClientFrame::decode(&text).unwrap() == [ClientFrame::Heartbeat] {
                        let _ = beats_tx.send(Instant::now());
                    }
                }
            }
        });

        let mut config = config(url);
        config.heartbeat_outgoing = Duration::from_millis(20);
        let (events_tx, mut events) = mpsc::channel(32);
        let gateway = WsGateway::spawn(&config, &LocalIdentity::new("u1", "alice"), events_tx);
        assert_eq!(next_event(&mut events).await, LinkEvent::Connected);

        let mut stamps = Vec::new();
        for _ in 0..4 {
            stamps.push(timeout(WAIT, beats.recv()).await.unwrap().unwrap());
        }
        // Agreed period is max(20, 40) = 40 ms.
        let spread = stamps[3] - stamps[0];
        assert!(spread >= Duration::from_millis(100), "beats too fast: {spread:?}");
        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_flushes_queued_frames() {
        let (listener, url) = listen().await;
        let (seen_tx, mut seen) = mpsc::unbounded_channel::<ClientFrame>();

        tokio::spawn(async move {
            let mut ws = accept_stomp(&listener, HeartBeat::default()).await;
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                for frame in ClientFrame::decode(&text).unwrap() {
                    let _ = seen_tx.send(frame);
                }
            }
        });

        let (events_tx, mut events) = mpsc::channel(32);
        let mut gateway = WsGateway::spawn(&config(url), &LocalIdentity::new("u1", "alice"), events_tx);
        assert_eq!(next_event(&mut events).await, LinkEvent::Connected);
        gateway.on_link_up().unwrap();

        gateway
            .publish("/app/player/disconnect", r#"{"userId":"u1"}"#.into())
            .unwrap();
        gateway.disconnect().unwrap();
        assert!(!gateway.is_connected());
        gateway.shutdown().await;

        let mut received = Vec::new();
        while let Ok(Some(frame)) = timeout(WAIT, seen.recv()).await {
            received.push(frame);
        }
        assert_eq!(
            received,
            [
                ClientFrame::Send {
                    destination: "/app/player/disconnect".into(),
                    body: r#"{"userId":"u1"}"#.into(),
                },
                ClientFrame::Disconnect,
            ]
        );
    }

    #[tokio::test]
    async fn test_refused_session_reports_disconnect() {
        let (listener, url) = listen().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            let _ = ws.next().await;
            let refusal = BrokerFrame::Error {
                message: "unknown user".into(),
            };
            let _ = ws.send(Message::Text(refusal.encode())).await;
            while let Some(Ok(_)) = ws.next().await {}
        });

        let mut config = config(url);
        config.reconnect_delay = Duration::from_secs(60);
        let (events_tx, mut events) = mpsc::channel(8);
        let gateway = WsGateway::spawn(&config, &LocalIdentity::new("u1", "alice"), events_tx);
        match next_event(&mut events).await {
            LinkEvent::Disconnected { reason } => assert!(reason.contains("unknown user"), "{reason}"),
            other => panic!("expected disconnect, got {other:?}"),
        }
        gateway.shutdown().await;
    }

    #[tokio::test]
    async fn test_unreachable_broker_reports_disconnect() {
        // Bind then drop to get a port nobody listens on.
        let (listener, url) = listen().await;
        drop(listener);

        let (events_tx, mut events) = mpsc::channel(8);
        let gateway = WsGateway::spawn(&config(url), &LocalIdentity::new("u1", "alice"), events_tx);
        assert!(matches!(next_event(&mut events).await, LinkEvent::Disconnected { .. }));
        assert!(matches!(next_event(&mut events).await, LinkEvent::Disconnected { .. }));
        gateway.shutdown().await;
    }
}
