//! Session Lifecycle Integration Tests
//!
//! Drives full sessions over a scripted in-memory transport with paused
//! time: subscription, heartbeat probing, dead-link reconnects, frame
//! validation, and shutdown.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};

use ticker_stream::infrastructure::exchange::{BINANCE_FUTURES_ENDPOINT, OKX_PUBLIC_ENDPOINT};
use ticker_stream::{
    Classification, Connection, ConnectionState, DisplayUpdate, InboundFrame, InstrumentId,
    OutboundFrame, SessionConfig, SessionError, SessionHandle, SessionListener, Transport,
    TransportError, Venue, start_session_with_transport,
};

// =============================================================================
// Scripted Transport
// =============================================================================

type Inbound = Result<InboundFrame, TransportError>;

/// The exchange side of one scripted connection.
struct Peer {
    inbound: mpsc::UnboundedSender<Inbound>,
    outbound: mpsc::UnboundedReceiver<OutboundFrame>,
}

impl Peer {
    fn push(&self, text: &str) {
        self.inbound
            .send(Ok(InboundFrame::Text(text.to_string())))
            .unwrap();
    }

    fn sent(&mut self) -> Vec<OutboundFrame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }
}

struct ScriptedConnection {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    outbound: mpsc::UnboundedSender<OutboundFrame>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn send(&mut self, frame: OutboundFrame) -> Result<(), TransportError> {
        self.outbound
            .send(frame)
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Result<InboundFrame, TransportError> {
        self.inbound
            .recv()
            .await
            .unwrap_or(Err(TransportError::Closed(None)))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Hands out prepared connections in order, then refuses.
#[derive(Default)]
struct ScriptedTransport {
    pending: Mutex<VecDeque<ScriptedConnection>>,
    endpoints: Mutex<Vec<String>>,
    connects: AtomicUsize,
}

impl ScriptedTransport {
    fn with_connections(count: usize) -> (Arc<Self>, Vec<Peer>) {
        let transport = Self::default();
        let mut peers = Vec::with_capacity(count);

        for _ in 0..count {
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            transport.pending.lock().push_back(ScriptedConnection {
                inbound: inbound_rx,
                outbound: outbound_tx,
            });
            peers.push(Peer {
                inbound: inbound_tx,
                outbound: outbound_rx,
            });
        }

        (Arc::new(transport), peers)
    }

    fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    fn endpoints(&self) -> Vec<String> {
        self.endpoints.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Connection>, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.endpoints.lock().push(endpoint.to_string());

        let next = self.pending.lock().pop_front();
        match next {
            Some(conn) => Ok(Box::new(conn)),
            None => Err(TransportError::Connect {
                endpoint: endpoint.to_string(),
                reason: "connection refused".to_string(),
            }),
        }
    }
}

// =============================================================================
// Recording Listener
// =============================================================================

#[derive(Default)]
struct Recorder {
    updates: Mutex<Vec<DisplayUpdate>>,
    states: Mutex<Vec<ConnectionState>>,
    traffic: AtomicU64,
}

impl Recorder {
    fn updates(&self) -> Vec<DisplayUpdate> {
        self.updates.lock().clone()
    }

    fn states(&self) -> Vec<ConnectionState> {
        self.states.lock().clone()
    }
}

impl SessionListener for Recorder {
    fn on_update(&self, update: DisplayUpdate) {
        self.updates.lock().push(update);
    }

    fn on_traffic(&self, total_bytes: u64) {
        self.traffic.store(total_bytes, Ordering::SeqCst);
    }

    fn on_state(&self, state: ConnectionState) {
        self.states.lock().push(state);
    }
}

// =============================================================================
// Helpers
// =============================================================================

const INSTRUMENT: &str = "BTC-USDT-SWAP";

fn okx_ticker(last: &str) -> String {
    json!({
        "arg": {"channel": "tickers", "instId": INSTRUMENT},
        "data": [{
            "instId": INSTRUMENT,
            "last": last,
            "open24h": "63000",
            "high24h": "65000",
            "low24h": "62000"
        }]
    })
    .to_string()
}

fn start(
    venue: Venue,
    transport: &Arc<ScriptedTransport>,
    recorder: &Arc<Recorder>,
    config: SessionConfig,
) -> SessionHandle {
    start_session_with_transport(
        venue,
        [InstrumentId::from(INSTRUMENT)],
        Arc::clone(recorder),
        config,
        Arc::clone(transport) as Arc<dyn Transport>,
    )
    .unwrap()
}

fn text(frame: &OutboundFrame) -> Value {
    match frame {
        OutboundFrame::Text(text) => serde_json::from_str(text).unwrap(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

fn is_okx_ping(frame: &OutboundFrame) -> bool {
    matches!(frame, OutboundFrame::Text(text) if text.contains("\"ping\""))
}

// =============================================================================
// Heartbeat and Reconnect
// =============================================================================

#[tokio::test(start_paused = true)]
async fn silence_sends_one_probe_and_degrades() {
    let (transport, mut peers) = ScriptedTransport::with_connections(1);
    let recorder = Arc::new(Recorder::default());
    let handle = start(Venue::Okx, &transport, &recorder, SessionConfig::default());

    sleep(Duration::from_secs(6)).await;

    let sent = peers[0].sent();
    assert_eq!(sent.len(), 2, "unexpected frames: {sent:?}");
    assert_eq!(
        text(&sent[0]),
        json!({"op": "subscribe", "args": [{"channel": "tickers", "instId": INSTRUMENT}]})
    );
    assert_eq!(text(&sent[1]), json!({"op": "ping"}));
    assert_eq!(handle.state(), ConnectionState::Degraded);
    assert_eq!(transport.endpoints(), vec![OKX_PUBLIC_ENDPOINT.to_string()]);

    // Any frame restores the link.
    peers[0].push("pong");
    sleep(Duration::from_millis(10)).await;
    assert_eq!(handle.state(), ConnectionState::Subscribed);
    assert_eq!(
        recorder.states(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Subscribed,
            ConnectionState::Degraded,
            ConnectionState::Subscribed,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn dead_link_forces_reconnect_after_delay() {
    let (transport, mut peers) = ScriptedTransport::with_connections(2);
    let recorder = Arc::new(Recorder::default());
    let handle = start(Venue::Okx, &transport, &recorder, SessionConfig::default());

    sleep(Duration::from_secs(31)).await;

    assert_eq!(handle.state(), ConnectionState::Disconnected);
    assert_eq!(transport.connects(), 1);
    assert_eq!(handle.snapshot().reconnect_attempts(), 1);
    let probes = peers[0].sent().iter().filter(|f| is_okx_ping(f)).count();
    assert_eq!(probes, 5);

    sleep(Duration::from_secs(5)).await;

    assert_eq!(transport.connects(), 2);
    assert_eq!(handle.state(), ConnectionState::Subscribed);
    assert_eq!(handle.snapshot().epoch(), 2);
    assert_eq!(text(&peers[1].sent()[0])["op"], "subscribe");
}

#[tokio::test(start_paused = true)]
async fn failed_heartbeat_disconnects_and_reconnects() {
    let (transport, mut peers) = ScriptedTransport::with_connections(2);
    let recorder = Arc::new(Recorder::default());
    let handle = start(Venue::Okx, &transport, &recorder, SessionConfig::default());

    sleep(Duration::from_millis(10)).await;
    assert_eq!(handle.state(), ConnectionState::Subscribed);

    // Closing the exchange side of the outbound channel makes the probe send fail.
    let Peer { inbound, outbound } = peers.remove(0);
    drop(outbound);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(handle.state(), ConnectionState::Disconnected);
    assert_eq!(
        recorder.states(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Subscribed,
            ConnectionState::Degraded,
            ConnectionState::Disconnected,
        ]
    );

    sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.connects(), 2);
    assert_eq!(handle.state(), ConnectionState::Subscribed);
    assert_eq!(text(&peers[0].sent()[0])["op"], "subscribe");
    drop(inbound);
}

#[tokio::test(start_paused = true)]
async fn oversized_dead_link_threshold_keeps_sending_heartbeats() {
    let (transport, mut peers) = ScriptedTransport::with_connections(1);
    let recorder = Arc::new(Recorder::default());
    let config = SessionConfig {
        dead_link_threshold: Duration::MAX,
        ..SessionConfig::default()
    };
    let handle = start(Venue::Okx, &transport, &recorder, config);

    sleep(Duration::from_secs(61)).await;

    let pings = peers[0].sent().iter().filter(|f| is_okx_ping(f)).count();
    assert_eq!(pings, 12);
    assert_eq!(handle.state(), ConnectionState::Degraded);
    assert_eq!(transport.connects(), 1);
    assert!(!handle.is_stopped());

    handle.stop();
    handle.join().await.unwrap();
    assert_eq!(recorder.states().last(), Some(&ConnectionState::Disconnected));
}

#[tokio::test(start_paused = true)]
async fn peer_close_reconnects() {
    let (transport, peers) = ScriptedTransport::with_connections(2);
    let recorder = Arc::new(Recorder::default());
    let handle = start(Venue::Okx, &transport, &recorder, SessionConfig::default());

    sleep(Duration::from_millis(10)).await;
    peers[0]
        .inbound
        .send(Err(TransportError::Closed(Some("1000 bye".to_string()))))
        .unwrap();

    sleep(Duration::from_secs(1)).await;
    assert_eq!(handle.state(), ConnectionState::Disconnected);

    sleep(Duration::from_secs(5)).await;
    assert_eq!(transport.connects(), 2);
    assert_eq!(handle.state(), ConnectionState::Subscribed);
}

#[tokio::test(start_paused = true)]
async fn inbound_ping_is_answered() {
    let (transport, mut peers) = ScriptedTransport::with_connections(1);
    let recorder = Arc::new(Recorder::default());
    let _handle = start(Venue::Okx, &transport, &recorder, SessionConfig::default());

    peers[0]
        .inbound
        .send(Ok(InboundFrame::Ping(vec![7, 7])))
        .unwrap();
    sleep(Duration::from_millis(10)).await;

    let sent = peers[0].sent();
    assert_eq!(sent.last(), Some(&OutboundFrame::Pong(vec![7, 7])));
}

// =============================================================================
// Frame Handling
// =============================================================================

#[tokio::test(start_paused = true)]
async fn malformed_frame_is_dropped_and_next_is_delivered() {
    let (transport, peers) = ScriptedTransport::with_connections(1);
    let recorder = Arc::new(Recorder::default());
    let handle = start(Venue::Okx, &transport, &recorder, SessionConfig::default());

    let malformed =
        json!({"data": [{"instId": INSTRUMENT, "open24h": "1", "high24h": "1", "low24h": "1"}]})
            .to_string();
    let valid = okx_ticker("64000.1");
    peers[0].push(&malformed);
    peers[0].push(&valid);
    sleep(Duration::from_millis(100)).await;

    let updates = recorder.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].formatted_price, "64,000.10");
    assert_eq!(updates[0].classification, Classification::Up);
    assert_eq!(
        updates[0].to_string(),
        "BTC-USDT-SWAP: 64,000.10 (+1.59%)\n24h high: 65000.0000 low: 62000.0000"
    );

    assert_eq!(handle.state(), ConnectionState::Subscribed);
    assert_eq!(transport.connects(), 1);

    let expected_bytes = (malformed.len() + valid.len()) as u64;
    assert_eq!(handle.snapshot().traffic().total_bytes(), expected_bytes);
    assert_eq!(recorder.traffic.load(Ordering::SeqCst), expected_bytes);
    assert!(handle.snapshot().last_message_at().is_some());
}

#[tokio::test(start_paused = true)]
async fn binance_symbols_map_back_to_instruments() {
    let (transport, mut peers) = ScriptedTransport::with_connections(1);
    let recorder = Arc::new(Recorder::default());
    let handle = start(Venue::Binance, &transport, &recorder, SessionConfig::default());

    peers[0].push(r#"{"e":"24hrTicker","s":"BTCUSDT","c":"0.5","o":"0","h":"1","l":"0.1"}"#);
    peers[0].push(r#"{"e":"24hrTicker","s":"DOGEUSDT","c":"1","o":"1","h":"1","l":"1"}"#);
    sleep(Duration::from_millis(100)).await;

    let updates = recorder.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].instrument.as_str(), INSTRUMENT);
    assert_eq!(updates[0].classification, Classification::Unknown);
    assert_eq!(updates[0].to_string(), "BTC-USDT-SWAP: 0.500000");
    assert_eq!(transport.endpoints(), vec![BINANCE_FUTURES_ENDPOINT.to_string()]);

    let subscribe = peers[0].sent();
    assert_eq!(text(&subscribe[0])["params"], json!(["btcusdt@ticker"]));

    sleep(Duration::from_secs(6)).await;
    assert_eq!(peers[0].sent(), vec![OutboundFrame::Ping]);
    assert_eq!(handle.state(), ConnectionState::Degraded);
}

#[tokio::test(start_paused = true)]
async fn history_keeps_the_newest_points() {
    let (transport, peers) = ScriptedTransport::with_connections(1);
    let recorder = Arc::new(Recorder::default());
    let config = SessionConfig::default()
        .with_history_capacity(3)
        .with_endpoint("wss://okx.test/ws");
    let handle = start(Venue::Okx, &transport, &recorder, config);

    for last in ["1", "2", "3", "4"] {
        peers[0].push(&okx_ticker(last));
    }
    sleep(Duration::from_millis(100)).await;

    let prices: Vec<Decimal> = handle
        .history(&InstrumentId::from(INSTRUMENT))
        .into_iter()
        .map(|point| point.price)
        .collect();
    assert_eq!(prices, vec![Decimal::from(2), Decimal::from(3), Decimal::from(4)]);
    assert_eq!(recorder.updates().len(), 4);
    assert_eq!(transport.endpoints(), vec!["wss://okx.test/ws".to_string()]);
}

// =============================================================================
// Start and Stop
// =============================================================================

#[tokio::test(start_paused = true)]
async fn stop_interrupts_reconnect_delay() {
    let (transport, _peers) = ScriptedTransport::with_connections(0);
    let recorder = Arc::new(Recorder::default());
    let handle = start(Venue::Okx, &transport, &recorder, SessionConfig::default());

    sleep(Duration::from_secs(1)).await;
    assert_eq!(handle.state(), ConnectionState::Disconnected);
    assert_eq!(transport.connects(), 1);

    let started = Instant::now();
    handle.stop();
    handle.stop();
    assert!(handle.is_stopped());
    handle.join().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(transport.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_interrupts_receive_loop() {
    let (transport, _peers) = ScriptedTransport::with_connections(1);
    let recorder = Arc::new(Recorder::default());
    let handle = start(Venue::Okx, &transport, &recorder, SessionConfig::default());

    sleep(Duration::from_secs(2)).await;
    assert_eq!(handle.state(), ConnectionState::Subscribed);

    let started = Instant::now();
    handle.stop();
    handle.join().await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(transport.connects(), 1);
    assert_eq!(
        recorder.states(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Subscribed,
            ConnectionState::Disconnected,
        ]
    );
}

#[tokio::test]
async fn empty_instrument_set_is_rejected_before_connecting() {
    let (transport, _peers) = ScriptedTransport::with_connections(1);
    let recorder = Arc::new(Recorder::default());

    let err = start_session_with_transport(
        Venue::Okx,
        Vec::<InstrumentId>::new(),
        recorder,
        SessionConfig::default(),
        Arc::clone(&transport) as Arc<dyn Transport>,
    )
    .unwrap_err();

    assert!(matches!(err, SessionError::InvalidInstrumentSet(_)));
    assert_eq!(transport.connects(), 0);
}
