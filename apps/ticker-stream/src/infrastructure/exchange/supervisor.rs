//! Feed Supervisor
//!
//! Drives one venue session through its connection epochs:
//!
//! ```text
//! Disconnected -> Connecting -> Subscribed <-> Degraded
//!      ^                            |             |
//!      +------ backoff delay -------+-------------+
//! ```
//!
//! Each epoch connects, sends the adapter's subscription frames, then pumps
//! inbound frames until the link dies or the session is cancelled. Silence
//! triggers heartbeat probes; prolonged silence abandons the connection.
//! Every state change is published through a `watch` channel so handles can
//! take snapshots without touching the session task.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{
    Connection, ControlSignal, ExchangeAdapter, FrameError, InboundFrame, OutboundFrame,
    ParsedFrame, SessionListener, Transport, TransportError,
};
use crate::domain::derived::DisplayUpdate;
use crate::domain::session::{ConnectionState, VenueSession};
use crate::domain::ticker::CanonicalTicker;
use crate::infrastructure::config::SessionConfig;
use crate::infrastructure::exchange::heartbeat::{Liveness, LivenessMonitor};
use crate::infrastructure::exchange::reconnect::ReconnectPolicy;
use crate::infrastructure::metrics;

/// Time allowed for a graceful close before the connection is dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Reasons a connection epoch ended.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Connecting, sending, or receiving failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// An outbound frame could not be encoded.
    #[error("failed to encode outbound frame: {0}")]
    Encode(#[from] FrameError),

    /// A heartbeat probe could not be sent.
    #[error("heartbeat probe failed: {0}")]
    HeartbeatFailure(#[source] TransportError),

    /// Nothing arrived for longer than the dead-link threshold.
    #[error("no frames received for {silence:?}")]
    DeadLink {
        /// Silence observed when the link was abandoned.
        silence: Duration,
    },
}

/// Owns a venue session and runs it until cancelled.
pub struct FeedSupervisor {
    adapter: Arc<dyn ExchangeAdapter>,
    transport: Arc<dyn Transport>,
    listener: Arc<dyn SessionListener>,
    config: SessionConfig,
    state: watch::Sender<VenueSession>,
    cancel: CancellationToken,
}

impl FeedSupervisor {
    /// Create a supervisor publishing session state through `state`.
    #[must_use]
    pub fn new(
        adapter: Arc<dyn ExchangeAdapter>,
        transport: Arc<dyn Transport>,
        listener: Arc<dyn SessionListener>,
        config: SessionConfig,
        state: watch::Sender<VenueSession>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            adapter,
            transport,
            listener,
            config,
            state,
            cancel,
        }
    }

    /// Run connection epochs until cancelled or reconnects are exhausted.
    ///
    /// The session is always left `Disconnected` on return.
    pub async fn run(self) {
        let venue = self.adapter.venue();
        let endpoint = self
            .config
            .endpoint
            .clone()
            .unwrap_or_else(|| self.adapter.default_endpoint().to_string());
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            match self.run_epoch(&endpoint, &mut policy).await {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(venue = %venue, error = %e, "Connection lost");
                    self.set_state(ConnectionState::Disconnected);

                    let Some(delay) = policy.next_delay() else {
                        tracing::error!(
                            venue = %venue,
                            attempts = policy.attempt_count(),
                            "Reconnect attempts exhausted, stopping session"
                        );
                        break;
                    };

                    self.state.send_modify(VenueSession::record_reconnect);
                    metrics::record_reconnect(venue);
                    tracing::info!(
                        venue = %venue,
                        attempt = policy.attempt_count(),
                        delay_ms = delay.as_millis(),
                        "Reconnecting"
                    );

                    tokio::select! {
                        () = self.cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
        tracing::info!(venue = %venue, "Session stopped");
    }

    /// One connection epoch. `Ok` means the session was cancelled.
    async fn run_epoch(
        &self,
        endpoint: &str,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), FeedError> {
        let venue = self.adapter.venue();
        self.state.send_modify(VenueSession::begin_epoch);
        self.set_state(ConnectionState::Connecting);
        tracing::info!(venue = %venue, endpoint, "Connecting");

        let mut conn = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            result = self.transport.connect(endpoint) => result?,
        };

        let result = self.stream(conn.as_mut(), policy).await;

        match tokio::time::timeout(CLOSE_TIMEOUT, conn.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(venue = %venue, error = %e, "Close failed"),
            Err(_) => tracing::debug!(venue = %venue, "Close timed out"),
        }

        result
    }

    /// Subscribe, then pump frames until cancellation or failure.
    async fn stream(
        &self,
        conn: &mut dyn Connection,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), FeedError> {
        let venue = self.adapter.venue();

        for frame in self.adapter.build_subscription()? {
            conn.send(frame).await?;
        }
        self.set_state(ConnectionState::Subscribed);
        policy.reset();
        tracing::info!(
            venue = %venue,
            instruments = self.adapter.instruments().len(),
            "Subscribed"
        );

        let mut liveness = LivenessMonitor::new(self.config.heartbeat(), Instant::now());

        loop {
            let deadline = liveness.next_deadline();
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Ok(()),
                received = tokio::time::timeout_at(deadline, conn.recv()) => match received {
                    Ok(frame) => {
                        let frame = frame?;
                        liveness.record_frame(Instant::now());
                        self.handle_frame(conn, frame).await?;
                    }
                    Err(_) => self.on_silence(conn, &mut liveness).await?,
                },
            }
        }
    }

    async fn on_silence(
        &self,
        conn: &mut dyn Connection,
        liveness: &mut LivenessMonitor,
    ) -> Result<(), FeedError> {
        let venue = self.adapter.venue();
        let now = Instant::now();

        match liveness.check(now) {
            Liveness::Healthy => Ok(()),
            Liveness::Dead => Err(FeedError::DeadLink {
                silence: liveness.silence(now),
            }),
            Liveness::ProbeDue => {
                self.set_state(ConnectionState::Degraded);
                let probe = self.adapter.heartbeat()?;
                conn.send(probe)
                    .await
                    .map_err(FeedError::HeartbeatFailure)?;
                liveness.record_probe(Instant::now());
                metrics::record_heartbeat_sent(venue);
                tracing::debug!(
                    venue = %venue,
                    probes = liveness.probes_sent(),
                    silence_ms = liveness.silence(now).as_millis(),
                    "Link quiet, sent heartbeat"
                );
                Ok(())
            }
        }
    }

    async fn handle_frame(
        &self,
        conn: &mut dyn Connection,
        frame: InboundFrame,
    ) -> Result<(), FeedError> {
        let venue = self.adapter.venue();
        let started = std::time::Instant::now();
        let observed_at = Utc::now();

        self.state.send_modify(|session| session.record_frame(observed_at));
        self.set_state(ConnectionState::Subscribed);

        if let Some(len) = frame.data_len() {
            let bytes = len as u64;
            let mut total = 0;
            self.state
                .send_modify(|session| total = session.record_bytes(bytes));
            metrics::record_frame_received(venue, bytes);
            self.listener.on_traffic(total);
        }

        match frame {
            InboundFrame::Ping(payload) => {
                conn.send(OutboundFrame::Pong(payload)).await?;
                return Ok(());
            }
            InboundFrame::Pong => return Ok(()),
            InboundFrame::Text(text) => self.dispatch(&text, observed_at),
            InboundFrame::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => self.dispatch(&text, observed_at),
                Err(_) => self.drop_frame(&FrameError::NotUtf8),
            },
        }

        metrics::record_processing_duration(venue, started.elapsed());
        Ok(())
    }

    fn dispatch(&self, raw: &str, observed_at: chrono::DateTime<Utc>) {
        match self.adapter.parse_frame(raw, observed_at) {
            Ok(ParsedFrame::Ticker(ticker)) => self.deliver(ticker),
            Ok(ParsedFrame::Control(signal)) => self.on_control(signal),
            Ok(ParsedFrame::Empty) => {}
            Err(e) => self.drop_frame(&e),
        }
    }

    fn deliver(&self, ticker: CanonicalTicker) {
        let venue = self.adapter.venue();
        let mut update = None;
        self.state.send_modify(|session| {
            let accepted = session.accept_ticker(ticker);
            update = Some(DisplayUpdate::from_ticker(venue, &accepted));
        });

        if let Some(update) = update {
            tracing::trace!(venue = %venue, update = %update, "Ticker");
            self.listener.on_update(update);
            metrics::record_ticker_delivered(venue);
        }
    }

    fn on_control(&self, signal: ControlSignal) {
        let venue = self.adapter.venue();
        match signal {
            ControlSignal::Heartbeat => tracing::trace!(venue = %venue, "Heartbeat reply"),
            ControlSignal::SubscriptionAck => {
                tracing::debug!(venue = %venue, "Subscription acknowledged");
            }
            ControlSignal::Error { code, message } => tracing::warn!(
                venue = %venue,
                code = code.as_deref().unwrap_or("-"),
                message = %message,
                "Venue reported an error"
            ),
        }
    }

    fn drop_frame(&self, error: &FrameError) {
        let venue = self.adapter.venue();
        if error.is_silent() {
            tracing::trace!(venue = %venue, error = %error, "Ignoring frame");
        } else {
            tracing::warn!(venue = %venue, error = %error, "Dropping frame");
        }
        metrics::record_frame_dropped(venue, error.reason());
    }

    fn set_state(&self, state: ConnectionState) {
        if self.state.send_if_modified(|session| session.set_state(state)) {
            let venue = self.adapter.venue();
            metrics::set_connection_state(venue, state);
            tracing::debug!(venue = %venue, state = %state, "Connection state changed");
            self.listener.on_state(state);
        }
    }
}
