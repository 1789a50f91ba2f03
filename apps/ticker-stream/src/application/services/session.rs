//! Session Service
//!
//! Starts venue sessions and hands consumers a [`SessionHandle`] for
//! stopping them and reading their state.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::application::ports::{SessionListener, Transport};
use crate::domain::derived::DisplayUpdate;
use crate::domain::history::{PriceHistoryBuffer, PricePoint};
use crate::domain::session::{ConnectionState, Venue, VenueSession};
use crate::domain::ticker::InstrumentId;
use crate::infrastructure::config::{ConfigError, SessionConfig};
use crate::infrastructure::exchange::{FeedSupervisor, WebSocketTransport, adapter_for};

// =============================================================================
// Errors
// =============================================================================

/// Session start and shutdown errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The instrument set cannot be subscribed.
    #[error("invalid instrument set: {0}")]
    InvalidInstrumentSet(&'static str),

    /// The session configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No Tokio runtime to spawn the session on.
    #[error("start_session must be called from within a Tokio runtime")]
    NoRuntime,

    /// The session task panicked or was aborted.
    #[error("session task failed: {0}")]
    TaskFailed(String),
}

// =============================================================================
// Starting Sessions
// =============================================================================

/// Start a session over WebSocket, honouring `config.proxy`.
///
/// # Errors
///
/// Returns [`SessionError::InvalidInstrumentSet`] for an empty set or an
/// empty instrument id, [`SessionError::Config`] for invalid settings, and
/// [`SessionError::NoRuntime`] outside a Tokio runtime. Nothing touches the
/// network before these checks pass.
pub fn start_session(
    venue: Venue,
    instruments: impl IntoIterator<Item = InstrumentId>,
    listener: impl SessionListener,
    config: SessionConfig,
) -> Result<SessionHandle, SessionError> {
    let transport = Arc::new(WebSocketTransport::new(
        config.proxy.clone(),
        config.connect_timeout,
    ));
    start_session_with_transport(venue, instruments, listener, config, transport)
}

/// Start a session over a caller-supplied transport.
///
/// # Errors
///
/// See [`start_session`].
pub fn start_session_with_transport(
    venue: Venue,
    instruments: impl IntoIterator<Item = InstrumentId>,
    listener: impl SessionListener,
    config: SessionConfig,
    transport: Arc<dyn Transport>,
) -> Result<SessionHandle, SessionError> {
    let instruments = dedup_instruments(instruments)?;
    config.validate()?;
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| SessionError::NoRuntime)?;

    let session = VenueSession::new(venue, instruments.clone(), config.history_capacity);
    let (state_tx, state_rx) = watch::channel(session);
    let cancel = CancellationToken::new();

    let supervisor = FeedSupervisor::new(
        adapter_for(venue, instruments),
        transport,
        Arc::new(listener),
        config,
        state_tx,
        cancel.clone(),
    );
    let task = runtime.spawn(supervisor.run());
    tracing::info!(venue = %venue, "Session started");

    Ok(SessionHandle {
        venue,
        cancel: cancel.clone(),
        state: state_rx,
        task,
        _guard: cancel.drop_guard(),
    })
}

/// Drop duplicates (first occurrence wins) and reject empty input.
fn dedup_instruments(
    instruments: impl IntoIterator<Item = InstrumentId>,
) -> Result<Vec<InstrumentId>, SessionError> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();

    for instrument in instruments {
        if instrument.as_str().trim().is_empty() {
            return Err(SessionError::InvalidInstrumentSet("empty instrument id"));
        }
        if seen.insert(instrument.clone()) {
            unique.push(instrument);
        }
    }

    if unique.is_empty() {
        return Err(SessionError::InvalidInstrumentSet("no instruments"));
    }
    Ok(unique)
}

// =============================================================================
// Session Handle
// =============================================================================

/// Control and observation handle for a running session.
///
/// Dropping the handle stops the session.
#[derive(Debug)]
pub struct SessionHandle {
    venue: Venue,
    cancel: CancellationToken,
    state: watch::Receiver<VenueSession>,
    task: JoinHandle<()>,
    _guard: DropGuard,
}

impl SessionHandle {
    /// Venue the session consumes.
    #[must_use]
    pub const fn venue(&self) -> Venue {
        self.venue
    }

    /// Request a stop. Idempotent; interrupts any pending wait.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!(venue = %self.venue, "Stopping session");
            self.cancel.cancel();
        }
    }

    /// Whether a stop was requested or the session ended on its own.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled() || self.task.is_finished()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().state()
    }

    /// Copy of the full session state.
    #[must_use]
    pub fn snapshot(&self) -> VenueSession {
        self.state.borrow().clone()
    }

    /// Price history for one instrument, oldest first.
    #[must_use]
    pub fn history(&self, instrument: &InstrumentId) -> Vec<PricePoint> {
        self.state
            .borrow()
            .history(instrument)
            .map(PriceHistoryBuffer::to_vec)
            .unwrap_or_default()
    }

    /// Receiver notified on every session state change.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<VenueSession> {
        self.state.clone()
    }

    /// Wait for the session task to finish.
    ///
    /// Does not stop the session; call [`stop`](Self::stop) first.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TaskFailed`] if the task panicked.
    pub async fn join(self) -> Result<(), SessionError> {
        let Self { task, _guard, .. } = self;
        task.await
            .map_err(|e| SessionError::TaskFailed(e.to_string()))
    }
}

// =============================================================================
// Closure Listener
// =============================================================================

/// [`SessionListener`] built from two closures.
pub struct Callbacks<U, T> {
    on_update: U,
    on_traffic: T,
}

impl<U, T> Callbacks<U, T>
where
    U: Fn(DisplayUpdate) + Send + Sync + 'static,
    T: Fn(u64) + Send + Sync + 'static,
{
    /// Wrap an update callback and a traffic callback.
    pub const fn new(on_update: U, on_traffic: T) -> Self {
        Self {
            on_update,
            on_traffic,
        }
    }
}

impl<U, T> SessionListener for Callbacks<U, T>
where
    U: Fn(DisplayUpdate) + Send + Sync + 'static,
    T: Fn(u64) + Send + Sync + 'static,
{
    fn on_update(&self, update: DisplayUpdate) {
        (self.on_update)(update);
    }

    fn on_traffic(&self, total_bytes: u64) {
        (self.on_traffic)(total_bytes);
    }
}
