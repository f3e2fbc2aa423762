// ── Connection health ──
//
// Per-controller connectivity state plus the cool-down gate that spaces
// out refresh and reconnection attempts. Transitions are edge-triggered:
// callers learn whether a call actually crossed between states so that
// notifications fire once per transition.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::CoreError;
use crate::sync::lock;

// ── ConnectionState ──────────────────────────────────────────────

/// Connectivity of a controller, observable by consumers.
#[derive(Debug, Clone)]
pub enum ConnectionState {
    Connected,
    /// The last request failed. Holds the most recent failure.
    Disconnected { reason: Arc<izone_api::Error> },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// The failure that caused (or most recently extended) the outage.
    pub fn reason(&self) -> Option<&Arc<izone_api::Error>> {
        match self {
            Self::Connected => None,
            Self::Disconnected { reason } => Some(reason),
        }
    }
}

// ── Health ───────────────────────────────────────────────────────

/// Owner of a controller's [`ConnectionState`].
#[derive(Debug)]
pub(crate) struct Health {
    state: watch::Sender<ConnectionState>,
}

impl Health {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Connected);
        Self { state }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub(crate) fn current(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    /// Record a transport failure. Returns `true` only when this call
    /// moved the state from connected to disconnected; later failures
    /// just replace the stored reason.
    pub(crate) fn fail(&self, reason: Arc<izone_api::Error>) -> bool {
        let mut crossed = false;
        self.state.send_modify(|state| {
            crossed = state.is_connected();
            *state = ConnectionState::Disconnected { reason };
        });
        crossed
    }

    /// Mark the link healthy again. Returns `true` only when this call
    /// ended an outage.
    pub(crate) fn restore(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.is_connected() {
                false
            } else {
                *state = ConnectionState::Connected;
                true
            }
        })
    }

    /// Fail fast with the stored reason while disconnected.
    pub(crate) fn ensure_connected(&self, device_uid: &str) -> Result<(), CoreError> {
        match &*self.state.borrow() {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Disconnected { reason } => Err(CoreError::Connection {
                device_uid: device_uid.to_owned(),
                source: Arc::clone(reason),
            }),
        }
    }
}

// ── RefreshGate ──────────────────────────────────────────────────

/// Cool-down token for a refreshable resource.
///
/// Remembers when the resource was last refreshed; an attempt inside
/// `interval` of that is refused unless forced.
#[derive(Debug)]
pub(crate) struct RefreshGate {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RefreshGate {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Claim an attempt. Returns `false` if one was made or recorded
    /// within the interval and `force` is not set.
    pub(crate) fn try_acquire(&self, force: bool) -> bool {
        let now = Instant::now();
        let mut last = lock(&self.last);
        if !force && last.is_some_and(|at| now.duration_since(at) < self.interval) {
            return false;
        }
        *last = Some(now);
        true
    }

    /// Record a refresh that happened outside the gate.
    pub(crate) fn mark(&self) {
        *lock(&self.last) = Some(Instant::now());
    }

    /// Forget the last attempt so the next one proceeds immediately.
    pub(crate) fn reset(&self) {
        *lock(&self.last) = None;
    }
}
