//! Deterministic fault injection.
//!
//! A [`FaultInjector`] forces the next N outbound attempts to fail with a chosen
//! [`FaultKind`] instead of reaching the network. It disarms itself once the
//! budget is consumed and notifies subscribers on every transition.

use crate::client::error_classification::RawFailure;
use crate::{Error, ErrorContext};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info};

/// Number of requests an armed fault affects when the caller does not choose.
pub const DEFAULT_FAULT_COUNT: u32 = 3;

/// Failures the injector can simulate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultKind {
    ServerError500,
    NotFound404,
    Timeout,
    NetworkDown,
    EmptyResponse,
    InvalidPayload,
}

impl FaultKind {
    pub const ALL: [FaultKind; 6] = [
        Self::ServerError500,
        Self::NotFound404,
        Self::Timeout,
        Self::NetworkDown,
        Self::EmptyResponse,
        Self::InvalidPayload,
    ];

    /// Stable short name (`"500"`, `"404"`, `"timeout"`, `"network"`, `"empty"`, `"invalid"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServerError500 => "500",
            Self::NotFound404 => "404",
            Self::Timeout => "timeout",
            Self::NetworkDown => "network",
            Self::EmptyResponse => "empty",
            Self::InvalidPayload => "invalid",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ServerError500 => "Error 500",
            Self::NotFound404 => "Error 404",
            Self::Timeout => "Timeout",
            Self::NetworkDown => "Network",
            Self::EmptyResponse => "Empty",
            Self::InvalidPayload => "Invalid",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::ServerError500 => "Internal server error",
            Self::NotFound404 => "Resource not found",
            Self::Timeout => "The connection takes too long",
            Self::NetworkDown => "No internet connection",
            Self::EmptyResponse => "Empty response from the server",
            Self::InvalidPayload => "Corrupt or malformed data",
        }
    }

    /// The raw failure this fault stands in for.
    pub fn raw_failure(&self) -> RawFailure {
        match self {
            Self::ServerError500 => RawFailure::Status(500),
            Self::NotFound404 => RawFailure::Status(404),
            Self::Timeout => RawFailure::NoResponse {
                timed_out: true,
                detail: "simulated timeout".to_string(),
            },
            Self::NetworkDown => RawFailure::NoResponse {
                timed_out: false,
                detail: "simulated network outage".to_string(),
            },
            Self::EmptyResponse => RawFailure::EmptyPayload,
            Self::InvalidPayload => RawFailure::InvalidPayload {
                detail: "simulated malformed payload".to_string(),
            },
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FaultKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FaultKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                Error::validation_with_context(
                    format!("unknown fault kind: {s}"),
                    ErrorContext::new()
                        .with_details("expected one of 500, 404, timeout, network, empty, invalid")
                        .with_source("fault_injector"),
                )
            })
    }
}

/// Point-in-time view of the injector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FaultSnapshot {
    pub active: Option<FaultKind>,
    pub remaining: u32,
}

type Listener = Arc<dyn Fn(&FaultSnapshot) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Listener)>>,
}

impl Listeners {
    fn remove(&self, id: u64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|(i, _)| *i != id);
        }
    }

    fn snapshot(&self) -> Vec<Listener> {
        match self.entries.lock() {
            Ok(entries) => entries.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Handle returned by [`FaultInjector::subscribe`]. Dropping it deregisters the listener.
#[must_use = "dropping a Subscription immediately unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.remove(self.id);
        }
    }
}

/// Toggleable fault state consulted once per outbound attempt.
///
/// - Explicitly constructed and handed to the gateway; tests build isolated instances
/// - `consume` decrements under a single lock, so concurrent callers never double-count
/// - Listeners run after the lock is released
pub struct FaultInjector {
    state: Mutex<FaultSnapshot>,
    listeners: Arc<Listeners>,
}

impl Default for FaultInjector {
    fn default() -> Self {
        Self::new()
    }
}

impl FaultInjector {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FaultSnapshot::default()),
            listeners: Arc::new(Listeners::default()),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut FaultSnapshot) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    fn notify(&self, snapshot: FaultSnapshot) {
        for listener in self.listeners.snapshot() {
            listener(&snapshot);
        }
    }

    /// Force the next `count` attempts to fail with `kind`. `count == 0` is a no-op.
    pub fn arm(&self, kind: FaultKind, count: u32) {
        if count == 0 {
            debug!(fault = kind.as_str(), "fault injection arm ignored: count is zero");
            return;
        }
        let snapshot = self.with_state(|st| {
            st.active = Some(kind);
            st.remaining = count;
            *st
        });
        info!(fault = kind.as_str(), count, "fault injection armed");
        self.notify(snapshot);
    }

    pub fn clear(&self) {
        let snapshot = self.with_state(|st| {
            st.active = None;
            st.remaining = 0;
            *st
        });
        info!("fault injection cleared");
        self.notify(snapshot);
    }

    /// Take one unit of the fault budget. Must be called exactly once per outbound attempt.
    pub fn consume(&self) -> Option<FaultKind> {
        let (kind, exhausted) = self.with_state(|st| {
            let kind = match st.active {
                Some(k) if st.remaining > 0 => k,
                _ => return (None, None),
            };
            st.remaining -= 1;
            if st.remaining == 0 {
                st.active = None;
                (Some(kind), Some(*st))
            } else {
                (Some(kind), None)
            }
        });
        if let Some(snapshot) = exhausted {
            info!("all simulated faults consumed, auto-clearing");
            self.notify(snapshot);
        }
        kind
    }

    pub fn state(&self) -> FaultSnapshot {
        self.with_state(|st| *st)
    }

    pub fn is_armed(&self) -> bool {
        self.state().active.is_some()
    }

    /// Register a listener invoked on every arm / clear / auto-clear.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&FaultSnapshot) + Send + Sync + 'static,
    {
        let id = self.listeners.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut entries) = self.listeners.entries.lock() {
            entries.push((id, Arc::new(listener)));
        }
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }
}

static SHARED: Lazy<Arc<FaultInjector>> = Lazy::new(|| Arc::new(FaultInjector::new()));

/// Process-wide injector for application entry points.
///
/// Library code never reads this; pass it to
/// [`CatalogClientBuilder::fault_injector`](crate::client::CatalogClientBuilder::fault_injector).
pub fn shared_injector() -> Arc<FaultInjector> {
    Arc::clone(&SHARED)
}
