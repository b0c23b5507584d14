//! Refresh coordinator
//!
//! Owns the latest price snapshot and the refresh bookkeeping. At most one
//! fetch runs at a time: a refresh requested while another is in flight waits
//! for that attempt and returns its outcome. Listeners are notified after
//! every attempt, in registration order.

use crate::error::{AmpsterError, Result};
use crate::fetcher::PriceSource;
use crate::logging::StructuredLogger;
use crate::price::PriceSnapshot;
use crate::scheduler::{TimerHandle, schedule_hourly};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

/// Result of one refresh attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    Success { at: DateTime<Utc> },
    Failure { at: DateTime<Utc>, error: String },
}

impl RefreshOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Refresh bookkeeping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshState {
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<(DateTime<Utc>, String)>,
    pub in_flight: bool,
    /// Whether the most recent completed attempt succeeded
    pub last_update_success: bool,
}

/// Observer notified after each refresh attempt
pub trait RefreshListener: Send + Sync {
    fn notify(&self, outcome: &RefreshOutcome);
}

/// Returned by [`RefreshCoordinator::add_listener`]; pass it back to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerToken(u64);

type Flight = watch::Receiver<Option<RefreshOutcome>>;

#[derive(Default)]
struct Inner {
    snapshot: Option<Arc<PriceSnapshot>>,
    state: RefreshState,
    flight: Option<Flight>,
}

pub struct RefreshCoordinator {
    url: String,
    source: Arc<dyn PriceSource>,
    logger: StructuredLogger,
    inner: Mutex<Inner>,
    listeners: Mutex<BTreeMap<ListenerToken, Arc<dyn RefreshListener>>>,
    next_token: AtomicU64,
    timer: Mutex<Option<TimerHandle>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the in-flight marker if a fetch is dropped before completing
struct FlightGuard<'a> {
    inner: &'a Mutex<Inner>,
    armed: bool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = lock(self.inner);
            inner.flight = None;
            inner.state.in_flight = false;
        }
    }
}

impl RefreshCoordinator {
    pub fn new(url: impl Into<String>, source: Arc<dyn PriceSource>, logger: StructuredLogger) -> Self {
        Self {
            url: url.into(),
            source,
            logger,
            inner: Mutex::new(Inner::default()),
            listeners: Mutex::new(BTreeMap::new()),
            next_token: AtomicU64::new(1),
            timer: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Latest successfully fetched document, if any
    pub fn current_snapshot(&self) -> Option<Arc<PriceSnapshot>> {
        lock(&self.inner).snapshot.clone()
    }

    pub fn refresh_state(&self) -> RefreshState {
        lock(&self.inner).state.clone()
    }

    pub fn last_update_success(&self) -> bool {
        lock(&self.inner).state.last_update_success
    }

    /// Fetch now, or join the fetch already in flight
    pub async fn request_refresh(&self) -> RefreshOutcome {
        let claimed = {
            let mut inner = lock(&self.inner);
            match inner.flight.clone() {
                Some(flight) => Err(flight),
                None => {
                    let (tx, rx) = watch::channel(None);
                    inner.flight = Some(rx);
                    inner.state.in_flight = true;
                    Ok(tx)
                }
            }
        };
        let tx = match claimed {
            Ok(tx) => tx,
            Err(flight) => {
                self.logger.debug("Refresh already in flight; joining it");
                return Self::join(flight).await;
            }
        };
        let mut guard = FlightGuard {
            inner: &self.inner,
            armed: true,
        };

        let result = self.source.fetch(&self.url).await;
        let at = Utc::now();

        let outcome = {
            let mut inner = lock(&self.inner);
            guard.armed = false;
            inner.flight = None;
            inner.state.in_flight = false;
            match result {
                Ok(snapshot) => {
                    inner.snapshot = Some(Arc::new(snapshot));
                    inner.state.last_success = Some(at);
                    inner.state.last_update_success = true;
                    RefreshOutcome::Success { at }
                }
                Err(e) => {
                    let error = e.to_string();
                    inner.state.last_failure = Some((at, error.clone()));
                    inner.state.last_update_success = false;
                    RefreshOutcome::Failure { at, error }
                }
            }
        };
        drop(guard);

        match &outcome {
            RefreshOutcome::Success { .. } => self.logger.debug("Price data refreshed"),
            RefreshOutcome::Failure { error, .. } => self
                .logger
                .error(&format!("Data fetch failed from {}: {}", self.url, error)),
        }

        let _ = tx.send(Some(outcome.clone()));
        self.notify_listeners(&outcome);
        outcome
    }

    async fn join(mut flight: Flight) -> RefreshOutcome {
        match flight.wait_for(|o| o.is_some()).await {
            Ok(outcome) => outcome.clone().unwrap_or_else(|| RefreshOutcome::Failure {
                at: Utc::now(),
                error: "refresh produced no outcome".to_string(),
            }),
            Err(_) => RefreshOutcome::Failure {
                at: Utc::now(),
                error: "refresh was cancelled".to_string(),
            },
        }
    }

    /// The first refresh of an entry must succeed for setup to succeed
    pub async fn first_refresh(&self) -> Result<()> {
        match self.request_refresh().await {
            RefreshOutcome::Success { .. } => Ok(()),
            RefreshOutcome::Failure { error, .. } => Err(AmpsterError::not_ready(format!(
                "initial price fetch failed: {}",
                error
            ))),
        }
    }

    /// Timer entry point; equivalent to [`request_refresh`](Self::request_refresh)
    pub async fn scheduled_refresh(&self, now: DateTime<Tz>) -> RefreshOutcome {
        self.logger.info(&format!(
            "Scheduled refresh fired at {}",
            now.to_rfc3339()
        ));
        self.request_refresh().await
    }

    pub fn add_listener(&self, listener: Arc<dyn RefreshListener>) -> ListenerToken {
        let token = ListenerToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).insert(token, listener);
        token
    }

    /// Returns false when the token was not registered
    pub fn remove_listener(&self, token: ListenerToken) -> bool {
        lock(&self.listeners).remove(&token).is_some()
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    fn notify_listeners(&self, outcome: &RefreshOutcome) {
        // Snapshot the list so listeners may unsubscribe while being notified
        let listeners: Vec<Arc<dyn RefreshListener>> =
            lock(&self.listeners).values().cloned().collect();
        for listener in listeners {
            listener.notify(outcome);
        }
    }

    /// Start the hourly refresh at `minute` past the hour in `tz`
    pub fn start_schedule(self: &Arc<Self>, minute: u8, tz: Tz) {
        let weak = Arc::downgrade(self);
        let handle = schedule_hourly("price-refresh", minute, tz, move |now| {
            let weak = weak.clone();
            async move {
                if let Some(coordinator) = weak.upgrade() {
                    coordinator.scheduled_refresh(now).await;
                }
            }
        });
        if let Some(mut previous) = lock(&self.timer).replace(handle) {
            previous.cancel();
        }
        self.logger.info(&format!(
            "Hourly refresh scheduled at minute {} ({})",
            minute, tz
        ));
    }

    pub fn is_scheduled(&self) -> bool {
        lock(&self.timer).as_ref().is_some_and(TimerHandle::is_active)
    }

    /// Cancel the hourly timer; safe to call repeatedly
    pub fn shutdown(&self) -> bool {
        let cancelled = lock(&self.timer)
            .take()
            .map(|mut timer| timer.cancel())
            .unwrap_or(false);
        if cancelled {
            self.logger.info("Hourly refresh stopped");
        }
        cancelled
    }
}
