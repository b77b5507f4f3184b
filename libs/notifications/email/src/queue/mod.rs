//! Rate-limited delivery queue
//!
//! A [`DeliveryQueue`] owns an ordered list of [`DeliveryItem`]s and drains
//! them one at a time through an [`EmailProvider`], pacing sends to the
//! provider's quota and retrying failures up to a ceiling.
//!
//! ## States
//!
//! ```text
//! ┌──────┐  start   ┌────────────┐  pause   ┌────────┐
//! │ IDLE │ ───────> │ PROCESSING │ ───────> │ PAUSED │
//! └──────┘          └────────────┘ <─────── └────────┘
//!     ^                   │         resume
//!     └───────────────────┘
//!        no pending items
//! ```
//!
//! ## Drain step
//!
//! Each step refreshes the provider's quota, picks the first pending item in
//! insertion order and either waits out an exhausted quota or attempts the
//! send. The next step is scheduled after the provider's pacing delay. Only
//! one step runs at a time and at most one future step is scheduled.
//!
//! Control operations spawn onto the current Tokio runtime and must be called
//! from within one.

mod config;
mod events;
mod status;

pub use config::DeliveryQueueConfig;
pub use events::{ProgressSnapshot, QueueEvent, QueueListener};
pub use status::{QueueState, QueueStatus, RateLimitStatus};

use crate::models::{DeliveryItem, DeliveryStatus, OutboundEmail};
use crate::provider::{EmailProvider, QuotaPeriod, RateLimitWindow};
use chrono::Utc;
use events::EventHub;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Handle to the single future drain step
struct ScheduledStep {
    token: u64,
    handle: AbortHandle,
}

struct QueueInner {
    items: Vec<DeliveryItem>,
    state: QueueState,
    processed: usize,
    failed: usize,
    rate_limit: Option<RateLimitWindow>,
    scheduled: Option<ScheduledStep>,
    step_running: bool,
    next_token: u64,
}

impl QueueInner {
    fn next_pending(&self) -> Option<usize> {
        self.items.iter().position(DeliveryItem::is_pending)
    }

    fn pending(&self) -> usize {
        self.items.len() - self.processed - self.failed
    }

    fn progress(&self, per_item: Duration) -> ProgressSnapshot {
        let pending = self.pending();
        ProgressSnapshot {
            total: self.items.len(),
            sent: self.processed,
            failed: self.failed,
            pending,
            estimated_seconds_remaining: (per_item.as_secs_f64() * pending as f64).ceil() as u64,
        }
    }
}

struct Shared {
    session_id: String,
    provider: Arc<dyn EmailProvider>,
    config: DeliveryQueueConfig,
    inner: Mutex<QueueInner>,
    events: EventHub,
    state_tx: watch::Sender<QueueState>,
}

/// Rate-limited, retrying delivery queue for one bulk-send session
///
/// Cheap to clone; clones share the same queue.
#[derive(Clone)]
pub struct DeliveryQueue {
    shared: Arc<Shared>,
}

impl DeliveryQueue {
    pub fn new(
        session_id: impl Into<String>,
        provider: Arc<dyn EmailProvider>,
        config: DeliveryQueueConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(QueueState::Idle);
        let events = EventHub::new(config.event_capacity());

        Self {
            shared: Arc::new(Shared {
                session_id: session_id.into(),
                provider,
                config,
                inner: Mutex::new(QueueInner {
                    items: Vec::new(),
                    state: QueueState::Idle,
                    processed: 0,
                    failed: 0,
                    rate_limit: None,
                    scheduled: None,
                    step_running: false,
                    next_token: 0,
                }),
                events,
                state_tx,
            }),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.shared.session_id
    }

    /// Append items to the tail of the queue. Does not start processing.
    pub fn add_items<I>(&self, emails: I) -> Vec<Uuid>
    where
        I: IntoIterator<Item = OutboundEmail>,
    {
        let mut inner = self.lock();
        let before = inner.items.len();
        inner.items.extend(emails.into_iter().map(DeliveryItem::new));

        let ids: Vec<Uuid> = inner.items[before..].iter().map(|item| item.id).collect();
        debug!(
            session_id = %self.shared.session_id,
            added = ids.len(),
            total = inner.items.len(),
            "Items added to delivery queue"
        );
        ids
    }

    /// Begin draining. No-op while already processing.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, since the drain step is spawned onto it.
    pub fn start(&self) {
        let mut inner = self.lock();
        if inner.state == QueueState::Processing {
            return;
        }

        info!(session_id = %self.shared.session_id, "Delivery queue started");
        self.set_state(&mut inner, QueueState::Processing);
        self.kick(&mut inner);
    }

    /// Stop attempting new sends. A send already in flight completes and is recorded.
    pub fn pause(&self) {
        let mut inner = self.lock();
        if let Some(scheduled) = inner.scheduled.take() {
            scheduled.handle.abort();
        }
        if inner.state != QueueState::Paused {
            info!(session_id = %self.shared.session_id, "Delivery queue paused");
        }
        self.set_state(&mut inner, QueueState::Paused);
    }

    /// Continue after [`pause`](Self::pause). No-op unless paused.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, like [`start`](Self::start).
    pub fn resume(&self) {
        let mut inner = self.lock();
        if inner.state != QueueState::Paused {
            return;
        }

        info!(session_id = %self.shared.session_id, "Delivery queue resumed");
        self.set_state(&mut inner, QueueState::Processing);
        self.kick(&mut inner);
    }

    /// Pause, then discard every item and reset the counters.
    pub fn clear(&self) {
        self.pause();

        let mut inner = self.lock();
        let discarded = inner.items.len();
        inner.items.clear();
        inner.processed = 0;
        inner.failed = 0;
        info!(session_id = %self.shared.session_id, discarded, "Delivery queue cleared");
    }

    /// Snapshot for polling.
    pub fn status(&self) -> QueueStatus {
        let inner = self.lock();
        let window = inner
            .rate_limit
            .unwrap_or_else(|| self.shared.provider.rate_limit());

        QueueStatus {
            status: inner.state,
            processed: inner.processed,
            failed: inner.failed,
            total: inner.items.len(),
            remaining: inner.pending(),
            provider_name: self.shared.provider.name().to_string(),
            rate_limit: window.into(),
        }
    }

    /// Copy of every item in queue order.
    pub fn items(&self) -> Vec<DeliveryItem> {
        self.lock().items.clone()
    }

    pub fn item(&self, id: Uuid) -> Option<DeliveryItem> {
        self.lock().items.iter().find(|item| item.id == id).cloned()
    }

    /// Register an observer. Observers are notified in registration order.
    pub fn add_listener(&self, listener: Arc<dyn QueueListener>) {
        self.shared.events.add_listener(listener);
    }

    /// Receive every event on a channel. Receivers that fall behind lag instead of blocking the queue.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.shared.events.subscribe()
    }

    /// Follow state transitions.
    pub fn watch_state(&self) -> watch::Receiver<QueueState> {
        self.shared.state_tx.subscribe()
    }

    /// Resolve once the queue is idle (immediately if it already is).
    pub async fn wait_until_idle(&self) {
        let mut rx = self.watch_state();
        // The sender lives as long as `self`
        let _ = rx.wait_for(|state| *state == QueueState::Idle).await;
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.shared.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, inner: &mut QueueInner, state: QueueState) {
        inner.state = state;
        self.shared.state_tx.send_replace(state);
    }

    /// Schedule an immediate step unless one is running or already scheduled.
    fn kick(&self, inner: &mut QueueInner) {
        if inner.step_running || inner.scheduled.is_some() {
            return;
        }
        self.schedule(inner, Duration::ZERO);
    }

    /// Caller holds the lock, so the task cannot observe `scheduled` before it is stored.
    fn schedule(&self, inner: &mut QueueInner, delay: Duration) {
        if let Some(previous) = inner.scheduled.take() {
            previous.handle.abort();
        }

        inner.next_token += 1;
        let token = inner.next_token;
        let queue = self.clone();

        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            queue.fire(token).await;
        });

        inner.scheduled = Some(ScheduledStep {
            token,
            handle: handle.abort_handle(),
        });
    }

    async fn fire(self, token: u64) {
        {
            let mut inner = self.lock();
            match &inner.scheduled {
                Some(scheduled) if scheduled.token == token => inner.scheduled = None,
                _ => return,
            }
            inner.step_running = true;
        }

        let next = self.drain_step().await;

        let mut inner = self.lock();
        inner.step_running = false;
        if inner.state == QueueState::Processing {
            self.schedule(&mut inner, next.unwrap_or(Duration::ZERO));
        }
    }

    /// One pass over the queue. Returns the delay before the next step, or
    /// `None` when the queue should stop.
    async fn drain_step(&self) -> Option<Duration> {
        let provider = &self.shared.provider;
        let period = provider.quota_period();

        let (item_id, email, attempt) = {
            let mut inner = self.lock();
            if inner.state != QueueState::Processing {
                return None;
            }

            let window = provider.rate_limit();
            inner.rate_limit = Some(window);
            let per_item = period.pacing_delay(window.limit);

            let Some(index) = inner.next_pending() else {
                self.set_state(&mut inner, QueueState::Idle);
                let progress = inner.progress(per_item);
                info!(
                    session_id = %self.shared.session_id,
                    sent = progress.sent,
                    failed = progress.failed,
                    "Delivery queue drained"
                );
                drop(inner);
                self.shared.events.dispatch(vec![QueueEvent::Progress(progress)]);
                return None;
            };

            if window.is_exhausted() {
                let wait = window.reset_at.saturating_duration_since(Instant::now());
                if !wait.is_zero() {
                    debug!(
                        session_id = %self.shared.session_id,
                        wait_ms = wait.as_millis() as u64,
                        "Provider quota exhausted, waiting for reset"
                    );
                    return Some(wait);
                }
            }

            let item = &mut inner.items[index];
            item.status = DeliveryStatus::Sending;
            item.attempts += 1;
            (item.id, item.email.clone(), item.attempts)
        };

        debug!(
            session_id = %self.shared.session_id,
            item_id = %item_id,
            attempt,
            to = %email.to,
            "Sending item"
        );

        let result = provider.send(&email).await;

        let mut events = Vec::with_capacity(2);
        let delay = {
            let mut inner = self.lock();
            let per_item = pacing(period, inner.rate_limit);
            let max_attempts = self.shared.config.max_attempts();

            match inner.items.iter().position(|item| item.id == item_id) {
                None => {
                    debug!(item_id = %item_id, "Item discarded while in flight");
                }
                Some(index) => {
                    let terminal = {
                        let item = &mut inner.items[index];
                        match result {
                            Ok(sent) => {
                                item.status = DeliveryStatus::Sent;
                                item.completed_at = Some(Utc::now());
                                item.message_id = sent.message_id;
                                true
                            }
                            Err(err) => {
                                let message = err.to_string();
                                warn!(
                                    session_id = %self.shared.session_id,
                                    item_id = %item_id,
                                    attempt,
                                    max_attempts,
                                    error = %message,
                                    "Send attempt failed"
                                );
                                item.last_error = Some(message);
                                if item.attempts < max_attempts {
                                    item.status = DeliveryStatus::Pending;
                                    false
                                } else {
                                    item.status = DeliveryStatus::Failed;
                                    true
                                }
                            }
                        }
                    };

                    if terminal {
                        let item = inner.items[index].clone();
                        match item.status {
                            DeliveryStatus::Sent => inner.processed += 1,
                            _ => inner.failed += 1,
                        }
                        events.push(QueueEvent::ItemCompleted(item));
                    }
                }
            }

            events.push(QueueEvent::Progress(inner.progress(per_item)));
            per_item
        };

        self.shared.events.dispatch(events);
        Some(delay)
    }
}

fn pacing(period: QuotaPeriod, window: Option<RateLimitWindow>) -> Duration {
    period.pacing_delay(window.map_or(1, |w| w.limit))
}
