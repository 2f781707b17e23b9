//! Unattended polling for new content.
//!
//! The scheduler runs an explicit loop:
//!
//! 1. stop if cancelled;
//! 2. stop if the retry budget is spent;
//! 3. wait the initial delay (first iteration only);
//! 4. run one tick, guarded so ticks never overlap;
//! 5. after a successful or skipped tick wait `frequency` and repeat with
//!    the same budget;
//! 6. after a failed tick wait `frequency / 2` and repeat with one less.
//!
//! Every wait is raced against the cancellation token.

use crate::config::{PollConfig, ReadDirection};
use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use feedsync_protocol::FeedItem;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Reports backpressure from the content source.
pub trait RateLimitMonitor: Send + Sync {
    /// Returns true if requests should be held back.
    fn is_near_limit(&self) -> bool;
}

/// A [`RateLimitMonitor`] toggled by the host.
#[derive(Debug, Default)]
pub struct RateLimitFlag {
    limited: AtomicBool,
}

impl RateLimitFlag {
    /// Creates a flag in the "not limited" position.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether the source is near its limit.
    pub fn set(&self, limited: bool) {
        self.limited.store(limited, Ordering::SeqCst);
    }
}

impl RateLimitMonitor for RateLimitFlag {
    fn is_near_limit(&self) -> bool {
        self.limited.load(Ordering::SeqCst)
    }
}

/// Why a polling loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollExit {
    /// The loop was stopped or its engine cancelled.
    Cancelled,
    /// Too many consecutive failures.
    RetryBudgetExhausted {
        /// Number of failed ticks.
        attempts: u32,
    },
    /// Bottom-up reading consumed its page limit without reaching the top.
    PageLimitReached,
    /// The engine was dropped.
    EngineDropped,
}

/// Result of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick fetched; `new_items` were merged.
    Completed {
        /// Number of items merged.
        new_items: usize,
    },
    /// A previous tick was still fetching.
    SkippedInProgress,
    /// The source is near its rate limit.
    SkippedRateLimited,
    /// Bottom-up reading hit the per-tick page limit.
    PageLimitReached {
        /// Number of items merged.
        new_items: usize,
    },
    /// The engine was dropped.
    EngineDropped,
}

/// Sets a flag for as long as it lives.
struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| FlagGuard(flag))
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Loop state shared between the scheduler and its spawned task.
struct PollLoop<T: FeedItem> {
    engine: Weak<SyncEngine<T>>,
    config: PollConfig,
    rate_limit: Option<Arc<dyn RateLimitMonitor>>,
    fetching: AtomicBool,
    running: AtomicBool,
    reached_top: AtomicBool,
}

impl<T: FeedItem> PollLoop<T> {
    async fn tick(&self) -> SyncResult<TickOutcome> {
        let Some(engine) = self.engine.upgrade() else {
            return Ok(TickOutcome::EngineDropped);
        };
        let feed = engine.feed();

        if self
            .rate_limit
            .as_ref()
            .is_some_and(|monitor| monitor.is_near_limit())
        {
            warn!(feed = %feed, "near rate limit, skipping poll");
            return Ok(TickOutcome::SkippedRateLimited);
        }
        let Some(_fetching) = FlagGuard::acquire(&self.fetching) else {
            warn!(feed = %feed, "already fetching, skipping poll");
            return Ok(TickOutcome::SkippedInProgress);
        };

        match self.config.read_direction {
            ReadDirection::TopDown => {
                let outcome = engine.load_latest(None).await?;
                self.reached_top.store(true, Ordering::SeqCst);
                Ok(TickOutcome::Completed {
                    new_items: outcome.items().len(),
                })
            }
            ReadDirection::BottomUp => {
                let mut new_items = 0;
                for page in 0..self.config.max_pages_per_tick {
                    let outcome = engine.load_previous_page().await?;
                    if outcome.items().is_empty() {
                        // Only an empty first or second page means the reader is at the top.
                        self.reached_top.store(page < 2, Ordering::SeqCst);
                        return Ok(TickOutcome::Completed { new_items });
                    }
                    new_items += outcome.items().len();
                }
                self.reached_top.store(false, Ordering::SeqCst);
                Ok(TickOutcome::PageLimitReached { new_items })
            }
        }
    }

    async fn run(&self, cancel: CancellationToken, delay: Duration) -> PollExit {
        let budget_limit = self.config.retry_budget;
        let mut budget = budget_limit;
        let mut wait = delay;

        loop {
            if cancel.is_cancelled() {
                info!("polling stopped");
                return PollExit::Cancelled;
            }
            if budget == 0 {
                error!(attempts = budget_limit, "polling halted after repeated failures");
                return PollExit::RetryBudgetExhausted {
                    attempts: budget_limit,
                };
            }
            if !pause(&cancel, wait).await {
                return PollExit::Cancelled;
            }
            wait = Duration::ZERO;

            let after = match self.tick().await {
                Ok(TickOutcome::EngineDropped) => {
                    debug!("engine dropped, polling stopped");
                    return PollExit::EngineDropped;
                }
                Ok(TickOutcome::PageLimitReached { new_items }) => {
                    warn!(new_items, "page limit reached before the top of the feed");
                    return PollExit::PageLimitReached;
                }
                Ok(outcome) => {
                    debug!(outcome = ?outcome, "poll tick");
                    self.config.frequency
                }
                Err(SyncError::Cancelled) => return PollExit::Cancelled,
                Err(err) => {
                    budget -= 1;
                    warn!(error = %err, remaining = budget, "poll tick failed");
                    self.config.failure_wait()
                }
            };
            if !pause(&cancel, after).await {
                return PollExit::Cancelled;
            }
        }
    }
}

/// Sleeps for `duration` unless cancelled first. Returns false if cancelled.
async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

struct PollingSession {
    cancel: CancellationToken,
    handle: Option<JoinHandle<PollExit>>,
}

/// Periodically fetches new content for one engine.
///
/// The scheduler holds only a weak reference to its engine; dropping the
/// engine ends the loop. Dropping the scheduler stops it.
pub struct PollScheduler<T: FeedItem> {
    inner: Arc<PollLoop<T>>,
    session: Mutex<Option<PollingSession>>,
}

impl<T: FeedItem> PollScheduler<T> {
    /// Creates a scheduler for `engine`.
    pub fn new(engine: &Arc<SyncEngine<T>>, config: PollConfig) -> SyncResult<Self> {
        Self::build(engine, config, None)
    }

    /// Creates a scheduler that skips ticks while `monitor` reports
    /// backpressure.
    pub fn with_rate_limit(
        engine: &Arc<SyncEngine<T>>,
        config: PollConfig,
        monitor: Arc<dyn RateLimitMonitor>,
    ) -> SyncResult<Self> {
        Self::build(engine, config, Some(monitor))
    }

    fn build(
        engine: &Arc<SyncEngine<T>>,
        config: PollConfig,
        rate_limit: Option<Arc<dyn RateLimitMonitor>>,
    ) -> SyncResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(PollLoop {
                engine: Arc::downgrade(engine),
                config,
                rate_limit,
                fetching: AtomicBool::new(false),
                running: AtomicBool::new(false),
                reached_top: AtomicBool::new(true),
            }),
            session: Mutex::new(None),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PollConfig {
        &self.inner.config
    }

    /// Starts polling on the current tokio runtime with the configured delay.
    ///
    /// Returns false if polling is already running or the engine is gone.
    pub fn start(&self) -> bool {
        self.start_with_delay(self.inner.config.delay)
    }

    /// Starts polling after `delay`.
    pub fn start_with_delay(&self, delay: Duration) -> bool {
        let mut session = self.session.lock();
        if self.inner.running.load(Ordering::SeqCst) {
            return false;
        }
        let Some(engine) = self.inner.engine.upgrade() else {
            return false;
        };
        let cancel = engine.cancellation_token().child_token();
        drop(engine);

        self.inner.running.store(true, Ordering::SeqCst);
        let inner = self.inner.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let exit = inner.run(token, delay).await;
            inner.running.store(false, Ordering::SeqCst);
            exit
        });

        if let Some(previous) = session.replace(PollingSession {
            cancel,
            handle: Some(handle),
        }) {
            previous.cancel.cancel();
        }
        true
    }

    /// Stops polling. An in-flight tick completes before the loop exits.
    pub fn stop(&self) {
        if let Some(session) = self.session.lock().as_ref() {
            session.cancel.cancel();
        }
    }

    /// Returns true while the loop is running.
    pub fn is_polling(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Returns true if the last tick ran out of newer content within its
    /// first two pages.
    pub fn reached_top(&self) -> bool {
        self.inner.reached_top.load(Ordering::SeqCst)
    }

    /// Waits for the running loop to end and returns why it ended.
    ///
    /// Returns `None` if no loop was started or it was already awaited.
    pub async fn wait(&self) -> Option<PollExit> {
        let handle = self
            .session
            .lock()
            .as_mut()
            .and_then(|session| session.handle.take())?;
        match handle.await {
            Ok(exit) => Some(exit),
            Err(err) => {
                error!(error = %err, "polling task failed");
                None
            }
        }
    }

    /// Runs the loop on the calling task until it ends.
    pub async fn run(&self, cancel: CancellationToken) -> PollExit {
        let Some(_running) = FlagGuard::acquire(&self.inner.running) else {
            return PollExit::Cancelled;
        };
        self.inner.run(cancel, self.inner.config.delay).await
    }

    /// Runs one guarded tick immediately.
    pub async fn tick(&self) -> SyncResult<TickOutcome> {
        self.inner.tick().await
    }
}

impl<T: FeedItem> Drop for PollScheduler<T> {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            session.cancel.cancel();
        }
    }
}
