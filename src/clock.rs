//! Time abstraction for poll loops.
//!
//! Every wait in the orchestrator goes through a [`Clock`], so loops run
//! against real time in production and against a [`ManualClock`] in tests
//! without sleeping.

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Source of wall-clock time and blocking sleeps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn sleep(&self, duration: Duration);
}

/// Real time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

type SleepHook = Box<dyn FnMut(usize) + Send>;

/// Virtual clock: `sleep` advances time instantly and records the request.
///
/// An optional hook runs after every sleep with the number of sleeps so far,
/// which lets tests make the outside world change between polls.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<Duration>>,
    on_sleep: Mutex<Option<SleepHook>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            sleeps: Mutex::new(Vec::new()),
            on_sleep: Mutex::new(None),
        }
    }

    /// Install the hook called after each sleep.
    pub fn set_hook(&self, hook: impl FnMut(usize) + Send + 'static) {
        *self.on_sleep.lock() = Some(Box::new(hook));
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock();
        *now += chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    pub fn sleep_count(&self) -> usize {
        self.sleeps.lock().len()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        let start = Utc
            .with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self::new(start)
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("now", &*self.now.lock())
            .field("sleeps", &self.sleep_count())
            .finish()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        let count = {
            let mut sleeps = self.sleeps.lock();
            sleeps.push(duration);
            sleeps.len()
        };
        if let Some(hook) = self.on_sleep.lock().as_mut() {
            hook(count);
        }
    }
}

/// Outcome of one check in a poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick<T> {
    Ready(T),
    Pending,
}

/// Fixed-interval poll loop over an injectable clock.
#[derive(Clone)]
pub struct PollTimer {
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl PollTimer {
    pub fn new(clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self { clock, interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Sleep one interval.
    pub fn wait(&self) {
        self.clock.sleep(self.interval);
    }

    /// Run `check` until it reports ready, sleeping one interval between
    /// attempts. The check receives the zero-based attempt number. There is
    /// no deadline; errors from the check end the loop.
    pub fn poll_until<T, E>(
        &self,
        mut check: impl FnMut(u64) -> Result<Tick<T>, E>,
    ) -> Result<T, E> {
        let mut attempt = 0u64;
        loop {
            match check(attempt)? {
                Tick::Ready(value) => return Ok(value),
                Tick::Pending => {
                    debug!(attempt, interval_secs = self.interval.as_secs(), "Poll pending");
                    self.wait();
                    attempt += 1;
                }
            }
        }
    }
}

impl fmt::Debug for PollTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollTimer")
            .field("interval", &self.interval)
            .finish()
    }
}
