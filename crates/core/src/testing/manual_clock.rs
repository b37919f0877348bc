//! Manually driven clock for testing.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::clock::{add_duration, Clock};

struct Sleeper {
    deadline: DateTime<Utc>,
    wake: oneshot::Sender<()>,
}

struct ClockState {
    now: DateTime<Utc>,
    sleepers: Vec<Sleeper>,
    sleeps: Vec<Duration>,
}

/// Clock whose time only moves when told to.
///
/// Two modes:
/// - [`ManualClock::new`]: `sleep` blocks until [`advance`](ManualClock::advance)
///   moves time past its deadline.
/// - [`ManualClock::auto_advance`]: `sleep` moves time forward by the requested
///   duration and returns at once.
///
/// Every requested sleep is recorded either way.
pub struct ManualClock {
    state: Mutex<ClockState>,
    auto: bool,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::with_mode(false)
    }

    pub fn auto_advance() -> Self {
        Self::with_mode(true)
    }

    fn with_mode(auto: bool) -> Self {
        Self {
            state: Mutex::new(ClockState {
                now: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                sleepers: Vec::new(),
                sleeps: Vec::new(),
            }),
            auto,
        }
    }

    /// Move time forward, waking every sleeper whose deadline has passed.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock().unwrap();
        state.now = add_duration(state.now, duration);
        let now = state.now;

        let (due, pending): (Vec<_>, Vec<_>) =
            state.sleepers.drain(..).partition(|s| s.deadline <= now);
        state.sleepers = pending;
        drop(state);

        for sleeper in due {
            let _ = sleeper.wake.send(());
        }
    }

    /// Sleeps currently blocked (dropped sleep futures are not counted).
    pub fn sleeper_count(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        state.sleepers.retain(|s| !s.wake.is_closed());
        state.sleepers.len()
    }

    /// Yield until at least `n` sleeps are blocked.
    pub async fn wait_for_sleepers(&self, n: usize) {
        for _ in 0..10_000 {
            if self.sleeper_count() >= n {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("timed out waiting for {} sleepers", n);
    }

    /// Every sleep requested so far, in order.
    pub fn recorded_sleeps(&self) -> Vec<Duration> {
        self.state.lock().unwrap().sleeps.clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.state.lock().unwrap().now
    }

    async fn sleep(&self, duration: Duration) {
        let rx = {
            let mut state = self.state.lock().unwrap();
            state.sleeps.push(duration);

            if self.auto || duration.is_zero() {
                state.now = add_duration(state.now, duration);
                None
            } else {
                let (tx, rx) = oneshot::channel();
                let deadline = add_duration(state.now, duration);
                state.sleepers.push(Sleeper { deadline, wake: tx });
                Some(rx)
            }
        };

        match rx {
            Some(rx) => {
                let _ = rx.await;
            }
            None => tokio::task::yield_now().await,
        }
    }
}
