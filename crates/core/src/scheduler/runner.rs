//! Scheduler implementation.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audit::{AuditEvent, AuditHandle};
use crate::automation::CycleResult;
use crate::clock::{add_duration, Clock};

use super::types::{
    CycleOutcome, CycleRunner, CycleTrigger, ManualTicket, SchedulerError, SchedulerState,
    SchedulerStatus,
};

struct QueuedManual {
    dry_run: bool,
    responder: oneshot::Sender<CycleOutcome>,
}

#[derive(Default)]
struct State {
    running: bool,
    cycle_active: bool,
    queued: Option<QueuedManual>,
    last_run: Option<DateTime<Utc>>,
    next_run: Option<DateTime<Utc>>,
    /// Cancels the timer task of the current start().
    timer: Option<CancellationToken>,
}

struct Inner {
    runner: Arc<dyn CycleRunner>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    audit: Option<AuditHandle>,
    state: Mutex<State>,
    /// Signalled whenever the scheduler leaves CycleActive.
    idle: Notify,
    /// Signalled after every cycle so the timer counts from completion.
    rearm: Notify,
}

/// Owns the timer and the manual-trigger path.
///
/// All state lives behind one mutex that is never held while a cycle runs.
/// Cheap to clone; clones share the same scheduler.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(
        runner: Arc<dyn CycleRunner>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        audit: Option<AuditHandle>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                runner,
                clock,
                interval,
                audit,
                state: Mutex::new(State::default()),
                idle: Notify::new(),
                rearm: Notify::new(),
            }),
        }
    }

    /// Arm the timer. Returns false if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        let token = {
            let mut state = self.inner.lock();
            if state.running {
                debug!("Scheduler already running");
                return false;
            }
            state.running = true;
            let token = CancellationToken::new();
            state.timer = Some(token.clone());
            token
        };

        info!(interval_secs = self.inner.interval.as_secs(), "Scheduler started");
        if let Some(ref audit) = self.inner.audit {
            audit.try_emit(AuditEvent::SchedulerStarted {
                interval_secs: self.inner.interval.as_secs(),
            });
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.run_timer(token).await });
        true
    }

    /// Disarm the timer and discard any queued manual request.
    ///
    /// An active cycle is left to finish. Returns false if already stopped.
    pub fn stop(&self) -> bool {
        let (timer, queued) = {
            let mut state = self.inner.lock();
            if !state.running {
                return false;
            }
            state.running = false;
            state.next_run = None;
            (state.timer.take(), state.queued.take())
        };

        if let Some(timer) = timer {
            timer.cancel();
        }
        if queued.is_some() {
            info!("Discarding queued manual cycle");
        }
        // Dropping the responder resolves the waiter with Cancelled
        drop(queued);

        info!("Scheduler stopped");
        if let Some(ref audit) = self.inner.audit {
            audit.try_emit(AuditEvent::SchedulerStopped);
        }
        true
    }

    /// Request a manual cycle.
    ///
    /// Runs at once when idle. While a cycle is active one request is queued
    /// to run right after it; a further request fails with `Busy`.
    pub fn trigger_manual(&self, dry_run: bool) -> Result<ManualTicket, SchedulerError> {
        let (tx, rx) = oneshot::channel();

        {
            let mut state = self.inner.lock();
            if !state.running {
                return Err(SchedulerError::NotRunning);
            }
            if state.cycle_active {
                if state.queued.is_some() {
                    return Err(SchedulerError::Busy);
                }
                state.queued = Some(QueuedManual {
                    dry_run,
                    responder: tx,
                });
                debug!(dry_run, "Manual cycle queued");
                return Ok(ManualTicket { queued: true, rx });
            }
            state.cycle_active = true;
            state.next_run = None;
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner
                .drive(CycleTrigger::Manual { dry_run }, Some(tx))
                .await
        });

        Ok(ManualTicket { queued: false, rx })
    }

    /// Trigger a manual cycle and wait for its result.
    pub async fn run_manual(&self, dry_run: bool) -> Result<CycleResult, SchedulerError> {
        self.trigger_manual(dry_run)?.wait().await
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = self.inner.lock();
        let phase = if state.cycle_active {
            SchedulerState::CycleActive
        } else if state.running {
            SchedulerState::Idle
        } else {
            SchedulerState::Stopped
        };

        SchedulerStatus {
            state: phase,
            running: state.running,
            cycle_active: state.cycle_active,
            manual_queued: state.queued.is_some(),
            last_run: state.last_run,
            next_run: state.next_run,
            interval_secs: self.inner.interval.as_secs(),
        }
    }

    /// Resolve once no cycle is active.
    pub async fn wait_for_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.inner.lock().cycle_active {
                return;
            }
            notified.await;
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        // State stays consistent across a panicking holder; every update is a plain field write
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn run_timer(self: Arc<Self>, token: CancellationToken) {
        loop {
            {
                let mut state = self.lock();
                if !state.cycle_active {
                    state.next_run = Some(add_duration(self.clock.now(), self.interval));
                }
            }

            let rearm = self.rearm.notified();
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = rearm => continue,
                _ = self.clock.sleep(self.interval) => {}
            }

            let fire = {
                let mut state = self.lock();
                if token.is_cancelled() || !state.running {
                    return;
                }
                if state.cycle_active {
                    false
                } else {
                    state.cycle_active = true;
                    state.next_run = None;
                    true
                }
            };

            if fire {
                self.drive(CycleTrigger::Scheduled, None).await;
            } else {
                debug!("Timer fired during an active cycle, skipping");
            }
        }
    }

    /// Run a cycle, then any manual request queued behind it, then go idle.
    async fn drive(&self, trigger: CycleTrigger, responder: Option<oneshot::Sender<CycleOutcome>>) {
        let mut next = Some((trigger, responder));

        while let Some((trigger, responder)) = next.take() {
            let started = self.clock.now();
            {
                self.lock().last_run = Some(started);
            }

            let outcome = self.runner.execute(trigger).await;
            match &outcome {
                Ok(result) => debug!(cycle_id = %result.cycle_id, "Cycle finished"),
                Err(e) if e.is_aborted() => info!(cycle_id = %e.result().cycle_id, "Cycle aborted"),
                Err(e) => warn!(cycle_id = %e.result().cycle_id, error = %e, "Cycle failed"),
            }

            if let Some(responder) = responder {
                let _ = responder.send(outcome);
            }

            let mut state = self.lock();
            match state.queued.take() {
                Some(queued) => {
                    next = Some((
                        CycleTrigger::Manual {
                            dry_run: queued.dry_run,
                        },
                        Some(queued.responder),
                    ));
                }
                None => {
                    state.cycle_active = false;
                    if state.running {
                        state.next_run = Some(add_duration(self.clock.now(), self.interval));
                    }
                }
            }
        }

        self.idle.notify_waiters();
        self.rearm.notify_waiters();
    }
}
