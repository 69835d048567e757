//! Trigger Scheduler - background control thread
//!
//! One named thread waits for the next trigger and runs the callback when it
//! is reached, then waits for the next one, every day, until shutdown.
//!
//! ```text
//! now ──▶ next_after(now) ──▶ wait(target - now) ──▶ now >= target? ──▶ fire
//!  ▲                               │   no                               │
//!  │                               └──── re-read clock ◀────────────────┘
//!  └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The remaining time is recomputed from the wall clock after every wake-up,
//! so clock adjustments and spurious wake-ups cannot cause double or missed
//! firings. Waking late fires exactly once, then the next target is computed
//! from the new time. The next target is never earlier than the last one
//! fired, so a clock stepped back after a firing cannot fire it again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use parking_lot::{Condvar, Mutex};

use crate::error::{JBoltError, Result};
use crate::logging::{JBoltEvent, JBoltLogger};
use crate::trigger::time::{TimeTrigger, TriggerSet};

/// Name of the background thread
pub const CONTROL_THREAD_NAME: &str = "jbolt-control";

/// Longest single wait, so a changed wall clock is noticed
const MAX_WAIT: Duration = Duration::from_secs(60);

/// Source of local wall-clock time
pub trait WallClock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// The host's local time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Callback run at each trigger
pub type TriggerCallback = Box<dyn FnMut(TimeTrigger) + Send + 'static>;

struct SchedulerState {
    running: bool,
    target: Option<NaiveDateTime>,
}

struct Shared {
    state: Mutex<SchedulerState>,
    wakeup: Condvar,
    fired: AtomicU64,
}

pub struct TriggerScheduler {
    triggers: Arc<TriggerSet>,
    clock: Arc<dyn WallClock>,
    logger: Arc<JBoltLogger>,
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TriggerScheduler {
    pub fn new(triggers: TriggerSet, clock: Arc<dyn WallClock>, logger: Arc<JBoltLogger>) -> Self {
        Self {
            triggers: Arc::new(triggers),
            clock,
            logger,
            shared: Arc::new(Shared {
                state: Mutex::new(SchedulerState {
                    running: false,
                    target: None,
                }),
                wakeup: Condvar::new(),
                fired: AtomicU64::new(0),
            }),
            handle: Mutex::new(None),
        }
    }

    pub fn triggers(&self) -> &TriggerSet {
        &self.triggers
    }

    /// Start the control thread
    ///
    /// The callback runs synchronously on the control thread; the next
    /// target is computed only after it returns.
    pub fn start<F>(&self, callback: F) -> Result<()>
    where
        F: FnMut(TimeTrigger) + Send + 'static,
    {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Err(JBoltError::Internal(
                "JBolt control thread already started".to_string(),
            ));
        }
        if self.triggers.is_empty() {
            return Err(JBoltError::Internal(
                "JBolt control thread needs at least one trigger".to_string(),
            ));
        }

        self.shared.state.lock().running = true;

        let control = ControlLoop {
            triggers: Arc::clone(&self.triggers),
            clock: Arc::clone(&self.clock),
            logger: Arc::clone(&self.logger),
            shared: Arc::clone(&self.shared),
            callback: Box::new(callback),
            last_fired: None,
        };

        let spawned = thread::Builder::new()
            .name(CONTROL_THREAD_NAME.to_string())
            .spawn(move || control.run());

        match spawned {
            Ok(join) => {
                *handle = Some(join);
                Ok(())
            }
            Err(e) => {
                self.shared.state.lock().running = false;
                Err(JBoltError::Io(e))
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.state.lock().running
    }

    /// Instant the control thread is currently waiting for
    pub fn next_target(&self) -> Option<NaiveDateTime> {
        self.shared.state.lock().target
    }

    /// Number of triggers fired so far
    pub fn fired_count(&self) -> u64 {
        self.shared.fired.load(Ordering::Acquire)
    }

    /// Wake the control thread so it re-reads the clock
    pub fn notify_clock_change(&self) {
        let _state = self.shared.state.lock();
        self.shared.wakeup.notify_all();
    }

    /// Stop and join the control thread
    ///
    /// Only used at process exit; a callback in progress runs to completion.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            state.running = false;
            state.target = None;
            self.shared.wakeup.notify_all();
        }

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!(target: crate::logging::LOG_TARGET, "JBolt control thread panicked");
            }
        }
    }
}

impl Drop for TriggerScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct ControlLoop {
    triggers: Arc<TriggerSet>,
    clock: Arc<dyn WallClock>,
    logger: Arc<JBoltLogger>,
    shared: Arc<Shared>,
    callback: TriggerCallback,
    last_fired: Option<NaiveDateTime>,
}

impl ControlLoop {
    fn run(mut self) {
        while let Some(target) = self.wait_for_next_trigger() {
            self.last_fired = Some(target);
            let trigger = TimeTrigger::of(target);
            self.logger.log(JBoltEvent::TriggerFired { time: trigger });
            self.shared.fired.fetch_add(1, Ordering::AcqRel);
            (self.callback)(trigger);
        }
    }

    /// Block until the next trigger is reached; `None` on shutdown
    fn wait_for_next_trigger(&self) -> Option<NaiveDateTime> {
        let mut state = self.shared.state.lock();
        if !state.running {
            return None;
        }

        let now = self.clock.now();
        let from = self.last_fired.map_or(now, |fired| fired.max(now));
        let target = self.triggers.next_after(from)?;
        state.target = Some(target);
        self.logger.log(JBoltEvent::NextTrigger { at: target });

        loop {
            if !state.running {
                return None;
            }
            let now = self.clock.now();
            if now >= target {
                state.target = None;
                return Some(target);
            }
            let remaining = (target - now)
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(MAX_WAIT);
            self.shared.wakeup.wait_for(&mut state, remaining);
        }
    }
}
