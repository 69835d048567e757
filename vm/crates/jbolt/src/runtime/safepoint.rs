//! Safepoint Management
//!
//! Code may only move while every registered mutator thread is parked at a
//! safepoint. The relocating thread requests a safepoint, waits until all
//! registered threads have arrived, moves code, and releases them.
//!
//! ## Safepoint States
//!
//! ```text
//! SAFEPOINT_NONE (0) ─────┐
//!     │                   │
//!     ▼                   │
//! SAFEPOINT_REQUESTED (1) │
//!     │                   │
//!     ▼                   │
//! SAFEPOINT_REACHED (2) ──┘ (release)
//! ```
//!
//! Mutators call `poll()` at their poll points. A registered mutator that
//! never polls blocks the relocating thread.
//!
//! The parked count carries the low half of the epoch it was counted in, so
//! a thread that arrives while a safepoint is being released is never
//! counted toward the next one.

use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};

pub const SAFEPOINT_NONE: u8 = 0;
pub const SAFEPOINT_REQUESTED: u8 = 1;
pub const SAFEPOINT_REACHED: u8 = 2;

const COUNT_MASK: u64 = 0xFFFF_FFFF;

/// Parked count of zero for `epoch`
fn tagged(epoch: u64) -> u64 {
    (epoch & COUNT_MASK) << 32
}

/// Safepoint - rendezvous between the relocating thread and mutators
///
/// # Examples
///
/// ```rust
/// use jbolt::runtime::Safepoint;
///
/// let safepoint = Safepoint::new();
/// {
///     let _guard = safepoint.synchronize();
///     assert!(safepoint.is_synchronized());
/// }
/// assert!(!safepoint.is_synchronized());
/// ```
pub struct Safepoint {
    state: AtomicU8,

    /// Threads parked at the current safepoint, tagged with its epoch
    paused_threads: AtomicU64,

    /// Threads that must park before code can move
    registered_threads: AtomicUsize,

    /// Incremented on every release
    epoch: AtomicU64,
}

impl Safepoint {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(SAFEPOINT_NONE),
            paused_threads: AtomicU64::new(tagged(0)),
            registered_threads: AtomicUsize::new(0),
            epoch: AtomicU64::new(0),
        }
    }

    /// Register a mutator thread that will poll
    pub fn register_thread(&self) {
        self.registered_threads.fetch_add(1, Ordering::AcqRel);
    }

    pub fn deregister_thread(&self) {
        self.registered_threads.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn registered_threads(&self) -> usize {
        self.registered_threads.load(Ordering::Acquire)
    }

    /// Request all threads to reach safepoint
    pub fn request(&self) {
        self.state.store(SAFEPOINT_REQUESTED, Ordering::SeqCst);
    }

    /// Wait for all registered threads to reach safepoint
    pub fn wait_for_threads(&self) {
        while !self.all_arrived() {
            std::thread::yield_now();
        }
        self.state.store(SAFEPOINT_REACHED, Ordering::SeqCst);
    }

    /// Release safepoint and resume all threads
    ///
    /// The epoch moves first, then the state, then the count is reset for the
    /// new epoch; a poller that sees the new epoch before the state changes
    /// still finds the old tag and leaves.
    pub fn release(&self) {
        let next = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.store(SAFEPOINT_NONE, Ordering::SeqCst);
        self.paused_threads.store(tagged(next), Ordering::SeqCst);
    }

    /// Threads counted as parked at the current safepoint
    pub fn paused_threads(&self) -> usize {
        let paused = self.paused_threads.load(Ordering::SeqCst);
        if paused & !COUNT_MASK == tagged(self.epoch()) {
            (paused & COUNT_MASK) as usize
        } else {
            0
        }
    }

    fn all_arrived(&self) -> bool {
        self.paused_threads() >= self.registered_threads()
    }

    /// Count the caller as parked in `epoch`
    ///
    /// Returns false when that safepoint is already over.
    fn arrive(&self, epoch: u64) -> bool {
        let mut current = self.paused_threads.load(Ordering::SeqCst);
        loop {
            if current & !COUNT_MASK != tagged(epoch) {
                return false;
            }
            match self.paused_threads.compare_exchange_weak(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Request, wait, and release when the guard drops
    pub fn synchronize(&self) -> SafepointGuard<'_> {
        self.request();
        self.wait_for_threads();
        SafepointGuard { safepoint: self }
    }

    /// Mutator poll point
    ///
    /// Returns immediately when no safepoint is pending; otherwise parks
    /// until the safepoint is released.
    pub fn poll(&self) {
        let epoch = self.epoch.load(Ordering::SeqCst);
        if self.state.load(Ordering::SeqCst) == SAFEPOINT_NONE {
            return;
        }
        if !self.arrive(epoch) {
            return;
        }
        while self.epoch.load(Ordering::SeqCst) == epoch {
            std::thread::yield_now();
        }
    }

    pub fn is_requested(&self) -> bool {
        self.state.load(Ordering::Acquire) != SAFEPOINT_NONE
    }

    /// All registered threads are parked
    pub fn is_synchronized(&self) -> bool {
        self.state.load(Ordering::Acquire) == SAFEPOINT_REACHED
    }

    pub fn state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    /// Completed safepoints
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }
}

impl Default for Safepoint {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds a reached safepoint until dropped
pub struct SafepointGuard<'a> {
    safepoint: &'a Safepoint,
}

impl Drop for SafepointGuard<'_> {
    fn drop(&mut self) {
        self.safepoint.release();
    }
}
