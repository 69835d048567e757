//! Rescheduling triggers
//!
//! `JBoltRescheduling` names up to ten daily wall-clock times. They are
//! parsed once at startup into a `TriggerSet`; a `TriggerScheduler` then
//! runs a reordering pass each time one of them is reached.

pub mod scheduler;
pub mod time;

pub use scheduler::{SystemClock, TriggerScheduler, WallClock, CONTROL_THREAD_NAME};
pub use time::{TimeTrigger, TriggerSet, MAX_RESCHEDULING_LEN, MAX_TRIGGERS};
