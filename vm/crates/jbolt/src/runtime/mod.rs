//! Runtime integration: safepoints used while code moves.

pub mod safepoint;

pub use safepoint::{Safepoint, SafepointGuard};
