//! # JBolt - Code Cache Layout Optimizer
//!
//! JBolt keeps the hottest compiled methods packed together so that
//! instruction fetch touches fewer pages and cache lines. It splits two
//! extra partitions out of the segmented code cache and moves methods into
//! them by hotness, either once at startup or at configured times of day.
//!
//! ## Overview
//!
//! - **Segmented code cache**: partitions for non-profiled, profiled, JBolt
//!   hot, JBolt tmp and non-method code, with a static overflow relation
//! - **Reordering passes**: rank methods, plan placements, move code at a
//!   safepoint, forward stale entry addresses
//! - **Rescheduling**: `JBoltRescheduling=HH:MM,...` runs a pass every day at
//!   each listed time on the `jbolt-control` thread
//! - **Order files**: dump mode records the ranking, load mode seeds from it
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use jbolt::{CodeHeapKind, JBoltLogger, JBoltManager, MethodKey, SystemClock, VmOptions};
//!
//! fn main() -> Result<(), jbolt::JBoltError> {
//!     let mut options = VmOptions::default();
//!     options.set_bool("UseJBolt", true)?;
//!
//!     let manager = JBoltManager::initialize(
//!         options,
//!         Arc::new(SystemClock),
//!         Arc::new(JBoltLogger::silent()),
//!     )?;
//!
//!     let method = MethodKey::new("demo/App", "run", "()V");
//!     manager.compile(method.clone(), &[0x90; 256], CodeHeapKind::MethodNonProfiled)?;
//!     manager.profiler().record_samples(&method, 100);
//!
//!     let report = manager.reorder_now()?;
//!     assert_eq!(report.relocated, 1);
//!     manager.shutdown()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   options    ┌──────────────────┐
//! │   jboltctl   │─────────────▶│   JBoltManager   │
//! └──────────────┘              └────────┬─────────┘
//!                                        │ builds
//!        ┌───────────────────┬───────────┼─────────────────┐
//!        ▼                   ▼           ▼                 ▼
//! ┌──────────────┐  ┌──────────────┐ ┌──────────────┐ ┌──────────────┐
//! │CodeHeapRegis-│  │  CodeCache   │ │ReorderEngine │ │TriggerSched- │
//! │try (active + │  │ (one heap    │ │ (plan, move, │ │uler (control │
//! │ capacities)  │  │  per kind)   │ │  forward)    │ │  thread)     │
//! └──────────────┘  └──────────────┘ └──────────────┘ └──────────────┘
//! ```
//!
//! ## Thread Safety
//!
//! - `JBoltManager`, `ReorderEngine` and `CodeCache` are `Send + Sync`
//! - Passes are serialized; code only moves while the safepoint is reached
//! - Entry-address lookups never observe a half-applied pass

pub mod config;
pub mod error;
pub mod heap;
pub mod logging;
pub mod manager;
pub mod method;
pub mod reorder;
pub mod runtime;
pub mod stats;
pub mod trigger;

pub use config::{ConfigError, VmOptions};
pub use error::{JBoltError, Result};
pub use heap::{CodeBlob, CodeCache, CodeHeapKind, CodeHeapRegistry};
pub use logging::{JBoltEvent, JBoltLogger, JBoltLoggerConfig, LogLevel};
pub use manager::{JBoltManager, JBoltMode, JBoltStatus};
pub use method::MethodKey;
pub use reorder::{HotnessProfiler, OperatingMode, OrderFile, PassReport, RankingSource, ReorderEngine};
pub use runtime::Safepoint;
pub use trigger::{SystemClock, TimeTrigger, TriggerScheduler, TriggerSet, WallClock};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
