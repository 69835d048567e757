//! Code reordering
//!
//! Moves compiled methods between the JBolt heaps and the rest of the code
//! cache so that the hottest code sits together in `MethodJBoltHot`.
//!
//! ```text
//! RankingSource ──▶ placement::plan ──▶ ReorderEngine ──▶ CodeCache
//!   (profiler,        (pure)              (safepoint,       (heaps)
//!    order file)                            forwarding)
//! ```

pub mod engine;
pub mod forwarding;
pub mod order_file;
pub mod placement;
pub mod ranking;

pub use engine::{OperatingMode, PassReport, ReorderEngine};
pub use forwarding::ForwardingTable;
pub use order_file::{OrderEntry, OrderFile};
pub use placement::{plan, PlacementPlan, PlacementRecord, PlannedMove};
pub use ranking::{FixedRanking, HotnessProfiler, MethodProfile, RankingSource};
