//! Placement planning
//!
//! Given the current placement of every compiled method and a ranking, decide
//! where each method should live:
//!
//! ```text
//! rank 0 ... k        -> MethodJBoltHot   (while cumulative size fits)
//! rank k+1 ... m      -> MethodJBoltTmp   (while cumulative size fits)
//! rank m+1 ...        -> unchanged, or fallback if inside a JBolt heap
//! unranked in JBolt   -> fallback
//! ```
//!
//! Planning is pure. The engine executes the resulting moves.

use std::collections::HashSet;

use indexmap::IndexMap;

use crate::heap::{CodeBlob, CodeHeapKind, CodeHeapRegistry};
use crate::method::MethodKey;

/// Where a compiled method currently lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementRecord {
    pub method: MethodKey,
    pub blob: CodeBlob,
    /// Position in the last applied ranking
    pub rank: Option<usize>,
    /// Monotonic compile order, newer is larger
    pub compile_seq: u64,
}

impl PlacementRecord {
    pub fn current(&self) -> CodeHeapKind {
        self.blob.kind
    }

    pub fn address(&self) -> usize {
        self.blob.address
    }

    pub fn size(&self) -> usize {
        self.blob.size
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMove {
    pub method: MethodKey,
    pub from: CodeHeapKind,
    pub to: CodeHeapKind,
    pub rank: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlacementPlan {
    /// Evictions first, then placements in rank order
    pub moves: Vec<PlannedMove>,
    /// Rank of every ranked, registered method
    pub ranks: IndexMap<MethodKey, usize>,
    /// Padded bytes of all ranked, registered methods
    pub needed: usize,
    pub hot_budget_used: usize,
    pub tmp_budget_used: usize,
}

impl PlacementPlan {
    pub fn target_of(&self, method: &MethodKey) -> Option<CodeHeapKind> {
        self.moves
            .iter()
            .find(|mv| &mv.method == method)
            .map(|mv| mv.to)
    }
}

/// Compute the placement for `ranking`
///
/// Methods in the ranking that have no compiled code are skipped, as are
/// repeated entries after the first.
pub fn plan(
    records: &IndexMap<MethodKey, PlacementRecord>,
    ranking: &[MethodKey],
    registry: &CodeHeapRegistry,
) -> PlacementPlan {
    let budget = |kind| {
        if registry.is_active(kind) {
            registry.capacity(kind)
        } else {
            0
        }
    };
    let hot_capacity = budget(CodeHeapKind::MethodJBoltHot);
    let tmp_capacity = budget(CodeHeapKind::MethodJBoltTmp);
    let fallback = registry.fallback_partition();

    let mut result = PlacementPlan::default();
    let mut placements = Vec::new();
    let mut seen = HashSet::new();

    for method in ranking {
        if !seen.insert(method) {
            continue;
        }
        let Some(record) = records.get(method) else {
            continue;
        };

        let rank = result.ranks.len();
        let size = record.blob.padded_size;
        result.ranks.insert(method.clone(), rank);
        result.needed += size;

        let target = if result.hot_budget_used + size <= hot_capacity {
            result.hot_budget_used += size;
            CodeHeapKind::MethodJBoltHot
        } else if result.tmp_budget_used + size <= tmp_capacity {
            result.tmp_budget_used += size;
            CodeHeapKind::MethodJBoltTmp
        } else if record.current().is_jbolt() {
            fallback
        } else {
            record.current()
        };

        if target != record.current() {
            placements.push(PlannedMove {
                method: method.clone(),
                from: record.current(),
                to: target,
                rank: Some(rank),
            });
        }
    }

    for record in records.values() {
        if record.current().is_jbolt() && !result.ranks.contains_key(&record.method) {
            result.moves.push(PlannedMove {
                method: record.method.clone(),
                from: record.current(),
                to: fallback,
                rank: None,
            });
        }
    }
    result.moves.extend(placements);
    result
}
