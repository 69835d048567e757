//! Reorder Engine
//!
//! Applies a hotness ranking to the code cache. A pass:
//!
//! 1. plans target partitions for every compiled method (`placement::plan`)
//! 2. brings all mutators to a safepoint if anything has to move
//! 3. moves evicted methods out of the JBolt heaps, then ranked methods in
//! 4. publishes a forwarding table for the moved entry addresses
//!
//! Passes are serialized. Entry-address lookups wait for a running pass, so
//! callers see either the old or the new placement of a method, never a mix.
//!
//! When the hot and tmp heaps are both full and methods have to swap between
//! them, the first blocked method is parked in the fallback partition to make
//! room, then moved on to its target. When a JBolt heap has enough free
//! bytes for a method but no single range large enough, its residents are
//! parked and moved back in rank order, which packs the heap.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use crate::error::{JBoltError, Result};
use crate::heap::{padded_size, CodeBlob, CodeCache, CodeHeapKind};
use crate::logging::{JBoltEvent, JBoltLogger};
use crate::method::MethodKey;
use crate::reorder::forwarding::ForwardingTable;
use crate::reorder::order_file::OrderFile;
use crate::reorder::placement::{plan, PlacementRecord, PlannedMove};
use crate::reorder::ranking::RankingSource;
use crate::runtime::Safepoint;
use crate::stats::{PassTimer, ReorderStats};

/// What a pass does with the ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    /// Record the ranking and write it to the order file
    Dump,
    /// Move code to match the ranking
    Use,
}

/// Outcome of one pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    pub pass: u64,
    /// Ranked methods that have compiled code
    pub ranked: usize,
    /// Distinct methods whose code moved
    pub relocated: usize,
    /// Unranked methods moved out of the JBolt heaps
    pub evicted: usize,
    pub bytes_moved: usize,
    /// Methods that could not reach any viable partition
    pub capacity_exhausted: usize,
    pub duration: Duration,
    /// Where the order was written, in dump mode
    pub dumped: Option<PathBuf>,
}

pub struct ReorderEngine {
    mode: OperatingMode,
    cache: Arc<CodeCache>,
    safepoint: Arc<Safepoint>,
    logger: Arc<JBoltLogger>,
    stats: Arc<ReorderStats>,

    placements: RwLock<IndexMap<MethodKey, PlacementRecord>>,
    /// Table of the most recent pass
    forwarding: RwLock<Arc<ForwardingTable>>,
    pass_lock: Mutex<()>,
    passes: AtomicU64,
    compile_seq: AtomicU64,

    dump_path: Option<PathBuf>,
    seed: Option<OrderFile>,
    seed_consumed: AtomicBool,
    /// Partition each seeded method is compiled into
    seed_targets: IndexMap<MethodKey, CodeHeapKind>,
    last_order: Mutex<Option<OrderFile>>,
}

impl ReorderEngine {
    pub fn new(
        mode: OperatingMode,
        cache: Arc<CodeCache>,
        safepoint: Arc<Safepoint>,
        logger: Arc<JBoltLogger>,
    ) -> Self {
        Self {
            mode,
            cache,
            safepoint,
            logger,
            stats: Arc::new(ReorderStats::new()),
            placements: RwLock::new(IndexMap::new()),
            forwarding: RwLock::new(Arc::new(ForwardingTable::new(0))),
            pass_lock: Mutex::new(()),
            passes: AtomicU64::new(0),
            compile_seq: AtomicU64::new(0),
            dump_path: None,
            seed: None,
            seed_consumed: AtomicBool::new(false),
            seed_targets: IndexMap::new(),
            last_order: Mutex::new(None),
        }
    }

    /// Write the order here after every dump pass
    pub fn with_dump_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dump_path = Some(path.into());
        self
    }

    /// Use a loaded order for the first pass
    ///
    /// Listed methods are compiled straight into the JBolt heap their
    /// position budgets them to.
    pub fn with_seed(mut self, order: OrderFile) -> Self {
        let registry = self.cache.registry();
        let capacity = |kind| {
            if registry.is_active(kind) {
                registry.capacity(kind)
            } else {
                0
            }
        };
        let hot_capacity = capacity(CodeHeapKind::MethodJBoltHot);
        let tmp_capacity = capacity(CodeHeapKind::MethodJBoltTmp);

        let (mut hot_used, mut tmp_used) = (0, 0);
        let mut targets = IndexMap::new();
        for (method, size) in order.methods() {
            let size = padded_size(size);
            if hot_used + size <= hot_capacity {
                hot_used += size;
                targets.insert(method.clone(), CodeHeapKind::MethodJBoltHot);
            } else if tmp_used + size <= tmp_capacity {
                tmp_used += size;
                targets.insert(method.clone(), CodeHeapKind::MethodJBoltTmp);
            }
        }

        self.seed_targets = targets;
        self.seed = Some(order);
        self
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn cache(&self) -> &Arc<CodeCache> {
        &self.cache
    }

    pub fn stats(&self) -> Arc<ReorderStats> {
        Arc::clone(&self.stats)
    }

    pub fn seed(&self) -> Option<&OrderFile> {
        self.seed.as_ref()
    }

    /// Passes run so far
    pub fn pass_count(&self) -> u64 {
        self.passes.load(Ordering::Acquire)
    }

    /// Partition a newly compiled method should go to
    pub fn preferred_kind(&self, method: &MethodKey, requested: CodeHeapKind) -> CodeHeapKind {
        self.seed_targets.get(method).copied().unwrap_or(requested)
    }

    /// Install freshly compiled code
    ///
    /// Replaces any previous code of the same method.
    pub fn register_compiled(
        &self,
        method: MethodKey,
        code: &[u8],
        kind: CodeHeapKind,
    ) -> Result<CodeBlob> {
        let kind = self.preferred_kind(&method, kind);
        let mut placements = self.placements.write();
        let blob = self.cache.allocate(kind, &method, code)?;
        if let Some(old) = placements.shift_remove(&method) {
            self.cache.free(&old.blob)?;
        }

        let compile_seq = self.compile_seq.fetch_add(1, Ordering::AcqRel) + 1;
        placements.insert(
            method.clone(),
            PlacementRecord {
                method,
                blob: blob.clone(),
                rank: None,
                compile_seq,
            },
        );
        Ok(blob)
    }

    /// Drop a method's code
    pub fn on_method_unloaded(&self, method: &MethodKey) -> Result<()> {
        let mut placements = self.placements.write();
        let record = placements
            .shift_remove(method)
            .ok_or_else(|| JBoltError::UnknownMethod(method.to_string()))?;
        self.cache.free(&record.blob)?;
        Ok(())
    }

    pub fn placement(&self, method: &MethodKey) -> Option<PlacementRecord> {
        self.placements.read().get(method).cloned()
    }

    pub fn placements(&self) -> Vec<PlacementRecord> {
        self.placements.read().values().cloned().collect()
    }

    pub fn method_count(&self) -> usize {
        self.placements.read().len()
    }

    /// Current entry address of a method
    pub fn entry_address(&self, method: &MethodKey) -> Option<usize> {
        self.placements.read().get(method).map(PlacementRecord::address)
    }

    /// Map a possibly stale entry address to the current one
    pub fn resolve(&self, address: usize) -> usize {
        self.forwarding.read().forward(address)
    }

    pub fn forwarding(&self) -> Arc<ForwardingTable> {
        Arc::clone(&self.forwarding.read())
    }

    /// Run a pass with the seed order on first use, else with `source`
    pub fn run_with(&self, source: &dyn RankingSource) -> Result<PassReport> {
        let ranking = match &self.seed {
            Some(order) if !self.seed_consumed.swap(true, Ordering::AcqRel) => order.ranking(),
            _ => source.ranking(),
        };
        self.run_pass(&ranking)
    }

    /// Run one pass for `ranking`, hottest first
    pub fn run_pass(&self, ranking: &[MethodKey]) -> Result<PassReport> {
        let _serial = self.pass_lock.lock();
        let timer = PassTimer::new();
        let pass = self.passes.fetch_add(1, Ordering::AcqRel) + 1;
        self.logger.log(JBoltEvent::PassStart {
            pass,
            ranked: ranking.len(),
        });

        let mut report = PassReport {
            pass,
            ..Default::default()
        };

        match self.mode {
            OperatingMode::Dump => self.record(ranking, &mut report)?,
            OperatingMode::Use => self.reorder(pass, ranking, &mut report)?,
        }

        report.duration = timer.elapsed();
        self.logger.log(JBoltEvent::PassEnd {
            pass,
            relocated: report.relocated,
            bytes_moved: report.bytes_moved,
            capacity_exhausted: report.capacity_exhausted,
            duration_ms: timer.elapsed_ms(),
        });
        self.stats.record_pass(&report);
        Ok(report)
    }

    /// Order recorded by the most recent pass
    pub fn last_order(&self) -> Option<OrderFile> {
        self.last_order.lock().clone()
    }

    /// Write the most recent order to `path`
    pub fn dump_order(&self, path: &Path) -> Result<usize> {
        let order = self.last_order().ok_or(JBoltError::OrderUnavailable)?;
        order.write(path)?;
        self.logger.log(JBoltEvent::OrderDumped {
            path: path.display().to_string(),
            methods: order.len(),
        });
        Ok(order.len())
    }

    fn order_for(
        ranking: &[MethodKey],
        placements: &IndexMap<MethodKey, PlacementRecord>,
    ) -> OrderFile {
        OrderFile::from_methods(ranking.iter().filter_map(|method| {
            placements
                .get(method)
                .map(|record| (method.clone(), record.size()))
        }))
    }

    fn record(&self, ranking: &[MethodKey], report: &mut PassReport) -> Result<()> {
        let order = Self::order_for(ranking, &self.placements.read());
        report.ranked = order.len();

        if let Some(path) = &self.dump_path {
            order.write(path)?;
            self.logger.log(JBoltEvent::OrderDumped {
                path: path.display().to_string(),
                methods: order.len(),
            });
            report.dumped = Some(path.clone());
        }
        *self.last_order.lock() = Some(order);
        Ok(())
    }

    fn reorder(&self, pass: u64, ranking: &[MethodKey], report: &mut PassReport) -> Result<()> {
        let registry = Arc::clone(self.cache.registry());

        let mut safepoint = None;
        let (mut placements, plan) = loop {
            let placements = self.placements.write();
            let plan = plan(&placements, ranking, &registry);
            if !plan.moves.is_empty() && safepoint.is_none() {
                drop(placements);
                safepoint = Some(self.safepoint.synchronize());
                continue;
            }
            break (placements, plan);
        };

        report.ranked = plan.ranks.len();
        for record in placements.values_mut() {
            record.rank = plan.ranks.get(&record.method).copied();
        }
        *self.last_order.lock() = Some(Self::order_for(ranking, &placements));

        if registry.is_active(CodeHeapKind::MethodJBoltHot) {
            let configured = registry.capacity(CodeHeapKind::MethodJBoltHot);
            if plan.needed > configured {
                self.logger.log(JBoltEvent::HeapTooSmall {
                    configured,
                    needed: plan.needed,
                });
            }
        }

        let table = ForwardingTable::new(pass);
        let result = if plan.moves.is_empty() {
            Ok(())
        } else {
            self.execute(&mut placements, &table, plan.moves, report)
        };
        table.mark_complete();
        *self.forwarding.write() = Arc::new(table);

        drop(placements);
        drop(safepoint);
        result
    }

    fn execute(
        &self,
        placements: &mut IndexMap<MethodKey, PlacementRecord>,
        table: &ForwardingTable,
        mut pending: Vec<PlannedMove>,
        report: &mut PassReport,
    ) -> Result<()> {
        let registry = Arc::clone(self.cache.registry());
        let fallback = registry.fallback_partition();
        let mut moved = HashSet::new();
        let mut parked = HashSet::new();
        let mut compacted = HashSet::new();

        loop {
            // exact moves until nothing more fits
            loop {
                let mut progress = false;
                let mut i = 0;
                while i < pending.len() {
                    let (method, to, rank) =
                        (pending[i].method.clone(), pending[i].to, pending[i].rank);
                    if placements.get(&method).map(PlacementRecord::current) == Some(to) {
                        pending.remove(i);
                        continue;
                    }
                    match self.relocate(placements, table, &method, &[to], to) {
                        Ok(bytes) => {
                            report.bytes_moved += bytes;
                            if rank.is_none() {
                                report.evicted += 1;
                            }
                            moved.insert(method);
                            pending.remove(i);
                            progress = true;
                        }
                        Err(JBoltError::CodeCacheFull { .. }) => i += 1,
                        Err(e) => return Err(e),
                    }
                }
                if !progress || pending.is_empty() {
                    break;
                }
            }
            if pending.is_empty() {
                break;
            }

            if let Some(kind) = self.fragmented_target(placements, &pending, &compacted) {
                compacted.insert(kind);
                self.compact(placements, table, kind, &mut pending, &mut moved, report)?;
                continue;
            }

            let parkable = pending.iter().position(|mv| {
                mv.to != fallback
                    && !parked.contains(&mv.method)
                    && placements
                        .get(&mv.method)
                        .is_some_and(|record| record.current().is_jbolt())
            });

            match parkable {
                Some(index) => {
                    let method = pending[index].method.clone();
                    parked.insert(method.clone());
                    match self.relocate(placements, table, &method, &[fallback], fallback) {
                        Ok(bytes) => {
                            report.bytes_moved += bytes;
                            moved.insert(method);
                        }
                        Err(JBoltError::CodeCacheFull { .. }) => {}
                        Err(e) => return Err(e),
                    }
                }
                None => {
                    for mv in pending.drain(..) {
                        let Some(record) = placements.get(&mv.method) else {
                            continue;
                        };
                        let current = record.current();
                        let size = record.blob.padded_size;
                        let order: Vec<CodeHeapKind> = registry
                            .allocation_order(mv.to)
                            .into_iter()
                            .filter(|kind| *kind != current)
                            .collect();

                        let result = if order.is_empty() {
                            Err(JBoltError::CodeCacheFull {
                                kind: mv.to,
                                requested: size,
                            })
                        } else {
                            self.relocate(placements, table, &mv.method, &order, mv.to)
                        };

                        match result {
                            Ok(bytes) => {
                                report.bytes_moved += bytes;
                                moved.insert(mv.method);
                            }
                            Err(JBoltError::CodeCacheFull { .. }) => {
                                report.capacity_exhausted += 1;
                                self.logger.log(JBoltEvent::PlacementFailed {
                                    method: mv.method.to_string(),
                                    target: mv.to,
                                    size,
                                });
                            }
                            Err(e) => return Err(e),
                        }
                    }
                    break;
                }
            }
        }

        report.relocated = moved.len();
        Ok(())
    }

    /// JBolt heap a pending move targets whose free bytes suffice but are
    /// split into ranges too small for the method
    fn fragmented_target(
        &self,
        placements: &IndexMap<MethodKey, PlacementRecord>,
        pending: &[PlannedMove],
        compacted: &HashSet<CodeHeapKind>,
    ) -> Option<CodeHeapKind> {
        pending.iter().find_map(|mv| {
            if !mv.to.is_jbolt() || compacted.contains(&mv.to) {
                return None;
            }
            let size = placements.get(&mv.method)?.blob.padded_size;
            let usage = self.cache.usage(mv.to)?;
            let fragmented = usage.capacity - usage.used >= size
                && self.cache.largest_free(mv.to) < size;
            fragmented.then_some(mv.to)
        })
    }

    /// Park the ranked residents of `kind` in the fallback partition and queue
    /// them to come back, so the heap refills in rank order with no gaps
    fn compact(
        &self,
        placements: &mut IndexMap<MethodKey, PlacementRecord>,
        table: &ForwardingTable,
        kind: CodeHeapKind,
        pending: &mut Vec<PlannedMove>,
        moved: &mut HashSet<MethodKey>,
        report: &mut PassReport,
    ) -> Result<()> {
        let fallback = self.cache.registry().fallback_partition();
        let mut residents: Vec<(MethodKey, usize)> = placements
            .values()
            .filter(|record| record.current() == kind)
            .filter(|record| !pending.iter().any(|mv| mv.method == record.method))
            .filter_map(|record| record.rank.map(|rank| (record.method.clone(), rank)))
            .collect();
        residents.sort_by_key(|(_, rank)| *rank);

        for (method, rank) in residents {
            match self.relocate(placements, table, &method, &[fallback], fallback) {
                Ok(bytes) => {
                    report.bytes_moved += bytes;
                    moved.insert(method.clone());
                    pending.push(PlannedMove {
                        method,
                        from: fallback,
                        to: kind,
                        rank: Some(rank),
                    });
                }
                Err(JBoltError::CodeCacheFull { .. }) => break,
                Err(e) => return Err(e),
            }
        }

        // evictions first, then rank order
        pending.sort_by_key(|mv| mv.rank.map_or((0, 0), |rank| (1, rank)));
        Ok(())
    }

    /// Copy one method's code following `order` and free the old copy
    ///
    /// Only legal while the safepoint is reached.
    fn relocate(
        &self,
        placements: &mut IndexMap<MethodKey, PlacementRecord>,
        table: &ForwardingTable,
        method: &MethodKey,
        order: &[CodeHeapKind],
        requested: CodeHeapKind,
    ) -> Result<usize> {
        if !self.safepoint.is_synchronized() {
            return Err(JBoltError::RelocationRace(method.to_string()));
        }
        let record = placements
            .get_mut(method)
            .ok_or_else(|| JBoltError::UnknownMethod(method.to_string()))?;
        let code = self
            .cache
            .code(&record.blob)
            .ok_or_else(|| JBoltError::Internal(format!("no code for {}", method)))?;

        let blob = match order {
            [kind] => self.cache.allocate_exact(*kind, method, &code)?,
            _ => self.cache.allocate_in_order(order, requested, method, &code)?,
        };
        self.cache.free(&record.blob)?;
        table.add_entry(record.blob.address, blob.address);

        self.logger.log(JBoltEvent::MethodRelocated {
            method: method.to_string(),
            from: record.blob.kind,
            to: blob.kind,
            size: blob.size,
        });
        let bytes = blob.size;
        record.blob = blob;
        Ok(bytes)
    }
}
