//! Code Heap Registry
//!
//! Decides once, at startup, which partitions exist and how large each one
//! is. The result is immutable and shared read-only afterwards.
//!
//! When the JBolt heaps are active they are carved out of the non-profiled
//! heap, so the effective non-profiled capacity differs from its option.

use std::fmt;

use crate::config::{ConfigError, VmOptions, KB};
use crate::heap::kind::{CodeHeapDescriptor, CodeHeapKind, ALL_KINDS};
use crate::heap::{align_down, CODE_HEAP_ALIGNMENT};

/// Set of partitions present in this configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActivePartitionSet(u8);

impl ActivePartitionSet {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn of(kinds: &[CodeHeapKind]) -> Self {
        let mut set = Self::empty();
        for kind in kinds {
            set.insert(*kind);
        }
        set
    }

    pub fn insert(&mut self, kind: CodeHeapKind) {
        self.0 |= 1 << kind.id();
    }

    pub fn remove(&mut self, kind: CodeHeapKind) {
        self.0 &= !(1 << kind.id());
    }

    pub fn contains(&self, kind: CodeHeapKind) -> bool {
        self.0 & (1 << kind.id()) != 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Members in id order
    pub fn iter(&self) -> impl Iterator<Item = CodeHeapKind> + '_ {
        ALL_KINDS.into_iter().filter(move |kind| self.contains(*kind))
    }
}

impl fmt::Display for ActivePartitionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(CodeHeapKind::display_name).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// All partition descriptors plus the active set and resolved capacities
#[derive(Debug, Clone)]
pub struct CodeHeapRegistry {
    active: ActivePartitionSet,
    capacities: [usize; 6],
}

impl CodeHeapRegistry {
    /// Build the registry for a validated set of options
    ///
    /// Fails when the JBolt heaps are active and cannot be carved out of the
    /// non-profiled heap.
    pub fn new(options: &VmOptions) -> Result<Self, ConfigError> {
        let active = Self::compute_active(options);

        let mut capacities = [0; 6];
        for kind in ALL_KINDS {
            capacities[kind as usize] = Self::option_capacity(options, kind);
        }

        if active.contains(CodeHeapKind::MethodJBoltHot) {
            let jbolt_size = options.jbolt_code_heap_size();
            if jbolt_size % CODE_HEAP_ALIGNMENT != 0 {
                return Err(ConfigError::UnalignedJBoltHeap(CODE_HEAP_ALIGNMENT));
            }

            let jbolt_total = jbolt_size
                .checked_mul(2)
                .ok_or(ConfigError::JBoltHeapTooLarge(jbolt_size))?;
            let non_profiled = options.non_profiled_code_heap_size;
            if non_profiled <= jbolt_total {
                return Err(ConfigError::NotEnoughNonProfiledSpace {
                    non_profiled_kb: non_profiled / KB,
                    jbolt_total_kb: jbolt_total / KB,
                });
            }
            capacities[CodeHeapKind::MethodNonProfiled as usize] =
                align_down(non_profiled - jbolt_total, CODE_HEAP_ALIGNMENT);
        }

        Ok(Self { active, capacities })
    }

    /// Derive the active partitions from the options
    pub fn compute_active(options: &VmOptions) -> ActivePartitionSet {
        if !options.segmented_code_cache {
            return ActivePartitionSet::of(&[CodeHeapKind::All]);
        }
        if options.interpreter_only {
            return ActivePartitionSet::of(&[CodeHeapKind::NonNMethod]);
        }

        let mut active = ActivePartitionSet::of(&ALL_KINDS);
        active.remove(CodeHeapKind::All);

        if !options.has_profiled_tier() {
            active.remove(CodeHeapKind::MethodProfiled);
        }
        if !options.use_jbolt || options.is_dump_mode() {
            active.remove(CodeHeapKind::MethodJBoltHot);
            active.remove(CodeHeapKind::MethodJBoltTmp);
        }
        active
    }

    /// Capacity as given by the partition's size option
    pub fn option_capacity(options: &VmOptions, kind: CodeHeapKind) -> usize {
        match kind {
            CodeHeapKind::MethodNonProfiled => options.non_profiled_code_heap_size,
            CodeHeapKind::MethodProfiled => options.profiled_code_heap_size,
            CodeHeapKind::MethodJBoltHot | CodeHeapKind::MethodJBoltTmp => {
                options.jbolt_code_heap_size()
            }
            CodeHeapKind::NonNMethod => options.non_nmethod_code_heap_size,
            CodeHeapKind::All => options.reserved_code_cache_size,
        }
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &'static CodeHeapDescriptor> {
        ALL_KINDS.into_iter().map(CodeHeapKind::descriptor)
    }

    pub fn active(&self) -> ActivePartitionSet {
        self.active
    }

    pub fn is_active(&self, kind: CodeHeapKind) -> bool {
        self.active.contains(kind)
    }

    /// Effective capacity in bytes
    pub fn capacity(&self, kind: CodeHeapKind) -> usize {
        self.capacities[kind as usize]
    }

    /// Active overflow targets of `kind`, excluding `kind` itself
    pub fn overflow_chain(&self, kind: CodeHeapKind) -> Vec<CodeHeapKind> {
        kind.overflow_targets()
            .iter()
            .copied()
            .filter(|target| self.is_active(*target))
            .collect()
    }

    /// `kind` (when active) followed by its active overflow targets
    pub fn allocation_order(&self, kind: CodeHeapKind) -> Vec<CodeHeapKind> {
        let mut order = Vec::with_capacity(3);
        if self.is_active(kind) {
            order.push(kind);
        }
        order.extend(self.overflow_chain(kind));
        order
    }

    /// Where a method leaves a JBolt heap to when it no longer belongs there
    pub fn fallback_partition(&self) -> CodeHeapKind {
        if self.is_active(CodeHeapKind::MethodNonProfiled) {
            CodeHeapKind::MethodNonProfiled
        } else {
            CodeHeapKind::All
        }
    }
}
