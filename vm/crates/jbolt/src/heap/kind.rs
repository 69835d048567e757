//! Code heap partition identities and their static overflow relation.

use std::fmt;

/// Code cache partition
///
/// Discriminants are the stable ids used in logs and JSON output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CodeHeapKind {
    /// Fully optimized code without profiling
    MethodNonProfiled = 0,
    /// Code that still collects profiles
    MethodProfiled = 1,
    /// Densely packed hot methods
    MethodJBoltHot = 2,
    /// Hot methods that did not fit the hot heap
    MethodJBoltTmp = 3,
    /// Stubs, adapters and buffers
    NonNMethod = 4,
    /// The unsegmented code cache
    All = 5,
}

/// Every partition, in id order
pub const ALL_KINDS: [CodeHeapKind; 6] = [
    CodeHeapKind::MethodNonProfiled,
    CodeHeapKind::MethodProfiled,
    CodeHeapKind::MethodJBoltHot,
    CodeHeapKind::MethodJBoltTmp,
    CodeHeapKind::NonNMethod,
    CodeHeapKind::All,
];

impl CodeHeapKind {
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn descriptor(self) -> &'static CodeHeapDescriptor {
        &DESCRIPTORS[self as usize]
    }

    pub fn display_name(self) -> &'static str {
        self.descriptor().display_name
    }

    /// Name of the VM option holding this partition's capacity
    pub fn capacity_flag(self) -> &'static str {
        self.descriptor().capacity_flag
    }

    /// Partitions that may receive this partition's code when it is full
    pub fn overflow_targets(self) -> &'static [CodeHeapKind] {
        self.descriptor().overflow_targets
    }

    /// Every partition accepts itself; the rest follows the static table.
    pub fn allows_overflow_into(self, other: CodeHeapKind) -> bool {
        self == other || self.overflow_targets().contains(&other)
    }

    pub fn is_jbolt(self) -> bool {
        matches!(self, CodeHeapKind::MethodJBoltHot | CodeHeapKind::MethodJBoltTmp)
    }
}

impl fmt::Display for CodeHeapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Static description of a partition
#[derive(Debug, PartialEq, Eq)]
pub struct CodeHeapDescriptor {
    pub kind: CodeHeapKind,
    pub display_name: &'static str,
    pub capacity_flag: &'static str,
    pub overflow_targets: &'static [CodeHeapKind],
}

impl CodeHeapDescriptor {
    pub fn allows_overflow_into(&self, other: CodeHeapKind) -> bool {
        self.kind.allows_overflow_into(other)
    }
}

static DESCRIPTORS: [CodeHeapDescriptor; 6] = [
    CodeHeapDescriptor {
        kind: CodeHeapKind::MethodNonProfiled,
        display_name: "CodeHeap 'non-profiled nmethods'",
        capacity_flag: "NonProfiledCodeHeapSize",
        overflow_targets: &[],
    },
    CodeHeapDescriptor {
        kind: CodeHeapKind::MethodProfiled,
        display_name: "CodeHeap 'profiled nmethods'",
        capacity_flag: "ProfiledCodeHeapSize",
        overflow_targets: &[CodeHeapKind::MethodNonProfiled],
    },
    CodeHeapDescriptor {
        kind: CodeHeapKind::MethodJBoltHot,
        display_name: "CodeHeap 'jbolt hot nmethods'",
        capacity_flag: "JBoltCodeHeapSize",
        overflow_targets: &[CodeHeapKind::MethodNonProfiled],
    },
    CodeHeapDescriptor {
        kind: CodeHeapKind::MethodJBoltTmp,
        display_name: "CodeHeap 'jbolt tmp nmethods'",
        capacity_flag: "JBoltCodeHeapSize",
        overflow_targets: &[CodeHeapKind::MethodNonProfiled],
    },
    CodeHeapDescriptor {
        kind: CodeHeapKind::NonNMethod,
        display_name: "CodeHeap 'non-nmethods'",
        capacity_flag: "NonNMethodCodeHeapSize",
        overflow_targets: &[CodeHeapKind::MethodNonProfiled, CodeHeapKind::MethodProfiled],
    },
    CodeHeapDescriptor {
        kind: CodeHeapKind::All,
        display_name: "CodeCache",
        capacity_flag: "ReservedCodeCacheSize",
        overflow_targets: &[],
    },
];
