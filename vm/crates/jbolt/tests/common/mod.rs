//! Shared fixtures for the JBolt integration tests
//!
//! Every fixture builds a private code cache, safepoint and logger so tests
//! can run in parallel without sharing state.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime};
use jbolt::heap::CODE_HEAP_ALIGNMENT;
use jbolt::{
    CodeBlob, CodeCache, CodeHeapKind, CodeHeapRegistry, JBoltLogger, MethodKey, OperatingMode,
    ReorderEngine, Safepoint, VmOptions, WallClock,
};
use parking_lot::Mutex;

/// JBolt heap size used by most tests (one alignment unit per heap)
pub const SMALL_JBOLT_HEAP: usize = CODE_HEAP_ALIGNMENT;

/// Upper bound for anything a test waits on
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Options with JBolt enabled and each JBolt heap `jbolt_size` bytes
pub fn jbolt_options(jbolt_size: usize) -> VmOptions {
    VmOptions {
        use_jbolt: true,
        jbolt_code_heap_size: Some(jbolt_size),
        ..Default::default()
    }
}

pub fn key(name: &str) -> MethodKey {
    MethodKey::new("app/Service", name, "()V")
}

pub fn keys(names: &[&str]) -> Vec<MethodKey> {
    names.iter().map(|name| key(name)).collect()
}

/// Engine plus everything it runs on
pub struct EngineFixture {
    pub registry: Arc<CodeHeapRegistry>,
    pub cache: Arc<CodeCache>,
    pub safepoint: Arc<Safepoint>,
    pub logger: Arc<JBoltLogger>,
    pub engine: Arc<ReorderEngine>,
}

impl EngineFixture {
    pub fn with_jbolt_size(jbolt_size: usize) -> Self {
        Self::build(jbolt_options(jbolt_size), OperatingMode::Use, |engine| engine)
    }

    pub fn small() -> Self {
        Self::with_jbolt_size(SMALL_JBOLT_HEAP)
    }

    /// Dump-mode engine writing to `path` after every pass
    pub fn dumping_to(path: &Path) -> Self {
        let options = VmOptions {
            use_jbolt: true,
            jbolt_dump_mode: Some(true),
            ..Default::default()
        };
        let path = path.to_path_buf();
        Self::build(options, OperatingMode::Dump, move |engine| {
            engine.with_dump_path(path)
        })
    }

    pub fn build(
        options: VmOptions,
        mode: OperatingMode,
        configure: impl FnOnce(ReorderEngine) -> ReorderEngine,
    ) -> Self {
        let registry = Arc::new(
            CodeHeapRegistry::new(&options).expect("code heap layout should be valid"),
        );
        let logger = Arc::new(JBoltLogger::silent());
        let cache = Arc::new(
            CodeCache::new(Arc::clone(&registry), Arc::clone(&logger))
                .expect("code cache should reserve its heaps"),
        );
        let safepoint = Arc::new(Safepoint::new());
        let engine = ReorderEngine::new(
            mode,
            Arc::clone(&cache),
            Arc::clone(&safepoint),
            Arc::clone(&logger),
        );
        Self {
            registry,
            cache,
            safepoint,
            logger,
            engine: Arc::new(configure(engine)),
        }
    }

    /// Compile `name` with `size` bytes of code into the non-profiled heap
    pub fn compile(&self, name: &str, size: usize) -> CodeBlob {
        self.compile_into(name, size, CodeHeapKind::MethodNonProfiled)
    }

    pub fn compile_into(&self, name: &str, size: usize, kind: CodeHeapKind) -> CodeBlob {
        let code = code_for(name, size);
        self.engine
            .register_compiled(key(name), &code, kind)
            .unwrap_or_else(|e| panic!("compiling {} ({} bytes) failed: {}", name, size, e))
    }

    pub fn compile_many(&self, names: &[&str], size: usize) -> Vec<CodeBlob> {
        names.iter().map(|name| self.compile(name, size)).collect()
    }

    pub fn kind_of(&self, name: &str) -> CodeHeapKind {
        self.engine
            .placement(&key(name))
            .unwrap_or_else(|| panic!("{} has no code", name))
            .current()
    }

    /// Methods in `kind`, in address order
    pub fn methods_in(&self, kind: CodeHeapKind) -> Vec<MethodKey> {
        let mut records: Vec<_> = self
            .engine
            .placements()
            .into_iter()
            .filter(|r| r.current() == kind)
            .collect();
        records.sort_by_key(|r| r.address());
        records.into_iter().map(|r| r.method).collect()
    }
}

/// Deterministic code bytes, distinct per method
pub fn code_for(name: &str, size: usize) -> Vec<u8> {
    let seed = name.bytes().fold(0u8, |acc, b| acc.wrapping_mul(31).wrapping_add(b));
    (0..size).map(|i| seed.wrapping_add(i as u8)).collect()
}

/// Clock the test moves by hand
pub struct ManualClock(Mutex<NaiveDateTime>);

impl ManualClock {
    pub fn at(hour: u32, minute: u32) -> Arc<Self> {
        let now = NaiveDate::from_ymd_opt(2024, 3, 15)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .expect("valid test time");
        Arc::new(Self(Mutex::new(now)))
    }

    pub fn set(&self, hour: u32, minute: u32) {
        let mut now = self.0.lock();
        *now = now
            .date()
            .and_hms_opt(hour, minute, 0)
            .expect("valid test time");
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.0.lock()
    }
}

/// Poll `condition` until it holds or `TEST_TIMEOUT` passes
pub fn wait_until(condition: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < TEST_TIMEOUT {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Assert that no two live blobs overlap
#[track_caller]
pub fn assert_no_overlap(fixture: &EngineFixture, context: &str) {
    let mut spans: Vec<(usize, usize)> = fixture
        .engine
        .placements()
        .iter()
        .map(|r| (r.address(), r.address() + r.blob.padded_size))
        .collect();
    spans.sort();
    for pair in spans.windows(2) {
        assert!(
            pair[0].1 <= pair[1].0,
            "{}: blob at {:#x}..{:#x} overlaps blob at {:#x}",
            context,
            pair[0].0,
            pair[0].1,
            pair[1].0
        );
    }
}

/// Assert that every method's address lies inside the heap it claims
#[track_caller]
pub fn assert_placements_consistent(fixture: &EngineFixture, context: &str) {
    let mut addresses = HashSet::new();
    for record in fixture.engine.placements() {
        assert_eq!(
            fixture.cache.kind_of(record.address()),
            Some(record.current()),
            "{}: {} claims {} but lives elsewhere",
            context,
            record.method,
            record.current()
        );
        assert!(
            addresses.insert(record.address()),
            "{}: duplicate entry address {:#x}",
            context,
            record.address()
        );
    }
}
