//! Hotness ranking sources
//!
//! The reordering engine only needs an ordered list of methods, hottest
//! first. `HotnessProfiler` produces one from sample counters; anything else
//! (an order file, a test fixture) can implement `RankingSource` directly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::method::MethodKey;

/// Supplies the current hotness ranking
#[cfg_attr(test, mockall::automock)]
pub trait RankingSource: Send + Sync {
    /// Methods ordered hottest first
    fn ranking(&self) -> Vec<MethodKey>;
}

/// A ranking that never changes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedRanking(pub Vec<MethodKey>);

impl RankingSource for FixedRanking {
    fn ranking(&self) -> Vec<MethodKey> {
        self.0.clone()
    }
}

/// Profiling counters for a single method
#[derive(Debug, Default)]
pub struct MethodProfile {
    samples: AtomicU64,
    compile_seq: AtomicU64,
}

impl MethodProfile {
    /// Record samples, return new count
    pub fn record(&self, samples: u64) -> u64 {
        self.samples.fetch_add(samples, Ordering::Relaxed) + samples
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    pub fn compile_seq(&self) -> u64 {
        self.compile_seq.load(Ordering::Relaxed)
    }
}

/// Sample-count ranking
///
/// Orders by sample count, highest first. Ties go to the most recently
/// compiled method. Methods without samples are not ranked.
#[derive(Default)]
pub struct HotnessProfiler {
    profiles: RwLock<IndexMap<MethodKey, Arc<MethodProfile>>>,
    next_seq: AtomicU64,
}

impl HotnessProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    fn profile(&self, method: &MethodKey) -> Arc<MethodProfile> {
        if let Some(profile) = self.profiles.read().get(method) {
            return Arc::clone(profile);
        }
        let mut profiles = self.profiles.write();
        Arc::clone(profiles.entry(method.clone()).or_default())
    }

    /// Record one sample, return new count
    pub fn record_sample(&self, method: &MethodKey) -> u64 {
        self.profile(method).record(1)
    }

    pub fn record_samples(&self, method: &MethodKey, samples: u64) -> u64 {
        self.profile(method).record(samples)
    }

    /// Note that `method` was (re)compiled
    pub fn record_compiled(&self, method: &MethodKey) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        self.profile(method).compile_seq.store(seq, Ordering::Relaxed);
    }

    /// Forget a method, e.g. after it was unloaded
    pub fn remove(&self, method: &MethodKey) {
        self.profiles.write().shift_remove(method);
    }

    pub fn samples(&self, method: &MethodKey) -> u64 {
        self.profiles
            .read()
            .get(method)
            .map(|profile| profile.samples())
            .unwrap_or(0)
    }

    /// Zero all sample counters, keeping compile order
    pub fn reset_samples(&self) {
        for profile in self.profiles.read().values() {
            profile.samples.store(0, Ordering::Relaxed);
        }
    }
}

impl RankingSource for HotnessProfiler {
    fn ranking(&self) -> Vec<MethodKey> {
        let mut ranked: Vec<(MethodKey, u64, u64)> = self
            .profiles
            .read()
            .iter()
            .map(|(method, profile)| (method.clone(), profile.samples(), profile.compile_seq()))
            .filter(|(_, samples, _)| *samples > 0)
            .collect();

        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)));
        ranked.into_iter().map(|(method, _, _)| method).collect()
    }
}
