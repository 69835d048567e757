//! Reordering Integration Tests
//!
//! Placement properties observed through the public engine API:
//! - hot heap holds a rank prefix, tmp holds the next prefix
//! - a second pass with the same ranking moves nothing
//! - methods that no longer rank leave the JBolt heaps
//! - stale entry addresses resolve to the moved code
//! - mutators parked at the safepoint never observe a half-applied pass

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use common::{
    assert_no_overlap, assert_placements_consistent, code_for, key, keys, wait_until,
    EngineFixture, SMALL_JBOLT_HEAP,
};
use jbolt::{CodeHeapKind, HotnessProfiler, JBoltEvent, JBoltError, RankingSource};

use CodeHeapKind::*;

const EIGHTH: usize = SMALL_JBOLT_HEAP / 8;

#[test]
fn test_rank_prefix_fills_hot_then_tmp() {
    let fixture = EngineFixture::small();
    let names: Vec<String> = (0..20).map(|i| format!("m{:02}", i)).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    fixture.compile_many(&refs, EIGHTH);

    // reverse compile order, so every ranked method has to move
    let ranking: Vec<_> = refs.iter().rev().map(|n| key(n)).collect();
    let report = fixture.engine.run_pass(&ranking).unwrap();

    assert_eq!(report.ranked, 20);
    assert_eq!(report.relocated, 16);
    assert_eq!(report.capacity_exhausted, 0);
    assert_eq!(fixture.methods_in(MethodJBoltHot), ranking[..8].to_vec());
    assert_eq!(fixture.methods_in(MethodJBoltTmp), ranking[8..16].to_vec());
    for name in &refs[..4] {
        assert_eq!(fixture.kind_of(name), MethodNonProfiled);
    }
    assert_no_overlap(&fixture, "after first pass");
    assert_placements_consistent(&fixture, "after first pass");
}

#[test]
fn test_second_pass_is_idempotent() {
    let fixture = EngineFixture::small();
    fixture.compile_many(&["a", "b", "c", "d"], EIGHTH);
    let ranking = keys(&["c", "a", "d", "b"]);

    fixture.engine.run_pass(&ranking).unwrap();
    let before = fixture.engine.placements();
    let epoch = fixture.safepoint.epoch();

    let report = fixture.engine.run_pass(&ranking).unwrap();
    assert_eq!(report.relocated, 0);
    assert_eq!(report.bytes_moved, 0);
    assert_eq!(fixture.engine.placements(), before);
    assert_eq!(fixture.safepoint.epoch(), epoch, "no-op pass must not stop the world");
}

#[test]
fn test_cooled_methods_are_evicted() {
    let fixture = EngineFixture::small();
    fixture.compile_many(&["hot", "warm", "newcomer"], EIGHTH);

    fixture.engine.run_pass(&keys(&["hot", "warm"])).unwrap();
    assert_eq!(fixture.kind_of("warm"), MethodJBoltHot);

    let report = fixture.engine.run_pass(&keys(&["newcomer", "hot"])).unwrap();
    assert_eq!(report.evicted, 1);
    assert_eq!(fixture.kind_of("warm"), MethodNonProfiled);
    assert_eq!(fixture.kind_of("newcomer"), MethodJBoltHot);
    assert_eq!(
        fixture.methods_in(MethodJBoltHot).len(),
        2,
        "hot heap keeps exactly the ranked methods"
    );
}

#[test]
fn test_moved_code_is_byte_identical() {
    let fixture = EngineFixture::small();
    let blob = fixture.compile("payload", 1000);

    fixture.engine.run_pass(&keys(&["payload"])).unwrap();
    let record = fixture.engine.placement(&key("payload")).unwrap();

    assert_ne!(record.address(), blob.address);
    assert_eq!(
        fixture.cache.code(&record.blob).unwrap(),
        code_for("payload", 1000)
    );
}

#[test]
fn test_stale_addresses_forward() {
    let fixture = EngineFixture::small();
    let a = fixture.compile("a", 300);
    let b = fixture.compile("b", 300);

    fixture.engine.run_pass(&keys(&["b", "a"])).unwrap();

    let table = fixture.engine.forwarding();
    assert!(table.is_complete());
    assert_eq!(table.len(), 2);
    assert_eq!(fixture.engine.resolve(a.address), fixture.engine.entry_address(&key("a")).unwrap());
    assert_eq!(fixture.engine.resolve(b.address), fixture.engine.entry_address(&key("b")).unwrap());

    // a later pass replaces the table
    fixture.engine.run_pass(&keys(&["b", "a"])).unwrap();
    assert!(fixture.engine.forwarding().is_empty());
}

#[test]
fn test_fragmented_hot_heap_is_packed() {
    let fixture = EngineFixture::small();
    let quarter = SMALL_JBOLT_HEAP / 4;
    fixture.compile_many(&["a", "b", "c", "d"], quarter);
    fixture.engine.run_pass(&keys(&["a", "b", "c", "d"])).unwrap();
    assert_eq!(fixture.methods_in(MethodJBoltHot), keys(&["a", "b", "c", "d"]));

    // evicting a and c leaves two quarter-sized holes, e needs half the heap
    fixture.compile("e", 2 * quarter);
    let report = fixture.engine.run_pass(&keys(&["b", "d", "e"])).unwrap();

    assert_eq!(report.capacity_exhausted, 0);
    assert_eq!(report.evicted, 2);
    assert_eq!(fixture.methods_in(MethodJBoltHot), keys(&["b", "d", "e"]));
    assert_eq!(fixture.cache.largest_free(MethodJBoltHot), 0);
    assert_eq!(fixture.cache.usage(MethodJBoltTmp).unwrap().used, 0);
    assert_eq!(
        fixture.cache.code(&fixture.engine.placement(&key("b")).unwrap().blob).unwrap(),
        code_for("b", quarter)
    );
    assert_no_overlap(&fixture, "after packing");
    assert_placements_consistent(&fixture, "after packing");

    let epoch = fixture.safepoint.epoch();
    let report = fixture.engine.run_pass(&keys(&["b", "d", "e"])).unwrap();
    assert_eq!(report.relocated, 0);
    assert_eq!(report.capacity_exhausted, 0);
    assert_eq!(fixture.safepoint.epoch(), epoch);
}

#[test]
fn test_oversized_ranking_reports_heap_too_small() {
    let fixture = EngineFixture::small();
    let names: Vec<String> = (0..24).map(|i| format!("big{}", i)).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    fixture.compile_many(&refs, EIGHTH);

    let ranking: Vec<_> = refs.iter().map(|n| key(n)).collect();
    let report = fixture.engine.run_pass(&ranking).unwrap();

    assert_eq!(report.relocated, 16);
    assert_eq!(
        fixture.logger.count_matching(|e| matches!(
            e,
            JBoltEvent::HeapTooSmall { needed, configured }
                if *needed == 24 * EIGHTH && *configured == SMALL_JBOLT_HEAP
        )),
        1
    );
}

#[test]
fn test_profiler_ranking_drives_pass() {
    let fixture = EngineFixture::small();
    fixture.compile_many(&["cold", "lukewarm", "scorching"], 512);

    let profiler = HotnessProfiler::new();
    for name in ["cold", "lukewarm", "scorching"] {
        profiler.record_compiled(&key(name));
    }
    profiler.record_samples(&key("scorching"), 900);
    profiler.record_samples(&key("lukewarm"), 40);

    assert_eq!(profiler.ranking(), keys(&["scorching", "lukewarm"]));

    let report = fixture.engine.run_with(&profiler).unwrap();
    assert_eq!(report.ranked, 2);
    assert_eq!(fixture.methods_in(MethodJBoltHot), keys(&["scorching", "lukewarm"]));
    assert_eq!(fixture.kind_of("cold"), MethodNonProfiled);
}

#[test]
fn test_unloaded_method_frees_space() {
    let fixture = EngineFixture::small();
    fixture.compile_many(&["keep", "drop"], EIGHTH);
    fixture.engine.run_pass(&keys(&["keep", "drop"])).unwrap();

    let used = fixture.cache.usage(MethodJBoltHot).unwrap().used;
    fixture.engine.on_method_unloaded(&key("drop")).unwrap();
    assert_eq!(fixture.cache.usage(MethodJBoltHot).unwrap().used, used - EIGHTH);

    assert!(matches!(
        fixture.engine.on_method_unloaded(&key("drop")),
        Err(JBoltError::UnknownMethod(_))
    ));
}

#[test]
fn test_mutators_parked_during_pass() {
    let fixture = EngineFixture::small();
    let names: Vec<String> = (0..64).map(|i| format!("m{}", i)).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    fixture.compile_many(&refs, 2048);

    let engine = Arc::clone(&fixture.engine);
    let safepoint = Arc::clone(&fixture.safepoint);
    let stop = Arc::new(AtomicBool::new(false));
    let torn_reads = Arc::new(AtomicUsize::new(0));
    let mutator_count = 4;
    let barrier = Arc::new(Barrier::new(mutator_count + 1));

    let mut handles = Vec::new();
    for t in 0..mutator_count {
        let engine = Arc::clone(&engine);
        let safepoint = Arc::clone(&safepoint);
        let stop = Arc::clone(&stop);
        let torn_reads = Arc::clone(&torn_reads);
        let barrier = Arc::clone(&barrier);
        let target = key(&format!("m{}", t * 7));

        safepoint.register_thread();
        handles.push(thread::spawn(move || {
            barrier.wait();
            while !stop.load(Ordering::Acquire) {
                safepoint.poll();
                // between polls the published placement must be live code
                if let Some(record) = engine.placement(&target) {
                    if engine.cache().kind_of(record.address()) != Some(record.current()) {
                        torn_reads.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
            safepoint.deregister_thread();
        }));
    }

    barrier.wait();
    for round in 0..6 {
        let mut ranking: Vec<_> = refs.iter().map(|n| key(n)).collect();
        ranking.rotate_left(round * 11);
        engine.run_pass(&ranking).unwrap();
    }

    stop.store(true, Ordering::Release);
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(torn_reads.load(Ordering::Relaxed), 0);
    assert!(wait_until(|| safepoint.registered_threads() == 0));
    assert_eq!(fixture.engine.pass_count(), 6);
    assert_no_overlap(&fixture, "after concurrent passes");
    assert_placements_consistent(&fixture, "after concurrent passes");
}

#[test]
fn test_concurrent_passes_serialize() {
    let fixture = EngineFixture::small();
    fixture.compile_many(&["a", "b", "c", "d", "e", "f"], EIGHTH);

    let rankings = [keys(&["a", "b", "c"]), keys(&["f", "e", "d"])];
    let handles: Vec<_> = rankings
        .into_iter()
        .map(|ranking| {
            let engine = Arc::clone(&fixture.engine);
            thread::spawn(move || {
                for _ in 0..5 {
                    engine.run_pass(&ranking).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(fixture.engine.pass_count(), 10);
    assert_eq!(fixture.engine.stats().summary().passes, 10);
    assert_eq!(fixture.methods_in(MethodJBoltHot).len(), 3);
    assert_no_overlap(&fixture, "after racing passes");
    assert_placements_consistent(&fixture, "after racing passes");
}
