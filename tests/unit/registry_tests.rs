// Registry and metric primitive unit tests
// Concurrency properties are exercised with real OS threads

use gatewatch::constants::DEFAULT_SAMPLE_SIZE;
use gatewatch::metrics::{Histogram, Metric};
use gatewatch::registry::Registry;
use gatewatch::stats::Stats;
use std::sync::Arc;
use std::thread;

#[test]
fn test_concurrent_counter_increments_are_not_lost() {
    // Test: 16 threads x 10_000 increments land exactly
    let registry = Registry::new();
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let registry = registry.clone();
            thread::spawn(move || {
                let counter = registry.counter("hits");
                for _ in 0..10_000 {
                    counter.inc(1);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(registry.counter("hits").count(), 160_000);
}

#[test]
fn test_concurrent_first_registration_yields_one_instance() {
    // Test: racing get-or-register callers all receive the same counter
    let registry = Registry::with_prefix("gatewatch.");
    let handles: Vec<_> = (0..32)
        .map(|_| {
            let registry = registry.clone();
            thread::spawn(move || registry.counter("router.response./x.status"))
        })
        .collect();
    let counters: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for counter in &counters[1..] {
        assert!(Arc::ptr_eq(&counters[0], counter));
    }
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_nested_children_compose_prefixes() {
    let root = Registry::with_prefix("gatewatch.");
    let router = root.child("router.");
    let endpoint = router.child("response./users.");

    endpoint.counter("status.200.count").inc(2);

    let stats = Stats::capture(&root);
    assert_eq!(
        stats.counters["gatewatch.router.response./users.status.200.count"],
        2
    );
    assert_eq!(endpoint.prefix(), "gatewatch.router.response./users.");
}

#[test]
fn test_child_enumeration_is_scoped() {
    let root = Registry::with_prefix("gatewatch.");
    root.child("router.").counter("connected");
    root.child("proxy.").counter("recorder.dropped");

    let mut names = Vec::new();
    root.child("router.").each(|name, _| names.push(name.to_string()));

    assert_eq!(names, vec!["gatewatch.router.connected".to_string()]);
    assert_eq!(root.len(), 2);
}

#[test]
fn test_histogram_under_capacity_is_exact() {
    let histogram = Histogram::new();
    for v in 1..=500 {
        histogram.update(v);
    }

    let snap = histogram.snapshot();
    assert_eq!(snap.count, 500);
    assert_eq!(snap.max, 500);
    assert_eq!(snap.min, 1);
    assert!((snap.mean - 250.5).abs() < 1e-9);
}

#[test]
fn test_histogram_over_capacity_stays_within_range() {
    // Test: reservoir eviction keeps max/min/mean inside the true range
    let histogram = Histogram::new();
    let n = DEFAULT_SAMPLE_SIZE as i64 * 20;
    for v in 0..n {
        histogram.update(v);
    }

    let snap = histogram.snapshot();
    assert_eq!(snap.count, n as u64);
    assert!(snap.max <= n - 1 && snap.max >= 0);
    assert!(snap.min >= 0 && snap.min <= snap.max);
    assert!(snap.mean >= 0.0 && snap.mean <= (n - 1) as f64);
    // percentiles are monotone
    for pair in snap.percentiles.windows(2) {
        assert!(pair[0] <= pair[1]);
    }
}

#[test]
fn test_null_registry_discards_writes() {
    let registry = Registry::null();
    let counter = registry.counter("hits");
    counter.inc(5);

    assert!(registry.is_null());
    assert!(registry.get("hits").is_none());
    assert!(registry.is_empty());
}

#[test]
fn test_metric_kind_is_stable_per_name() {
    let registry = Registry::new();
    registry.gauge("depth").update(3);

    // a counter request under a gauge's name gets a detached counter
    let counter = registry.counter("depth");
    counter.inc(1);

    match registry.get("depth") {
        Some(Metric::Gauge(gauge)) => assert_eq!(gauge.value(), 3),
        other => panic!("unexpected metric: {:?}", other),
    }
}
