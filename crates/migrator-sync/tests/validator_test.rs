//! Validator scenarios over file-backed stores.

mod common;

use std::sync::Arc;

use common::{open_store, put, Interactive, RecordingProducer};
use migrator_core::{CancellationToken, InconsistentEventType, Side};
use migrator_sync::Validator;
use tempfile::TempDir;

fn stale(id: i64) -> Interactive {
    Interactive {
        like_cnt: 10_000 + id,
        ..Interactive::sample(id)
    }
}

/// Base: ids 1..=250. Target: 1..=240 identical, 241 and 242 stale.
fn scenario(dir: &TempDir) -> (Arc<migrator_storage::SqliteStore>, Arc<migrator_storage::SqliteStore>) {
    let base = open_store(dir, "base.db");
    let target = open_store(dir, "target.db");
    for id in 1..=250 {
        put(&base, &Interactive::sample(id));
    }
    for id in 1..=240 {
        put(&target, &Interactive::sample(id));
    }
    put(&target, &stale(241));
    put(&target, &stale(242));
    (base, target)
}

#[test]
fn forward_scan_pages_and_reports_divergence() {
    let dir = TempDir::new().unwrap();
    let (base, target) = scenario(&dir);
    let producer = Arc::new(RecordingProducer::default());

    let report = Validator::<Interactive>::new(base, target, Side::Src, producer.clone())
        .batch_size(100)
        .validate(&CancellationToken::new())
        .unwrap();

    assert_eq!(report.forward_pages, 3);
    assert_eq!(report.reverse_pages, 3);
    assert_eq!(
        producer.ids(InconsistentEventType::TargetMissing),
        (243..=250).collect::<Vec<_>>()
    );
    assert_eq!(producer.ids(InconsistentEventType::NotEqual), vec![241, 242]);
    assert!(producer.ids(InconsistentEventType::BaseMissing).is_empty());
    assert!(producer.events().iter().all(|e| e.direction == Side::Src));
    assert_eq!(report.events(), 10);
}

#[test]
fn reverse_scan_reports_extra_target_row_once() {
    let dir = TempDir::new().unwrap();
    let (base, target) = scenario(&dir);
    put(&target, &Interactive::sample(999));
    let producer = Arc::new(RecordingProducer::default());

    let report = Validator::<Interactive>::new(base, target, Side::Src, producer.clone())
        .validate(&CancellationToken::new())
        .unwrap();

    assert_eq!(producer.ids(InconsistentEventType::BaseMissing), vec![999]);
    assert_eq!(report.base_missing, 1);
}

#[test]
fn forward_scan_is_repeatable() {
    let dir = TempDir::new().unwrap();
    let (base, target) = scenario(&dir);
    let producer = Arc::new(RecordingProducer::default());
    let validator = Validator::<Interactive>::new(base, target, Side::Src, producer.clone())
        .batch_size(64);

    let first = validator.validate(&CancellationToken::new()).unwrap();
    let first_missing = producer.ids(InconsistentEventType::TargetMissing);
    let first_neq = producer.ids(InconsistentEventType::NotEqual);
    producer.clear();

    let second = validator.validate(&CancellationToken::new()).unwrap();
    assert_eq!(first, second);
    assert_eq!(producer.ids(InconsistentEventType::TargetMissing), first_missing);
    assert_eq!(producer.ids(InconsistentEventType::NotEqual), first_neq);
}

#[test]
fn technical_columns_do_not_count_as_divergence() {
    let dir = TempDir::new().unwrap();
    let base = open_store(&dir, "base.db");
    let target = open_store(&dir, "target.db");
    put(&base, &Interactive::sample(1));
    put(
        &target,
        &Interactive {
            ctime: 1,
            utime: 2,
            ..Interactive::sample(1)
        },
    );
    let producer = Arc::new(RecordingProducer::default());
    let report = Validator::<Interactive>::new(base, target, Side::Dst, producer.clone())
        .validate(&CancellationToken::new())
        .unwrap();
    assert_eq!(report.events(), 0);
    assert!(producer.events().is_empty());
}

#[test]
fn dst_authoritative_run_tags_events_dst() {
    let dir = TempDir::new().unwrap();
    let (src, dst) = scenario(&dir);
    let producer = Arc::new(RecordingProducer::default());

    // dst is the base here: 243..=250 exist only in src, so they are base_missing.
    Validator::<Interactive>::new(dst, src, Side::Dst, producer.clone())
        .validate(&CancellationToken::new())
        .unwrap();

    assert_eq!(
        producer.ids(InconsistentEventType::BaseMissing),
        (243..=250).collect::<Vec<_>>()
    );
    assert!(producer.events().iter().all(|e| e.direction == Side::Dst));
}

#[test]
fn publish_failures_do_not_abort_the_run() {
    let dir = TempDir::new().unwrap();
    let (base, target) = scenario(&dir);
    let report = Validator::<Interactive>::new(base, target, Side::Src, Arc::new(common::FailingProducer))
        .validate(&CancellationToken::new())
        .unwrap();
    assert_eq!(report.notify_failures, 10);
}

/// Rows 1..=n shaped like `Interactive::sample`, inserted in one statement.
fn fill(store: &migrator_storage::SqliteStore, n: i64) {
    store
        .execute_batch(&format!(
            "WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < {n})
             INSERT INTO interactives (id, biz_id, biz, read_cnt, like_cnt, collect_cnt, ctime, utime)
             SELECT n, n * 7, 'article', n * 3, n, n % 5, 1000 + n, 1000 + n FROM seq"
        ))
        .unwrap();
}

#[test]
fn pages_larger_than_the_variable_limit_are_looked_up_in_chunks() {
    let dir = TempDir::new().unwrap();
    let base = open_store(&dir, "base.db");
    let target = open_store(&dir, "target.db");
    fill(&base, 33_000);
    fill(&target, 33_000);
    target
        .execute_batch("DELETE FROM interactives WHERE id = 32900")
        .unwrap();
    put(&target, &Interactive::sample(40_001));
    let producer = Arc::new(RecordingProducer::default());

    let report = Validator::<Interactive>::new(base, target, Side::Src, producer.clone())
        .batch_size(40_000)
        .validate(&CancellationToken::new())
        .unwrap();

    assert_eq!(report.forward_pages, 1);
    assert_eq!(report.reverse_pages, 1);
    assert_eq!(producer.ids(InconsistentEventType::TargetMissing), vec![32_900]);
    assert_eq!(producer.ids(InconsistentEventType::BaseMissing), vec![40_001]);
    assert!(producer.ids(InconsistentEventType::NotEqual).is_empty());
}
