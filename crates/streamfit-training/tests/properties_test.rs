//! Group flushing properties checked through the progress stream.

mod common;

use common::{regions, rows, training_schema, Harness, MockEngine};
use streamfit_training::{
    FieldDescriptor, GroupKey, RowHandling, StreamError, StreamTrainer, TrainingConfig,
};

fn trainer(harness: &Harness, rows: RowHandling) -> StreamTrainer {
    let config = TrainingConfig::new(
        "mock",
        "y",
        vec![FieldDescriptor::numeric("x"), FieldDescriptor::nominal("region"), FieldDescriptor::nominal("y")],
    )
    .with_row_handling(rows);
    let mut trainer = StreamTrainer::new(config, harness.collaborators(MockEngine::batch(&harness.log))).unwrap();
    trainer.initialize(training_schema(), None).unwrap();
    trainer
}

#[test]
fn test_batch_flush_count_is_ceiling_of_n_over_b() {
    for (n, b) in [(1usize, 1usize), (7, 3), (9, 3), (10, 4), (5, 8), (12, 1)] {
        let harness = Harness::new();
        let mut trainer = trainer(&harness, RowHandling::Batch { size: b });
        for record in rows(n) {
            trainer.process_training(Some(record)).unwrap();
        }
        trainer.process_training(None).unwrap();

        let flushes = harness.progress.flushes();
        assert_eq!(flushes.len(), n.div_ceil(b), "n={n} b={b}");
        let last = flushes.last().map(|(_, rows)| *rows).unwrap();
        let expected_last = if n % b == 0 { b } else { n % b };
        assert_eq!(last, expected_last, "n={n} b={b}");
        let counters: Vec<GroupKey> = flushes.into_iter().map(|(k, _)| k).collect();
        let expected: Vec<GroupKey> = (1..=n.div_ceil(b) as u64).map(GroupKey::Batch).collect();
        assert_eq!(counters, expected);
    }
}

#[test]
fn test_stratified_runs_flush_exactly_once_each() {
    let keys = ["a", "a", "b", "c", "c", "c", "d", "e", "e"];
    let harness = Harness::new();
    let mut trainer = trainer(&harness, RowHandling::Stratified { field: "region".to_string() });
    for record in regions(&keys) {
        trainer.process_training(Some(record)).unwrap();
    }
    trainer.process_training(None).unwrap();

    let flushes: Vec<(String, usize)> = harness
        .progress
        .flushes()
        .into_iter()
        .map(|(key, rows)| (key.to_string(), rows))
        .collect();
    assert_eq!(
        flushes,
        vec![
            ("a".to_string(), 2),
            ("b".to_string(), 1),
            ("c".to_string(), 3),
            ("d".to_string(), 1),
            ("e".to_string(), 2),
        ]
    );
}

#[test]
fn test_ordering_violation_never_merges_groups() {
    let harness = Harness::new();
    let mut trainer = trainer(&harness, RowHandling::Stratified { field: "region".to_string() });
    let mut error = None;
    for record in regions(&["A", "A", "B", "A", "A"]) {
        if let Err(err) = trainer.process_training(Some(record)) {
            error = Some(err);
            break;
        }
    }
    assert!(matches!(error, Some(StreamError::OrderingViolation { .. })));
    let flushes = harness.progress.flushes();
    assert_eq!(
        flushes,
        vec![(GroupKey::Stratum("A".to_string()), 2), (GroupKey::Stratum("B".to_string()), 1)]
    );
}
