//! End-to-end runs of the streaming trainer with the reference engines.

use streamfit_abstraction::evaluation::{PERCENT_CORRECT, TOTAL_INSTANCES, WEIGHTED_AUC};
use streamfit_abstraction::{Record, RecordSchema, SourceField, Value, ValueKind};
use streamfit_models::{EngineFactory, JsonModelStore, StandardEvaluation};
use streamfit_training::{
    Collaborators, EvaluationMode, FieldDescriptor, OutputSchema, RowHandling, StreamTrainer, TrainingConfig,
};
use tempfile::TempDir;

fn source_schema() -> RecordSchema {
    RecordSchema::new(vec![
        SourceField::new("x", ValueKind::Number),
        SourceField::new("region", ValueKind::Text),
        SourceField::new("y", ValueKind::Text),
    ])
}

/// Rows whose label is fully determined by `x`.
fn separable(region: &str, n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            let jitter = (i % 3) as f64 * 0.1;
            let (x, label) = if i % 2 == 0 { (1.0 + jitter, "low") } else { (9.0 - jitter, "high") };
            Record::new(vec![Value::Number(x), Value::Text(region.to_string()), Value::Text(label.to_string())])
        })
        .collect()
}

fn fields() -> Vec<FieldDescriptor> {
    vec![FieldDescriptor::numeric("x"), FieldDescriptor::nominal("region"), FieldDescriptor::nominal("y")]
}

fn trainer(config: TrainingConfig) -> StreamTrainer {
    let engine = EngineFactory::create_from_str(&config.engine).unwrap();
    StreamTrainer::new(config, Collaborators::new(engine, Box::new(StandardEvaluation::new()))).unwrap()
}

fn run_training(trainer: &mut StreamTrainer, records: Vec<Record>) -> Vec<Record> {
    let mut out = Vec::new();
    for record in records {
        out.extend(trainer.process_training(Some(record)).unwrap());
    }
    out.extend(trainer.process_training(None).unwrap());
    out
}

fn metric(schema: &OutputSchema, record: &Record, name: &str) -> f64 {
    let index = schema.fields().index_of(name).unwrap();
    record.get(index).as_f64().unwrap()
}

#[test]
fn test_naive_bayes_prequential() {
    let config = TrainingConfig::new("naive-bayes", "y", fields())
        .with_evaluation(EvaluationMode::Prequential)
        .with_incremental_cache_size(10);
    let mut trainer = trainer(config);
    let schema = trainer.initialize(source_schema(), None).unwrap();

    let out = run_training(&mut trainer, separable("A", 40));
    assert!(trainer.is_done());
    assert_eq!(out.len(), 1);
    assert_eq!(metric(&schema, &out[0], TOTAL_INSTANCES), 40.0);
    assert!(metric(&schema, &out[0], PERCENT_CORRECT) > 80.0);
}

#[test]
fn test_baseline_cross_validation_per_stratum() {
    let mut config = TrainingConfig::new("baseline", "y", fields())
        .with_row_handling(RowHandling::Stratified { field: "region".to_string() })
        .with_evaluation(EvaluationMode::CrossValidation { folds: 3 });
    config.evaluation.output_auc = true;
    let mut trainer = trainer(config);
    let schema = trainer.initialize(source_schema(), None).unwrap();

    let mut records = separable("A", 6);
    records.extend(separable("B", 4));
    let out = run_training(&mut trainer, records);

    assert_eq!(out.len(), 2);
    assert_eq!(out[0].get(0), &Value::Text("A".to_string()));
    assert_eq!(out[1].get(0), &Value::Text("B".to_string()));
    assert_eq!(metric(&schema, &out[0], TOTAL_INSTANCES), 6.0);
    assert_eq!(metric(&schema, &out[1], TOTAL_INSTANCES), 4.0);
    let auc = metric(&schema, &out[0], WEIGHTED_AUC);
    assert!((0.0..=1.0).contains(&auc));
}

#[test]
fn test_separate_test_set_with_json_models() {
    let temp = TempDir::new().unwrap();
    let config = TrainingConfig::new("naive-bayes", "y", fields())
        .with_row_handling(RowHandling::Stratified { field: "region".to_string() })
        .with_evaluation(EvaluationMode::SeparateTestSet)
        .with_model_output(temp.path(), "model.json");
    let engine = EngineFactory::create_from_str("naive-bayes").unwrap();
    let collaborators = Collaborators::new(engine, Box::new(StandardEvaluation::new()))
        .with_persistence(Box::new(JsonModelStore::new()));
    let mut trainer = StreamTrainer::new(config, collaborators).unwrap();
    let schema = trainer.initialize(source_schema(), Some(source_schema())).unwrap();

    let mut records = separable("A", 10);
    records.extend(separable("B", 10));
    assert!(run_training(&mut trainer, records).is_empty());

    for record in separable("A", 4).into_iter().chain(separable("B", 2)) {
        trainer.process_test(Some(record)).unwrap();
    }
    let out = trainer.process_test(None).unwrap();
    assert!(trainer.is_done());
    assert_eq!(out.len(), 2);
    assert_eq!(metric(&schema, &out[0], TOTAL_INSTANCES), 4.0);
    assert_eq!(metric(&schema, &out[1], PERCENT_CORRECT), 100.0);

    let stored: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(temp.path().join("A_model.json")).unwrap()).unwrap();
    assert_eq!(stored["schema"]["relation"], "stream");
    assert!(temp.path().join("B_model.json").is_file());
}

#[test]
fn test_prequential_rejects_non_incremental_option() {
    let config = TrainingConfig::new("naive-bayes", "y", fields())
        .with_scheme(streamfit_abstraction::SchemeConfig {
            options: vec![streamfit_models::naive_bayes::NO_INCREMENTAL_OPTION.to_string()],
            ..Default::default()
        })
        .with_evaluation(EvaluationMode::Prequential);
    let mut trainer = trainer(config);
    assert!(trainer.initialize(source_schema(), None).is_err());
}
