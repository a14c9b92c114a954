//! Recording mock collaborators shared by the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use streamfit_abstraction::evaluation::{PERCENT_CORRECT, TOTAL_INSTANCES};
use streamfit_abstraction::{
    Dataset, DatasetSchema, EngineCapabilities, EngineError, EngineResult, EvaluationEngine, EvaluationProtocol,
    EvaluationSetup, Evaluator, Instance, MetricSet, Model, ModelArtifact, ModelPersistence, Record, RecordSchema,
    SchemeConfig, SourceField, TrainingEngine, Value, ValueKind,
};
use streamfit_training::{Collaborators, RecordingProgressSink};

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn log_entries(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

fn push(log: &CallLog, entry: impl Into<String>) {
    log.lock().unwrap().push(entry.into());
}

#[derive(Clone)]
pub struct MockEngine {
    pub capabilities: EngineCapabilities,
    pub log: CallLog,
    pub fail_training: bool,
}

impl MockEngine {
    pub fn batch(log: &CallLog) -> Self {
        Self { capabilities: EngineCapabilities::default(), log: Arc::clone(log), fail_training: false }
    }

    pub fn incremental(log: &CallLog) -> Self {
        Self {
            capabilities: EngineCapabilities { incremental: true, ..EngineCapabilities::default() },
            log: Arc::clone(log),
            fail_training: false,
        }
    }

    pub fn batch_scorer(log: &CallLog, preferred: usize) -> Self {
        Self {
            capabilities: EngineCapabilities { incremental: false, batch_scorer: true, preferred_batch_size: preferred },
            log: Arc::clone(log),
            fail_training: false,
        }
    }
}

impl TrainingEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn configure(&mut self, _scheme: &SchemeConfig) -> EngineResult<EngineCapabilities> {
        push(&self.log, "configure");
        Ok(self.capabilities)
    }

    fn configured_model(&self, schema: &Arc<DatasetSchema>) -> EngineResult<Box<dyn Model>> {
        Ok(Box::new(MockModel {
            schema: Arc::clone(schema),
            rows: 0,
            log: Arc::clone(&self.log),
            fail_training: self.fail_training,
        }))
    }
}

pub struct MockModel {
    schema: Arc<DatasetSchema>,
    rows: usize,
    log: CallLog,
    fail_training: bool,
}

impl Model for MockModel {
    fn schema(&self) -> &Arc<DatasetSchema> {
        &self.schema
    }

    fn train(&mut self, dataset: &Dataset) -> EngineResult<()> {
        if self.fail_training {
            return Err(EngineError::Training("mock failure".to_string()));
        }
        push(&self.log, format!("train:{}", dataset.len()));
        self.rows = dataset.len();
        Ok(())
    }

    fn update(&mut self, _instance: &Instance) -> EngineResult<()> {
        push(&self.log, "update");
        self.rows += 1;
        Ok(())
    }

    fn distribution(&self, _instance: &Instance) -> EngineResult<Vec<f64>> {
        let classes = self.schema.num_classes().max(1);
        Ok(vec![1.0 / classes as f64; classes])
    }

    fn describe(&self) -> String {
        format!("mock model over {} rows", self.rows)
    }

    fn fresh_copy(&self) -> Box<dyn Model> {
        Box::new(Self {
            schema: Arc::clone(&self.schema),
            rows: 0,
            log: Arc::clone(&self.log),
            fail_training: self.fail_training,
        })
    }

    fn snapshot(&self) -> EngineResult<serde_json::Value> {
        Ok(serde_json::json!({ "rows": self.rows }))
    }
}

pub struct MockEvaluation {
    pub log: CallLog,
}

impl EvaluationEngine for MockEvaluation {
    fn evaluator(&self, setup: EvaluationSetup) -> EngineResult<Box<dyn Evaluator>> {
        push(&self.log, format!("evaluator:{:?}", setup.protocol));
        Ok(Box::new(MockEvaluator { protocol: setup.protocol, evaluated: 0, log: Arc::clone(&self.log) }))
    }
}

pub struct MockEvaluator {
    protocol: EvaluationProtocol,
    evaluated: usize,
    log: CallLog,
}

impl Evaluator for MockEvaluator {
    fn evaluate_model(&mut self, template: &dyn Model, dataset: &Dataset) -> EngineResult<()> {
        let mut copy = template.fresh_copy();
        copy.train(dataset)?;
        push(&self.log, format!("evaluate_model:{}", dataset.len()));
        self.evaluated += dataset.len();
        Ok(())
    }

    fn evaluate_instance(&mut self, model: &dyn Model, instance: &Instance) -> EngineResult<()> {
        model.distribution(instance)?;
        push(&self.log, "test");
        self.evaluated += 1;
        Ok(())
    }

    fn evaluate_batch(&mut self, model: &dyn Model, batch: &Dataset) -> EngineResult<()> {
        model.distributions(batch)?;
        push(&self.log, format!("test_batch:{}", batch.len()));
        self.evaluated += batch.len();
        Ok(())
    }

    fn evaluated(&self) -> usize {
        self.evaluated
    }

    fn summary(&self) -> EngineResult<MetricSet> {
        let mut metrics = MetricSet::new();
        metrics.insert(TOTAL_INSTANCES, self.evaluated as f64);
        if self.protocol != EvaluationProtocol::Prequential {
            metrics.insert(PERCENT_CORRECT, 50.0);
        }
        Ok(metrics)
    }
}

/// Writes the model description as the artifact body.
pub struct MockStore;

impl ModelPersistence for MockStore {
    fn save(&self, model: &dyn Model, _schema: &DatasetSchema, path: &Path) -> EngineResult<ModelArtifact> {
        std::fs::write(path, model.describe())?;
        Ok(ModelArtifact { path: path.to_path_buf(), sha256: "0".repeat(64) })
    }
}

pub struct Harness {
    pub log: CallLog,
    pub progress: Arc<RecordingProgressSink>,
}

impl Harness {
    pub fn new() -> Self {
        Self { log: Arc::new(Mutex::new(Vec::new())), progress: Arc::new(RecordingProgressSink::new()) }
    }

    pub fn collaborators(&self, engine: MockEngine) -> Collaborators {
        Collaborators::new(Box::new(engine), Box::new(MockEvaluation { log: Arc::clone(&self.log) }))
            .with_progress(Arc::clone(&self.progress) as Arc<dyn streamfit_training::ProgressSink>)
    }
}

/// `x` (number), `region` (text), `y` (text).
pub fn training_schema() -> RecordSchema {
    RecordSchema::new(vec![
        SourceField::new("x", ValueKind::Number),
        SourceField::new("region", ValueKind::Text),
        SourceField::new("y", ValueKind::Text),
    ])
}

pub fn row(x: f64, region: &str, y: &str) -> Record {
    Record::new(vec![Value::Number(x), Value::Text(region.to_string()), Value::Text(y.to_string())])
}

/// `n` rows in region "A" with alternating labels.
pub fn rows(n: usize) -> Vec<Record> {
    (0..n).map(|i| row(i as f64, "A", if i % 2 == 0 { "yes" } else { "no" })).collect()
}

pub fn regions(keys: &[&str]) -> Vec<Record> {
    keys.iter().enumerate().map(|(i, k)| row(i as f64, k, if i % 2 == 0 { "yes" } else { "no" })).collect()
}
