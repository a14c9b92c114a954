//! Output record layout, fixed once per run before the first record.

use crate::accumulator::GroupKey;
use serde::Serialize;
use streamfit_abstraction::{metric_catalogue, MetricSet, Record, RecordSchema, SourceField, Value, ValueKind};

pub const BATCH_COLUMN: &str = "batch";
pub const MODEL_COLUMN: &str = "model";

/// Leading key column of every output record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum KeyColumn {
    None,
    Batch,
    Stratum { field: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OutputBody {
    /// One text column with the model description.
    Model,
    /// One numeric column per metric name.
    Metrics(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSchema {
    key: KeyColumn,
    body: OutputBody,
    fields: RecordSchema,
}

impl OutputSchema {
    #[must_use]
    pub fn new(key: KeyColumn, body: OutputBody) -> Self {
        let mut fields = Vec::new();
        match &key {
            KeyColumn::None => {}
            KeyColumn::Batch => fields.push(SourceField::new(BATCH_COLUMN, ValueKind::Integer)),
            KeyColumn::Stratum { field } => fields.push(SourceField::new(field.clone(), ValueKind::Text)),
        }
        match &body {
            OutputBody::Model => fields.push(SourceField::new(MODEL_COLUMN, ValueKind::Text)),
            OutputBody::Metrics(names) => {
                fields.extend(names.iter().map(|n| SourceField::new(n.clone(), ValueKind::Number)));
            }
        }
        Self { key, body, fields: RecordSchema::new(fields) }
    }

    /// Metric columns for the catalogue of a nominal or numeric class.
    #[must_use]
    pub fn for_metrics(key: KeyColumn, class_nominal: bool, output_auc: bool, output_ir: bool) -> Self {
        let names = metric_catalogue(class_nominal, output_auc, output_ir).into_iter().map(str::to_string).collect();
        Self::new(key, OutputBody::Metrics(names))
    }

    #[must_use]
    pub fn fields(&self) -> &RecordSchema {
        &self.fields
    }

    #[must_use]
    pub fn body(&self) -> &OutputBody {
        &self.body
    }

    #[must_use]
    pub fn model_record(&self, key: &GroupKey, description: String) -> Record {
        let mut values = self.key_values(key);
        values.push(Value::Text(description));
        Record::new(values)
    }

    /// Metrics the evaluator did not report are emitted as nulls.
    #[must_use]
    pub fn metrics_record(&self, key: &GroupKey, metrics: &MetricSet) -> Record {
        let mut values = self.key_values(key);
        if let OutputBody::Metrics(names) = &self.body {
            values.extend(names.iter().map(|n| metrics.get(n).map_or(Value::Null, Value::Number)));
        }
        Record::new(values)
    }

    fn key_values(&self, key: &GroupKey) -> Vec<Value> {
        match (&self.key, key) {
            (KeyColumn::None, _) => Vec::new(),
            (KeyColumn::Batch, GroupKey::Batch(n)) => vec![Value::Integer(i64::try_from(*n).unwrap_or(i64::MAX))],
            (KeyColumn::Stratum { .. }, GroupKey::Stratum(s)) => vec![Value::Text(s.clone())],
            (_, _) => vec![Value::Null],
        }
    }
}
