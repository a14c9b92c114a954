//! Majority-class / mean baseline.

use serde::Serialize;
use std::sync::Arc;
use streamfit_abstraction::{
    Dataset, DatasetSchema, EngineCapabilities, EngineError, EngineResult, Instance, Model, SchemeConfig,
    TrainingEngine,
};
use tracing::debug;

pub const BASELINE_BATCH_SIZE: usize = 100;

/// Batch-only engine predicting the majority class (nominal target) or the
/// mean (numeric target).
#[derive(Debug, Default)]
pub struct BaselineEngine {
    configured: bool,
}

impl BaselineEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrainingEngine for BaselineEngine {
    fn name(&self) -> &str {
        "baseline"
    }

    fn configure(&mut self, scheme: &SchemeConfig) -> EngineResult<EngineCapabilities> {
        if let Some(option) = scheme.options.first() {
            return Err(EngineError::InvalidOptions(format!("baseline takes no options, got '{option}'")));
        }
        if !scheme.sampling.is_empty() || !scheme.preprocessing.is_empty() {
            return Err(EngineError::InvalidOptions(
                "baseline does not support sampling or preprocessing filters".to_string(),
            ));
        }
        self.configured = true;
        Ok(EngineCapabilities { incremental: false, batch_scorer: true, preferred_batch_size: BASELINE_BATCH_SIZE })
    }

    fn configured_model(&self, schema: &Arc<DatasetSchema>) -> EngineResult<Box<dyn Model>> {
        if !self.configured {
            return Err(EngineError::Unsupported("engine used before configure".to_string()));
        }
        Ok(Box::new(BaselineModel::new(Arc::clone(schema))))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Estimate {
    /// Weighted class counts.
    Majority { counts: Vec<f64> },
    Mean { sum: f64, weight: f64 },
}

#[derive(Debug, Clone)]
pub struct BaselineModel {
    schema: Arc<DatasetSchema>,
    estimate: Estimate,
}

impl BaselineModel {
    #[must_use]
    pub fn new(schema: Arc<DatasetSchema>) -> Self {
        let estimate = if schema.is_class_nominal() {
            Estimate::Majority { counts: vec![0.0; schema.num_classes()] }
        } else {
            Estimate::Mean { sum: 0.0, weight: 0.0 }
        };
        Self { schema, estimate }
    }

    fn prediction(&self) -> Vec<f64> {
        match &self.estimate {
            Estimate::Majority { counts } => {
                let total: f64 = counts.iter().sum();
                if total > 0.0 {
                    counts.iter().map(|c| c / total).collect()
                } else {
                    let k = counts.len().max(1) as f64;
                    vec![1.0 / k; counts.len()]
                }
            }
            Estimate::Mean { sum, weight } => vec![if *weight > 0.0 { sum / weight } else { 0.0 }],
        }
    }
}

impl Model for BaselineModel {
    fn schema(&self) -> &Arc<DatasetSchema> {
        &self.schema
    }

    fn train(&mut self, dataset: &Dataset) -> EngineResult<()> {
        *self = Self::new(Arc::clone(dataset.schema()));
        for instance in dataset.instances() {
            let Some(class) = instance.class_value() else {
                continue;
            };
            match &mut self.estimate {
                Estimate::Majority { counts } => {
                    let slot = counts.get_mut(class as usize).ok_or_else(|| {
                        EngineError::Training(format!("class index {class} outside the class attribute"))
                    })?;
                    *slot += instance.weight;
                }
                Estimate::Mean { sum, weight } => {
                    *sum += class * instance.weight;
                    *weight += instance.weight;
                }
            }
        }
        debug!(rows = dataset.len(), "baseline trained");
        Ok(())
    }

    fn update(&mut self, _instance: &Instance) -> EngineResult<()> {
        Err(EngineError::Unsupported("baseline models are trained in batch only".to_string()))
    }

    fn distribution(&self, _instance: &Instance) -> EngineResult<Vec<f64>> {
        Ok(self.prediction())
    }

    fn distributions(&self, dataset: &Dataset) -> EngineResult<Vec<Vec<f64>>> {
        let prediction = self.prediction();
        Ok(vec![prediction; dataset.len()])
    }

    fn describe(&self) -> String {
        let class = self.schema.class_attribute();
        match &self.estimate {
            Estimate::Majority { counts } => {
                let total: f64 = counts.iter().sum();
                let best = counts
                    .iter()
                    .enumerate()
                    .fold(None, |best: Option<(usize, f64)>, (i, &c)| match best {
                        Some((_, b)) if b >= c => best,
                        _ => Some((i, c)),
                    });
                match best {
                    Some((index, count)) if total > 0.0 => format!(
                        "Majority class of {}: {} ({count} of {total})",
                        class.name,
                        class.nominal_label(index).unwrap_or("?")
                    ),
                    _ => format!("Majority class of {}: no training data", class.name),
                }
            }
            Estimate::Mean { sum, weight } => {
                if *weight > 0.0 {
                    format!("Mean of {}: {} over {weight} rows", class.name, sum / weight)
                } else {
                    format!("Mean of {}: no training data", class.name)
                }
            }
        }
    }

    fn fresh_copy(&self) -> Box<dyn Model> {
        Box::new(Self::new(Arc::clone(&self.schema)))
    }

    fn snapshot(&self) -> EngineResult<serde_json::Value> {
        Ok(serde_json::to_value(&self.estimate)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamfit_abstraction::{Attribute, AttributeKind, Cell};

    fn nominal_schema() -> Arc<DatasetSchema> {
        Arc::new(DatasetSchema::new(
            "t",
            vec![Attribute::new("x", AttributeKind::Numeric)],
            Attribute::new("y", AttributeKind::Nominal { values: vec!["no".to_string(), "yes".to_string()] }),
        ))
    }

    #[test]
    fn test_majority_class() {
        let schema = nominal_schema();
        let data = Dataset::with_instances(
            Arc::clone(&schema),
            [1, 1, 0].iter().map(|&c| Instance::new(vec![Cell::Numeric(0.0), Cell::Nominal(c)])).collect(),
        );
        let mut model = BaselineModel::new(schema);
        model.train(&data).unwrap();
        let dist = model.distribution(&data.instances()[0]).unwrap();
        assert!((dist[1] - 2.0 / 3.0).abs() < 1e-9);
        assert!(model.describe().contains("yes"));
        assert_eq!(model.distributions(&data).unwrap().len(), 3);
    }

    #[test]
    fn test_mean_prediction_skips_missing_class() {
        let schema = Arc::new(DatasetSchema::new("t", vec![], Attribute::new("y", AttributeKind::Numeric)));
        let data = Dataset::with_instances(
            Arc::clone(&schema),
            vec![
                Instance::new(vec![Cell::Numeric(2.0)]),
                Instance::new(vec![Cell::Numeric(4.0)]),
                Instance::new(vec![Cell::Missing]),
            ],
        );
        let mut model = BaselineModel::new(schema);
        model.train(&data).unwrap();
        assert_eq!(model.distribution(&data.instances()[0]).unwrap(), vec![3.0]);
    }

    #[test]
    fn test_options_rejected_and_update_unsupported() {
        let mut engine = BaselineEngine::new();
        let scheme = SchemeConfig { options: vec!["-x".to_string()], ..SchemeConfig::default() };
        assert!(matches!(engine.configure(&scheme), Err(EngineError::InvalidOptions(_))));

        let caps = engine.configure(&SchemeConfig::default()).unwrap();
        assert!(!caps.incremental && caps.batch_scorer);
        let mut model = engine.configured_model(&nominal_schema()).unwrap();
        assert!(model.update(&Instance::new(vec![Cell::Missing, Cell::Missing])).is_err());
    }
}
