//! Updateable naive Bayes for nominal targets.
//!
//! Numeric and date attributes use per-class Gaussian estimates maintained
//! with Welford's update; nominal attributes use Laplace-smoothed counts.
//! Text attributes carry no estimator and are ignored when scoring.

use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use streamfit_abstraction::{
    AttributeKind, Cell, Dataset, DatasetSchema, EngineCapabilities, EngineError, EngineResult, Instance, Model,
    SchemeConfig, TrainingEngine,
};
use tracing::debug;

/// Turns off row-at-a-time updates so the orchestrator trains in batch.
pub const NO_INCREMENTAL_OPTION: &str = "-no-incremental";

const MIN_STD_DEV: f64 = 1e-3;

#[derive(Debug, Default)]
pub struct NaiveBayesEngine {
    capabilities: Option<EngineCapabilities>,
}

impl NaiveBayesEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrainingEngine for NaiveBayesEngine {
    fn name(&self) -> &str {
        "naive-bayes"
    }

    fn configure(&mut self, scheme: &SchemeConfig) -> EngineResult<EngineCapabilities> {
        let mut incremental = true;
        for option in &scheme.options {
            match option.as_str() {
                NO_INCREMENTAL_OPTION => incremental = false,
                other => {
                    return Err(EngineError::InvalidOptions(format!("unknown naive-bayes option '{other}'")));
                }
            }
        }
        if !scheme.sampling.is_empty() || !scheme.preprocessing.is_empty() {
            return Err(EngineError::InvalidOptions(
                "naive-bayes does not support sampling or preprocessing filters".to_string(),
            ));
        }
        let capabilities = EngineCapabilities { incremental, ..EngineCapabilities::default() };
        self.capabilities = Some(capabilities);
        Ok(capabilities)
    }

    fn configured_model(&self, schema: &Arc<DatasetSchema>) -> EngineResult<Box<dyn Model>> {
        if self.capabilities.is_none() {
            return Err(EngineError::Unsupported("engine used before configure".to_string()));
        }
        Ok(Box::new(NaiveBayesModel::new(Arc::clone(schema))?))
    }
}

/// Weighted running mean and variance.
#[derive(Debug, Clone, Default, Serialize)]
struct Gaussian {
    weight: f64,
    mean: f64,
    m2: f64,
}

impl Gaussian {
    fn observe(&mut self, x: f64, w: f64) {
        self.weight += w;
        let delta = x - self.mean;
        self.mean += delta * w / self.weight;
        self.m2 += w * delta * (x - self.mean);
    }

    fn std_dev(&self) -> f64 {
        if self.weight > 0.0 { (self.m2 / self.weight).sqrt().max(MIN_STD_DEV) } else { MIN_STD_DEV }
    }

    fn log_density(&self, x: f64) -> Option<f64> {
        if self.weight <= 0.0 {
            return None;
        }
        let sd = self.std_dev();
        let z = (x - self.mean) / sd;
        Some(-0.5 * z * z - sd.ln() - 0.5 * (2.0 * std::f64::consts::PI).ln())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Estimator {
    /// Indexed by class, then by label.
    Discrete { counts: Vec<Vec<f64>> },
    Gaussian { per_class: Vec<Gaussian> },
    Ignored,
}

impl Estimator {
    fn for_kind(kind: &AttributeKind, classes: usize) -> Self {
        match kind {
            AttributeKind::Nominal { values } => Self::Discrete { counts: vec![vec![0.0; values.len()]; classes] },
            AttributeKind::Numeric | AttributeKind::Date { .. } => {
                Self::Gaussian { per_class: vec![Gaussian::default(); classes] }
            }
            AttributeKind::Text => Self::Ignored,
        }
    }

    fn observe(&mut self, class: usize, cell: &Cell, weight: f64) {
        match (self, cell) {
            (Self::Discrete { counts }, Cell::Nominal(label)) => {
                let row = &mut counts[class];
                if *label >= row.len() {
                    row.resize(label + 1, 0.0);
                }
                row[*label] += weight;
            }
            (Self::Gaussian { per_class }, Cell::Numeric(x)) => per_class[class].observe(*x, weight),
            _ => {}
        }
    }

    fn log_likelihood(&self, class: usize, cell: &Cell) -> Option<f64> {
        match (self, cell) {
            (Self::Discrete { counts }, Cell::Nominal(label)) => {
                let row = &counts[class];
                let labels = row.len().max(label + 1) as f64;
                let total: f64 = row.iter().sum();
                let count = row.get(*label).copied().unwrap_or(0.0);
                Some(((count + 1.0) / (total + labels)).ln())
            }
            (Self::Gaussian { per_class }, Cell::Numeric(x)) => per_class[class].log_density(*x),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct Estimates {
    class_counts: Vec<f64>,
    attributes: Vec<Estimator>,
}

#[derive(Debug, Clone)]
pub struct NaiveBayesModel {
    schema: Arc<DatasetSchema>,
    estimates: Estimates,
}

impl NaiveBayesModel {
    /// # Errors
    /// Returns `EngineError::Unsupported` unless the class attribute is nominal.
    pub fn new(schema: Arc<DatasetSchema>) -> EngineResult<Self> {
        if !schema.is_class_nominal() {
            return Err(EngineError::Unsupported(format!(
                "naive-bayes needs a nominal class, '{}' is not",
                schema.class_attribute().name
            )));
        }
        let classes = schema.num_classes();
        let predictors = &schema.attributes()[..schema.class_index()];
        let attributes = predictors.iter().map(|a| Estimator::for_kind(&a.kind, classes)).collect();
        Ok(Self { estimates: Estimates { class_counts: vec![0.0; classes], attributes }, schema })
    }

    fn observe(&mut self, instance: &Instance) -> EngineResult<()> {
        let Some(class) = instance.class_value() else {
            return Ok(());
        };
        let class = class as usize;
        if class >= self.estimates.class_counts.len() {
            return Err(EngineError::Training(format!("class index {class} outside the class attribute")));
        }
        self.estimates.class_counts[class] += instance.weight;
        for (estimator, cell) in self.estimates.attributes.iter_mut().zip(&instance.cells) {
            estimator.observe(class, cell, instance.weight);
        }
        Ok(())
    }
}

impl Model for NaiveBayesModel {
    fn schema(&self) -> &Arc<DatasetSchema> {
        &self.schema
    }

    fn train(&mut self, dataset: &Dataset) -> EngineResult<()> {
        *self = Self::new(Arc::clone(dataset.schema()))?;
        for instance in dataset.instances() {
            self.observe(instance)?;
        }
        debug!(rows = dataset.len(), "naive bayes trained");
        Ok(())
    }

    fn update(&mut self, instance: &Instance) -> EngineResult<()> {
        self.observe(instance)
    }

    fn distribution(&self, instance: &Instance) -> EngineResult<Vec<f64>> {
        let counts = &self.estimates.class_counts;
        let total: f64 = counts.iter().sum();
        let classes = counts.len() as f64;
        let mut scores: Vec<f64> = counts
            .iter()
            .enumerate()
            .map(|(class, count)| {
                let prior = ((count + 1.0) / (total + classes)).ln();
                self.estimates
                    .attributes
                    .iter()
                    .zip(&instance.cells)
                    .filter_map(|(estimator, cell)| estimator.log_likelihood(class, cell))
                    .fold(prior, |acc, l| acc + l)
            })
            .collect();

        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return Err(EngineError::Scoring("class scores are not finite".to_string()));
        }
        for score in &mut scores {
            *score = (*score - max).exp();
        }
        let sum: f64 = scores.iter().sum();
        Ok(scores.into_iter().map(|s| s / sum).collect())
    }

    fn describe(&self) -> String {
        let class = self.schema.class_attribute();
        let mut out = format!("Naive Bayes for {}\n", class.name);
        for (index, count) in self.estimates.class_counts.iter().enumerate() {
            let _ = writeln!(out, "  {}: {count}", class.nominal_label(index).unwrap_or("?"));
        }
        for (attribute, estimator) in self.schema.attributes().iter().zip(&self.estimates.attributes) {
            match estimator {
                Estimator::Gaussian { per_class } => {
                    let summary: Vec<String> =
                        per_class.iter().map(|g| format!("{:.4}±{:.4}", g.mean, g.std_dev())).collect();
                    let _ = writeln!(out, "  {} ~ N: {}", attribute.name, summary.join(", "));
                }
                Estimator::Discrete { counts } => {
                    let _ = writeln!(out, "  {} counts: {counts:?}", attribute.name);
                }
                Estimator::Ignored => {}
            }
        }
        out
    }

    fn fresh_copy(&self) -> Box<dyn Model> {
        // The schema already passed the nominal-class check.
        let mut copy = self.clone();
        copy.estimates.class_counts.iter_mut().for_each(|c| *c = 0.0);
        copy.estimates.attributes = self.schema.attributes()[..self.schema.class_index()]
            .iter()
            .map(|a| Estimator::for_kind(&a.kind, self.schema.num_classes()))
            .collect();
        Box::new(copy)
    }

    fn snapshot(&self) -> EngineResult<serde_json::Value> {
        Ok(serde_json::to_value(&self.estimates)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamfit_abstraction::Attribute;

    fn schema() -> Arc<DatasetSchema> {
        Arc::new(DatasetSchema::new(
            "t",
            vec![
                Attribute::new("x", AttributeKind::Numeric),
                Attribute::new("colour", AttributeKind::Nominal { values: vec!["red".to_string(), "blue".to_string()] }),
                Attribute::new("note", AttributeKind::Text),
            ],
            Attribute::new("y", AttributeKind::Nominal { values: vec!["no".to_string(), "yes".to_string()] }),
        ))
    }

    fn instance(x: f64, colour: usize, class: usize) -> Instance {
        Instance::new(vec![Cell::Numeric(x), Cell::Nominal(colour), Cell::Text("n".to_string()), Cell::Nominal(class)])
    }

    fn training_data() -> Dataset {
        Dataset::with_instances(
            schema(),
            vec![instance(1.0, 0, 0), instance(1.2, 0, 0), instance(0.9, 0, 0), instance(5.0, 1, 1), instance(5.3, 1, 1)],
        )
    }

    #[test]
    fn test_separates_classes() {
        let mut model = NaiveBayesModel::new(schema()).unwrap();
        model.train(&training_data()).unwrap();

        let low = model.distribution(&instance(1.1, 0, 0)).unwrap();
        let high = model.distribution(&instance(5.1, 1, 0)).unwrap();
        assert!(low[0] > 0.9, "{low:?}");
        assert!(high[1] > 0.9, "{high:?}");
        assert!((low.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_updates_match_batch_training() {
        let data = training_data();
        let mut batch = NaiveBayesModel::new(schema()).unwrap();
        batch.train(&data).unwrap();

        let mut incremental = NaiveBayesModel::new(schema()).unwrap();
        incremental.train(&Dataset::new(schema())).unwrap();
        for row in data.instances() {
            incremental.update(row).unwrap();
        }

        let probe = instance(3.0, 1, 0);
        let a = batch.distribution(&probe).unwrap();
        let b = incremental.distribution(&probe).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-9);
        }
    }

    #[test]
    fn test_missing_class_and_values_are_skipped() {
        let mut model = NaiveBayesModel::new(schema()).unwrap();
        let mut unlabelled = instance(1.0, 0, 0);
        unlabelled.cells[3] = Cell::Missing;
        model.update(&unlabelled).unwrap();
        assert_eq!(model.estimates.class_counts, vec![0.0, 0.0]);

        model.train(&training_data()).unwrap();
        let probe = Instance::new(vec![Cell::Missing, Cell::Missing, Cell::Missing, Cell::Missing]);
        let dist = model.distribution(&probe).unwrap();
        assert!(dist[0] > dist[1]);
    }

    #[test]
    fn test_numeric_class_rejected() {
        let numeric = Arc::new(DatasetSchema::new("t", vec![], Attribute::new("y", AttributeKind::Numeric)));
        let mut engine = NaiveBayesEngine::new();
        engine.configure(&SchemeConfig::default()).unwrap();
        assert!(matches!(engine.configured_model(&numeric), Err(EngineError::Unsupported(_))));
    }

    #[test]
    fn test_no_incremental_option() {
        let mut engine = NaiveBayesEngine::new();
        assert!(engine.configure(&SchemeConfig::default()).unwrap().incremental);
        let scheme = SchemeConfig { options: vec![NO_INCREMENTAL_OPTION.to_string()], ..SchemeConfig::default() };
        assert!(!engine.configure(&scheme).unwrap().incremental);
        let bad = SchemeConfig { options: vec!["-K".to_string()], ..SchemeConfig::default() };
        assert!(engine.configure(&bad).is_err());
    }

    #[test]
    fn test_fresh_copy_is_untrained() {
        let mut model = NaiveBayesModel::new(schema()).unwrap();
        model.train(&training_data()).unwrap();
        let copy = model.fresh_copy();
        let dist = copy.distribution(&instance(5.0, 1, 0)).unwrap();
        assert!((dist[0] - 0.5).abs() < 1e-9);
        assert!(model.snapshot().unwrap()["class_counts"].is_array());
    }
}
