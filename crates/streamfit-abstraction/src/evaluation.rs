//! Evaluation engine contracts and the metric catalogue shared by the
//! orchestrator (which lays out output columns) and evaluators (which fill
//! them).

use crate::dataset::{Dataset, DatasetSchema, Instance};
use crate::engine::Model;
use crate::error::EngineResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const CORRECT: &str = "correctly_classified";
pub const INCORRECT: &str = "incorrectly_classified";
pub const PERCENT_CORRECT: &str = "percent_correct";
pub const KAPPA: &str = "kappa";
pub const CORRELATION: &str = "correlation_coefficient";
pub const MEAN_ABSOLUTE_ERROR: &str = "mean_absolute_error";
pub const ROOT_MEAN_SQUARED_ERROR: &str = "root_mean_squared_error";
pub const RELATIVE_ABSOLUTE_ERROR: &str = "relative_absolute_error";
pub const ROOT_RELATIVE_SQUARED_ERROR: &str = "root_relative_squared_error";
pub const TOTAL_INSTANCES: &str = "total_instances";
pub const WEIGHTED_AUC: &str = "weighted_auc";
pub const WEIGHTED_PRECISION: &str = "weighted_precision";
pub const WEIGHTED_RECALL: &str = "weighted_recall";
pub const WEIGHTED_F_MEASURE: &str = "weighted_f_measure";

/// Metric names, in output order, for a class of the given type.
#[must_use]
pub fn metric_catalogue(class_nominal: bool, output_auc: bool, output_ir: bool) -> Vec<&'static str> {
    let mut names = if class_nominal {
        vec![CORRECT, INCORRECT, PERCENT_CORRECT, KAPPA, MEAN_ABSOLUTE_ERROR, ROOT_MEAN_SQUARED_ERROR]
    } else {
        vec![
            CORRELATION,
            MEAN_ABSOLUTE_ERROR,
            ROOT_MEAN_SQUARED_ERROR,
            RELATIVE_ABSOLUTE_ERROR,
            ROOT_RELATIVE_SQUARED_ERROR,
        ]
    };
    names.push(TOTAL_INSTANCES);
    if class_nominal && output_auc {
        names.push(WEIGHTED_AUC);
    }
    if class_nominal && output_ir {
        names.extend([WEIGHTED_PRECISION, WEIGHTED_RECALL, WEIGHTED_F_MEASURE]);
    }
    names
}

/// Evaluation protocol selected for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationProtocol {
    /// Train on the first `percent`% of a shuffled group, test on the rest.
    PercentageSplit { percent: u8 },
    /// Seeded k-fold cross-validation over the group.
    CrossValidation { folds: usize },
    /// Score a separate stream against the group's final model.
    TestSet,
    /// Test each record before training on it.
    Prequential,
}

#[derive(Debug, Clone)]
pub struct EvaluationSetup {
    pub schema: Arc<DatasetSchema>,
    pub protocol: EvaluationProtocol,
    pub seed: u64,
    pub output_auc: bool,
    pub output_ir: bool,
}

/// Named metric values, in catalogue order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    values: Vec<(String, f64)>,
}

impl MetricSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        if let Some(slot) = self.values.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.values.push((name, value));
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(n, v)| (n.as_str(), *v))
    }
}

/// Creates evaluators. One instance is injected per orchestrator run.
pub trait EvaluationEngine: Send {
    fn evaluator(&self, setup: EvaluationSetup) -> EngineResult<Box<dyn Evaluator>>;
}

/// Statistics accumulator for one group.
pub trait Evaluator: Send {
    /// Runs a split or cross-validation protocol over `dataset`, training
    /// fresh copies of `template`.
    fn evaluate_model(&mut self, template: &dyn Model, dataset: &Dataset) -> EngineResult<()>;

    /// Scores one instance against `model` and accumulates the outcome.
    fn evaluate_instance(&mut self, model: &dyn Model, instance: &Instance) -> EngineResult<()>;

    /// Scores a batch against `model` in one call and accumulates the outcomes.
    fn evaluate_batch(&mut self, model: &dyn Model, batch: &Dataset) -> EngineResult<()>;

    /// Number of instances accumulated so far.
    fn evaluated(&self) -> usize;

    fn summary(&self) -> EngineResult<MetricSet>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_for_nominal_class_with_extras() {
        let names = metric_catalogue(true, true, true);
        assert_eq!(names.first(), Some(&CORRECT));
        assert!(names.contains(&WEIGHTED_AUC));
        assert_eq!(names.last(), Some(&WEIGHTED_F_MEASURE));
    }

    #[test]
    fn test_catalogue_ignores_class_metrics_for_numeric_class() {
        let names = metric_catalogue(false, true, true);
        assert!(!names.contains(&WEIGHTED_AUC));
        assert!(names.contains(&CORRELATION));
    }

    #[test]
    fn test_metric_set_insert_replaces() {
        let mut set = MetricSet::new();
        set.insert(KAPPA, 0.1);
        set.insert(KAPPA, 0.5);
        assert_eq!(set.get(KAPPA), Some(0.5));
        assert_eq!(set.iter().count(), 1);
    }
}
