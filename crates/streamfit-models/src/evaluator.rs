//! Standard evaluation engine: holdout, cross-validation, test-set and
//! prequential accumulation over a shared prediction log.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::Arc;
use streamfit_abstraction::evaluation::{
    CORRECT, CORRELATION, INCORRECT, KAPPA, MEAN_ABSOLUTE_ERROR, PERCENT_CORRECT, RELATIVE_ABSOLUTE_ERROR,
    ROOT_MEAN_SQUARED_ERROR, ROOT_RELATIVE_SQUARED_ERROR, TOTAL_INSTANCES, WEIGHTED_AUC, WEIGHTED_F_MEASURE,
    WEIGHTED_PRECISION, WEIGHTED_RECALL,
};
use streamfit_abstraction::{
    metric_catalogue, Dataset, DatasetSchema, EngineError, EngineResult, EvaluationEngine, EvaluationProtocol,
    EvaluationSetup, Evaluator, Instance, MetricSet, Model,
};
use tracing::{debug, warn};

#[derive(Debug, Default, Clone, Copy)]
pub struct StandardEvaluation;

impl StandardEvaluation {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EvaluationEngine for StandardEvaluation {
    fn evaluator(&self, setup: EvaluationSetup) -> EngineResult<Box<dyn Evaluator>> {
        if let EvaluationProtocol::PercentageSplit { percent } = setup.protocol
            && !(1..=99).contains(&percent)
        {
            return Err(EngineError::Evaluation(format!("split percentage {percent} outside 1..=99")));
        }
        if let EvaluationProtocol::CrossValidation { folds } = setup.protocol
            && folds < 2
        {
            return Err(EngineError::Evaluation(format!("cross-validation needs at least 2 folds, got {folds}")));
        }
        Ok(Box::new(StandardEvaluator::new(setup)))
    }
}

/// One scored instance.
#[derive(Debug, Clone)]
struct Prediction {
    distribution: Vec<f64>,
    actual: f64,
    weight: f64,
}

#[derive(Debug)]
pub struct StandardEvaluator {
    setup: EvaluationSetup,
    predictions: Vec<Prediction>,
}

impl StandardEvaluator {
    #[must_use]
    pub fn new(setup: EvaluationSetup) -> Self {
        Self { setup, predictions: Vec::new() }
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<DatasetSchema> {
        &self.setup.schema
    }

    fn shuffled(&self, n: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(self.setup.seed);
        indices.shuffle(&mut rng);
        indices
    }

    fn record(&mut self, instance: &Instance, distribution: Vec<f64>) -> EngineResult<()> {
        let Some(actual) = instance.class_value() else {
            return Ok(());
        };
        if distribution.is_empty() {
            return Err(EngineError::Scoring("model returned an empty distribution".to_string()));
        }
        self.predictions.push(Prediction { distribution, actual, weight: instance.weight });
        Ok(())
    }

    fn score(&mut self, model: &dyn Model, dataset: &Dataset) -> EngineResult<()> {
        let distributions = model.distributions(dataset)?;
        for (instance, distribution) in dataset.instances().iter().zip(distributions) {
            self.record(instance, distribution)?;
        }
        Ok(())
    }

    fn train_and_score(
        &mut self,
        template: &dyn Model,
        dataset: &Dataset,
        train: &[usize],
        test: &[usize],
    ) -> EngineResult<()> {
        let mut model = template.fresh_copy();
        model.train(&dataset.subset(train))?;
        self.score(model.as_ref(), &dataset.subset(test))
    }

    fn split(&mut self, template: &dyn Model, dataset: &Dataset, percent: u8) -> EngineResult<()> {
        let indices = self.shuffled(dataset.len());
        let cut = (dataset.len() as f64 * f64::from(percent) / 100.0).round() as usize;
        let (train, test) = indices.split_at(cut.min(indices.len()));
        debug!(train = train.len(), test = test.len(), "percentage split");
        self.train_and_score(template, dataset, train, test)
    }

    fn cross_validate(&mut self, template: &dyn Model, dataset: &Dataset, folds: usize) -> EngineResult<()> {
        let n = dataset.len();
        let folds = folds.min(n);
        if folds < 2 {
            warn!(rows = n, "too few rows to cross-validate, scoring on the training rows");
            let all: Vec<usize> = (0..n).collect();
            return self.train_and_score(template, dataset, &all, &all);
        }

        let indices = self.shuffled(n);
        let mut current = 0;
        for fold in 0..folds {
            let size = n / folds + usize::from(fold < n % folds);
            let test = &indices[current..current + size];
            let train: Vec<usize> =
                indices[..current].iter().chain(&indices[current + size..]).copied().collect();
            self.train_and_score(template, dataset, &train, test)?;
            current += size;
        }
        Ok(())
    }

    fn total_weight(&self) -> f64 {
        self.predictions.iter().map(|p| p.weight).sum()
    }

    fn nominal_metrics(&self, classes: usize, metrics: &mut MetricSet) {
        let total = self.total_weight();
        let mut confusion = vec![vec![0.0; classes]; classes];
        let (mut abs_err, mut sq_err) = (0.0, 0.0);
        for p in &self.predictions {
            let actual = p.actual as usize;
            let predicted = argmax(&p.distribution);
            if actual < classes && predicted < classes {
                confusion[actual][predicted] += p.weight;
            }
            for class in 0..classes {
                let target = if class == actual { 1.0 } else { 0.0 };
                let diff = p.distribution.get(class).copied().unwrap_or(0.0) - target;
                abs_err += p.weight * diff.abs();
                sq_err += p.weight * diff * diff;
            }
        }

        let correct: f64 = (0..classes).map(|c| confusion[c][c]).sum();
        let actual_totals: Vec<f64> = confusion.iter().map(|row| row.iter().sum()).collect();
        let predicted_totals: Vec<f64> = (0..classes).map(|c| confusion.iter().map(|row| row[c]).sum()).collect();

        metrics.insert(CORRECT, correct);
        metrics.insert(INCORRECT, total - correct);
        metrics.insert(PERCENT_CORRECT, 100.0 * correct / total);

        let chance: f64 = actual_totals.iter().zip(&predicted_totals).map(|(a, p)| a * p).sum::<f64>() / (total * total);
        let observed = correct / total;
        metrics.insert(KAPPA, if chance < 1.0 { (observed - chance) / (1.0 - chance) } else { 1.0 });

        let k = classes.max(1) as f64;
        metrics.insert(MEAN_ABSOLUTE_ERROR, abs_err / (total * k));
        metrics.insert(ROOT_MEAN_SQUARED_ERROR, (sq_err / (total * k)).sqrt());

        if self.setup.output_auc
            && let Some(auc) = self.weighted_auc(classes, &actual_totals)
        {
            metrics.insert(WEIGHTED_AUC, auc);
        }
        if self.setup.output_ir {
            let (mut precision, mut recall, mut f_measure) = (0.0, 0.0, 0.0);
            for class in 0..classes {
                let tp = confusion[class][class];
                let p = if predicted_totals[class] > 0.0 { tp / predicted_totals[class] } else { 0.0 };
                let r = if actual_totals[class] > 0.0 { tp / actual_totals[class] } else { 0.0 };
                let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };
                let share = actual_totals[class] / total;
                precision += share * p;
                recall += share * r;
                f_measure += share * f;
            }
            metrics.insert(WEIGHTED_PRECISION, precision);
            metrics.insert(WEIGHTED_RECALL, recall);
            metrics.insert(WEIGHTED_F_MEASURE, f_measure);
        }
    }

    /// Per-class Mann-Whitney AUC weighted by class frequency. Classes without
    /// both positives and negatives are left out.
    fn weighted_auc(&self, classes: usize, actual_totals: &[f64]) -> Option<f64> {
        let (mut sum, mut weight) = (0.0, 0.0);
        for class in 0..classes {
            let mut scored: Vec<(f64, bool, f64)> = self
                .predictions
                .iter()
                .map(|p| (p.distribution.get(class).copied().unwrap_or(0.0), p.actual as usize == class, p.weight))
                .collect();
            if let Some(auc) = rank_auc(&mut scored) {
                sum += auc * actual_totals[class];
                weight += actual_totals[class];
            }
        }
        (weight > 0.0).then(|| sum / weight)
    }

    fn numeric_metrics(&self, metrics: &mut MetricSet) {
        let total = self.total_weight();
        let mean_actual = self.predictions.iter().map(|p| p.weight * p.actual).sum::<f64>() / total;
        let mean_predicted = self.predictions.iter().map(|p| p.weight * p.distribution[0]).sum::<f64>() / total;

        let (mut abs_err, mut sq_err, mut abs_dev, mut sq_dev) = (0.0, 0.0, 0.0, 0.0);
        let (mut cov, mut var_p) = (0.0, 0.0);
        for p in &self.predictions {
            let predicted = p.distribution[0];
            let err = predicted - p.actual;
            let dev = p.actual - mean_actual;
            abs_err += p.weight * err.abs();
            sq_err += p.weight * err * err;
            abs_dev += p.weight * dev.abs();
            sq_dev += p.weight * dev * dev;
            cov += p.weight * dev * (predicted - mean_predicted);
            var_p += p.weight * (predicted - mean_predicted).powi(2);
        }

        let correlation = if sq_dev > 0.0 && var_p > 0.0 { cov / (sq_dev * var_p).sqrt() } else { 0.0 };
        metrics.insert(CORRELATION, correlation);
        metrics.insert(MEAN_ABSOLUTE_ERROR, abs_err / total);
        metrics.insert(ROOT_MEAN_SQUARED_ERROR, (sq_err / total).sqrt());
        if abs_dev > 0.0 {
            metrics.insert(RELATIVE_ABSOLUTE_ERROR, 100.0 * abs_err / abs_dev);
        }
        if sq_dev > 0.0 {
            metrics.insert(ROOT_RELATIVE_SQUARED_ERROR, 100.0 * (sq_err / sq_dev).sqrt());
        }
    }
}

impl Evaluator for StandardEvaluator {
    fn evaluate_model(&mut self, template: &dyn Model, dataset: &Dataset) -> EngineResult<()> {
        match self.setup.protocol {
            EvaluationProtocol::PercentageSplit { percent } => self.split(template, dataset, percent),
            EvaluationProtocol::CrossValidation { folds } => self.cross_validate(template, dataset, folds),
            protocol => Err(EngineError::Evaluation(format!("{protocol:?} does not evaluate whole groups"))),
        }
    }

    fn evaluate_instance(&mut self, model: &dyn Model, instance: &Instance) -> EngineResult<()> {
        if instance.class_value().is_none() {
            return Ok(());
        }
        let distribution = model.distribution(instance)?;
        self.record(instance, distribution)
    }

    fn evaluate_batch(&mut self, model: &dyn Model, batch: &Dataset) -> EngineResult<()> {
        self.score(model, batch)
    }

    fn evaluated(&self) -> usize {
        self.predictions.len()
    }

    fn summary(&self) -> EngineResult<MetricSet> {
        let schema = &self.setup.schema;
        let nominal = schema.is_class_nominal();
        let mut computed = MetricSet::new();
        let total = self.total_weight();
        if total > 0.0 {
            if nominal {
                self.nominal_metrics(schema.num_classes(), &mut computed);
            } else {
                self.numeric_metrics(&mut computed);
            }
        }
        computed.insert(TOTAL_INSTANCES, total);

        let mut metrics = MetricSet::new();
        for name in metric_catalogue(nominal, self.setup.output_auc, self.setup.output_ir) {
            if let Some(value) = computed.get(name) {
                metrics.insert(name, value);
            }
        }
        Ok(metrics)
    }
}

fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}

/// Area under the ROC curve from `(score, positive, weight)` triples using
/// average ranks for ties.
fn rank_auc(scored: &mut [(f64, bool, f64)]) -> Option<f64> {
    let positives: f64 = scored.iter().filter(|s| s.1).map(|s| s.2).sum();
    let negatives: f64 = scored.iter().filter(|s| !s.1).map(|s| s.2).sum();
    if positives <= 0.0 || negatives <= 0.0 {
        return None;
    }
    scored.sort_by(|a, b| a.0.total_cmp(&b.0));

    // Weighted rank sum of positives; ties share the mean rank of their run.
    let mut rank_sum = 0.0;
    let mut below = 0.0;
    let mut i = 0;
    while i < scored.len() {
        let mut j = i;
        let mut run_weight = 0.0;
        let mut run_positive = 0.0;
        while j < scored.len() && scored[j].0 == scored[i].0 {
            run_weight += scored[j].2;
            if scored[j].1 {
                run_positive += scored[j].2;
            }
            j += 1;
        }
        rank_sum += run_positive * (below + (run_weight + 1.0) / 2.0);
        below += run_weight;
        i = j;
    }
    let u = rank_sum - positives * (positives + 1.0) / 2.0;
    Some(u / (positives * negatives))
}
