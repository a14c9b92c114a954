//! Scoring of the separate test stream against retained models.

use crate::accumulator::GroupKey;
use crate::convert::{to_instance, ConversionStats};
use crate::error::{StreamError, StreamResult};
use crate::output::OutputSchema;
use crate::registry::TrainedModelRegistry;
use std::collections::HashSet;
use std::sync::Arc;
use streamfit_abstraction::{Dataset, EngineCapabilities, Instance, Record};
use tracing::warn;

/// Chosen once per run from the engine capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringStrategy {
    PerRecord,
    Batched { size: usize },
}

impl ScoringStrategy {
    #[must_use]
    pub fn for_capabilities(capabilities: &EngineCapabilities) -> Self {
        if capabilities.batch_scorer {
            Self::Batched { size: capabilities.preferred_batch_size.max(1) }
        } else {
            Self::PerRecord
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    Accepted,
    Skipped(String),
}

#[derive(Debug)]
struct PendingBatch {
    key: GroupKey,
    instances: Vec<Instance>,
}

#[derive(Debug)]
pub struct TestSetFeeder {
    strategy: ScoringStrategy,
    /// Stratification field and its test-stream position.
    stratification: Option<(String, usize)>,
    pending: Option<PendingBatch>,
    /// Key of the most recent batched record; finalized when the key changes.
    last_key: Option<GroupKey>,
    finalized: HashSet<GroupKey>,
    unseen: HashSet<GroupKey>,
    stats: ConversionStats,
}

impl TestSetFeeder {
    #[must_use]
    pub fn new(strategy: ScoringStrategy, stratification: Option<(String, usize)>) -> Self {
        Self {
            strategy,
            stratification,
            pending: None,
            last_key: None,
            finalized: HashSet::new(),
            unseen: HashSet::new(),
            stats: ConversionStats::default(),
        }
    }

    #[must_use]
    pub fn strategy(&self) -> ScoringStrategy {
        self.strategy
    }

    pub fn feed(&mut self, record: &Record, trained: &mut TrainedModelRegistry) -> StreamResult<FeedOutcome> {
        let key = match &self.stratification {
            None => GroupKey::All,
            Some((field, position)) => match record.get(*position).render(None) {
                Some(value) => GroupKey::Stratum(value),
                None => {
                    warn!(field = %field, "skipping test record with null stratification value");
                    return Ok(FeedOutcome::Skipped("null stratification value".to_string()));
                }
            },
        };

        if !trained.contains(&key) {
            if self.unseen.insert(key.clone()) {
                warn!(group = %key, "no model was trained for test group; its records cannot be evaluated");
            }
            return Ok(FeedOutcome::Skipped(format!("no model for group {key}")));
        }

        match self.strategy {
            ScoringStrategy::PerRecord => {
                let Some(group) = trained.get_mut(&key) else {
                    return Ok(FeedOutcome::Skipped(format!("no model for group {key}")));
                };
                let instance = to_instance(record, &group.schema, &group.test_columns, &mut self.stats);
                group.evaluator.evaluate_instance(group.model.as_ref(), &instance)?;
            }
            ScoringStrategy::Batched { size } => {
                if self.last_key.as_ref() != Some(&key) {
                    self.flush(trained)?;
                    if let Some(previous) = self.last_key.take() {
                        self.finalized.insert(previous);
                    }
                    if self.finalized.contains(&key) {
                        let field = self.stratification.as_ref().map(|(f, _)| f.clone()).unwrap_or_default();
                        return Err(StreamError::OrderingViolation { field, key: key.to_string(), emitted: Vec::new() });
                    }
                    self.last_key = Some(key.clone());
                }
                if self.pending.is_none() {
                    self.pending = Some(PendingBatch { key: key.clone(), instances: Vec::with_capacity(size) });
                }
                let Some(group) = trained.get_mut(&key) else {
                    return Ok(FeedOutcome::Skipped(format!("no model for group {key}")));
                };
                let instance = to_instance(record, &group.schema, &group.test_columns, &mut self.stats);
                if let Some(pending) = self.pending.as_mut() {
                    pending.instances.push(instance);
                    if pending.instances.len() >= size {
                        self.flush(trained)?;
                    }
                }
            }
        }
        Ok(FeedOutcome::Accepted)
    }

    /// End of the test stream: scores any partial batch and returns one
    /// metrics record per group that evaluated at least one record.
    pub fn finish(&mut self, trained: &mut TrainedModelRegistry, output: &OutputSchema) -> StreamResult<Vec<Record>> {
        self.flush(trained)?;
        if self.stats.failed > 0 {
            warn!(failed = self.stats.failed, "test values could not be converted and were treated as missing");
        }
        trained
            .iter()
            .filter(|g| g.evaluator.evaluated() > 0)
            .map(|g| -> StreamResult<Record> { Ok(output.metrics_record(&g.key, &g.evaluator.summary()?)) })
            .collect()
    }

    fn flush(&mut self, trained: &mut TrainedModelRegistry) -> StreamResult<()> {
        let Some(batch) = self.pending.take() else {
            return Ok(());
        };
        if batch.instances.is_empty() {
            return Ok(());
        }
        if let Some(group) = trained.get_mut(&batch.key) {
            let dataset = Dataset::with_instances(Arc::clone(&group.schema), batch.instances);
            group.evaluator.evaluate_batch(group.model.as_ref(), &dataset)?;
        }
        Ok(())
    }
}
