//! Models retained per group for scoring the separate test stream.

use crate::accumulator::GroupKey;
use crate::convert::ColumnMap;
use std::collections::HashMap;
use std::sync::Arc;
use streamfit_abstraction::{DatasetSchema, Evaluator, Model};

/// A trained group kept for scoring the test stream.
pub struct TrainedGroup {
    pub key: GroupKey,
    pub schema: Arc<DatasetSchema>,
    pub model: Box<dyn Model>,
    pub evaluator: Box<dyn Evaluator>,
    /// Test-stream positions of the schema's attributes.
    pub test_columns: ColumnMap,
}

impl std::fmt::Debug for TrainedGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainedGroup")
            .field("key", &self.key)
            .field("evaluated", &self.evaluator.evaluated())
            .finish_non_exhaustive()
    }
}

/// Trained groups by key, in training order.
#[derive(Debug, Default)]
pub struct TrainedModelRegistry {
    groups: Vec<TrainedGroup>,
    by_key: HashMap<GroupKey, usize>,
}

impl TrainedModelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a group, replacing any earlier group with the same key.
    pub fn insert(&mut self, group: TrainedGroup) {
        if let Some(&index) = self.by_key.get(&group.key) {
            self.groups[index] = group;
        } else {
            self.by_key.insert(group.key.clone(), self.groups.len());
            self.groups.push(group);
        }
    }

    #[must_use]
    pub fn contains(&self, key: &GroupKey) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn get_mut(&mut self, key: &GroupKey) -> Option<&mut TrainedGroup> {
        let index = *self.by_key.get(key)?;
        self.groups.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrainedGroup> {
        self.groups.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
