//! Dataset schemas, instances and datasets handed to training engines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Type of a dataset attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AttributeKind {
    Numeric,
    Date {
        #[serde(default)]
        format: Option<String>,
    },
    /// Unbounded text.
    Text,
    /// Finite, sorted label set.
    Nominal { values: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub kind: AttributeKind,
}

impl Attribute {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self { name: name.into(), kind }
    }

    #[must_use]
    pub fn is_nominal(&self) -> bool {
        matches!(self.kind, AttributeKind::Nominal { .. })
    }

    /// Number of labels for nominal attributes, zero otherwise.
    #[must_use]
    pub fn num_values(&self) -> usize {
        match &self.kind {
            AttributeKind::Nominal { values } => values.len(),
            _ => 0,
        }
    }

    #[must_use]
    pub fn nominal_index(&self, label: &str) -> Option<usize> {
        match &self.kind {
            AttributeKind::Nominal { values } => values.iter().position(|v| v == label),
            _ => None,
        }
    }

    #[must_use]
    pub fn nominal_label(&self, index: usize) -> Option<&str> {
        match &self.kind {
            AttributeKind::Nominal { values } => values.get(index).map(String::as_str),
            _ => None,
        }
    }
}

/// Ordered attribute list. The class attribute is always the last one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSchema {
    relation: String,
    attributes: Vec<Attribute>,
}

impl DatasetSchema {
    /// Builds a schema from predictor attributes and the class attribute,
    /// which is placed last.
    pub fn new(relation: impl Into<String>, mut predictors: Vec<Attribute>, class: Attribute) -> Self {
        predictors.push(class);
        Self { relation: relation.into(), attributes: predictors }
    }

    #[must_use]
    pub fn relation(&self) -> &str {
        &self.relation
    }

    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    #[must_use]
    pub fn class_index(&self) -> usize {
        self.attributes.len().saturating_sub(1)
    }

    #[must_use]
    pub fn class_attribute(&self) -> &Attribute {
        &self.attributes[self.class_index()]
    }

    #[must_use]
    pub fn is_class_nominal(&self) -> bool {
        self.class_attribute().is_nominal()
    }

    #[must_use]
    pub fn num_classes(&self) -> usize {
        if self.is_class_nominal() { self.class_attribute().num_values() } else { 1 }
    }

    /// Union of this schema with `other`: nominal label sets are merged and
    /// re-sorted, every other attribute is taken from `self`. Attributes are
    /// matched by position; both schemas must come from the same descriptors.
    #[must_use]
    pub fn widen(&self, other: &Self) -> Self {
        let attributes = self
            .attributes
            .iter()
            .zip(other.attributes.iter())
            .map(|(mine, theirs)| match (&mine.kind, &theirs.kind) {
                (AttributeKind::Nominal { values: a }, AttributeKind::Nominal { values: b }) => {
                    let merged: BTreeSet<&String> = a.iter().chain(b.iter()).collect();
                    Attribute::new(
                        mine.name.clone(),
                        AttributeKind::Nominal { values: merged.into_iter().cloned().collect() },
                    )
                }
                _ => mine.clone(),
            })
            .collect();
        Self { relation: self.relation.clone(), attributes }
    }
}

/// A converted value in dataset space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Missing,
    Numeric(f64),
    /// Index into the attribute's label list.
    Nominal(usize),
    Text(String),
}

impl Cell {
    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Numeric view: the number itself, or the label index for nominal cells.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Numeric(n) => Some(*n),
            Self::Nominal(i) => Some(*i as f64),
            Self::Missing | Self::Text(_) => None,
        }
    }
}

/// One row in dataset space, aligned with a `DatasetSchema`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub cells: Vec<Cell>,
    pub weight: f64,
}

impl Instance {
    #[must_use]
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells, weight: 1.0 }
    }

    #[must_use]
    pub fn class_cell(&self) -> &Cell {
        self.cells.last().unwrap_or(&Cell::Missing)
    }

    #[must_use]
    pub fn class_value(&self) -> Option<f64> {
        self.class_cell().as_f64()
    }
}

/// A schema plus the instances converted against it.
#[derive(Debug, Clone)]
pub struct Dataset {
    schema: Arc<DatasetSchema>,
    instances: Vec<Instance>,
}

impl Dataset {
    #[must_use]
    pub fn new(schema: Arc<DatasetSchema>) -> Self {
        Self { schema, instances: Vec::new() }
    }

    #[must_use]
    pub fn with_instances(schema: Arc<DatasetSchema>, instances: Vec<Instance>) -> Self {
        Self { schema, instances }
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<DatasetSchema> {
        &self.schema
    }

    #[must_use]
    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn push(&mut self, instance: Instance) {
        self.instances.push(instance);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// New dataset holding the instances at `indices`, in that order.
    #[must_use]
    pub fn subset(&self, indices: &[usize]) -> Self {
        let instances = indices.iter().filter_map(|&i| self.instances.get(i).cloned()).collect();
        Self { schema: Arc::clone(&self.schema), instances }
    }
}
