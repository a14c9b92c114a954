//! Field descriptors and their resolution against stream schemas.

use crate::error::{StreamError, StreamResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use streamfit_abstraction::RecordSchema;
use tracing::warn;

/// Semantic type of a configured field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Numeric,
    Nominal,
    #[serde(alias = "text")]
    String,
    Date,
    /// Any type name this crate does not understand.
    #[serde(other)]
    Unsupported,
}

/// A configured field: name, semantic type and optional legal values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub semantic_type: SemanticType,
    /// Pre-specified nominal labels, in output order.
    #[serde(default, rename = "values")]
    pub legal_values: Option<Vec<String>>,
    #[serde(default)]
    pub date_format: Option<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self { name: name.into(), semantic_type, legal_values: None, date_format: None }
    }

    pub fn numeric(name: impl Into<String>) -> Self {
        Self::new(name, SemanticType::Numeric)
    }

    pub fn nominal(name: impl Into<String>) -> Self {
        Self::new(name, SemanticType::Nominal)
    }

    #[must_use]
    pub fn with_legal_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.legal_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn with_date_format(mut self, format: impl Into<String>) -> Self {
        self.date_format = Some(format.into());
        self
    }
}

/// Field name to source-record position, for one stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldIndexes {
    positions: HashMap<String, usize>,
}

impl FieldIndexes {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }
}

/// Which incoming stream a lookup refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Training,
    Test,
}

impl std::fmt::Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Training => f.write_str("training"),
            Self::Test => f.write_str("test"),
        }
    }
}

/// Configured descriptors resolved against the training and test schemas.
/// Built once at start; the index maps do not change during a run.
#[derive(Debug, Clone)]
pub struct FieldRegistry {
    descriptors: Vec<FieldDescriptor>,
    target: usize,
    stratification: Option<usize>,
    training: FieldIndexes,
    testing: Option<FieldIndexes>,
}

impl FieldRegistry {
    /// Resolves `descriptors` against both stream schemas.
    ///
    /// Fields missing from a stream are tolerated (with one warning listing
    /// them) while fewer than half of the descriptors are missing. The target
    /// and stratification fields must be present in every stream and have
    /// compatible types across streams.
    pub fn resolve(
        descriptors: &[FieldDescriptor],
        target: &str,
        stratification: Option<&str>,
        training: &RecordSchema,
        testing: Option<&RecordSchema>,
    ) -> StreamResult<Self> {
        let position = |name: &str| descriptors.iter().position(|d| d.name == name);
        let target_pos = position(target).ok_or_else(|| {
            StreamError::Configuration(format!("target field '{target}' is not a configured field"))
        })?;
        let strat_pos = match stratification {
            Some(name) => Some(position(name).ok_or_else(|| {
                StreamError::Configuration(format!(
                    "stratification field '{name}' is not a configured field"
                ))
            })?),
            None => None,
        };

        let training_indexes = index_stream(descriptors, training, Stream::Training)?;
        let testing_indexes = match testing {
            Some(schema) => Some(index_stream(descriptors, schema, Stream::Test)?),
            None => None,
        };

        let mut checked = vec![("target", target)];
        if let Some(name) = stratification {
            checked.push(("stratification", name));
        }
        for (role, name) in checked {
            let train_idx = training_indexes.get(name).ok_or_else(|| {
                StreamError::SchemaMismatch(format!(
                    "{role} field '{name}' is missing from the training stream"
                ))
            })?;
            if let (Some(test_schema), Some(test_indexes)) = (testing, testing_indexes.as_ref()) {
                let test_idx = test_indexes.get(name).ok_or_else(|| {
                    StreamError::SchemaMismatch(format!(
                        "{role} field '{name}' is missing from the test stream"
                    ))
                })?;
                let train_kind = training.field(train_idx).map(|f| f.kind);
                let test_kind = test_schema.field(test_idx).map(|f| f.kind);
                let compatible = match (train_kind, test_kind) {
                    (Some(a), Some(b)) => a.is_compatible_with(b),
                    _ => false,
                };
                if !compatible {
                    return Err(StreamError::SchemaMismatch(format!(
                        "{role} field '{name}' has type {train_kind:?} in the training stream but {test_kind:?} in the test stream"
                    )));
                }
            }
        }

        Ok(Self {
            descriptors: descriptors.to_vec(),
            target: target_pos,
            stratification: strat_pos,
            training: training_indexes,
            testing: testing_indexes,
        })
    }

    #[must_use]
    pub fn descriptors(&self) -> &[FieldDescriptor] {
        &self.descriptors
    }

    #[must_use]
    pub fn target(&self) -> &FieldDescriptor {
        &self.descriptors[self.target]
    }

    #[must_use]
    pub fn stratification(&self) -> Option<&FieldDescriptor> {
        self.stratification.map(|i| &self.descriptors[i])
    }

    /// Descriptors that become dataset attributes (everything except the
    /// stratification field), in configured order.
    pub fn dataset_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.descriptors.iter().enumerate().filter(|(i, _)| Some(*i) != self.stratification).map(|(_, d)| d)
    }

    #[must_use]
    pub fn indexes(&self, stream: Stream) -> Option<&FieldIndexes> {
        match stream {
            Stream::Training => Some(&self.training),
            Stream::Test => self.testing.as_ref(),
        }
    }

    #[must_use]
    pub fn training_indexes(&self) -> &FieldIndexes {
        &self.training
    }

    /// Source position of the stratification field in `stream`.
    #[must_use]
    pub fn stratification_index(&self, stream: Stream) -> Option<usize> {
        let name = &self.stratification()?.name;
        self.indexes(stream)?.get(name)
    }
}

fn index_stream(
    descriptors: &[FieldDescriptor],
    schema: &RecordSchema,
    stream: Stream,
) -> StreamResult<FieldIndexes> {
    let mut positions = HashMap::new();
    let mut missing = Vec::new();
    for descriptor in descriptors {
        match schema.index_of(&descriptor.name) {
            Some(idx) => {
                positions.insert(descriptor.name.clone(), idx);
            }
            None => missing.push(descriptor.name.as_str()),
        }
    }

    if !missing.is_empty() {
        if missing.len() * 2 >= descriptors.len() {
            return Err(StreamError::Configuration(format!(
                "{} of {} configured fields are missing from the {stream} stream: {}",
                missing.len(),
                descriptors.len(),
                missing.join(", ")
            )));
        }
        warn!(stream = %stream, missing = %missing.join(", "), "configured fields missing from stream");
    }

    Ok(FieldIndexes { positions })
}
