//! Dataset schema construction from field descriptors and buffered records.

use crate::error::{StreamError, StreamResult};
use crate::fields::{FieldDescriptor, FieldIndexes, FieldRegistry, SemanticType};
use std::collections::BTreeSet;
use streamfit_abstraction::{Attribute, AttributeKind, DatasetSchema, Record, RecordSchema};

/// Builds dataset schemas for one run. Holds the non-stratification
/// descriptors with the target split out so it always lands last.
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    predictors: Vec<FieldDescriptor>,
    target: FieldDescriptor,
}

impl SchemaBuilder {
    /// Fails with `UnsupportedAttributeType` if any dataset field has a
    /// semantic type this crate cannot map to an attribute.
    pub fn new(registry: &FieldRegistry) -> StreamResult<Self> {
        let target_name = &registry.target().name;
        let mut predictors = Vec::new();
        for descriptor in registry.dataset_fields() {
            if descriptor.semantic_type == SemanticType::Unsupported {
                return Err(StreamError::UnsupportedAttributeType(descriptor.name.clone()));
            }
            if descriptor.name != *target_name {
                predictors.push(descriptor.clone());
            }
        }
        Ok(Self { predictors, target: registry.target().clone() })
    }

    #[must_use]
    pub fn target(&self) -> &FieldDescriptor {
        &self.target
    }

    /// True when every nominal field carries a pre-specified label list,
    /// so the schema does not depend on data.
    #[must_use]
    pub fn is_immediately_determinable(&self) -> bool {
        self.descriptors()
            .all(|d| d.semantic_type != SemanticType::Nominal || d.legal_values.is_some())
    }

    /// Schema derived from descriptors alone, when possible.
    #[must_use]
    pub fn from_descriptors(&self, relation: &str) -> Option<DatasetSchema> {
        if !self.is_immediately_determinable() {
            return None;
        }
        let empty = RecordSchema::default();
        self.build(relation, &[], &FieldIndexes::default(), &empty).ok()
    }

    /// Builds the schema for `records`, read through `indexes` from a stream
    /// described by `source`.
    pub fn build(
        &self,
        relation: &str,
        records: &[Record],
        indexes: &FieldIndexes,
        source: &RecordSchema,
    ) -> StreamResult<DatasetSchema> {
        let predictors = self
            .predictors
            .iter()
            .map(|d| attribute_for(d, records, indexes, source))
            .collect::<StreamResult<Vec<_>>>()?;
        let class = attribute_for(&self.target, records, indexes, source)?;
        Ok(DatasetSchema::new(relation, predictors, class))
    }

    fn descriptors(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.predictors.iter().chain(std::iter::once(&self.target))
    }
}

fn attribute_for(
    descriptor: &FieldDescriptor,
    records: &[Record],
    indexes: &FieldIndexes,
    source: &RecordSchema,
) -> StreamResult<Attribute> {
    let kind = match descriptor.semantic_type {
        SemanticType::Numeric => AttributeKind::Numeric,
        SemanticType::Date => AttributeKind::Date { format: descriptor.date_format.clone() },
        SemanticType::String => AttributeKind::Text,
        SemanticType::Nominal => AttributeKind::Nominal { values: nominal_values(descriptor, records, indexes, source) },
        SemanticType::Unsupported => {
            return Err(StreamError::UnsupportedAttributeType(descriptor.name.clone()));
        }
    };
    Ok(Attribute::new(descriptor.name.clone(), kind))
}

/// Label priority: configured list, then indexed-storage hint, then a
/// sorted scan of the buffer.
fn nominal_values(
    descriptor: &FieldDescriptor,
    records: &[Record],
    indexes: &FieldIndexes,
    source: &RecordSchema,
) -> Vec<String> {
    if let Some(values) = &descriptor.legal_values {
        return dedup_in_order(values);
    }
    let Some(position) = indexes.get(&descriptor.name) else {
        return Vec::new();
    };
    if let Some(hint) = source.field(position).and_then(|f| f.indexed_values.as_ref()) {
        return dedup_in_order(hint);
    }
    records
        .iter()
        .filter_map(|r| r.get(position).render(None))
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect()
}

fn dedup_in_order(values: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    values.iter().filter(|v| seen.insert(v.as_str())).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamfit_abstraction::{SourceField, Value, ValueKind};

    fn source() -> RecordSchema {
        RecordSchema::new(vec![
            SourceField::new("color", ValueKind::Text),
            SourceField::new("size", ValueKind::Number),
            SourceField::new("label", ValueKind::Text),
            SourceField::new("region", ValueKind::Text),
        ])
    }

    fn registry(descs: Vec<FieldDescriptor>, strat: Option<&str>) -> FieldRegistry {
        FieldRegistry::resolve(&descs, "label", strat, &source(), None).unwrap()
    }

    fn row(color: &str, size: f64, label: &str) -> Record {
        Record::new(vec![
            Value::Text(color.to_string()),
            Value::Number(size),
            Value::Text(label.to_string()),
            Value::Text("north".to_string()),
        ])
    }

    #[test]
    fn test_target_is_last_regardless_of_configured_position() {
        let reg = registry(
            vec![
                FieldDescriptor::nominal("label"),
                FieldDescriptor::nominal("color"),
                FieldDescriptor::numeric("size"),
            ],
            None,
        );
        let builder = SchemaBuilder::new(&reg).unwrap();
        let schema = builder
            .build("r", &[row("red", 1.0, "yes")], reg.training_indexes(), &source())
            .unwrap();
        let names: Vec<&str> = schema.attributes().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["color", "size", "label"]);
    }

    #[test]
    fn test_nominal_values_scanned_sorted_and_distinct() {
        let reg = registry(vec![FieldDescriptor::nominal("color"), FieldDescriptor::nominal("label")], None);
        let builder = SchemaBuilder::new(&reg).unwrap();
        let mut rows = vec![row("red", 1.0, "b"), row("blue", 2.0, "a"), row("red", 3.0, "b")];
        rows.push(Record::new(vec![Value::Null, Value::Null, Value::Text("c".to_string())]));
        let schema = builder.build("r", &rows, reg.training_indexes(), &source()).unwrap();
        assert_eq!(
            schema.attributes()[0].kind,
            AttributeKind::Nominal { values: vec!["blue".to_string(), "red".to_string()] }
        );
        assert_eq!(schema.class_attribute().num_values(), 3);
    }

    #[test]
    fn test_schema_build_is_deterministic() {
        let reg = registry(
            vec![FieldDescriptor::nominal("color"), FieldDescriptor::numeric("size"), FieldDescriptor::nominal("label")],
            None,
        );
        let builder = SchemaBuilder::new(&reg).unwrap();
        let rows = vec![row("green", 1.0, "y"), row("amber", 2.0, "n"), row("cyan", 0.5, "y")];
        let a = builder.build("r", &rows, reg.training_indexes(), &source()).unwrap();
        let b = builder.build("r", &rows, reg.training_indexes(), &source()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_prespecified_values_take_priority_over_hint_and_scan() {
        let src = RecordSchema::new(vec![
            SourceField::new("color", ValueKind::Text).with_indexed_values(vec!["z".to_string(), "a".to_string()]),
            SourceField::new("size", ValueKind::Number),
            SourceField::new("label", ValueKind::Text),
        ]);
        let descs = vec![
            FieldDescriptor::nominal("color"),
            FieldDescriptor::nominal("label").with_legal_values(["no", "yes"]),
        ];
        let reg = FieldRegistry::resolve(&descs, "label", None, &src, None).unwrap();
        let builder = SchemaBuilder::new(&reg).unwrap();
        let schema = builder.build("r", &[row("red", 1.0, "maybe")], reg.training_indexes(), &src).unwrap();
        // Indexed hint keeps storage order.
        assert_eq!(schema.attributes()[0].nominal_index("z"), Some(0));
        assert_eq!(schema.class_attribute().nominal_index("yes"), Some(1));
        assert_eq!(schema.class_attribute().nominal_index("maybe"), None);
    }

    #[test]
    fn test_stratification_field_excluded() {
        let reg = registry(
            vec![FieldDescriptor::nominal("region"), FieldDescriptor::numeric("size"), FieldDescriptor::nominal("label")],
            Some("region"),
        );
        let builder = SchemaBuilder::new(&reg).unwrap();
        let schema = builder.build("r", &[row("red", 1.0, "yes")], reg.training_indexes(), &source()).unwrap();
        assert_eq!(schema.len(), 2);
    }

    #[test]
    fn test_immediate_determination() {
        let reg = registry(
            vec![FieldDescriptor::numeric("size"), FieldDescriptor::nominal("label").with_legal_values(["a", "b"])],
            None,
        );
        let builder = SchemaBuilder::new(&reg).unwrap();
        assert!(builder.is_immediately_determinable());
        let schema = builder.from_descriptors("r").unwrap();
        assert_eq!(schema.class_attribute().num_values(), 2);

        let reg = registry(vec![FieldDescriptor::nominal("color"), FieldDescriptor::nominal("label")], None);
        assert!(SchemaBuilder::new(&reg).unwrap().from_descriptors("r").is_none());
    }

    #[test]
    fn test_unsupported_type_rejected() {
        let reg = registry(
            vec![FieldDescriptor::new("color", SemanticType::Unsupported), FieldDescriptor::nominal("label")],
            None,
        );
        let err = SchemaBuilder::new(&reg).unwrap_err();
        assert!(matches!(err, StreamError::UnsupportedAttributeType(name) if name == "color"));
    }
}
