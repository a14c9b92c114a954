//! Source record to dataset instance conversion.
//!
//! A value that cannot be converted for its attribute becomes a missing cell
//! and is counted; conversion never fails a run.

use crate::fields::FieldIndexes;
use streamfit_abstraction::{AttributeKind, Cell, DatasetSchema, Instance, Record, Value};

/// Source position for each attribute of a schema, for one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    sources: Vec<Option<usize>>,
}

impl ColumnMap {
    #[must_use]
    pub fn new(schema: &DatasetSchema, indexes: &FieldIndexes) -> Self {
        Self { sources: schema.attributes().iter().map(|a| indexes.get(&a.name)).collect() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConversionStats {
    /// Non-null values that could not be converted.
    pub failed: usize,
}

pub fn to_instance(
    record: &Record,
    schema: &DatasetSchema,
    columns: &ColumnMap,
    stats: &mut ConversionStats,
) -> Instance {
    let cells = schema
        .attributes()
        .iter()
        .zip(columns.sources.iter())
        .map(|(attribute, source)| {
            let Some(position) = source else {
                return Cell::Missing;
            };
            let value = record.get(*position);
            if value.is_null() {
                return Cell::Missing;
            }
            let cell = convert_value(value, &attribute.kind);
            if cell.is_missing() {
                stats.failed += 1;
            }
            cell
        })
        .collect();
    Instance::new(cells)
}

fn convert_value(value: &Value, kind: &AttributeKind) -> Cell {
    match kind {
        AttributeKind::Numeric => value.as_f64().map_or(Cell::Missing, Cell::Numeric),
        AttributeKind::Date { format } => value
            .as_date(format.as_deref())
            .map_or(Cell::Missing, |d| Cell::Numeric(d.timestamp_millis() as f64)),
        AttributeKind::Text => value.render(None).map_or(Cell::Missing, Cell::Text),
        AttributeKind::Nominal { values } => value
            .render(None)
            .and_then(|label| values.iter().position(|v| *v == label))
            .map_or(Cell::Missing, Cell::Nominal),
    }
}
