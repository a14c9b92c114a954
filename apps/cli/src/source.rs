//! CSV streams as source records.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
use streamfit_abstraction::{Record, RecordSchema, SourceField, Value, ValueKind};
use streamfit_training::{FieldDescriptor, SemanticType};

/// A CSV file whose header row becomes the stream schema. Columns configured
/// as numeric fields are read as numbers; everything else stays text.
pub struct CsvSource {
    schema: RecordSchema,
    reader: csv::Reader<File>,
}

impl CsvSource {
    pub fn open(path: &Path, fields: &[FieldDescriptor]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let headers = reader.headers().with_context(|| format!("Failed to read header of {}", path.display()))?;
        let schema = RecordSchema::new(
            headers.iter().map(|name| SourceField::new(name, column_kind(name, fields))).collect(),
        );
        Ok(Self { schema, reader })
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    pub fn into_records(self) -> impl Iterator<Item = Result<Record>> {
        let kinds: Vec<ValueKind> = self.schema.fields().iter().map(|f| f.kind).collect();
        self.reader.into_records().map(move |row| {
            let row = row.context("Malformed CSV row")?;
            Ok(Record::new(row.iter().zip(&kinds).map(|(cell, kind)| parse_cell(cell, *kind)).collect()))
        })
    }
}

fn column_kind(name: &str, fields: &[FieldDescriptor]) -> ValueKind {
    match fields.iter().find(|f| f.name == name) {
        Some(field) if field.semantic_type == SemanticType::Numeric => ValueKind::Number,
        _ => ValueKind::Text,
    }
}

/// Empty cells are null. Unparseable numbers stay text and fail conversion
/// downstream.
fn parse_cell(cell: &str, kind: ValueKind) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    match kind {
        ValueKind::Number => cell.parse::<f64>().map_or_else(|_| Value::Text(cell.to_string()), Value::Number),
        _ => Value::Text(cell.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_header_and_cells() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "x, label ,other").unwrap();
        writeln!(file, "1.5,yes,").unwrap();
        writeln!(file, "abc,no,7").unwrap();

        let fields = vec![FieldDescriptor::numeric("x"), FieldDescriptor::nominal("label")];
        let source = CsvSource::open(file.path(), &fields).unwrap();
        let kinds: Vec<ValueKind> = source.schema().fields().iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![ValueKind::Number, ValueKind::Text, ValueKind::Text]);

        let records: Vec<Record> = source.into_records().collect::<Result<_>>().unwrap();
        assert_eq!(records[0].values(), &[Value::Number(1.5), Value::Text("yes".to_string()), Value::Null]);
        assert_eq!(records[1].get(0), &Value::Text("abc".to_string()));
    }
}
