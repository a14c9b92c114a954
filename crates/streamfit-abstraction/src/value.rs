//! Source-side records and the schemas of the streams that deliver them.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Storage type of a field in an incoming stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Number,
    Integer,
    Boolean,
    Text,
    Date,
}

impl ValueKind {
    /// Whether a field of this kind can stand in for a field of `other`
    /// (number and integer are interchangeable, everything else must match).
    #[must_use]
    pub fn is_compatible_with(self, other: Self) -> bool {
        self == other || (self.is_numeric() && other.is_numeric())
    }

    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Number | Self::Integer)
    }
}

/// A single typed value in a source record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Number(f64),
    Integer(i64),
    Boolean(bool),
    Text(String),
    Date(DateTime<Utc>),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the value. Text is parsed, dates become epoch millis.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Null => None,
            Self::Number(n) => n.is_finite().then_some(*n),
            Self::Integer(i) => Some(*i as f64),
            Self::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            Self::Date(d) => Some(d.timestamp_millis() as f64),
        }
    }

    /// Date view of the value. Text is parsed with `format` when given,
    /// RFC 3339 otherwise; numbers are read as epoch millis.
    #[must_use]
    pub fn as_date(&self, format: Option<&str>) -> Option<DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(*d),
            Self::Integer(i) => DateTime::from_timestamp_millis(*i),
            Self::Number(n) if n.is_finite() => DateTime::from_timestamp_millis(*n as i64),
            Self::Text(s) => parse_date(s.trim(), format),
            _ => None,
        }
    }

    /// String form used for nominal labels. `None` for null values.
    #[must_use]
    pub fn render(&self, date_format: Option<&str>) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Number(n) => Some(n.to_string()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Boolean(b) => Some(b.to_string()),
            Self::Text(s) => Some(s.clone()),
            Self::Date(d) => match date_format {
                Some(fmt) => {
                    let mut out = String::new();
                    write!(out, "{}", d.format(fmt)).ok()?;
                    Some(out)
                }
                None => Some(d.to_rfc3339()),
            },
        }
    }
}

fn parse_date(text: &str, format: Option<&str>) -> Option<DateTime<Utc>> {
    match format {
        Some(fmt) => NaiveDateTime::parse_from_str(text, fmt)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(text, fmt).ok().and_then(|d| d.and_hms_opt(0, 0, 0))
            })
            .map(|naive| Utc.from_utc_datetime(&naive)),
        None => DateTime::parse_from_rfc3339(text).ok().map(|d| d.with_timezone(&Utc)),
    }
}

/// An ordered row of values, positioned according to its stream's schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Record(Vec<Value>);

impl Record {
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Value at `index`; positions past the end read as null.
    #[must_use]
    pub fn get(&self, index: usize) -> &Value {
        self.0.get(index).unwrap_or(&Value::Null)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.0
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}

impl From<Vec<Value>> for Record {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// Metadata for one field of an incoming stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceField {
    pub name: String,
    pub kind: ValueKind,
    /// Legal values advertised by indexed storage upstream, if any.
    #[serde(default)]
    pub indexed_values: Option<Vec<String>>,
}

impl SourceField {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self { name: name.into(), kind, indexed_values: None }
    }

    #[must_use]
    pub fn with_indexed_values(mut self, values: Vec<String>) -> Self {
        self.indexed_values = Some(values);
        self
    }
}

/// Ordered field list of a training or test stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    fields: Vec<SourceField>,
}

impl RecordSchema {
    #[must_use]
    pub fn new(fields: Vec<SourceField>) -> Self {
        Self { fields }
    }

    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    #[must_use]
    pub fn field(&self, index: usize) -> Option<&SourceField> {
        self.fields.get(index)
    }

    #[must_use]
    pub fn fields(&self) -> &[SourceField] {
        &self.fields
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
