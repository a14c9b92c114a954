//! Dataset header resolution for incrementally trained groups.
//!
//! An incremental model needs its schema before the first update. When the
//! descriptors fix every nominal label set the schema is known up front;
//! otherwise each group caches its first records and the schema is derived
//! from that cache.

use crate::error::StreamResult;
use crate::fields::FieldIndexes;
use crate::schema::SchemaBuilder;
use std::sync::Arc;
use streamfit_abstraction::{DatasetSchema, Record, RecordSchema};

/// Header state of a freshly opened group.
#[derive(Debug)]
pub enum HeaderState {
    Resolved(Arc<DatasetSchema>),
    Caching(Vec<Record>),
}

#[derive(Debug)]
pub struct HeaderResolver {
    cache_size: usize,
    immediate: Option<Arc<DatasetSchema>>,
    /// Header shared across groups of a non-stratified run.
    global: Option<Arc<DatasetSchema>>,
    share_global: bool,
}

impl HeaderResolver {
    /// `share_global` is set for non-stratified runs, where each derived
    /// header is merged with every header derived before it.
    #[must_use]
    pub fn new(cache_size: usize, immediate: Option<DatasetSchema>, share_global: bool) -> Self {
        Self { cache_size, immediate: immediate.map(Arc::new), global: None, share_global }
    }

    #[must_use]
    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    #[must_use]
    pub fn is_immediate(&self) -> bool {
        self.immediate.is_some()
    }

    #[must_use]
    pub fn open(&self) -> HeaderState {
        match &self.immediate {
            Some(schema) => HeaderState::Resolved(Arc::clone(schema)),
            None => HeaderState::Caching(Vec::with_capacity(self.cache_size)),
        }
    }

    #[must_use]
    pub fn cache_full(&self, cache: &[Record]) -> bool {
        cache.len() >= self.cache_size
    }

    /// Derives the header from `cache`, widened with the global header when
    /// one is shared.
    pub fn resolve(
        &mut self,
        builder: &SchemaBuilder,
        relation: &str,
        cache: &[Record],
        indexes: &FieldIndexes,
        source: &RecordSchema,
    ) -> StreamResult<Arc<DatasetSchema>> {
        let derived = builder.build(relation, cache, indexes, source)?;
        if !self.share_global {
            return Ok(Arc::new(derived));
        }
        let schema = match &self.global {
            Some(global) => Arc::new(derived.widen(global)),
            None => Arc::new(derived),
        };
        self.global = Some(Arc::clone(&schema));
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldDescriptor, FieldRegistry};
    use streamfit_abstraction::{SourceField, Value, ValueKind};

    fn setup(values: Option<&[&str]>) -> (FieldRegistry, SchemaBuilder, RecordSchema) {
        let source = RecordSchema::new(vec![
            SourceField::new("x", ValueKind::Number),
            SourceField::new("y", ValueKind::Text),
        ]);
        let mut target = FieldDescriptor::nominal("y");
        if let Some(values) = values {
            target = target.with_legal_values(values.iter().copied());
        }
        let registry =
            FieldRegistry::resolve(&[FieldDescriptor::numeric("x"), target], "y", None, &source, None).unwrap();
        let builder = SchemaBuilder::new(&registry).unwrap();
        (registry, builder, source)
    }

    fn row(label: &str) -> Record {
        Record::new(vec![Value::Number(1.0), Value::Text(label.to_string())])
    }

    #[test]
    fn test_immediate_header_skips_caching() {
        let (_, builder, _) = setup(Some(&["no", "yes"]));
        let resolver = HeaderResolver::new(100, builder.from_descriptors("s"), true);
        assert!(resolver.is_immediate());
        assert!(matches!(resolver.open(), HeaderState::Resolved(s) if s.num_classes() == 2));
    }

    #[test]
    fn test_cache_fills_at_configured_size() {
        let (_, builder, _) = setup(None);
        let resolver = HeaderResolver::new(3, builder.from_descriptors("s"), true);
        let HeaderState::Caching(mut cache) = resolver.open() else {
            panic!("expected caching state");
        };
        cache.push(row("a"));
        cache.push(row("b"));
        assert!(!resolver.cache_full(&cache));
        cache.push(row("a"));
        assert!(resolver.cache_full(&cache));
    }

    #[test]
    fn test_shared_header_accumulates_labels() {
        let (registry, builder, source) = setup(None);
        let mut resolver = HeaderResolver::new(2, None, true);
        let first = resolver
            .resolve(&builder, "s", &[row("b")], registry.training_indexes(), &source)
            .unwrap();
        assert_eq!(first.num_classes(), 1);
        let second = resolver
            .resolve(&builder, "s", &[row("a")], registry.training_indexes(), &source)
            .unwrap();
        assert_eq!(second.class_attribute().nominal_index("a"), Some(0));
        assert_eq!(second.class_attribute().nominal_index("b"), Some(1));
    }

    #[test]
    fn test_stratified_headers_are_independent() {
        let (registry, builder, source) = setup(None);
        let mut resolver = HeaderResolver::new(2, None, false);
        resolver.resolve(&builder, "s", &[row("b")], registry.training_indexes(), &source).unwrap();
        let second = resolver
            .resolve(&builder, "s", &[row("a")], registry.training_indexes(), &source)
            .unwrap();
        assert_eq!(second.num_classes(), 1);
    }
}
