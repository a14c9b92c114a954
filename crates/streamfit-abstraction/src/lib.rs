//! Collaborator contracts for streamfit.
//!
//! This crate defines the types that flow between the streaming orchestrator
//! and the engines it drives:
//! - Source records and the schemas of the streams that carry them
//! - Dataset schemas, instances and datasets handed to training engines
//! - The `TrainingEngine` / `Model` pair that builds and updates models
//! - The `EvaluationEngine` / `Evaluator` pair that accumulates metrics
//! - The `ModelPersistence` sink that writes trained models to disk

pub mod dataset;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod persistence;
pub mod value;

pub use dataset::{Attribute, AttributeKind, Cell, Dataset, DatasetSchema, Instance};
pub use engine::{EngineCapabilities, Model, SchemeConfig, TrainingEngine};
pub use error::{EngineError, EngineResult};
pub use evaluation::{
    metric_catalogue, EvaluationEngine, EvaluationProtocol, EvaluationSetup, Evaluator, MetricSet,
};
pub use persistence::{ModelArtifact, ModelPersistence};
pub use value::{Record, RecordSchema, SourceField, Value, ValueKind};
