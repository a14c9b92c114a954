use crate::dataset::DatasetSchema;
use crate::engine::Model;
use crate::error::EngineResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A model written to durable storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub path: PathBuf,
    pub sha256: String,
}

/// Writes trained models. The target directory already exists when `save`
/// is called.
pub trait ModelPersistence: Send {
    fn save(&self, model: &dyn Model, schema: &DatasetSchema, path: &Path) -> EngineResult<ModelArtifact>;
}
