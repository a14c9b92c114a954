//! JSON model artifacts.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use streamfit_abstraction::{DatasetSchema, EngineError, EngineResult, Model, ModelArtifact, ModelPersistence};
use tracing::info;

#[derive(Serialize)]
struct StoredModel<'a> {
    schema: &'a DatasetSchema,
    description: String,
    model: serde_json::Value,
}

/// Writes `{schema, description, model}` as pretty JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonModelStore;

impl JsonModelStore {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ModelPersistence for JsonModelStore {
    fn save(&self, model: &dyn Model, schema: &DatasetSchema, path: &Path) -> EngineResult<ModelArtifact> {
        let stored = StoredModel { schema, description: model.describe(), model: model.snapshot()? };
        let file = File::create(path)
            .map_err(|e| EngineError::Persistence(format!("cannot create {}: {e}", path.display())))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &stored)?;

        let sha256 = sha256_file(path)?;
        info!(path = %path.display(), sha256 = %sha256, "model written");
        Ok(ModelArtifact { path: path.to_path_buf(), sha256 })
    }
}

/// Hex-encoded SHA-256 of a file's contents.
///
/// # Errors
/// Returns `EngineError::Persistence` if the file cannot be read.
pub fn sha256_file(path: &Path) -> EngineResult<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::BaselineModel;
    use std::sync::Arc;
    use streamfit_abstraction::{Attribute, AttributeKind, Cell, Dataset, Instance};
    use tempfile::TempDir;

    #[test]
    fn test_save_writes_schema_description_and_model() {
        let schema = Arc::new(DatasetSchema::new(
            "stream",
            vec![],
            Attribute::new("y", AttributeKind::Nominal { values: vec!["a".to_string(), "b".to_string()] }),
        ));
        let mut model = BaselineModel::new(Arc::clone(&schema));
        model
            .train(&Dataset::with_instances(Arc::clone(&schema), vec![Instance::new(vec![Cell::Nominal(1)])]))
            .unwrap();

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("model.json");
        let artifact = JsonModelStore::new().save(&model, &schema, &path).unwrap();

        assert_eq!(artifact.path, path);
        assert_eq!(artifact.sha256.len(), 64);
        assert_eq!(artifact.sha256, sha256_file(&path).unwrap());

        let stored: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(stored["schema"]["relation"], "stream");
        assert_eq!(stored["model"]["kind"], "majority");
        assert!(stored["description"].as_str().unwrap().contains('b'));
    }

    #[test]
    fn test_save_into_missing_directory_fails() {
        let temp = TempDir::new().unwrap();
        let schema = DatasetSchema::new("s", vec![], Attribute::new("y", AttributeKind::Numeric));
        let model = BaselineModel::new(Arc::new(schema.clone()));
        let err = JsonModelStore::new().save(&model, &schema, &temp.path().join("nope/model.json")).unwrap_err();
        assert!(matches!(err, EngineError::Persistence(_)));
    }

    #[test]
    fn test_sha256_of_known_content() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(
            sha256_file(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
