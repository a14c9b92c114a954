use crate::accumulator::GroupKey;
use crate::config::ModelOutputConfig;
use crate::error::StreamResult;
use std::path::{Path, PathBuf};

/// Filesystem layout for persisted models.
///
/// Each group writes `<directory>/<prefix><file_name>`, where the prefix is
/// the batch number or stratification value followed by `_` (empty in All
/// mode).
#[derive(Debug, Clone)]
pub struct ModelOutputLayout {
    directory: PathBuf,
    file_name: String,
}

impl ModelOutputLayout {
    #[must_use]
    pub fn new(directory: PathBuf, file_name: impl Into<String>) -> Self {
        Self { directory, file_name: file_name.into() }
    }

    #[must_use]
    pub fn from_config(config: &ModelOutputConfig) -> Self {
        Self::new(config.directory.clone(), config.file_name.clone())
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    #[must_use]
    pub fn path_for(&self, key: &GroupKey) -> PathBuf {
        self.directory.join(format!("{}{}", key.file_prefix(), self.file_name))
    }

    pub fn ensure_dir(&self) -> StreamResult<()> {
        std::fs::create_dir_all(&self.directory)?;
        Ok(())
    }
}
