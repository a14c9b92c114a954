//! Run configuration.
//!
//! The configuration is plain data: how it reaches the process (TOML file,
//! host settings, test builder) does not matter to the orchestrator.

use crate::error::{StreamError, StreamResult};
use crate::fields::{FieldDescriptor, SemanticType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use streamfit_abstraction::SchemeConfig;

pub const DEFAULT_INCREMENTAL_CACHE_SIZE: usize = 100;
pub const DEFAULT_SPLIT_PERCENT: u8 = 66;
pub const DEFAULT_FOLDS: usize = 10;

fn default_seed() -> u64 {
    1
}

fn default_cache_size() -> usize {
    DEFAULT_INCREMENTAL_CACHE_SIZE
}

fn default_model_file() -> String {
    "model.json".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowMode {
    #[default]
    All,
    Batch,
    Stratified,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowHandlingConfig {
    #[serde(default)]
    pub mode: RowMode,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub stratification_field: Option<String>,
}

/// How the training stream is partitioned into groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowHandling {
    All,
    Batch { size: usize },
    Stratified { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservoirConfig {
    pub size: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationKind {
    #[default]
    None,
    PercentageSplit,
    CrossValidation,
    SeparateTestSet,
    Prequential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    #[serde(default)]
    pub mode: EvaluationKind,
    /// Training share for percentage split (1..=99).
    #[serde(default)]
    pub percent: Option<u8>,
    #[serde(default)]
    pub folds: Option<usize>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub output_auc: bool,
    #[serde(default)]
    pub output_ir: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            mode: EvaluationKind::None,
            percent: None,
            folds: None,
            seed: default_seed(),
            output_auc: false,
            output_ir: false,
        }
    }
}

/// Resolved evaluation protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationMode {
    None,
    PercentageSplit { percent: u8 },
    CrossValidation { folds: usize },
    SeparateTestSet,
    Prequential,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOutputConfig {
    pub directory: PathBuf,
    #[serde(default = "default_model_file")]
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Training engine name.
    pub engine: String,
    #[serde(default)]
    pub scheme: SchemeConfig,
    pub target_field: String,
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub row_handling: RowHandlingConfig,
    #[serde(default)]
    pub reservoir: Option<ReservoirConfig>,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default = "default_cache_size")]
    pub incremental_cache_size: usize,
    #[serde(default)]
    pub model_output: Option<ModelOutputConfig>,
}

impl TrainingConfig {
    pub fn new(engine: impl Into<String>, target_field: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            engine: engine.into(),
            scheme: SchemeConfig::default(),
            target_field: target_field.into(),
            fields,
            row_handling: RowHandlingConfig::default(),
            reservoir: None,
            evaluation: EvaluationConfig::default(),
            incremental_cache_size: DEFAULT_INCREMENTAL_CACHE_SIZE,
            model_output: None,
        }
    }

    pub fn from_toml_str(text: &str) -> StreamResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> StreamResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    #[must_use]
    pub fn with_scheme(mut self, scheme: SchemeConfig) -> Self {
        self.scheme = scheme;
        self
    }

    #[must_use]
    pub fn with_row_handling(mut self, handling: RowHandling) -> Self {
        self.row_handling = match handling {
            RowHandling::All => RowHandlingConfig::default(),
            RowHandling::Batch { size } => RowHandlingConfig {
                mode: RowMode::Batch,
                batch_size: Some(size),
                stratification_field: None,
            },
            RowHandling::Stratified { field } => RowHandlingConfig {
                mode: RowMode::Stratified,
                batch_size: None,
                stratification_field: Some(field),
            },
        };
        self
    }

    #[must_use]
    pub fn with_evaluation(mut self, mode: EvaluationMode) -> Self {
        let (kind, percent, folds) = match mode {
            EvaluationMode::None => (EvaluationKind::None, None, None),
            EvaluationMode::PercentageSplit { percent } => (EvaluationKind::PercentageSplit, Some(percent), None),
            EvaluationMode::CrossValidation { folds } => (EvaluationKind::CrossValidation, None, Some(folds)),
            EvaluationMode::SeparateTestSet => (EvaluationKind::SeparateTestSet, None, None),
            EvaluationMode::Prequential => (EvaluationKind::Prequential, None, None),
        };
        self.evaluation.mode = kind;
        self.evaluation.percent = percent;
        self.evaluation.folds = folds;
        self
    }

    #[must_use]
    pub fn with_reservoir(mut self, size: usize, seed: u64) -> Self {
        self.reservoir = Some(ReservoirConfig { size, seed });
        self
    }

    #[must_use]
    pub fn with_model_output(mut self, directory: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        self.model_output = Some(ModelOutputConfig { directory: directory.into(), file_name: file_name.into() });
        self
    }

    #[must_use]
    pub fn with_incremental_cache_size(mut self, size: usize) -> Self {
        self.incremental_cache_size = size;
        self
    }

    pub fn row_handling(&self) -> StreamResult<RowHandling> {
        let rows = &self.row_handling;
        match rows.mode {
            RowMode::All => Ok(RowHandling::All),
            RowMode::Batch => {
                let size = rows.batch_size.ok_or_else(|| {
                    StreamError::Configuration("batch mode requires row_handling.batch_size".to_string())
                })?;
                if size == 0 {
                    return Err(StreamError::Configuration("batch_size must be >= 1".to_string()));
                }
                Ok(RowHandling::Batch { size })
            }
            RowMode::Stratified => {
                let field = rows
                    .stratification_field
                    .as_deref()
                    .filter(|f| !f.trim().is_empty())
                    .ok_or_else(|| {
                        StreamError::Configuration(
                            "stratified mode requires row_handling.stratification_field".to_string(),
                        )
                    })?;
                Ok(RowHandling::Stratified { field: field.to_string() })
            }
        }
    }

    pub fn evaluation_mode(&self) -> StreamResult<EvaluationMode> {
        let eval = &self.evaluation;
        match eval.mode {
            EvaluationKind::None => Ok(EvaluationMode::None),
            EvaluationKind::PercentageSplit => {
                let percent = eval.percent.unwrap_or(DEFAULT_SPLIT_PERCENT);
                if !(1..=99).contains(&percent) {
                    return Err(StreamError::Configuration(format!(
                        "percentage split must be within 1..=99, got {percent}"
                    )));
                }
                Ok(EvaluationMode::PercentageSplit { percent })
            }
            EvaluationKind::CrossValidation => {
                let folds = eval.folds.unwrap_or(DEFAULT_FOLDS);
                if folds < 2 {
                    return Err(StreamError::Configuration(format!(
                        "cross-validation needs at least 2 folds, got {folds}"
                    )));
                }
                Ok(EvaluationMode::CrossValidation { folds })
            }
            EvaluationKind::SeparateTestSet => Ok(EvaluationMode::SeparateTestSet),
            EvaluationKind::Prequential => Ok(EvaluationMode::Prequential),
        }
    }

    /// Checks settings and their combinations. Called before any record is
    /// processed.
    pub fn validate(&self) -> StreamResult<()> {
        if self.engine.trim().is_empty() {
            return Err(StreamError::Configuration("engine is required".to_string()));
        }
        if self.fields.is_empty() {
            return Err(StreamError::Configuration("at least one field must be configured".to_string()));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.trim().is_empty() {
                return Err(StreamError::Configuration("field names must not be empty".to_string()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(StreamError::Configuration(format!("field '{}' is configured twice", field.name)));
            }
            if field.semantic_type == SemanticType::Unsupported {
                return Err(StreamError::UnsupportedAttributeType(field.name.clone()));
            }
        }
        if !seen.contains(self.target_field.as_str()) {
            return Err(StreamError::Configuration(format!(
                "target field '{}' is not a configured field",
                self.target_field
            )));
        }

        let rows = self.row_handling()?;
        if let RowHandling::Stratified { field } = &rows {
            if !seen.contains(field.as_str()) {
                return Err(StreamError::Configuration(format!(
                    "stratification field '{field}' is not a configured field"
                )));
            }
            if *field == self.target_field {
                return Err(StreamError::Configuration(
                    "stratification field must differ from the target field".to_string(),
                ));
            }
        }

        if let Some(reservoir) = &self.reservoir {
            if reservoir.size == 0 {
                return Err(StreamError::Configuration("reservoir size must be >= 1".to_string()));
            }
            if matches!(rows, RowHandling::Batch { .. }) {
                return Err(StreamError::Configuration(
                    "reservoir sampling cannot be combined with batch row handling".to_string(),
                ));
            }
        }

        let eval = self.evaluation_mode()?;
        if eval == EvaluationMode::SeparateTestSet && matches!(rows, RowHandling::Batch { .. }) {
            return Err(StreamError::Configuration(
                "separate test set evaluation cannot be combined with batch row handling".to_string(),
            ));
        }

        if self.incremental_cache_size == 0 {
            return Err(StreamError::Configuration("incremental_cache_size must be >= 1".to_string()));
        }
        if let Some(output) = &self.model_output {
            if output.file_name.trim().is_empty() {
                return Err(StreamError::Configuration("model_output.file_name must not be empty".to_string()));
            }
        }
        Ok(())
    }
}
