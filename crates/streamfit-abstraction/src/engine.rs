//! Training engine and model contracts.

use crate::dataset::{Dataset, DatasetSchema, Instance};
use crate::error::EngineResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Scheme selection handed to an engine once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemeConfig {
    /// Scheme identifier within the engine.
    #[serde(default)]
    pub name: String,
    /// Free-form scheme options (engine-specific).
    #[serde(default)]
    pub options: Vec<String>,
    /// Sampling filters applied by the engine before training.
    #[serde(default)]
    pub sampling: Vec<String>,
    /// Preprocessing filters applied by the engine before training.
    #[serde(default)]
    pub preprocessing: Vec<String>,
}

/// What a configured scheme can do. Returned once by
/// [`TrainingEngine::configure`] and consulted by the orchestrator instead of
/// inspecting models at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCapabilities {
    /// Row-at-a-time updates via [`Model::update`].
    pub incremental: bool,
    /// Scoring a whole batch is cheaper than scoring rows one by one.
    pub batch_scorer: bool,
    /// Batch size the scorer prefers when `batch_scorer` is set.
    pub preferred_batch_size: usize,
}

impl Default for EngineCapabilities {
    fn default() -> Self {
        Self { incremental: false, batch_scorer: false, preferred_batch_size: 100 }
    }
}

/// A pluggable training backend.
///
/// One instance is injected per orchestrator run; nothing is registered
/// process-wide.
pub trait TrainingEngine: Send {
    /// Engine identifier (e.g. "baseline", "naive-bayes").
    fn name(&self) -> &str;

    /// Applies scheme, sampling and preprocessing options.
    ///
    /// # Errors
    /// Returns `EngineError::InvalidOptions` if the options are not understood.
    fn configure(&mut self, scheme: &SchemeConfig) -> EngineResult<EngineCapabilities>;

    /// Creates an untrained model of the configured scheme for `schema`.
    ///
    /// # Errors
    /// Returns `EngineError::Unsupported` if the scheme cannot handle `schema`.
    fn configured_model(&self, schema: &Arc<DatasetSchema>) -> EngineResult<Box<dyn Model>>;
}

/// A trained (or trainable) model handle.
///
/// `distribution` returns class probabilities for a nominal class, or a
/// single-element vector holding the prediction for a numeric class.
pub trait Model: Send {
    fn schema(&self) -> &Arc<DatasetSchema>;

    /// Builds the model from scratch on `dataset`. Training on an empty
    /// dataset initialises an incremental model for its header.
    fn train(&mut self, dataset: &Dataset) -> EngineResult<()>;

    /// Updates the model with a single instance.
    fn update(&mut self, instance: &Instance) -> EngineResult<()>;

    fn distribution(&self, instance: &Instance) -> EngineResult<Vec<f64>>;

    /// Scores every instance of `dataset`. Batch scorers override this.
    fn distributions(&self, dataset: &Dataset) -> EngineResult<Vec<Vec<f64>>> {
        dataset.instances().iter().map(|i| self.distribution(i)).collect()
    }

    /// Human readable description of the trained model.
    fn describe(&self) -> String;

    /// Untrained copy with the same scheme configuration.
    fn fresh_copy(&self) -> Box<dyn Model>;

    /// Serialisable state for persistence.
    fn snapshot(&self) -> EngineResult<serde_json::Value>;
}
