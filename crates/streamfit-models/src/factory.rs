//! Engine factory.
//!
//! Maps an engine name from configuration to a fresh, unconfigured engine.
//! Each run asks for its own instance; nothing is registered globally.

use crate::{BaselineEngine, NaiveBayesEngine};
use std::str::FromStr;
use streamfit_abstraction::{EngineError, EngineResult, TrainingEngine};
use tracing::{debug, error};

/// Engine type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Majority class or mean predictor.
    Baseline,
    /// Updateable naive Bayes.
    NaiveBayes,
}

impl FromStr for EngineKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "baseline" | "majority" => Ok(Self::Baseline),
            "naive-bayes" | "naive_bayes" | "nb" => Ok(Self::NaiveBayes),
            _ => Err(()),
        }
    }
}

/// Factory for creating engine instances.
pub struct EngineFactory;

impl EngineFactory {
    #[must_use]
    pub fn create(kind: EngineKind) -> Box<dyn TrainingEngine> {
        debug!(engine = ?kind, "Creating engine instance");
        match kind {
            EngineKind::Baseline => Box::new(BaselineEngine::new()),
            EngineKind::NaiveBayes => Box::new(NaiveBayesEngine::new()),
        }
    }

    /// Creates an engine from its configured name.
    ///
    /// # Errors
    /// Returns `EngineError::Unsupported` if the name is not recognized.
    pub fn create_from_str(name: &str) -> EngineResult<Box<dyn TrainingEngine>> {
        let kind = EngineKind::from_str(name).map_err(|()| {
            error!(engine = %name, "Unrecognized engine");
            EngineError::Unsupported(format!("Unrecognized engine: {name}"))
        })?;
        Ok(Self::create(kind))
    }
}
