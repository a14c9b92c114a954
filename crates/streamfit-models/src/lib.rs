//! Reference collaborators for streamfit.
//!
//! This crate provides concrete implementations of the engine contracts so the
//! streaming trainer can run end to end.
//!
//! # Engines
//!
//! - **baseline**: majority class / mean, batch only, scores whole batches
//! - **naive-bayes**: updateable naive Bayes for nominal targets
//!
//! [`StandardEvaluation`] accumulates holdout, cross-validation, test-set and
//! prequential statistics; [`JsonModelStore`] writes trained models as JSON.

pub mod baseline;
pub mod evaluator;
pub mod factory;
pub mod naive_bayes;
pub mod store;

pub use baseline::BaselineEngine;
pub use evaluator::{StandardEvaluation, StandardEvaluator};
pub use factory::{EngineFactory, EngineKind};
pub use naive_bayes::NaiveBayesEngine;
pub use store::{sha256_file, JsonModelStore};
