//! Routing of completed groups.
//!
//! A run is classified once by `(GroupMode, TrainingStyle, EvaluationMode)`
//! and [`route`] maps that triple to the handler applied to every group the
//! run completes. Invalid triples are rejected before any record is read.

use crate::accumulator::GroupKey;
use crate::config::{EvaluationMode, RowHandling};
use crate::convert::ColumnMap;
use crate::error::{StreamError, StreamResult};
use crate::fields::FieldIndexes;
use crate::layout::ModelOutputLayout;
use crate::output::OutputSchema;
use crate::progress::ProgressEvent;
use crate::registry::{TrainedGroup, TrainedModelRegistry};
use crate::trainer::Collaborators;
use std::sync::Arc;
use streamfit_abstraction::{
    Dataset, DatasetSchema, EngineCapabilities, EvaluationProtocol, EvaluationSetup, Evaluator, Model, Record,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupMode {
    All,
    Batch,
    Stratified,
}

impl From<&RowHandling> for GroupMode {
    fn from(rows: &RowHandling) -> Self {
        match rows {
            RowHandling::All => Self::All,
            RowHandling::Batch { .. } => Self::Batch,
            RowHandling::Stratified { .. } => Self::Stratified,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingStyle {
    /// Buffer the group, then train once on all of it.
    Batch,
    /// Update the model record by record.
    Incremental,
}

impl TrainingStyle {
    /// Incremental only when the scheme supports it, the stream is not
    /// sampled, and the evaluation protocol does not need the whole group.
    #[must_use]
    pub fn select(capabilities: &EngineCapabilities, sampled: bool, evaluation: EvaluationMode) -> Self {
        let streamable = matches!(
            evaluation,
            EvaluationMode::None | EvaluationMode::SeparateTestSet | EvaluationMode::Prequential
        );
        if capabilities.incremental && !sampled && streamable { Self::Incremental } else { Self::Batch }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteKey {
    pub mode: GroupMode,
    pub style: TrainingStyle,
    pub evaluation: EvaluationMode,
}

/// A group ready for its completion handler.
pub enum CompletedGroup {
    /// Converted buffer (or reservoir sample); no model yet.
    Buffered { key: GroupKey, dataset: Dataset },
    /// Incrementally trained model with its prequential evaluator, if any.
    Streamed {
        key: GroupKey,
        schema: Arc<DatasetSchema>,
        model: Box<dyn Model>,
        evaluator: Option<Box<dyn Evaluator>>,
    },
}

/// Evaluation settings shared by every group of a run.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationParams {
    pub mode: EvaluationMode,
    pub seed: u64,
    pub output_auc: bool,
    pub output_ir: bool,
}

impl EvaluationParams {
    #[must_use]
    pub fn protocol(&self) -> Option<EvaluationProtocol> {
        match self.mode {
            EvaluationMode::None => None,
            EvaluationMode::PercentageSplit { percent } => Some(EvaluationProtocol::PercentageSplit { percent }),
            EvaluationMode::CrossValidation { folds } => Some(EvaluationProtocol::CrossValidation { folds }),
            EvaluationMode::SeparateTestSet => Some(EvaluationProtocol::TestSet),
            EvaluationMode::Prequential => Some(EvaluationProtocol::Prequential),
        }
    }
}

/// Everything a completion handler may touch.
pub struct GroupContext<'a> {
    pub collaborators: &'a Collaborators,
    pub output: &'a OutputSchema,
    pub evaluation: EvaluationParams,
    pub layout: Option<&'a ModelOutputLayout>,
    pub trained: &'a mut TrainedModelRegistry,
    pub test_indexes: Option<&'a FieldIndexes>,
}

impl GroupContext<'_> {
    /// New evaluator for `schema` under the run's protocol.
    pub fn evaluator(&self, schema: &Arc<DatasetSchema>) -> StreamResult<Box<dyn Evaluator>> {
        new_evaluator(self.collaborators, self.evaluation, schema)
    }

    fn train_full(&self, dataset: &Dataset) -> StreamResult<Box<dyn Model>> {
        let mut model = self.collaborators.engine.configured_model(dataset.schema())?;
        model.train(dataset)?;
        Ok(model)
    }

    /// Saves `model` when model output is configured.
    fn persist(&self, key: &GroupKey, model: &dyn Model, schema: &DatasetSchema) -> StreamResult<()> {
        let Some(layout) = self.layout else {
            return Ok(());
        };
        let store = self.collaborators.persistence.as_deref().ok_or_else(|| {
            StreamError::Configuration("model output is configured but no persistence is available".to_string())
        })?;
        layout.ensure_dir()?;
        let path = layout.path_for(key);
        let artifact =
            store.save(model, schema, &path).map_err(|source| StreamError::Persistence { path, source })?;
        self.collaborators.progress.on_event(ProgressEvent::ModelPersisted { key: key.clone(), artifact });
        Ok(())
    }
}

pub(crate) fn new_evaluator(
    collaborators: &Collaborators,
    params: EvaluationParams,
    schema: &Arc<DatasetSchema>,
) -> StreamResult<Box<dyn Evaluator>> {
    let protocol = params
        .protocol()
        .ok_or_else(|| StreamError::InvalidState("no evaluation protocol is configured".to_string()))?;
    let setup = EvaluationSetup {
        schema: Arc::clone(schema),
        protocol,
        seed: params.seed,
        output_auc: params.output_auc,
        output_ir: params.output_ir,
    };
    Ok(collaborators.evaluation.evaluator(setup)?)
}

pub type CompletionHandler = fn(&mut GroupContext<'_>, CompletedGroup) -> StreamResult<Option<Record>>;

#[derive(Clone, Copy)]
pub struct Route {
    pub style: TrainingStyle,
    pub name: &'static str,
    pub on_complete: CompletionHandler,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route").field("style", &self.style).field("name", &self.name).finish()
    }
}

/// The dispatch table.
pub fn route(key: RouteKey) -> StreamResult<Route> {
    use EvaluationMode as E;
    use TrainingStyle as S;

    let (name, on_complete): (&'static str, CompletionHandler) = match (key.mode, key.style, key.evaluation) {
        (GroupMode::Batch, _, E::SeparateTestSet) => {
            return Err(StreamError::Configuration(
                "separate test set evaluation cannot be combined with batch row handling".to_string(),
            ));
        }
        (_, S::Batch, E::Prequential) => {
            return Err(StreamError::Configuration(
                "prequential evaluation requires an incremental scheme and no reservoir sampling".to_string(),
            ));
        }
        (_, S::Incremental, E::PercentageSplit { .. } | E::CrossValidation { .. }) => {
            return Err(StreamError::Configuration(
                "split and cross-validation evaluation need batch training".to_string(),
            ));
        }
        (_, _, E::None) => ("describe", describe as CompletionHandler),
        (_, _, E::SeparateTestSet) => ("retain", retain as CompletionHandler),
        (_, S::Batch, E::PercentageSplit { .. } | E::CrossValidation { .. }) | (_, S::Incremental, E::Prequential) => {
            ("evaluate", evaluate as CompletionHandler)
        }
    };
    Ok(Route { style: key.style, name, on_complete })
}

/// Emits the description of the group's final model.
fn describe(ctx: &mut GroupContext<'_>, group: CompletedGroup) -> StreamResult<Option<Record>> {
    let (key, schema, model) = final_model(ctx, group)?;
    ctx.persist(&key, model.as_ref(), &schema)?;
    Ok(Some(ctx.output.model_record(&key, model.describe())))
}

/// Emits the group's metrics. Split and cross-validation run here; the
/// prequential evaluator arrives already filled.
fn evaluate(ctx: &mut GroupContext<'_>, group: CompletedGroup) -> StreamResult<Option<Record>> {
    match group {
        CompletedGroup::Buffered { key, dataset } => {
            let schema = Arc::clone(dataset.schema());
            let mut evaluator = ctx.evaluator(&schema)?;
            let template = ctx.collaborators.engine.configured_model(&schema)?;
            evaluator.evaluate_model(template.as_ref(), &dataset)?;
            if ctx.layout.is_some() {
                let model = ctx.train_full(&dataset)?;
                ctx.persist(&key, model.as_ref(), &schema)?;
            }
            Ok(Some(ctx.output.metrics_record(&key, &evaluator.summary()?)))
        }
        CompletedGroup::Streamed { key, schema, model, evaluator } => {
            ctx.persist(&key, model.as_ref(), &schema)?;
            let evaluator = evaluator
                .ok_or_else(|| StreamError::InvalidState(format!("group {key} finished without an evaluator")))?;
            Ok(Some(ctx.output.metrics_record(&key, &evaluator.summary()?)))
        }
    }
}

/// Keeps the final model for the test stream. Emits nothing now.
fn retain(ctx: &mut GroupContext<'_>, group: CompletedGroup) -> StreamResult<Option<Record>> {
    let (key, schema, model) = final_model(ctx, group)?;
    ctx.persist(&key, model.as_ref(), &schema)?;
    let indexes = ctx
        .test_indexes
        .ok_or_else(|| StreamError::Configuration("separate test set evaluation needs a test stream".to_string()))?;
    let test_columns = ColumnMap::new(&schema, indexes);
    let evaluator = ctx.evaluator(&schema)?;
    ctx.trained.insert(TrainedGroup { key, schema, model, evaluator, test_columns });
    Ok(None)
}

fn final_model(
    ctx: &GroupContext<'_>,
    group: CompletedGroup,
) -> StreamResult<(GroupKey, Arc<DatasetSchema>, Box<dyn Model>)> {
    match group {
        CompletedGroup::Buffered { key, dataset } => {
            let model = ctx.train_full(&dataset)?;
            Ok((key, Arc::clone(dataset.schema()), model))
        }
        CompletedGroup::Streamed { key, schema, model, .. } => Ok((key, schema, model)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(mode: GroupMode, style: TrainingStyle, evaluation: EvaluationMode) -> RouteKey {
        RouteKey { mode, style, evaluation }
    }

    #[test]
    fn test_route_table() {
        let cases = [
            (GroupMode::All, TrainingStyle::Batch, EvaluationMode::None, "describe"),
            (GroupMode::Batch, TrainingStyle::Incremental, EvaluationMode::None, "describe"),
            (GroupMode::Stratified, TrainingStyle::Batch, EvaluationMode::CrossValidation { folds: 3 }, "evaluate"),
            (GroupMode::All, TrainingStyle::Incremental, EvaluationMode::Prequential, "evaluate"),
            (GroupMode::Stratified, TrainingStyle::Incremental, EvaluationMode::SeparateTestSet, "retain"),
            (GroupMode::All, TrainingStyle::Batch, EvaluationMode::SeparateTestSet, "retain"),
        ];
        for (mode, style, evaluation, expected) in cases {
            let route = route(key(mode, style, evaluation)).unwrap();
            assert_eq!(route.name, expected, "{mode:?} {style:?} {evaluation:?}");
            assert_eq!(route.style, style);
        }
    }

    #[test]
    fn test_invalid_routes_are_configuration_errors() {
        let invalid = [
            key(GroupMode::Batch, TrainingStyle::Batch, EvaluationMode::SeparateTestSet),
            key(GroupMode::All, TrainingStyle::Batch, EvaluationMode::Prequential),
            key(GroupMode::All, TrainingStyle::Incremental, EvaluationMode::PercentageSplit { percent: 50 }),
        ];
        for k in invalid {
            assert!(matches!(route(k), Err(StreamError::Configuration(_))), "{k:?}");
        }
    }

    #[test]
    fn test_training_style_selection() {
        let incremental = EngineCapabilities { incremental: true, ..EngineCapabilities::default() };
        let batch = EngineCapabilities::default();
        assert_eq!(TrainingStyle::select(&incremental, false, EvaluationMode::None), TrainingStyle::Incremental);
        assert_eq!(TrainingStyle::select(&incremental, true, EvaluationMode::None), TrainingStyle::Batch);
        assert_eq!(
            TrainingStyle::select(&incremental, false, EvaluationMode::CrossValidation { folds: 2 }),
            TrainingStyle::Batch
        );
        assert_eq!(TrainingStyle::select(&batch, false, EvaluationMode::Prequential), TrainingStyle::Batch);
    }
}
