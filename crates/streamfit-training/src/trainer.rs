//! The streaming orchestrator driven by the host pipeline.
//!
//! The host calls [`StreamTrainer::initialize`] once with the stream
//! schemas, then delivers training and test records one at a time. `None`
//! marks the end of a stream. Every call returns the output records it
//! produced.

use crate::accumulator::{Buffering, ClosedGroup, GroupAccumulator, GroupEvent, GroupKey, Partition};
use crate::config::{EvaluationMode, RowHandling, TrainingConfig};
use crate::convert::{to_instance, ColumnMap, ConversionStats};
use crate::dispatch::{
    new_evaluator, route, CompletedGroup, EvaluationParams, GroupContext, GroupMode, Route, RouteKey, TrainingStyle,
};
use crate::error::{StreamError, StreamResult};
use crate::feeder::{FeedOutcome, ScoringStrategy, TestSetFeeder};
use crate::fields::{FieldRegistry, SemanticType, Stream};
use crate::header::{HeaderResolver, HeaderState};
use crate::layout::ModelOutputLayout;
use crate::output::{KeyColumn, OutputBody, OutputSchema};
use crate::progress::{LogProgressSink, ProgressEvent, ProgressSink};
use crate::registry::TrainedModelRegistry;
use crate::schema::SchemaBuilder;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use streamfit_abstraction::{
    Dataset, DatasetSchema, EvaluationEngine, Evaluator, Model, ModelPersistence, Record, RecordSchema,
    TrainingEngine,
};
use tracing::{debug, info, warn};

const RELATION: &str = "stream";

/// External engines used by one run.
pub struct Collaborators {
    pub engine: Box<dyn TrainingEngine>,
    pub evaluation: Box<dyn EvaluationEngine>,
    pub persistence: Option<Box<dyn ModelPersistence>>,
    pub progress: Arc<dyn ProgressSink>,
}

impl Collaborators {
    pub fn new(engine: Box<dyn TrainingEngine>, evaluation: Box<dyn EvaluationEngine>) -> Self {
        Self { engine, evaluation, persistence: None, progress: Arc::new(LogProgressSink) }
    }

    #[must_use]
    pub fn with_persistence(mut self, persistence: Box<dyn ModelPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }
}

/// Host stop request, shared between the host and the trainer.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Created,
    /// Accepting training records.
    Training,
    /// Training stream ended; waiting for the test stream.
    Testing,
    Done,
    Stopped,
    /// A fatal error ended the run.
    Failed,
}

struct LiveGroup {
    key: GroupKey,
    schema: Arc<DatasetSchema>,
    columns: ColumnMap,
    model: Box<dyn Model>,
    evaluator: Option<Box<dyn Evaluator>>,
    rows: usize,
    stats: ConversionStats,
}

impl LiveGroup {
    /// Test-then-train for one record.
    fn learn(&mut self, record: &Record) -> StreamResult<()> {
        let instance = to_instance(record, &self.schema, &self.columns, &mut self.stats);
        if let Some(evaluator) = self.evaluator.as_mut() {
            evaluator.evaluate_instance(self.model.as_ref(), &instance)?;
        }
        self.model.update(&instance)?;
        self.rows += 1;
        Ok(())
    }
}

enum StreamingGroup {
    Caching { key: GroupKey, cache: Vec<Record> },
    Live(LiveGroup),
}

/// Everything owned by an initialized run. Dropped on stop, failure or
/// completion.
struct Run {
    registry: FieldRegistry,
    builder: SchemaBuilder,
    training_source: RecordSchema,
    route: Route,
    evaluation: EvaluationParams,
    accumulator: GroupAccumulator,
    header: HeaderResolver,
    streaming: Option<StreamingGroup>,
    trained: TrainedModelRegistry,
    output: OutputSchema,
    layout: Option<ModelOutputLayout>,
    feeder: Option<TestSetFeeder>,
    queued_tests: Vec<Record>,
    expects_test: bool,
    training_ended: bool,
    test_ended: bool,
    groups: usize,
}

impl Run {
    fn on_training(&mut self, collab: &Collaborators, record: Option<Record>) -> StreamResult<Vec<Record>> {
        let mut out = Vec::new();
        match record {
            Some(record) => {
                for event in self.accumulator.admit(record)? {
                    self.on_group_event(collab, event, &mut out)?;
                }
            }
            None => {
                if let Some(group) = self.accumulator.finish() {
                    self.complete(collab, group, &mut out)?;
                }
                self.training_ended = true;
                debug!(groups = self.groups, "training stream ended");
                for record in std::mem::take(&mut self.queued_tests) {
                    self.feed_test(collab, &record)?;
                }
                if self.test_ended {
                    out.extend(self.finish_tests()?);
                }
            }
        }
        Ok(out)
    }

    fn on_test(&mut self, collab: &Collaborators, record: Option<Record>) -> StreamResult<Vec<Record>> {
        match record {
            Some(record) => {
                if self.feeder.is_none() {
                    return Ok(Vec::new());
                }
                if self.training_ended {
                    self.feed_test(collab, &record)?;
                } else {
                    self.queued_tests.push(record);
                }
                Ok(Vec::new())
            }
            None => {
                self.test_ended = true;
                if self.training_ended { self.finish_tests() } else { Ok(Vec::new()) }
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.training_ended && (!self.expects_test || self.test_ended)
    }

    fn on_group_event(
        &mut self,
        collab: &Collaborators,
        event: GroupEvent,
        out: &mut Vec<Record>,
    ) -> StreamResult<()> {
        match event {
            GroupEvent::Opened(key) => {
                collab.progress.on_event(ProgressEvent::GroupOpened { key: key.clone() });
                if self.route.style == TrainingStyle::Incremental {
                    let group = match self.header.open() {
                        HeaderState::Resolved(schema) => StreamingGroup::Live(self.start_live(collab, key, schema)?),
                        HeaderState::Caching(cache) => StreamingGroup::Caching { key, cache },
                    };
                    self.streaming = Some(group);
                }
            }
            GroupEvent::Record { record, .. } => self.stream_record(collab, record)?,
            GroupEvent::Closed(group) => self.complete(collab, group, out)?,
            GroupEvent::Skipped => {
                collab.progress.on_event(ProgressEvent::skipped(Stream::Training, "null stratification value"));
            }
            GroupEvent::Reappeared { field, key } => {
                return Err(StreamError::OrderingViolation { field, key, emitted: std::mem::take(out) });
            }
        }
        Ok(())
    }

    fn stream_record(&mut self, collab: &Collaborators, record: Record) -> StreamResult<()> {
        let next = match self.streaming.take() {
            Some(StreamingGroup::Caching { key, mut cache }) => {
                cache.push(record);
                if self.header.cache_full(&cache) {
                    StreamingGroup::Live(self.resolve_header(collab, key, cache)?)
                } else {
                    StreamingGroup::Caching { key, cache }
                }
            }
            Some(StreamingGroup::Live(mut group)) => {
                group.learn(&record)?;
                StreamingGroup::Live(group)
            }
            None => return Err(StreamError::InvalidState("record arrived for a group that was never opened".to_string())),
        };
        self.streaming = Some(next);
        Ok(())
    }

    /// Derives the header from the cache, then replays the cache.
    fn resolve_header(&mut self, collab: &Collaborators, key: GroupKey, cache: Vec<Record>) -> StreamResult<LiveGroup> {
        let schema = self.header.resolve(
            &self.builder,
            RELATION,
            &cache,
            self.registry.training_indexes(),
            &self.training_source,
        )?;
        collab.progress.on_event(ProgressEvent::HeaderResolved {
            key: key.clone(),
            attributes: schema.len(),
            cached: cache.len(),
        });
        let mut group = self.start_live(collab, key, schema)?;
        for record in &cache {
            group.learn(record)?;
        }
        Ok(group)
    }

    fn start_live(&self, collab: &Collaborators, key: GroupKey, schema: Arc<DatasetSchema>) -> StreamResult<LiveGroup> {
        let columns = ColumnMap::new(&schema, self.registry.training_indexes());
        let mut model = collab.engine.configured_model(&schema)?;
        model.train(&Dataset::new(Arc::clone(&schema)))?;
        let evaluator = if self.evaluation.mode == EvaluationMode::Prequential {
            Some(new_evaluator(collab, self.evaluation, &schema)?)
        } else {
            None
        };
        Ok(LiveGroup { key, schema, columns, model, evaluator, rows: 0, stats: ConversionStats::default() })
    }

    fn complete(&mut self, collab: &Collaborators, closed: ClosedGroup, out: &mut Vec<Record>) -> StreamResult<()> {
        let completed = match self.route.style {
            TrainingStyle::Batch => {
                let indexes = self.registry.training_indexes();
                let schema =
                    Arc::new(self.builder.build(RELATION, &closed.records, indexes, &self.training_source)?);
                let columns = ColumnMap::new(&schema, indexes);
                let mut stats = ConversionStats::default();
                let instances =
                    closed.records.iter().map(|r| to_instance(r, &schema, &columns, &mut stats)).collect();
                report_conversions(&closed.key, stats);
                collab.progress.on_event(ProgressEvent::GroupFlushed {
                    key: closed.key.clone(),
                    rows: closed.records.len(),
                    observed: closed.observed,
                });
                CompletedGroup::Buffered { key: closed.key, dataset: Dataset::with_instances(schema, instances) }
            }
            TrainingStyle::Incremental => {
                let group = match self.streaming.take() {
                    Some(StreamingGroup::Caching { key, cache }) => self.resolve_header(collab, key, cache)?,
                    Some(StreamingGroup::Live(group)) => group,
                    None => {
                        return Err(StreamError::InvalidState(format!("group {} closed without being opened", closed.key)));
                    }
                };
                report_conversions(&group.key, group.stats);
                collab.progress.on_event(ProgressEvent::GroupFlushed {
                    key: group.key.clone(),
                    rows: group.rows,
                    observed: closed.observed,
                });
                CompletedGroup::Streamed {
                    key: group.key,
                    schema: group.schema,
                    model: group.model,
                    evaluator: group.evaluator,
                }
            }
        };
        self.groups += 1;

        let mut ctx = GroupContext {
            collaborators: collab,
            output: &self.output,
            evaluation: self.evaluation,
            layout: self.layout.as_ref(),
            trained: &mut self.trained,
            test_indexes: self.registry.indexes(Stream::Test),
        };
        if let Some(record) = (self.route.on_complete)(&mut ctx, completed)? {
            out.push(record);
        }
        Ok(())
    }

    fn feed_test(&mut self, collab: &Collaborators, record: &Record) -> StreamResult<()> {
        let Some(feeder) = self.feeder.as_mut() else {
            return Ok(());
        };
        if let FeedOutcome::Skipped(reason) = feeder.feed(record, &mut self.trained)? {
            collab.progress.on_event(ProgressEvent::skipped(Stream::Test, reason));
        }
        Ok(())
    }

    fn finish_tests(&mut self) -> StreamResult<Vec<Record>> {
        match self.feeder.as_mut() {
            Some(feeder) => feeder.finish(&mut self.trained, &self.output),
            None => Ok(Vec::new()),
        }
    }
}

fn report_conversions(key: &GroupKey, stats: ConversionStats) {
    if stats.failed > 0 {
        warn!(group = %key, failed = stats.failed, "values could not be converted and were treated as missing");
    }
}

/// Streaming training and evaluation orchestrator for one step copy.
pub struct StreamTrainer {
    config: TrainingConfig,
    collaborators: Collaborators,
    stop: StopSignal,
    state: RunState,
    run: Option<Run>,
}

impl StreamTrainer {
    /// Validates `config`; nothing touches the collaborators until
    /// [`initialize`](Self::initialize).
    pub fn new(config: TrainingConfig, collaborators: Collaborators) -> StreamResult<Self> {
        config.validate()?;
        Ok(Self { config, collaborators, stop: StopSignal::new(), state: RunState::Created, run: None })
    }

    #[must_use]
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopSignal {
        self.stop.clone()
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    #[must_use]
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// True once the training stream, and the test stream if one was
    /// declared, have ended.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state == RunState::Done
    }

    /// Resolves fields against the stream schemas, configures the engine
    /// and fixes the output layout. Must be called once, before any record.
    pub fn initialize(
        &mut self,
        training: RecordSchema,
        test: Option<RecordSchema>,
    ) -> StreamResult<OutputSchema> {
        if self.state != RunState::Created {
            return Err(StreamError::InvalidState("the trainer is already initialized".to_string()));
        }
        let config = &self.config;
        let rows = config.row_handling()?;
        let mode = config.evaluation_mode()?;
        if mode == EvaluationMode::SeparateTestSet && test.is_none() {
            return Err(StreamError::Configuration(
                "separate test set evaluation needs a test stream".to_string(),
            ));
        }

        let stratification = match &rows {
            RowHandling::Stratified { field } => Some(field.as_str()),
            _ => None,
        };
        let registry =
            FieldRegistry::resolve(&config.fields, &config.target_field, stratification, &training, test.as_ref())?;
        let builder = SchemaBuilder::new(&registry)?;

        let capabilities = self.collaborators.engine.configure(&config.scheme)?;
        let style = TrainingStyle::select(&capabilities, config.reservoir.is_some(), mode);
        let route = route(RouteKey { mode: GroupMode::from(&rows), style, evaluation: mode })?;

        let layout = config.model_output.as_ref().map(ModelOutputLayout::from_config);
        if layout.is_some() && self.collaborators.persistence.is_none() {
            return Err(StreamError::Configuration(
                "model output is configured but no persistence is available".to_string(),
            ));
        }

        let (partition, key_column, test_stratification) = match &rows {
            RowHandling::All => (Partition::All, KeyColumn::None, None),
            RowHandling::Batch { size } => (Partition::Batch { size: *size }, KeyColumn::Batch, None),
            RowHandling::Stratified { field } => {
                let position = registry.stratification_index(Stream::Training).ok_or_else(|| {
                    StreamError::SchemaMismatch(format!("stratification field '{field}' is missing from the training stream"))
                })?;
                let in_test = registry.stratification_index(Stream::Test).map(|p| (field.clone(), p));
                (
                    Partition::Stratified { field: field.clone(), position },
                    KeyColumn::Stratum { field: field.clone() },
                    in_test,
                )
            }
        };

        let output = match mode {
            EvaluationMode::None => OutputSchema::new(key_column, OutputBody::Model),
            _ => OutputSchema::for_metrics(
                key_column,
                registry.target().semantic_type == SemanticType::Nominal,
                config.evaluation.output_auc,
                config.evaluation.output_ir,
            ),
        };

        let buffering = match (style, config.reservoir) {
            (TrainingStyle::Incremental, _) => Buffering::PassThrough,
            (TrainingStyle::Batch, Some(reservoir)) => Buffering::Reservoir { size: reservoir.size, seed: reservoir.seed },
            (TrainingStyle::Batch, None) => Buffering::Records,
        };
        let header = HeaderResolver::new(
            config.incremental_cache_size,
            builder.from_descriptors(RELATION),
            !matches!(rows, RowHandling::Stratified { .. }),
        );
        let feeder = (mode == EvaluationMode::SeparateTestSet)
            .then(|| TestSetFeeder::new(ScoringStrategy::for_capabilities(&capabilities), test_stratification));

        info!(
            engine = %self.collaborators.engine.name(),
            route = route.name,
            style = ?style,
            immediate_header = header.is_immediate(),
            "stream trainer initialized"
        );

        self.run = Some(Run {
            registry,
            builder,
            training_source: training,
            route,
            evaluation: EvaluationParams {
                mode,
                seed: config.evaluation.seed,
                output_auc: config.evaluation.output_auc,
                output_ir: config.evaluation.output_ir,
            },
            accumulator: GroupAccumulator::new(partition, buffering),
            header,
            streaming: None,
            trained: TrainedModelRegistry::new(),
            output: output.clone(),
            layout,
            feeder,
            queued_tests: Vec::new(),
            expects_test: test.is_some(),
            training_ended: false,
            test_ended: false,
            groups: 0,
        });
        self.state = RunState::Training;
        Ok(output)
    }

    /// Delivers one training record, or the end-of-stream sentinel.
    pub fn process_training(&mut self, record: Option<Record>) -> StreamResult<Vec<Record>> {
        if self.check_stopped() {
            return Ok(Vec::new());
        }
        match self.state {
            RunState::Training => {}
            RunState::Created => {
                return Err(StreamError::InvalidState("initialize must be called before records".to_string()));
            }
            _ => return Err(StreamError::InvalidState("the training stream has already ended".to_string())),
        }
        let Some(run) = self.run.as_mut() else {
            return Err(StreamError::InvalidState("no active run".to_string()));
        };
        let result = run.on_training(&self.collaborators, record);
        self.settle(result)
    }

    /// Delivers one test record, or the end-of-stream sentinel. Records
    /// that arrive before the training stream ends are held until it does.
    pub fn process_test(&mut self, record: Option<Record>) -> StreamResult<Vec<Record>> {
        if self.check_stopped() {
            return Ok(Vec::new());
        }
        match self.state {
            RunState::Training | RunState::Testing => {}
            RunState::Created => {
                return Err(StreamError::InvalidState("initialize must be called before records".to_string()));
            }
            _ => return Err(StreamError::InvalidState("the test stream has already ended".to_string())),
        }
        let Some(run) = self.run.as_mut() else {
            return Err(StreamError::InvalidState("no active run".to_string()));
        };
        if !run.expects_test {
            return Err(StreamError::InvalidState("no test stream was declared".to_string()));
        }
        if run.test_ended {
            return Err(StreamError::InvalidState("the test stream has already ended".to_string()));
        }
        let result = run.on_test(&self.collaborators, record);
        self.settle(result)
    }

    /// Sets the stop signal and drops all run state at once.
    pub fn abandon(&mut self) {
        self.stop.stop();
        self.check_stopped();
    }

    fn check_stopped(&mut self) -> bool {
        if self.state == RunState::Stopped {
            return true;
        }
        if self.stop.is_stopped() && !matches!(self.state, RunState::Done | RunState::Failed) {
            info!("stop requested; abandoning open groups");
            self.run = None;
            self.state = RunState::Stopped;
            return true;
        }
        false
    }

    fn settle(&mut self, result: StreamResult<Vec<Record>>) -> StreamResult<Vec<Record>> {
        let out = match result {
            Ok(out) => out,
            Err(err) => {
                self.run = None;
                self.state = RunState::Failed;
                return Err(err);
            }
        };
        if let Some(run) = &self.run {
            if run.is_finished() {
                self.collaborators.progress.on_event(ProgressEvent::Finished { groups: run.groups });
                self.run = None;
                self.state = RunState::Done;
            } else if run.training_ended {
                self.state = RunState::Testing;
            }
        }
        Ok(out)
    }
}
