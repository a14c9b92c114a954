//! Streamfit Training
//!
//! Streaming training and evaluation orchestration:
//! - Resolving configured fields against the training and test streams
//! - Splitting the training stream into groups (all, batches, strata)
//! - Building dataset schemas from descriptors or buffered records
//! - Routing each group to batch or incremental training and evaluation
//! - Scoring a separate test stream against the trained models

pub mod accumulator;
pub mod config;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod feeder;
pub mod fields;
pub mod header;
pub mod layout;
pub mod output;
pub mod progress;
pub mod registry;
pub mod reservoir;
pub mod schema;
pub mod trainer;

pub use accumulator::{Buffering, ClosedGroup, GroupAccumulator, GroupEvent, GroupKey, Partition};
pub use config::{
    EvaluationConfig, EvaluationKind, EvaluationMode, ModelOutputConfig, ReservoirConfig, RowHandling,
    RowHandlingConfig, RowMode, TrainingConfig,
};
pub use convert::{to_instance, ColumnMap, ConversionStats};
pub use dispatch::{route, GroupMode, Route, RouteKey, TrainingStyle};
pub use error::{StreamError, StreamResult};
pub use feeder::{FeedOutcome, ScoringStrategy, TestSetFeeder};
pub use fields::{FieldDescriptor, FieldIndexes, FieldRegistry, SemanticType, Stream};
pub use header::{HeaderResolver, HeaderState};
pub use layout::ModelOutputLayout;
pub use output::{KeyColumn, OutputBody, OutputSchema};
pub use progress::{LogProgressSink, ProgressEvent, ProgressSink, RecordingProgressSink};
pub use registry::{TrainedGroup, TrainedModelRegistry};
pub use reservoir::ReservoirSampler;
pub use schema::SchemaBuilder;
pub use trainer::{Collaborators, RunState, StopSignal, StreamTrainer};
