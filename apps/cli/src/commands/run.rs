//! `streamfit run`.

use crate::source::CsvSource;
use anyhow::{Context, Result};
use comfy_table::Table;
use std::path::PathBuf;
use streamfit_abstraction::Record;
use streamfit_models::{EngineFactory, JsonModelStore, StandardEvaluation};
use streamfit_training::{Collaborators, OutputSchema, RunState, StreamTrainer, TrainingConfig};
use tracing::{info, warn};

#[derive(Debug)]
pub struct RunOptions {
    pub config: PathBuf,
    pub train: PathBuf,
    pub test: Option<PathBuf>,
    pub json: bool,
}

pub async fn execute(options: RunOptions) -> Result<()> {
    let config = TrainingConfig::load(&options.config)
        .with_context(|| format!("Invalid configuration {}", options.config.display()))?;
    let training = CsvSource::open(&options.train, &config.fields)?;
    let test = options.test.as_deref().map(|path| CsvSource::open(path, &config.fields)).transpose()?;

    let engine = EngineFactory::create_from_str(&config.engine).context("Unknown engine")?;
    let collaborators = Collaborators::new(engine, Box::new(StandardEvaluation::new()))
        .with_persistence(Box::new(JsonModelStore::new()));
    let trainer = StreamTrainer::new(config, collaborators)?;

    let stop = trainer.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping the run");
            stop.stop();
        }
    });

    let (schema, rows, state) = tokio::task::spawn_blocking(move || pump(trainer, training, test))
        .await
        .context("Training task panicked")??;

    if state == RunState::Stopped {
        warn!("Run stopped before the streams were exhausted");
    }
    if options.json {
        print_json(&schema, &rows)?;
    } else {
        print_table(&schema, &rows);
    }
    Ok(())
}

/// Feeds both streams through the trainer: training first, then test.
fn pump(
    mut trainer: StreamTrainer,
    training: CsvSource,
    test: Option<CsvSource>,
) -> Result<(OutputSchema, Vec<Record>, RunState)> {
    let schema = trainer.initialize(training.schema().clone(), test.as_ref().map(|t| t.schema().clone()))?;
    let mut out = Vec::new();

    for record in training.into_records() {
        out.extend(trainer.process_training(Some(record?))?);
    }
    out.extend(trainer.process_training(None)?);

    if let Some(test) = test {
        for record in test.into_records() {
            out.extend(trainer.process_test(Some(record?))?);
        }
        out.extend(trainer.process_test(None)?);
    }

    info!(rows = out.len(), state = ?trainer.state(), "Run finished");
    Ok((schema, out, trainer.state()))
}

fn print_table(schema: &OutputSchema, rows: &[Record]) {
    let mut table = Table::new();
    table.set_header(schema.fields().fields().iter().map(|f| f.name.clone()).collect::<Vec<_>>());
    for row in rows {
        table.add_row(row.values().iter().map(|v| v.render(None).unwrap_or_default()).collect::<Vec<_>>());
    }
    println!("{table}");
}

fn print_json(schema: &OutputSchema, rows: &[Record]) -> Result<()> {
    for row in rows {
        let object: serde_json::Map<String, serde_json::Value> = schema
            .fields()
            .fields()
            .iter()
            .zip(row.values())
            .map(|(field, value)| -> Result<(String, serde_json::Value)> {
                Ok((field.name.clone(), serde_json::to_value(value)?))
            })
            .collect::<Result<_>>()?;
        println!("{}", serde_json::Value::Object(object));
    }
    Ok(())
}
