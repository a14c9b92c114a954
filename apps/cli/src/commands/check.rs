//! `streamfit check`.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use streamfit_models::EngineFactory;
use streamfit_training::TrainingConfig;

pub fn execute(path: &Path) -> Result<()> {
    let config =
        TrainingConfig::load(path).with_context(|| format!("Invalid configuration {}", path.display()))?;
    EngineFactory::create_from_str(&config.engine).context("Unknown engine")?;
    let rows = config.row_handling()?;
    let evaluation = config.evaluation_mode()?;

    println!("{} {}", "Configuration OK:".bold().green(), path.display());
    println!("  Engine:     {}", config.engine.cyan());
    println!("  Target:     {}", config.target_field);
    println!("  Fields:     {}", config.fields.len());
    println!("  Rows:       {rows:?}");
    println!("  Evaluation: {evaluation:?}");
    Ok(())
}
