//! Read/write run JSON files.
//!
//! Run JSON is the portable record of one optimization run:
//! - the optimizer configuration it used
//! - every axis scan with its fit result and chosen voltage
//!
//! It is enough to re-render the summary and plots without an instrument.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{OptimizationRun, OptimizerConfig};
use crate::error::{AppError, EXIT_INTERNAL};

const TOOL: &str = "optimize";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFile {
    pub tool: String,
    pub config: OptimizerConfig,
    pub run: OptimizationRun,
}

/// Write a run JSON file.
pub fn write_run_json(path: &Path, run: &OptimizationRun, config: &OptimizerConfig) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::new(EXIT_INTERNAL, format!("Failed to create run JSON '{}': {e}", path.display()))
    })?;

    let record = RunFile {
        tool: TOOL.to_string(),
        config: config.clone(),
        run: run.clone(),
    };

    super::write_json(BufWriter::new(file), &record, "run JSON")
}

/// Read a run JSON file.
pub fn read_run_json(path: &Path) -> Result<RunFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::config(format!("Failed to open run JSON '{}': {e}", path.display())))?;
    let record: RunFile =
        serde_json::from_reader(file).map_err(|e| AppError::config(format!("Invalid run JSON: {e}")))?;
    Ok(record)
}
