//! Domain types used throughout the optimizer.
//!
//! This module defines:
//!
//! - scan configuration (`Axis`, `AxisConfig`, `OptimizerConfig`)
//! - raw scan data (`ScanResult`)
//! - fit outputs (`FitResult`, `PeakParams`, `FitFailure`)
//! - run records (`AxisOutcome`, `OptimizationRun`, `RunState`)

pub mod types;

pub use types::*;
