//! Per-axis position history.
//!
//! Every applied voltage is appended to its axis with a running index and a
//! timestamp, so drift of the optimum can be followed across runs. The history
//! is persisted as a JSON object keyed by axis.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::domain::{Axis, OptimizationRun};
use crate::error::{AppError, EXIT_INTERNAL};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub index: usize,
    pub voltage: f64,
    pub timestamp: DateTime<Local>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionHistory {
    #[serde(default)]
    x: Vec<HistoryEntry>,
    #[serde(default)]
    y: Vec<HistoryEntry>,
    #[serde(default)]
    z: Vec<HistoryEntry>,
}

impl PositionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self, axis: Axis) -> &[HistoryEntry] {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }

    fn entries_mut(&mut self, axis: Axis) -> &mut Vec<HistoryEntry> {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
        }
    }

    pub fn axes(&self) -> impl Iterator<Item = (Axis, &[HistoryEntry])> {
        Axis::ALL.into_iter().map(move |axis| (axis, self.entries(axis)))
    }

    pub fn latest(&self, axis: Axis) -> Option<&HistoryEntry> {
        self.entries(axis).last()
    }

    pub fn is_empty(&self) -> bool {
        self.axes().all(|(_, entries)| entries.is_empty())
    }

    pub fn push(&mut self, axis: Axis, voltage: f64, timestamp: DateTime<Local>) {
        let entries = self.entries_mut(axis);
        let index = entries.last().map_or(0, |e| e.index + 1);
        entries.push(HistoryEntry {
            index,
            voltage,
            timestamp,
        });
    }

    /// Append every voltage the run applied. Returns the number of entries added.
    pub fn record_run(&mut self, run: &OptimizationRun) -> usize {
        let timestamp = run.finished_at.unwrap_or_else(Local::now);
        let mut added = 0;
        for outcome in &run.outcomes {
            if let Some(voltage) = outcome.applied_voltage() {
                self.push(outcome.axis, voltage, timestamp);
                added += 1;
            }
        }
        added
    }

    /// Load a history file; a missing file yields an empty history.
    pub fn load_or_default(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        Self::load(path)
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path)
            .map_err(|e| AppError::config(format!("Failed to open history '{}': {e}", path.display())))?;
        serde_json::from_reader(file)
            .map_err(|e| AppError::config(format!("Invalid history JSON '{}': {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        let file = File::create(path).map_err(|e| {
            AppError::new(EXIT_INTERNAL, format!("Failed to create history '{}': {e}", path.display()))
        })?;
        super::write_json(BufWriter::new(file), self, "history JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AxisOutcome, FitFailure, FitResult, FitStatus, PeakParams, ScanResult};

    fn outcome(axis: Axis, applied: Option<f64>) -> AxisOutcome {
        AxisOutcome {
            axis,
            scan: ScanResult {
                axis,
                center: 0.0,
                v_min: -0.1,
                v_max: 0.1,
                voltages: vec![],
                counts: vec![],
                cancelled: applied.is_none(),
            },
            fit: applied.map(|v| FitResult {
                status: FitStatus::Failed {
                    failure: FitFailure::FlatSignal,
                },
                chosen_voltage: v,
                initial_guess: PeakParams {
                    center: 0.0,
                    width: 0.1,
                    height: 1.0,
                },
            }),
        }
    }

    #[test]
    fn indices_increase_per_axis() {
        let mut history = PositionHistory::new();
        let now = Local::now();
        history.push(Axis::X, 0.1, now);
        history.push(Axis::X, 0.2, now);
        history.push(Axis::Z, -0.3, now);

        assert_eq!(history.entries(Axis::X).len(), 2);
        assert_eq!(history.latest(Axis::X).map(|e| (e.index, e.voltage)), Some((1, 0.2)));
        assert_eq!(history.latest(Axis::Z).map(|e| e.index), Some(0));
        assert!(history.entries(Axis::Y).is_empty());
    }

    #[test]
    fn record_run_skips_cancelled_axes() {
        let mut run = OptimizationRun::new();
        run.outcomes.push(outcome(Axis::X, Some(0.05)));
        run.outcomes.push(outcome(Axis::Y, None));
        run.finish(true);

        let mut history = PositionHistory::new();
        assert_eq!(history.record_run(&run), 1);
        assert_eq!(history.latest(Axis::X).map(|e| e.voltage), Some(0.05));
        assert_eq!(history.latest(Axis::X).map(|e| e.timestamp), run.finished_at);
        assert!(history.entries(Axis::Y).is_empty());
    }

    #[test]
    fn file_round_trip_and_missing_file() {
        let path = std::env::temp_dir().join(format!("optimize-history-{}.json", std::process::id()));
        std::fs::remove_file(&path).ok();

        let mut history = PositionHistory::load_or_default(&path).unwrap();
        assert!(history.is_empty());
        history.push(Axis::Y, 1.25, Local::now());
        history.save(&path).unwrap();

        let back = PositionHistory::load_or_default(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(back, history);
    }
}
