//! Reporting utilities: per-axis shifts and formatted terminal output.

use crate::domain::{Axis, OptimizationRun};

pub mod format;

pub use format::*;

/// How far one axis moved during a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisShift {
    pub axis: Axis,
    pub from: f64,
    pub to: f64,
}

impl AxisShift {
    pub fn delta(&self) -> f64 {
        self.to - self.from
    }
}

/// Voltage changes of every axis that applied a voltage.
pub fn axis_shifts(run: &OptimizationRun) -> Vec<AxisShift> {
    run.outcomes
        .iter()
        .filter_map(|o| {
            o.applied_voltage().map(|to| AxisShift {
                axis: o.axis,
                from: o.scan.center,
                to,
            })
        })
        .collect()
}
