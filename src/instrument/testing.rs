//! Deterministic instrument for tests.

use std::time::Duration;

use crate::domain::Axis;
use crate::instrument::{Instrument, InstrumentError};

/// Noiseless paraboloid response with a call log.
#[derive(Debug, Clone)]
pub struct ParabolicStage {
    pub voltages: [f64; 3],
    pub peak: [f64; 3],
    pub height: f64,
    pub curvature: f64,
    /// Fail every acquisition after this many succeeded.
    pub fail_after: Option<usize>,
    pub acquisitions: usize,
    pub prepared: Option<Duration>,
    pub applied: Vec<(Axis, f64)>,
    pub reads: Vec<(Axis, f64)>,
}

impl ParabolicStage {
    pub fn new(peak: [f64; 3]) -> Self {
        Self {
            voltages: [0.0; 3],
            peak,
            height: 1_000_000.0,
            curvature: 1e7,
            fail_after: None,
            acquisitions: 0,
            prepared: None,
            applied: Vec::new(),
            reads: Vec::new(),
        }
    }

    pub fn voltage_of(&self, axis: Axis) -> f64 {
        self.voltages[axis.index()]
    }
}

impl Instrument for ParabolicStage {
    fn prepare_acquisition(&mut self, count_time: Duration) -> Result<(), InstrumentError> {
        self.prepared = Some(count_time);
        Ok(())
    }

    fn voltage(&mut self, axis: Axis) -> Result<f64, InstrumentError> {
        let v = self.voltages[axis.index()];
        self.reads.push((axis, v));
        Ok(v)
    }

    fn apply_voltage(&mut self, axis: Axis, voltage: f64) -> Result<(), InstrumentError> {
        self.voltages[axis.index()] = voltage;
        self.applied.push((axis, voltage));
        Ok(())
    }

    fn acquire_count(&mut self) -> Result<u64, InstrumentError> {
        if let Some(limit) = self.fail_after {
            if self.acquisitions >= limit {
                return Err(InstrumentError::Acquisition("counter timed out".to_string()));
            }
        }
        self.acquisitions += 1;
        let mut y = self.height;
        for i in 0..3 {
            let d = self.voltages[i] - self.peak[i];
            y -= self.curvature * d * d;
        }
        Ok(y.max(0.0).round() as u64)
    }
}
