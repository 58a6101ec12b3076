//! Simulated confocal spot with shot noise.
//!
//! The collected count rate is a 3D Gaussian spot on top of a constant
//! background. Counts are Poisson-distributed around the expected value for the
//! configured integration time. The spot can drift by a fixed amount per
//! acquisition, which makes repeated optimization runs meaningful.

use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Poisson};
use serde::{Deserialize, Serialize};

use crate::domain::Axis;
use crate::instrument::{Instrument, InstrumentError};

/// Parameters of the simulated sample and stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Initially applied voltages.
    pub start: [f64; 3],
    /// Spot position (voltage of maximum emission) per axis.
    pub spot_center: [f64; 3],
    /// Spot standard deviation per axis, in volts.
    pub spot_sigma: [f64; 3],
    /// Count rate at the spot center, counts per second.
    pub peak_rate: f64,
    /// Background count rate, counts per second.
    pub background_rate: f64,
    /// Spot displacement applied after every acquisition.
    pub drift: [f64; 3],
    pub shot_noise: bool,
    pub seed: u64,
    /// Largest accepted absolute voltage.
    pub voltage_limit: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start: [0.0; 3],
            spot_center: [0.012, -0.008, 0.02],
            spot_sigma: [0.05, 0.05, 0.12],
            peak_rate: 60_000.0,
            background_rate: 2_000.0,
            drift: [0.0; 3],
            shot_noise: true,
            seed: 42,
            voltage_limit: 10.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedConfocal {
    config: SimulationConfig,
    voltages: [f64; 3],
    spot: [f64; 3],
    count_time: Option<Duration>,
    rng: StdRng,
    acquisitions: usize,
}

impl SimulatedConfocal {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            voltages: config.start,
            spot: config.spot_center,
            count_time: None,
            rng: StdRng::seed_from_u64(config.seed),
            acquisitions: 0,
            config,
        }
    }

    /// Current (possibly drifted) spot position.
    pub fn spot(&self) -> [f64; 3] {
        self.spot
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions
    }

    /// Expected counts at the current voltages for the prepared integration time.
    pub fn expected_counts(&self) -> Option<f64> {
        let t = self.count_time?.as_secs_f64();
        let mut exponent = 0.0;
        for i in 0..3 {
            let sigma = self.config.spot_sigma[i].abs().max(1e-12);
            let u = (self.voltages[i] - self.spot[i]) / sigma;
            exponent += u * u;
        }
        let rate = self.config.background_rate + self.config.peak_rate * (-0.5 * exponent).exp();
        Some(rate.max(0.0) * t)
    }
}

impl Instrument for SimulatedConfocal {
    fn prepare_acquisition(&mut self, count_time: Duration) -> Result<(), InstrumentError> {
        if count_time.is_zero() {
            return Err(InstrumentError::NotReady("integration time is zero".to_string()));
        }
        self.count_time = Some(count_time);
        Ok(())
    }

    fn voltage(&mut self, axis: Axis) -> Result<f64, InstrumentError> {
        Ok(self.voltages[axis.index()])
    }

    fn apply_voltage(&mut self, axis: Axis, voltage: f64) -> Result<(), InstrumentError> {
        if !voltage.is_finite() || voltage.abs() > self.config.voltage_limit {
            return Err(InstrumentError::VoltageRejected {
                axis,
                voltage,
                reason: format!("outside ±{} V", self.config.voltage_limit),
            });
        }
        self.voltages[axis.index()] = voltage;
        Ok(())
    }

    fn acquire_count(&mut self) -> Result<u64, InstrumentError> {
        let expected = self
            .expected_counts()
            .ok_or_else(|| InstrumentError::NotReady("acquisition not prepared".to_string()))?;

        let counts = if self.config.shot_noise && expected > 0.0 {
            let poisson = Poisson::new(expected)
                .map_err(|e| InstrumentError::Acquisition(format!("noise model: {e}")))?;
            poisson.sample(&mut self.rng)
        } else {
            expected
        };

        for i in 0..3 {
            self.spot[i] += self.config.drift[i];
        }
        self.acquisitions += 1;

        Ok(counts.round().max(0.0) as u64)
    }
}
