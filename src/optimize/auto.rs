//! Re-optimization trigger.
//!
//! Tracking mode watches the count rate at the current position and starts a
//! new run once it drops below a fraction of the last fitted peak height.

use crate::domain::{OptimizationRun, OptimizerConfig};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReoptimizeTrigger {
    threshold_fraction: f64,
    reference: Option<f64>,
}

impl ReoptimizeTrigger {
    pub fn new(threshold_fraction: f64) -> Self {
        Self {
            threshold_fraction,
            reference: None,
        }
    }

    pub fn from_config(config: &OptimizerConfig) -> Self {
        Self::new(config.threshold_fraction)
    }

    /// Adopt the run's last successful peak height as the new reference.
    ///
    /// Runs without any converged fit leave the reference unchanged.
    pub fn record_run(&mut self, run: &OptimizationRun) {
        if let Some(height) = run.last_peak_height() {
            self.reference = Some(height);
        }
    }

    pub fn set_reference(&mut self, height: f64) {
        self.reference = Some(height);
    }

    pub fn reference(&self) -> Option<f64> {
        self.reference
    }

    pub fn threshold(&self) -> Option<f64> {
        self.reference.map(|r| r * self.threshold_fraction)
    }

    /// True when `count` has fallen below the threshold, or no reference exists yet.
    pub fn should_reoptimize(&self, count: u64) -> bool {
        match self.threshold() {
            Some(threshold) => (count as f64) < threshold,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn without_reference_always_triggers() {
        let trigger = ReoptimizeTrigger::new(0.9);
        assert!(trigger.should_reoptimize(u64::MAX));
        assert_eq!(trigger.threshold(), None);
    }

    #[test]
    fn triggers_below_fraction_of_reference() {
        let mut trigger = ReoptimizeTrigger::from_config(&OptimizerConfig::default());
        trigger.set_reference(1000.0);
        assert_eq!(trigger.threshold(), Some(950.0));
        assert!(!trigger.should_reoptimize(950));
        assert!(!trigger.should_reoptimize(1200));
        assert!(trigger.should_reoptimize(949));
    }

    #[test]
    fn empty_run_keeps_previous_reference() {
        let mut trigger = ReoptimizeTrigger::new(0.5);
        trigger.set_reference(400.0);
        trigger.record_run(&OptimizationRun::new());
        assert_eq!(trigger.reference(), Some(400.0));
    }
}
