//! Single-axis optimization: scan, fit, apply.

use log::info;

use crate::domain::{Axis, AxisConfig, AxisOutcome};
use crate::fit::{FitOptions, fit_peak};
use crate::instrument::{Instrument, InstrumentError};
use crate::optimize::RunControl;
use crate::scan::scan;

/// The two instrument actions one axis needs.
pub trait AxisDriver {
    type Error;

    /// Apply `voltage`, then block until one count is available.
    fn acquire(&mut self, voltage: f64) -> Result<u64, Self::Error>;

    /// Leave the axis at `voltage`.
    fn apply_voltage(&mut self, voltage: f64) -> Result<(), Self::Error>;
}

/// Drives one axis of an [`Instrument`], reporting every voltage change.
pub struct InstrumentAxis<'a, I: ?Sized> {
    instrument: &'a mut I,
    axis: Axis,
    on_change: &'a mut dyn FnMut(Axis, f64),
}

impl<'a, I: Instrument + ?Sized> InstrumentAxis<'a, I> {
    pub fn new(instrument: &'a mut I, axis: Axis, on_change: &'a mut dyn FnMut(Axis, f64)) -> Self {
        Self {
            instrument,
            axis,
            on_change,
        }
    }
}

impl<I: Instrument + ?Sized> AxisDriver for InstrumentAxis<'_, I> {
    type Error = InstrumentError;

    fn acquire(&mut self, voltage: f64) -> Result<u64, InstrumentError> {
        self.apply_voltage(voltage)?;
        self.instrument.acquire_count()
    }

    fn apply_voltage(&mut self, voltage: f64) -> Result<(), InstrumentError> {
        self.instrument.apply_voltage(self.axis, voltage)?;
        (self.on_change)(self.axis, voltage);
        Ok(())
    }
}

/// Optimize one axis around `config.center`.
///
/// The chosen voltage is applied exactly once after a completed scan, whether
/// or not the fit converged. A cancelled scan returns its partial data without
/// fitting or applying anything.
pub fn optimize_axis<D: AxisDriver>(
    driver: &mut D,
    config: &AxisConfig,
    opts: &FitOptions,
    control: &mut dyn RunControl,
) -> Result<AxisOutcome, D::Error> {
    let scan = scan(config, |v| driver.acquire(v), control)?;

    if scan.cancelled {
        info!(
            "axis {}: cancelled after {} of {} points",
            config.axis,
            scan.len(),
            config.points
        );
        return Ok(AxisOutcome {
            axis: config.axis,
            scan,
            fit: None,
        });
    }

    let fit = fit_peak(&scan, config.center, opts);
    driver.apply_voltage(fit.chosen_voltage)?;

    info!(
        "axis {}: {:.6} V -> {:.6} V (fit {})",
        config.axis,
        config.center,
        fit.chosen_voltage,
        if fit.success() { "ok" } else { "failed" }
    );

    Ok(AxisOutcome {
        axis: config.axis,
        scan,
        fit: Some(fit),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::testing::ParabolicStage;
    use crate::optimize::{CancelFlag, Uninterrupted};

    /// Records calls and answers from a peak at `peak`.
    struct Recorder {
        peak: f64,
        acquired: Vec<f64>,
        applied: Vec<f64>,
        cancel_after: Option<(usize, CancelFlag)>,
    }

    impl AxisDriver for Recorder {
        type Error = String;

        fn acquire(&mut self, voltage: f64) -> Result<u64, String> {
            self.acquired.push(voltage);
            if let Some((k, flag)) = &self.cancel_after {
                if self.acquired.len() == *k {
                    flag.cancel();
                }
            }
            let d = voltage - self.peak;
            Ok((1_000_000.0 - 1e7 * d * d).max(0.0).round() as u64)
        }

        fn apply_voltage(&mut self, voltage: f64) -> Result<(), String> {
            self.applied.push(voltage);
            Ok(())
        }
    }

    fn recorder(peak: f64) -> Recorder {
        Recorder {
            peak,
            acquired: Vec::new(),
            applied: Vec::new(),
            cancel_after: None,
        }
    }

    #[test]
    fn applies_fitted_voltage_once() {
        let cfg = AxisConfig::new(Axis::X, 0.0, 0.2, 21).unwrap();
        let mut driver = recorder(0.02);
        let outcome = optimize_axis(&mut driver, &cfg, &FitOptions::default(), &mut Uninterrupted).unwrap();

        let fit = outcome.fit.as_ref().unwrap();
        assert!(fit.success());
        assert_eq!(driver.acquired.len(), 21);
        assert_eq!(driver.applied.len(), 1);
        assert!((driver.applied[0] - 0.02).abs() < 1e-4);
        assert_eq!(outcome.applied_voltage(), Some(driver.applied[0]));
    }

    #[test]
    fn failed_fit_still_applies_center() {
        struct Flat(Vec<f64>);
        impl AxisDriver for Flat {
            type Error = ();
            fn acquire(&mut self, _: f64) -> Result<u64, ()> {
                Ok(42)
            }
            fn apply_voltage(&mut self, v: f64) -> Result<(), ()> {
                self.0.push(v);
                Ok(())
            }
        }

        let cfg = AxisConfig::new(Axis::Y, 0.7, 0.2, 9).unwrap();
        let mut driver = Flat(Vec::new());
        let outcome = optimize_axis(&mut driver, &cfg, &FitOptions::default(), &mut Uninterrupted).unwrap();
        assert!(!outcome.fit.unwrap().success());
        assert_eq!(driver.0, vec![0.7]);
    }

    #[test]
    fn cancelled_scan_skips_fit_and_apply() {
        let cfg = AxisConfig::new(Axis::Z, 0.0, 0.2, 10).unwrap();
        let flag = CancelFlag::new();
        let mut driver = Recorder {
            cancel_after: Some((3, flag.clone())),
            ..recorder(0.0)
        };
        let mut control = flag.clone();
        let outcome = optimize_axis(&mut driver, &cfg, &FitOptions::default(), &mut control).unwrap();

        assert!(outcome.scan.cancelled);
        assert_eq!(outcome.scan.len(), 3);
        assert!(outcome.fit.is_none());
        assert!(driver.applied.is_empty());
    }

    #[test]
    fn instrument_axis_reports_every_voltage() {
        let mut stage = ParabolicStage::new([0.01, 0.0, 0.0]);
        let mut changes = Vec::new();
        let mut on_change = |axis: Axis, v: f64| changes.push((axis, v));
        let cfg = AxisConfig::new(Axis::X, 0.0, 0.1, 5).unwrap();

        let outcome = {
            let mut driver = InstrumentAxis::new(&mut stage, Axis::X, &mut on_change);
            optimize_axis(&mut driver, &cfg, &FitOptions::default(), &mut Uninterrupted).unwrap()
        };

        // 5 scan points plus the final apply.
        assert_eq!(changes.len(), 6);
        assert!(changes.iter().all(|(axis, _)| *axis == Axis::X));
        assert_eq!(changes[5].1, outcome.applied_voltage().unwrap());
        assert_eq!(stage.voltage_of(Axis::X), outcome.applied_voltage().unwrap());
    }

    #[test]
    fn instrument_error_propagates() {
        let mut stage = ParabolicStage::new([0.0; 3]);
        stage.fail_after = Some(2);
        let mut on_change = |_: Axis, _: f64| {};
        let cfg = AxisConfig::new(Axis::Y, 0.0, 0.1, 5).unwrap();
        let mut driver = InstrumentAxis::new(&mut stage, Axis::Y, &mut on_change);

        let err = optimize_axis(&mut driver, &cfg, &FitOptions::default(), &mut Uninterrupted).unwrap_err();
        assert!(matches!(err, InstrumentError::Acquisition(_)));
    }
}
