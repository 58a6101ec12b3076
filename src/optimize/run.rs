//! Three-axis optimization run.
//!
//! State machine: `Idle -> Running(X) -> Running(Y) -> Running(Z) -> Idle`, with
//! `Cancelled` reachable from any running state and always followed by `Idle`.
//!
//! Each axis reads its center voltage from the instrument right before its scan,
//! so later axes start from the corrections applied by earlier ones.

use std::time::Duration;

use log::{info, warn};

use crate::domain::{Axis, AxisOutcome, OptimizationRun, OptimizerConfig, RunState};
use crate::error::{AppError, OptimizeError};
use crate::fit::FitOptions;
use crate::instrument::{Instrument, InstrumentError};
use crate::optimize::{InstrumentAxis, RunControl, optimize_axis};

/// What changed on the instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InstrumentChange {
    AcquisitionPrepared { count_time: Duration },
    Voltage { axis: Axis, voltage: f64 },
}

/// Notifications emitted during a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptimizerEvent<'a> {
    Starting,
    StateChanged(RunState),
    InstrumentChanged(InstrumentChange),
    AxisFinished(&'a AxisOutcome),
    Ending { cancelled: bool },
}

type Observer<'o> = Box<dyn FnMut(&OptimizerEvent<'_>) + 'o>;

pub struct Optimizer3D<'o> {
    config: OptimizerConfig,
    fit: FitOptions,
    state: RunState,
    observers: Vec<Observer<'o>>,
}

impl<'o> Optimizer3D<'o> {
    pub fn new(config: OptimizerConfig) -> Result<Self, AppError> {
        config.validate()?;
        Ok(Self {
            config,
            fit: FitOptions::default(),
            state: RunState::Idle,
            observers: Vec::new(),
        })
    }

    /// Register an observer for run notifications.
    pub fn subscribe<F>(&mut self, observer: F)
    where
        F: FnMut(&OptimizerEvent<'_>) + 'o,
    {
        self.observers.push(Box::new(observer));
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Optimize x, y and z in order.
    ///
    /// Cancellation is checked before each axis and before each acquisition;
    /// a cancelled run returns the outcomes gathered so far. An instrument
    /// failure aborts the run. Either way the optimizer ends in `Idle`.
    pub fn run<I: Instrument + ?Sized>(
        &mut self,
        instrument: &mut I,
        control: &mut dyn RunControl,
    ) -> Result<OptimizationRun, OptimizeError> {
        info!("optimization starting");
        emit(&mut self.observers, &OptimizerEvent::Starting);

        let result = self.run_axes(instrument, control);

        self.set_state(RunState::Idle);
        let cancelled = matches!(&result, Ok(run) if run.cancelled);
        match &result {
            Ok(run) => info!(
                "optimization ended ({} axes{})",
                run.outcomes.len(),
                if cancelled { ", cancelled" } else { "" }
            ),
            Err(err) => warn!("optimization aborted: {err}"),
        }
        emit(&mut self.observers, &OptimizerEvent::Ending { cancelled });

        result
    }

    fn run_axes<I: Instrument + ?Sized>(
        &mut self,
        instrument: &mut I,
        control: &mut dyn RunControl,
    ) -> Result<OptimizationRun, OptimizeError> {
        let count_time = self.config.count_time();
        instrument
            .prepare_acquisition(count_time)
            .map_err(OptimizeError::Setup)?;
        emit(
            &mut self.observers,
            &OptimizerEvent::InstrumentChanged(InstrumentChange::AcquisitionPrepared { count_time }),
        );

        let mut run = OptimizationRun::new();

        for axis in Axis::ALL {
            if control.cancelled() {
                warn!("cancelled before axis {axis}");
                self.set_state(RunState::Cancelled);
                run.finish(true);
                return Ok(run);
            }
            self.set_state(RunState::Running(axis));

            let center = instrument
                .voltage(axis)
                .map_err(|source| OptimizeError::Instrument { axis, source })?;
            let axis_config = self.config.axis_config(axis, center).map_err(|e| {
                OptimizeError::Instrument {
                    axis,
                    source: InstrumentError::NotReady(e.to_string()),
                }
            })?;

            let outcome = {
                let observers = &mut self.observers;
                let mut on_change = |axis: Axis, voltage: f64| {
                    emit(
                        observers.as_mut_slice(),
                        &OptimizerEvent::InstrumentChanged(InstrumentChange::Voltage { axis, voltage }),
                    )
                };
                let mut driver = InstrumentAxis::new(&mut *instrument, axis, &mut on_change);
                optimize_axis(&mut driver, &axis_config, &self.fit, control)
                    .map_err(|source| OptimizeError::Instrument { axis, source })?
            };

            emit(&mut self.observers, &OptimizerEvent::AxisFinished(&outcome));
            let cancelled = outcome.scan.cancelled;
            run.outcomes.push(outcome);

            if cancelled {
                self.set_state(RunState::Cancelled);
                run.finish(true);
                return Ok(run);
            }
        }

        run.finish(false);
        Ok(run)
    }

    fn set_state(&mut self, state: RunState) {
        self.state = state;
        emit(&mut self.observers, &OptimizerEvent::StateChanged(state));
    }
}

fn emit(observers: &mut [Observer<'_>], event: &OptimizerEvent<'_>) {
    for observer in observers.iter_mut() {
        observer(event);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::instrument::testing::ParabolicStage;
    use crate::optimize::{CancelFlag, Uninterrupted};

    fn config() -> OptimizerConfig {
        OptimizerConfig {
            ranges: [0.1, 0.1, 0.2],
            scan_points: 11,
            ..OptimizerConfig::default()
        }
    }

    #[test]
    fn full_run_moves_every_axis_to_the_peak() {
        let mut stage = ParabolicStage::new([0.02, -0.03, 0.05]);
        let mut optimizer = Optimizer3D::new(config()).unwrap();
        let run = optimizer.run(&mut stage, &mut Uninterrupted).unwrap();

        assert!(!run.cancelled);
        assert!(run.finished_at.is_some());
        assert_eq!(run.outcomes.len(), 3);
        for (outcome, axis) in run.outcomes.iter().zip(Axis::ALL) {
            assert_eq!(outcome.axis, axis);
            assert!(outcome.fit.as_ref().unwrap().success());
            assert!((stage.voltage_of(axis) - stage.peak[axis.index()]).abs() < 1e-4);
        }
        assert_eq!(stage.prepared, Some(Duration::from_millis(50)));
        assert_eq!(optimizer.state(), RunState::Idle);
    }

    #[test]
    fn centers_are_read_fresh_per_axis() {
        let mut stage = ParabolicStage::new([0.02, -0.03, 0.05]);
        stage.voltages = [0.01, 0.0, 0.0];
        let mut optimizer = Optimizer3D::new(config()).unwrap();
        let run = optimizer.run(&mut stage, &mut Uninterrupted).unwrap();

        assert_eq!(stage.reads.len(), 3);
        assert_eq!(stage.reads[0], (Axis::X, 0.01));
        let x = run.outcome(Axis::X).unwrap();
        assert_eq!(x.scan.center, 0.01);
        assert!((x.scan.voltages[0] - (0.01 - 0.05)).abs() < 1e-12);
    }

    #[test]
    fn cancel_before_y_keeps_only_x() {
        let mut stage = ParabolicStage::new([0.0; 3]);
        let flag = CancelFlag::new();
        let trigger = flag.clone();
        let events = RefCell::new(Vec::new());

        let run = {
            let mut optimizer = Optimizer3D::new(config()).unwrap();
            optimizer.subscribe(|event| {
                if let OptimizerEvent::AxisFinished(outcome) = event {
                    if outcome.axis == Axis::X {
                        trigger.cancel();
                    }
                }
                events.borrow_mut().push(format!("{event:?}"));
            });
            let mut control = flag.clone();
            let run = optimizer.run(&mut stage, &mut control).unwrap();
            assert_eq!(optimizer.state(), RunState::Idle);
            run
        };

        assert!(run.cancelled);
        assert_eq!(run.outcomes.len(), 1);
        assert_eq!(run.outcomes[0].axis, Axis::X);
        assert!(run.outcome(Axis::Y).is_none());
        assert!(run.outcome(Axis::Z).is_none());
        assert!(stage.applied.iter().all(|(axis, _)| *axis == Axis::X));

        let events = events.into_inner();
        assert_eq!(events.first().map(String::as_str), Some("Starting"));
        assert_eq!(events.last().map(String::as_str), Some("Ending { cancelled: true }"));
        assert!(events.contains(&"StateChanged(Cancelled)".to_string()));
    }

    #[test]
    fn cancel_before_x_runs_no_axis() {
        let mut stage = ParabolicStage::new([0.0; 3]);
        let flag = CancelFlag::new();
        flag.cancel();
        let mut endings = Vec::new();

        let run = {
            let mut optimizer = Optimizer3D::new(config()).unwrap();
            optimizer.subscribe(|event| {
                if let OptimizerEvent::Ending { cancelled } = event {
                    endings.push(*cancelled);
                }
            });
            let mut control = flag.clone();
            let run = optimizer.run(&mut stage, &mut control).unwrap();
            assert_eq!(optimizer.state(), RunState::Idle);
            run
        };

        assert!(run.cancelled);
        assert!(run.outcomes.is_empty());
        assert_eq!(endings, vec![true]);
        assert_eq!(stage.acquisitions, 0);
        assert!(stage.reads.is_empty());
        assert!(stage.applied.is_empty());
    }

    #[test]
    fn idle_optimizer_can_run_again() {
        let mut stage = ParabolicStage::new([0.02, -0.03, 0.05]);
        let mut starts = 0;
        let mut endings = 0;
        {
            let mut optimizer = Optimizer3D::new(config()).unwrap();
            optimizer.subscribe(|event| match event {
                OptimizerEvent::Starting => starts += 1,
                OptimizerEvent::Ending { .. } => endings += 1,
                _ => {}
            });

            let first = optimizer.run(&mut stage, &mut Uninterrupted).unwrap();
            assert_eq!(optimizer.state(), RunState::Idle);
            let second = optimizer.run(&mut stage, &mut Uninterrupted).unwrap();
            assert_eq!(optimizer.state(), RunState::Idle);

            assert!(!first.cancelled && !second.cancelled);
            assert_eq!(second.outcomes.len(), 3);
        }

        assert_eq!((starts, endings), (2, 2));
        assert_eq!(stage.reads.len(), 6);
        // The second run starts from the voltages the first one applied.
        let (axis, center) = stage.reads[3];
        assert_eq!(axis, Axis::X);
        assert!((center - 0.02).abs() < 1e-4, "center={center}");
    }

    #[test]
    fn cancel_mid_scan_stops_without_applying() {
        let mut stage = ParabolicStage::new([0.0; 3]);
        let mut checks = 0;
        // Axis check for X, 11 point checks for X, axis check for Y, then 4 points.
        let mut control = || {
            checks += 1;
            checks > 1 + 11 + 1 + 4
        };
        let mut optimizer = Optimizer3D::new(config()).unwrap();
        let run = optimizer.run(&mut stage, &mut control).unwrap();

        assert!(run.cancelled);
        assert_eq!(run.outcomes.len(), 2);
        let y = run.outcome(Axis::Y).unwrap();
        assert!(y.scan.cancelled);
        assert_eq!(y.scan.len(), 4);
        assert!(y.fit.is_none());
        // One final apply for X, none for Y beyond its scan points.
        let y_applies = stage.applied.iter().filter(|(axis, _)| *axis == Axis::Y).count();
        assert_eq!(y_applies, 4);
    }

    #[test]
    fn instrument_failure_aborts_and_returns_to_idle() {
        let mut stage = ParabolicStage::new([0.0; 3]);
        stage.fail_after = Some(15);
        let ended = RefCell::new(None);
        let mut optimizer = Optimizer3D::new(config()).unwrap();
        optimizer.subscribe(|event| {
            if let OptimizerEvent::Ending { cancelled } = event {
                *ended.borrow_mut() = Some(*cancelled);
            }
        });

        let err = optimizer.run(&mut stage, &mut Uninterrupted).unwrap_err();
        assert!(matches!(err, OptimizeError::Instrument { axis: Axis::Y, .. }));
        assert_eq!(optimizer.state(), RunState::Idle);
        drop(optimizer);
        assert_eq!(ended.into_inner(), Some(false));
    }

    #[test]
    fn instrument_changes_are_reported() {
        let mut stage = ParabolicStage::new([0.0; 3]);
        let mut voltage_events = 0;
        let mut prepared = 0;
        {
            let mut optimizer = Optimizer3D::new(config()).unwrap();
            optimizer.subscribe(|event| match event {
                OptimizerEvent::InstrumentChanged(InstrumentChange::Voltage { .. }) => voltage_events += 1,
                OptimizerEvent::InstrumentChanged(InstrumentChange::AcquisitionPrepared { .. }) => {
                    prepared += 1
                }
                _ => {}
            });
            optimizer.run(&mut stage, &mut Uninterrupted).unwrap();
        }
        // 11 scan points + 1 final apply per axis.
        assert_eq!(voltage_events, 3 * 12);
        assert_eq!(prepared, 1);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let bad = OptimizerConfig {
            scan_points: 2,
            ..OptimizerConfig::default()
        };
        assert!(Optimizer3D::new(bad).is_err());
    }
}
