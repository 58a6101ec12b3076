//! Instrument collaborator interface.
//!
//! The optimizer only needs a handful of synchronous capabilities from the
//! hardware layer. Pulse-pattern encoding, digital line states and settling
//! delays all stay behind this trait.

use std::time::Duration;

use crate::domain::Axis;

pub mod simulated;
#[cfg(test)]
pub(crate) mod testing;

pub use simulated::*;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InstrumentError {
    #[error("count acquisition failed: {0}")]
    Acquisition(String),
    #[error("axis {axis} rejected voltage {voltage} V: {reason}")]
    VoltageRejected {
        axis: Axis,
        voltage: f64,
        reason: String,
    },
    #[error("instrument not ready: {0}")]
    NotReady(String),
}

/// A voltage-steered photon counter.
///
/// Calls are strictly sequential; the optimizer never has more than one in
/// flight.
pub trait Instrument {
    /// Configure the integration time used by `acquire_count`.
    fn prepare_acquisition(&mut self, count_time: Duration) -> Result<(), InstrumentError>;

    /// Currently applied voltage on `axis`.
    fn voltage(&mut self, axis: Axis) -> Result<f64, InstrumentError>;

    /// Apply `voltage` on `axis`. Settling is handled by the implementation.
    fn apply_voltage(&mut self, axis: Axis, voltage: f64) -> Result<(), InstrumentError>;

    /// Trigger one count measurement at the current voltages.
    fn acquire_count(&mut self) -> Result<u64, InstrumentError>;
}

impl<I: Instrument + ?Sized> Instrument for &mut I {
    fn prepare_acquisition(&mut self, count_time: Duration) -> Result<(), InstrumentError> {
        (**self).prepare_acquisition(count_time)
    }

    fn voltage(&mut self, axis: Axis) -> Result<f64, InstrumentError> {
        (**self).voltage(axis)
    }

    fn apply_voltage(&mut self, axis: Axis, voltage: f64) -> Result<(), InstrumentError> {
        (**self).apply_voltage(axis, voltage)
    }

    fn acquire_count(&mut self) -> Result<u64, InstrumentError> {
        (**self).acquire_count()
    }
}
