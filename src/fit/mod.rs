//! Peak fitting.
//!
//! Responsibilities:
//!
//! - seed and run the nonlinear fit of the peak model
//! - clamp the fitted optimum into the scanned bounds
//! - classify failures and fall back to the pre-scan voltage

pub mod fitter;

pub use fitter::*;
