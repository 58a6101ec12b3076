//! Confocal position optimization.
//!
//! - `control`: cooperative cancellation and yield points
//! - `axis`: scan, fit and apply for one axis
//! - `run`: the x, y, z sequence with observers
//! - `auto`: count-threshold trigger for tracking mode

pub mod auto;
pub mod axis;
pub mod control;
pub mod run;

pub use auto::*;
pub use axis::*;
pub use control::*;
pub use run::*;
