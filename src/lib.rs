//! `confocal-optimizer` library crate.
//!
//! The binary (`optimize`) is a thin wrapper around this library so that:
//!
//! - the optimizer core is testable without hardware or spawned processes
//! - instruments other than the simulator can plug in through `instrument::Instrument`
//! - code stays easy to navigate as the project grows

pub mod app;
pub mod cli;
pub mod domain;
pub mod error;
pub mod fit;
pub mod instrument;
pub mod io;
pub mod math;
pub mod models;
pub mod optimize;
pub mod plot;
pub mod report;
pub mod scan;
pub mod settings;
