//! Terminal plots of scan data and fits.

pub mod ascii;

pub use ascii::*;
