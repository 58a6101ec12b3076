//! Peak model used to locate the count maximum along one axis.
//!
//! The model is a small, pure function so the fitter and the plots can share it.

pub mod peak;

pub use peak::*;
