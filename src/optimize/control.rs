//! Cooperative cancellation and yield points.
//!
//! A run executes on the host's thread. The host gets control back at two
//! well-defined points:
//!
//! - `cancelled()` before every acquisition and before every axis
//! - `yield_now()` after every acquisition
//!
//! Cancellation never interrupts an acquisition in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub trait RunControl {
    /// Whether the run should stop at this point.
    fn cancelled(&mut self) -> bool;

    /// Give the host a chance to process pending events.
    fn yield_now(&mut self) {}
}

/// Shared cancellation flag.
///
/// Cloning yields another handle to the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl RunControl for CancelFlag {
    fn cancelled(&mut self) -> bool {
        self.is_cancelled()
    }
}

impl<F: FnMut() -> bool> RunControl for F {
    fn cancelled(&mut self) -> bool {
        self()
    }
}

/// Never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uninterrupted;

impl RunControl for Uninterrupted {
    fn cancelled(&mut self) -> bool {
        false
    }
}
