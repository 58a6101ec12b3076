//! Input/output helpers.
//!
//! - run JSON read/write (`run`)
//! - scan CSV export (`export`)
//! - per-axis position history (`history`)

use std::io::Write;

use serde::Serialize;

use crate::error::{AppError, EXIT_INTERNAL};

pub mod export;
pub mod history;
pub mod run;

pub use export::*;
pub use history::*;
pub use run::*;

/// Pretty-print `value` as JSON into `out` and flush it.
///
/// `what` names the file kind in error messages.
fn write_json<W: Write, T: Serialize + ?Sized>(mut out: W, value: &T, what: &str) -> Result<(), AppError> {
    serde_json::to_writer_pretty(&mut out, value)
        .map_err(|e| AppError::new(EXIT_INTERNAL, format!("Failed to write {what}: {e}")))?;
    out.flush()
        .map_err(|e| AppError::new(EXIT_INTERNAL, format!("Failed to write {what}: {e}")))
}
