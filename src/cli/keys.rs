//! Keyboard cancellation for interactive runs.
//!
//! While a run is in progress the terminal is in raw mode and pending key
//! events are drained at every control point. `q`, `Esc` and `Ctrl-C` cancel
//! the run; it stops at the next acquisition boundary.

use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use log::{info, warn};

use crate::error::{AppError, EXIT_INTERNAL};
use crate::optimize::{CancelFlag, RunControl};

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> Result<Self, AppError> {
        enable_raw_mode().map_err(|e| AppError::new(EXIT_INTERNAL, format!("Failed to enable raw mode: {e}")))?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// [`RunControl`] fed by the terminal keyboard.
pub struct KeyWatcher {
    flag: CancelFlag,
    _guard: RawModeGuard,
}

impl KeyWatcher {
    pub fn new(flag: CancelFlag) -> Result<Self, AppError> {
        let guard = RawModeGuard::new()?;
        Ok(Self { flag, _guard: guard })
    }

    fn drain_events(&mut self) {
        loop {
            match event::poll(Duration::ZERO) {
                Ok(true) => {}
                Ok(false) => return,
                Err(e) => {
                    warn!("keyboard poll failed: {e}");
                    return;
                }
            }
            match event::read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press && is_cancel_key(&key) => {
                    if !self.flag.is_cancelled() {
                        info!("cancel requested from keyboard");
                    }
                    self.flag.cancel();
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("keyboard read failed: {e}");
                    return;
                }
            }
        }
    }
}

impl RunControl for KeyWatcher {
    fn cancelled(&mut self) -> bool {
        self.drain_events();
        self.flag.is_cancelled()
    }

    fn yield_now(&mut self) {
        self.drain_events();
    }
}

fn is_cancel_key(key: &KeyEvent) -> bool {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}
