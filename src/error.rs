use crate::domain::Axis;
use crate::instrument::InstrumentError;

/// Exit code for invalid settings, arguments or input files.
pub const EXIT_CONFIG: u8 = 2;
/// Exit code for instrument failures that aborted a run.
pub const EXIT_INSTRUMENT: u8 = 3;
/// Exit code for internal, numerical or output failures.
pub const EXIT_INTERNAL: u8 = 4;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(EXIT_CONFIG, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Failure that aborts an optimization run.
///
/// Fit failures are not represented here: they are recovered inside the fitter
/// and recorded on the axis outcome.
#[derive(Debug, thiserror::Error)]
pub enum OptimizeError {
    #[error("instrument failure while optimizing axis {axis}: {source}")]
    Instrument {
        axis: Axis,
        #[source]
        source: InstrumentError,
    },
    #[error("instrument failure before the first axis: {0}")]
    Setup(#[source] InstrumentError),
}

impl From<OptimizeError> for AppError {
    fn from(err: OptimizeError) -> Self {
        AppError::new(EXIT_INSTRUMENT, err.to_string())
    }
}

impl From<InstrumentError> for AppError {
    fn from(err: InstrumentError) -> Self {
        AppError::new(EXIT_INSTRUMENT, format!("Instrument failure: {err}"))
    }
}
