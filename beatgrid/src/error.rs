use thiserror::Error;

use crate::shared::Instrument;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum MachineError {
    // surfaced to the user; the next play/toggle tries to acquire the device again
    #[error("audio output unavailable: {0}")]
    EngineUnavailable(String),

    #[error("invalid tempo {0}: must be a positive, finite BPM")]
    InvalidTempo(f64),

    #[error("invalid step count {requested}: expected {min}..={max} in increments of {increment}")]
    InvalidStepCount {
        requested: usize,
        min: usize,
        max: usize,
        increment: usize,
    },

    #[error("step {step} is outside the {step_count}-step pattern")]
    StepOutOfRange { step: usize, step_count: usize },

    // local to one trigger, logged and skipped by the scheduler
    #[error("could not build {instrument} voice: {reason}")]
    VoiceConstruction {
        instrument: Instrument,
        reason: String,
    },
}

impl MachineError {
    pub(crate) fn voice(instrument: Instrument, reason: impl Into<String>) -> Self {
        MachineError::VoiceConstruction {
            instrument,
            reason: reason.into(),
        }
    }
}

/// Why one row of a saved pattern was skipped on import.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PatternImportMismatch {
    #[error("row {row}: unknown instrument {name:?}")]
    UnknownInstrument { row: usize, name: String },

    #[error("row {row} ({instrument}): {found} cells, expected {expected}")]
    LengthMismatch {
        row: usize,
        instrument: Instrument,
        found: usize,
        expected: usize,
    },

    #[error("row {row} ({instrument}): cell {step} holds {value}, expected 0 or 1")]
    InvalidCell {
        row: usize,
        instrument: Instrument,
        step: usize,
        value: String, // the cell as written in the file
    },

    #[error("row {row}: {instrument} already imported from an earlier row")]
    DuplicateInstrument { row: usize, instrument: Instrument },

    #[error("tempo {0} ignored, keeping the current tempo")]
    InvalidTempo(f64),
}

pub type MachineResult<T> = Result<T, MachineError>;
