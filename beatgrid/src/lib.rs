pub mod audio;
pub mod audio_api;
pub mod config;
pub mod error;
pub mod machine;
pub mod pipeline;
pub mod render;
pub mod sequencer;
pub mod shared;
pub mod synth;

pub use config::MachineConfig;
pub use error::{MachineError, MachineResult, PatternImportMismatch};
pub use machine::DrumMachine;
pub use pipeline::persistence::{SavedPattern, SavedRow};
pub use shared::{Instrument, Mode};
