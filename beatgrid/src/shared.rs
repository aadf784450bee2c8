// Types shared between the pattern side and the audio side.
//
// The grid is always TRACK_COUNT rows, one per instrument, in the order of
// Instrument::ALL. Step count is variable (see config::StepRange).

use std::fmt;
use std::str::FromStr;

pub const TRACK_COUNT: usize = 9;
pub const STEPS_PER_BEAT: f64 = 4.0; // sixteenth notes

// ye olde drum kit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Instrument {
    Kick,
    Snare,
    Clap,
    ClosedHihat,
    OpenHihat,
    HighTom,
    LowTom,
    Crash,
    Ride,
}

impl Instrument {
    pub const ALL: [Instrument; TRACK_COUNT] = [
        Instrument::Kick,
        Instrument::Snare,
        Instrument::Clap,
        Instrument::ClosedHihat,
        Instrument::OpenHihat,
        Instrument::HighTom,
        Instrument::LowTom,
        Instrument::Crash,
        Instrument::Ride,
    ];

    /// Row of this instrument in the grid.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Name used in saved patterns.
    pub fn name(self) -> &'static str {
        match self {
            Instrument::Kick => "kick",
            Instrument::Snare => "snare",
            Instrument::Clap => "clap",
            Instrument::ClosedHihat => "hihatClosed",
            Instrument::OpenHihat => "hihatOpen",
            Instrument::HighTom => "tomHigh",
            Instrument::LowTom => "tomLow",
            Instrument::Crash => "crash",
            Instrument::Ride => "ride",
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownInstrument(pub String);

impl FromStr for Instrument {
    type Err = UnknownInstrument;

    // saved names first, then the kebab-case spellings people type by hand
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let found = match s {
            "kick" => Instrument::Kick,
            "snare" => Instrument::Snare,
            "clap" => Instrument::Clap,
            "hihatClosed" | "closed-hihat" => Instrument::ClosedHihat,
            "hihatOpen" | "open-hihat" => Instrument::OpenHihat,
            "tomHigh" | "high-tom" => Instrument::HighTom,
            "tomLow" | "low-tom" => Instrument::LowTom,
            "crash" => Instrument::Crash,
            "ride" => Instrument::Ride,
            other => return Err(UnknownInstrument(other.to_string())),
        };
        Ok(found)
    }
}

/// Host visibility, pushed in by the application. Only changes how often the
/// transport polls and how far ahead it schedules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Foreground,
    Background,
}
