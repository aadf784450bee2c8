// Pattern and tempo behind one lock, so the transport thread can read a
// step while the caller keeps editing.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::pattern::Pattern;
use crate::config::MachineConfig;
use crate::error::{MachineError, MachineResult};
use crate::shared::STEPS_PER_BEAT;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tempo(f64);

impl Tempo {
    pub fn new(bpm: f64) -> MachineResult<Self> {
        if bpm.is_finite() && bpm > 0.0 {
            Ok(Self(bpm))
        } else {
            Err(MachineError::InvalidTempo(bpm))
        }
    }

    pub fn bpm(self) -> f64 {
        self.0
    }

    /// Length of one sixteenth at this tempo.
    pub fn seconds_per_step(self) -> f64 {
        60.0 / self.0 / STEPS_PER_BEAT
    }
}

#[derive(Clone, Debug)]
pub struct Session {
    pub pattern: Pattern,
    pub tempo: Tempo,
}

pub type SharedSession = Arc<RwLock<Session>>;

impl Session {
    pub fn new(config: &MachineConfig) -> MachineResult<Self> {
        Ok(Session {
            pattern: Pattern::new(config.steps.default),
            tempo: Tempo::new(config.tempo)?,
        })
    }

    pub fn new_shared(config: &MachineConfig) -> MachineResult<SharedSession> {
        Ok(Arc::new(RwLock::new(Self::new(config)?)))
    }
}

// A panicking writer can't leave a half-written grid behind (resize swaps
// whole rows), so a poisoned lock is still safe to use.
pub fn read(session: &RwLock<Session>) -> RwLockReadGuard<'_, Session> {
    session.read().unwrap_or_else(PoisonError::into_inner)
}

pub fn write(session: &RwLock<Session>) -> RwLockWriteGuard<'_, Session> {
    session.write().unwrap_or_else(PoisonError::into_inner)
}
