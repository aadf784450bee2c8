use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// The audio timebase: frames rendered so far over the sample rate.
///
/// The render side advances it once per block, so readers see it move in
/// block-sized jumps, which is what the lookahead window is there to absorb.
#[derive(Clone, Debug)]
pub struct AudioClock {
    frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl AudioClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            frames: Arc::new(AtomicU64::new(0)),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    pub fn now(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub(crate) fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::Release);
    }
}
