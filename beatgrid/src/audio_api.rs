use std::sync::Arc;

pub use crate::audio::{AudioClock, StereoFrame, VoiceId, VoiceInstance};
use crate::error::MachineResult;

#[derive(Debug)]
pub enum AudioCommand {
    // Voices are built off the audio thread and handed over whole, so the
    // engine never allocates a node itself.
    Start(Box<VoiceInstance>),

    // Cut a voice now, whether or not its envelope has finished.
    Release(VoiceId),

    ReleaseAll,
}

/// Where started voices go. The real thing is the output device; tests and
/// the offline bounce use a sink that renders on demand.
pub trait AudioSink: Send + Sync {
    fn sample_rate(&self) -> u32;

    /// Seconds on the clock voices are scheduled against.
    fn now(&self) -> f64;

    fn start_voice(&self, voice: VoiceInstance) -> MachineResult<()>;

    fn release(&self, id: VoiceId);

    fn release_all(&self);

    /// Drop voices the renderer has retired, off the render thread.
    /// Returns how many were dropped.
    fn reclaim(&self) -> usize;

    /// Voices currently held by the renderer.
    fn live_voices(&self) -> usize;

    /// True once the output behind this sink has failed. A faulted sink
    /// never recovers; the backend hands out a new one instead.
    fn is_faulted(&self) -> bool {
        false
    }
}

/// Hands out a sink, possibly opening a device to do so. Called again after
/// a failure, so an unplugged device can come back on the next play.
/// Not `Send`: a device backend owns a stream that must stay on its thread.
pub trait AudioBackend {
    fn acquire(&mut self) -> MachineResult<Arc<dyn AudioSink>>;
}
