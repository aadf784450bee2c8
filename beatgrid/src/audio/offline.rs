use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam_channel::Receiver;

use super::clock::AudioClock;
use super::engine::Engine;
use super::frame::StereoFrame;
use super::voice::VoiceInstance;
use super::voice_id::VoiceId;
use crate::audio_api::{AudioCommand, AudioSink};
use crate::error::MachineResult;

/// A sink with no device behind it. Time only moves when [`render`] or
/// [`advance`] is called, which makes it the clock for bounces and tests.
///
/// [`render`]: OfflineSink::render
/// [`advance`]: OfflineSink::advance
pub struct OfflineSink {
    engine: Mutex<Engine>,
    clock: AudioClock,
    retired_rx: Receiver<Box<VoiceInstance>>,
}

impl OfflineSink {
    pub fn new(sample_rate: u32) -> Self {
        let clock = AudioClock::new(sample_rate);
        let (retired_tx, retired_rx) = crossbeam_channel::unbounded();
        let mut engine = Engine::new(clock.clone());
        engine.set_retired_tx(retired_tx);
        Self {
            engine: Mutex::new(engine),
            clock,
            retired_rx,
        }
    }

    fn engine(&self) -> MutexGuard<'_, Engine> {
        self.engine.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Render the next `frames` frames of the mix.
    pub fn render(&self, frames: usize) -> Vec<StereoFrame> {
        let mut out = vec![StereoFrame::zero(); frames];
        self.engine().render_block(&mut out);
        out
    }

    /// Render `secs` of audio, rounded to whole frames.
    pub fn advance(&self, secs: f64) -> Vec<StereoFrame> {
        let frames = (secs * self.clock.sample_rate() as f64).round().max(0.0) as usize;
        self.render(frames)
    }

    pub fn clock(&self) -> &AudioClock {
        &self.clock
    }
}

impl AudioSink for OfflineSink {
    fn sample_rate(&self) -> u32 {
        self.clock.sample_rate()
    }

    fn now(&self) -> f64 {
        self.clock.now()
    }

    fn start_voice(&self, voice: VoiceInstance) -> MachineResult<()> {
        self.engine().handle_cmd(AudioCommand::Start(Box::new(voice)));
        Ok(())
    }

    fn release(&self, id: VoiceId) {
        self.engine().handle_cmd(AudioCommand::Release(id));
    }

    fn release_all(&self) {
        self.engine().handle_cmd(AudioCommand::ReleaseAll);
    }

    fn reclaim(&self) -> usize {
        self.retired_rx.try_iter().count()
    }

    fn live_voices(&self) -> usize {
        self.engine().voice_count()
    }
}
