use std::sync::Arc;
use std::time::Instant;

use super::lifecycle::{ReaperHandle, teardown_deadline};
use crate::audio::VoiceId;
use crate::audio_api::AudioSink;
use crate::error::MachineResult;
use crate::shared::Instrument;
use crate::synth::Synthesizer;

// One trigger, start to finish: build the voice, start it, book its teardown.
#[derive(Clone)]
pub struct Voicer {
    sink: Arc<dyn AudioSink>,
    synth: Arc<Synthesizer>,
    reaper: ReaperHandle,
    teardown_guard: f64,
}

impl Voicer {
    pub fn new(
        sink: Arc<dyn AudioSink>,
        synth: Arc<Synthesizer>,
        reaper: ReaperHandle,
        teardown_guard: f64,
    ) -> Self {
        Self {
            sink,
            synth,
            reaper,
            teardown_guard,
        }
    }

    pub fn sink(&self) -> &Arc<dyn AudioSink> {
        &self.sink
    }

    pub fn now(&self) -> f64 {
        self.sink.now()
    }

    pub fn trigger(&self, instrument: Instrument, at: f64) -> MachineResult<VoiceId> {
        // keep retired voices from piling up between teardowns
        self.sink.reclaim();

        let voice = self.synth.realize(instrument, at, None)?;
        let id = voice.id();
        let lifetime = voice.lifetime();
        let (real_now, audio_now) = (Instant::now(), self.sink.now());
        self.sink.start_voice(voice)?;

        let deadline = teardown_deadline(real_now, at, audio_now, lifetime, self.teardown_guard);
        self.reaper.schedule(id, deadline, &self.sink);
        Ok(id)
    }

    /// Play `instrument` as soon as possible.
    pub fn trigger_now(&self, instrument: Instrument) -> MachineResult<VoiceId> {
        self.trigger(instrument, self.now())
    }
}
