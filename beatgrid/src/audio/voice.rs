use std::sync::Arc;

use super::effect::{Compressor, Effect, Filter};
use super::frame::StereoFrame;
use super::noise_buffer::NoiseBuffer;
use super::voice_id::VoiceId;
use crate::shared::Instrument;
use crate::synth::recipe::{Envelope, Waveform};

pub(crate) enum Generator {
    Oscillator {
        waveform: Waveform,
        frequency: Envelope,
        phase: f32,
    },
    Noise {
        buffer: Arc<NoiseBuffer>,
    },
}

pub(crate) struct LayerVoice {
    pub generator: Generator,
    pub filters: Vec<Filter>,
    pub gain: Envelope,
}

impl LayerVoice {
    fn next_sample(&mut self, frame: u64, t: f64, sample_rate: f32) -> f32 {
        let raw = match &mut self.generator {
            Generator::Oscillator {
                waveform,
                frequency,
                phase,
            } => {
                let s = waveform.sample(*phase);
                *phase = (*phase + frequency.value_at(t) / sample_rate).fract();
                s
            }
            Generator::Noise { buffer } => buffer.sample(frame as usize),
        };
        let filtered = self.filters.iter_mut().fold(raw, |s, f| f.process(s));
        filtered * self.gain.value_at(t)
    }
}

/// One triggered drum hit. Owns every node it renders through; nothing in
/// here is shared with another voice except the read-only noise buffer.
pub struct VoiceInstance {
    id: VoiceId,
    instrument: Instrument,
    start: f64,    // audio clock seconds
    lifetime: f64, // generators stop this long after `start`
    sample_rate: f32,
    start_frame: u64,
    stop_frame: u64,
    layers: Vec<LayerVoice>,
    compressor: Option<Compressor>,
}

impl VoiceInstance {
    pub(crate) fn new(
        id: VoiceId,
        instrument: Instrument,
        start: f64,
        lifetime: f64,
        sample_rate: u32,
        layers: Vec<LayerVoice>,
        compressor: Option<Compressor>,
    ) -> Self {
        let rate = sample_rate as f64;
        let start_frame = (start * rate).round() as u64;
        let stop_frame = start_frame + (lifetime * rate).round() as u64;
        Self {
            id,
            instrument,
            start,
            lifetime,
            sample_rate: sample_rate as f32,
            start_frame,
            stop_frame,
            layers,
            compressor,
        }
    }

    pub fn id(&self) -> VoiceId {
        self.id
    }

    pub fn instrument(&self) -> Instrument {
        self.instrument
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn lifetime(&self) -> f64 {
        self.lifetime
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn has_compressor(&self) -> bool {
        self.compressor.is_some()
    }

    /// True once a block starting at `first_frame` lies past the stop time.
    pub fn is_finished(&self, first_frame: u64) -> bool {
        first_frame >= self.stop_frame
    }

    // mix this voice into a block that starts at `first_frame` on the audio clock
    pub fn render_into(&mut self, first_frame: u64, out: &mut [StereoFrame]) {
        let end_frame = first_frame + out.len() as u64;
        if end_frame <= self.start_frame || first_frame >= self.stop_frame {
            return;
        }
        let from = self.start_frame.max(first_frame);
        let to = self.stop_frame.min(end_frame);
        for frame in from..to {
            let local = frame - self.start_frame;
            let t = local as f64 / self.sample_rate as f64;
            let mut sample = 0.0;
            for layer in &mut self.layers {
                sample += layer.next_sample(local, t, self.sample_rate);
            }
            if let Some(comp) = &mut self.compressor {
                sample = comp.process(sample);
            }
            out[(frame - first_frame) as usize].add_mono(sample);
        }
    }
}

impl std::fmt::Debug for VoiceInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceInstance")
            .field("id", &self.id)
            .field("instrument", &self.instrument)
            .field("start", &self.start)
            .field("lifetime", &self.lifetime)
            .field("layers", &self.layers.len())
            .finish()
    }
}
