//! Turning recipes into voices.
//!
//! [`Synthesizer::realize`] is a pure factory: given an instrument and a
//! trigger time it builds a fresh [`VoiceInstance`] with its own
//! oscillators, filters and compressor. It does not start anything; the
//! caller hands the voice to an [`AudioSink`](crate::audio_api::AudioSink).

pub mod recipe;
pub mod recipes;

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::audio::effect::{Compressor, Filter};
use crate::audio::voice::{Generator, LayerVoice};
use crate::audio::{NoiseBuffer, VoiceInstance, next_voice_id};
use crate::config::MachineConfig;
use crate::error::{MachineError, MachineResult};
use crate::shared::Instrument;
use recipe::Source;

pub struct Synthesizer {
    sample_rate: u32,
    noise: Option<Arc<NoiseBuffer>>,
    stop_guard: f64,
}

impl Synthesizer {
    pub fn new(sample_rate: u32, noise: Option<Arc<NoiseBuffer>>, stop_guard: f64) -> Self {
        Self {
            sample_rate,
            noise,
            stop_guard,
        }
    }

    /// Synthesizer for a device, with the noise buffer rendered per `config`.
    pub fn for_config(sample_rate: u32, config: &MachineConfig) -> Self {
        let seconds = config.noise.seconds.unwrap_or_else(recipes::kit_noise_secs);
        let mut rng = match config.noise.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let noise = NoiseBuffer::generate(sample_rate, seconds, &mut rng);
        Self::new(
            sample_rate,
            Some(Arc::new(noise)),
            config.lifecycle.stop_guard_secs,
        )
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// How long a voice rings: the recipe's envelope unless `ring` asks for
    /// something else, and never more than a guard past the envelope end.
    pub fn lifetime(&self, instrument: Instrument, ring: Option<f64>) -> f64 {
        let end = instrument.recipe().envelope_end();
        ring.unwrap_or(end).clamp(0.0, end + self.stop_guard)
    }

    /// Build a voice that starts at `at` on the audio clock.
    pub fn realize(
        &self,
        instrument: Instrument,
        at: f64,
        ring: Option<f64>,
    ) -> MachineResult<VoiceInstance> {
        if !at.is_finite() || at < 0.0 {
            return Err(MachineError::voice(instrument, format!("bad trigger time {at}")));
        }
        if let Some(r) = ring {
            if !r.is_finite() {
                return Err(MachineError::voice(instrument, format!("bad ring time {r}")));
            }
        }

        let recipe = instrument.recipe();
        let rate = self.sample_rate as f32;
        let mut layers = Vec::with_capacity(recipe.layers.len());
        for layer in recipe.layers {
            let generator = match layer.source {
                Source::Oscillator { waveform, frequency } => Generator::Oscillator {
                    waveform,
                    frequency,
                    phase: 0.0,
                },
                Source::Noise { duration } => {
                    let buffer = self
                        .noise
                        .as_ref()
                        .ok_or_else(|| MachineError::voice(instrument, "no noise buffer"))?;
                    if buffer.sample_rate() != self.sample_rate {
                        return Err(MachineError::voice(
                            instrument,
                            format!(
                                "noise rendered at {} Hz, output runs at {} Hz",
                                buffer.sample_rate(),
                                self.sample_rate
                            ),
                        ));
                    }
                    if buffer.seconds() + 1.0 / f64::from(rate) < duration {
                        return Err(MachineError::voice(
                            instrument,
                            format!(
                                "needs {duration}s of noise, buffer holds {:.3}s",
                                buffer.seconds()
                            ),
                        ));
                    }
                    Generator::Noise {
                        buffer: Arc::clone(buffer),
                    }
                }
            };
            let filters = layer
                .filters
                .iter()
                .map(|spec| Filter::new(spec, rate))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|reason| MachineError::voice(instrument, reason))?;
            layers.push(LayerVoice {
                generator,
                filters,
                gain: layer.gain,
            });
        }
        let compressor = recipe
            .compressor
            .as_ref()
            .map(|spec| Compressor::new(spec, rate))
            .transpose()
            .map_err(|reason| MachineError::voice(instrument, reason))?;

        Ok(VoiceInstance::new(
            next_voice_id(),
            instrument,
            at,
            self.lifetime(instrument, ring),
            self.sample_rate,
            layers,
            compressor,
        ))
    }
}
