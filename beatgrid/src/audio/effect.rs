use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};

use crate::synth::recipe::{CompressorSpec, FilterKind, FilterSpec};

// A per-voice processing stage. Every voice builds its own, so stages can
// keep filter memory without anything being shared between voices.
pub trait Effect: Send {
    fn process(&mut self, sample: f32) -> f32;
}

// biquad filter, coefficients fixed for the life of the voice
pub struct Filter {
    inner: DirectForm2Transposed<f32>,
}

impl Filter {
    pub fn new(spec: &FilterSpec, sample_rate: f32) -> Result<Self, String> {
        let kind = match spec.kind {
            FilterKind::Lowpass => Type::LowPass,
            FilterKind::Highpass => Type::HighPass,
            FilterKind::Bandpass => Type::BandPass,
        };
        let coeffs = Coefficients::<f32>::from_params(kind, sample_rate.hz(), spec.cutoff.hz(), spec.q())
            .map_err(|e| {
                format!(
                    "{:?} filter at {} Hz (q {}) at {} Hz sample rate: {:?}",
                    spec.kind,
                    spec.cutoff,
                    spec.q(),
                    sample_rate,
                    e
                )
            })?;
        Ok(Self {
            inner: DirectForm2Transposed::<f32>::new(coeffs),
        })
    }
}

impl Effect for Filter {
    fn process(&mut self, sample: f32) -> f32 {
        self.inner.run(sample)
    }
}

fn amp_to_db(amp: f32) -> f32 {
    20.0 * amp.abs().max(1e-6).log10()
}

fn db_to_amp(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

// feed-forward compressor with a soft knee
pub struct Compressor {
    threshold_db: f32,
    knee_db: f32,
    slope: f32, // 1/ratio - 1, negative
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
}

impl Compressor {
    pub fn new(spec: &CompressorSpec, sample_rate: f32) -> Result<Self, String> {
        if spec.ratio < 1.0 || spec.knee_db < 0.0 {
            return Err(format!(
                "compressor ratio {} / knee {} dB out of range",
                spec.ratio, spec.knee_db
            ));
        }
        if spec.attack_secs <= 0.0 || spec.release_secs <= 0.0 {
            return Err("compressor attack and release must be positive".to_string());
        }
        Ok(Self {
            threshold_db: spec.threshold_db,
            knee_db: spec.knee_db,
            slope: 1.0 / spec.ratio - 1.0,
            attack_coeff: (-1.0 / (spec.attack_secs * sample_rate)).exp(),
            release_coeff: (-1.0 / (spec.release_secs * sample_rate)).exp(),
            envelope: 0.0,
        })
    }

    // gain change in dB for a level in dB
    fn gain_db(&self, level_db: f32) -> f32 {
        let over = level_db - self.threshold_db;
        let half_knee = self.knee_db * 0.5;
        if over <= -half_knee {
            0.0
        } else if over < half_knee {
            let x = over + half_knee;
            self.slope * x * x / (2.0 * self.knee_db)
        } else {
            self.slope * over
        }
    }
}

impl Effect for Compressor {
    fn process(&mut self, sample: f32) -> f32 {
        let level = sample.abs();
        let coeff = if level > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = coeff * self.envelope + (1.0 - coeff) * level;
        sample * db_to_amp(self.gain_db(amp_to_db(self.envelope)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: f32, len: usize) -> impl Iterator<Item = f32> {
        (0..len).map(move |i| (std::f32::consts::TAU * freq * i as f32 / sample_rate).sin())
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn highpass_keeps_highs_and_cuts_lows() {
        let spec = FilterSpec::new(FilterKind::Highpass, 7000.0);
        let run = |freq| {
            let mut filter = Filter::new(&spec, 44_100.0).unwrap();
            let out: Vec<f32> = sine(freq, 44_100.0, 4410).map(|s| filter.process(s)).collect();
            rms(&out[2000..])
        };
        assert!(run(200.0) < 0.01);
        assert!(run(12_000.0) > 0.5);
    }

    #[test]
    fn cutoff_above_nyquist_is_rejected() {
        let spec = FilterSpec::new(FilterKind::Highpass, 7000.0);
        assert!(Filter::new(&spec, 8000.0).is_err());
        assert!(Filter::new(&spec, 48_000.0).is_ok());
    }

    #[test]
    fn compressor_reduces_loud_signal_only() {
        let spec = CompressorSpec {
            threshold_db: -12.0,
            knee_db: 6.0,
            ratio: 4.0,
            attack_secs: 0.001,
            release_secs: 0.1,
        };
        let squash = |amp: f32| {
            let mut comp = Compressor::new(&spec, 44_100.0).unwrap();
            let out: Vec<f32> = sine(100.0, 44_100.0, 8820).map(|s| comp.process(s * amp)).collect();
            rms(&out[4410..]) / (amp / 2f32.sqrt())
        };
        // well under threshold: untouched
        assert!((squash(0.05) - 1.0).abs() < 0.01);
        // way over: pulled down
        assert!(squash(2.0) < 0.5);
    }

    #[test]
    fn knee_is_continuous() {
        let spec = CompressorSpec {
            threshold_db: -12.0,
            knee_db: 6.0,
            ratio: 4.0,
            attack_secs: 0.001,
            release_secs: 0.1,
        };
        let comp = Compressor::new(&spec, 44_100.0).unwrap();
        assert_eq!(comp.gain_db(-15.0), 0.0);
        assert!((comp.gain_db(-9.0) - (-0.75 * 3.0)).abs() < 1e-4);
        assert!(comp.gain_db(-12.0) < 0.0 && comp.gain_db(-12.0) > -0.75 * 3.0);
    }
}
