//! Declarative voice definitions.
//!
//! A recipe is plain data: which generators to run, how each is filtered and
//! enveloped, and whether the layers share a compressor. Recipes are
//! `'static` and read by every voice of their instrument; nothing in here
//! holds per-voice state.

/// Exponential ramps never reach zero, so targets are clamped to this.
pub const EXP_FLOOR: f32 = 1e-3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Curve {
    Linear,
    Exponential,
}

/// Ramp to `value`, arriving `offset` seconds after the trigger.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Anchor {
    pub offset: f64,
    pub value: f32,
    pub curve: Curve,
}

impl Anchor {
    pub const fn exp(offset: f64, value: f32) -> Self {
        Self {
            offset,
            value,
            curve: Curve::Exponential,
        }
    }

    pub const fn linear(offset: f64, value: f32) -> Self {
        Self {
            offset,
            value,
            curve: Curve::Linear,
        }
    }

    fn settled(&self) -> f32 {
        match self.curve {
            Curve::Linear => self.value,
            Curve::Exponential => self.value.max(EXP_FLOOR),
        }
    }
}

/// A value that starts at `start` on the trigger and follows `anchors`
/// (sorted by offset), holding the last value afterwards.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Envelope {
    pub start: f32,
    pub anchors: &'static [Anchor],
}

impl Envelope {
    pub const fn new(start: f32, anchors: &'static [Anchor]) -> Self {
        Self { start, anchors }
    }

    /// Offset of the last anchor.
    pub fn end(&self) -> f64 {
        self.anchors.last().map_or(0.0, |a| a.offset)
    }

    /// Value `t` seconds after the trigger.
    pub fn value_at(&self, t: f64) -> f32 {
        let mut t0 = 0.0;
        let mut v0 = self.start;
        if t <= 0.0 {
            return v0;
        }
        for anchor in self.anchors {
            if t < anchor.offset {
                let span = anchor.offset - t0;
                let frac = ((t - t0) / span) as f32;
                return match anchor.curve {
                    Curve::Linear => v0 + (anchor.value - v0) * frac,
                    Curve::Exponential => {
                        let from = v0.max(EXP_FLOOR);
                        from * (anchor.settled() / from).powf(frac)
                    }
                };
            }
            t0 = anchor.offset;
            v0 = anchor.settled();
        }
        v0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
    Square,
    Sawtooth,
}

impl Waveform {
    /// One cycle over `phase` in [0, 1).
    pub fn sample(self, phase: f32) -> f32 {
        match self {
            Waveform::Sine => (phase * std::f32::consts::TAU).sin(),
            Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            Waveform::Sawtooth => 2.0 * phase - 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Source {
    Oscillator {
        waveform: Waveform,
        frequency: Envelope,
    },
    // reads the shared noise buffer from its start for `duration` seconds
    Noise {
        duration: f64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterKind {
    Lowpass,
    Highpass,
    Bandpass,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FilterSpec {
    pub kind: FilterKind,
    pub cutoff: f32,
    pub q: Option<f32>,
}

impl FilterSpec {
    pub const fn new(kind: FilterKind, cutoff: f32) -> Self {
        Self { kind, cutoff, q: None }
    }

    pub const fn with_q(mut self, q: f32) -> Self {
        self.q = Some(q);
        self
    }

    pub fn q(&self) -> f32 {
        match (self.q, self.kind) {
            (Some(q), _) => q,
            (None, FilterKind::Bandpass) => 1.0,
            (None, _) => biquad::Q_BUTTERWORTH_F32,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompressorSpec {
    pub threshold_db: f32,
    pub knee_db: f32,
    pub ratio: f32,
    pub attack_secs: f32,
    pub release_secs: f32,
}

/// One generator and its own shaping: source -> filters -> gain envelope.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Layer {
    pub source: Source,
    pub filters: &'static [FilterSpec],
    pub gain: Envelope,
}

/// Layers are summed, then optionally glued by one shared compressor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoiceRecipe {
    pub layers: &'static [Layer],
    pub compressor: Option<CompressorSpec>,
}

impl VoiceRecipe {
    /// Where the longest envelope in the recipe settles. This is the
    /// default ring time of a voice.
    pub fn envelope_end(&self) -> f64 {
        self.layers
            .iter()
            .flat_map(|layer| {
                let freq_end = match layer.source {
                    Source::Oscillator { frequency, .. } => frequency.end(),
                    Source::Noise { .. } => 0.0,
                };
                [layer.gain.end(), freq_end]
            })
            .fold(0.0, f64::max)
    }

    /// Seconds of noise the recipe reads, 0 if it has no noise layer.
    pub fn noise_secs(&self) -> f64 {
        self.layers
            .iter()
            .filter_map(|layer| match layer.source {
                Source::Noise { duration } => Some(duration),
                Source::Oscillator { .. } => None,
            })
            .fold(0.0, f64::max)
    }

    pub fn needs_noise(&self) -> bool {
        self.layers
            .iter()
            .any(|layer| matches!(layer.source, Source::Noise { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn exponential_ramp_hits_anchor_and_holds() {
        static FALL: [Anchor; 1] = [Anchor::exp(0.2, 30.0)];
        let env = Envelope::new(60.0, &FALL);
        assert_eq!(env.value_at(0.0), 60.0);
        // geometric midpoint
        assert!(close(env.value_at(0.1), (60.0f32 * 30.0).sqrt()));
        assert!(close(env.value_at(0.2), 30.0));
        assert!(close(env.value_at(5.0), 30.0));
        assert_eq!(env.end(), 0.2);
    }

    #[test]
    fn exponential_target_is_floored() {
        static TO_ZERO: [Anchor; 1] = [Anchor::exp(0.1, 0.0)];
        let env = Envelope::new(1.0, &TO_ZERO);
        assert!(close(env.value_at(0.1), EXP_FLOOR));
        let mid = env.value_at(0.05);
        assert!(mid.is_finite() && mid > EXP_FLOOR && mid < 1.0, "{mid}");
    }

    #[test]
    fn linear_segments_chain() {
        static SHAPE: [Anchor; 2] = [Anchor::linear(0.1, 1.0), Anchor::linear(0.3, 0.0)];
        let env = Envelope::new(0.0, &SHAPE);
        assert!(close(env.value_at(0.05), 0.5));
        assert!(close(env.value_at(0.1), 1.0));
        assert!(close(env.value_at(0.2), 0.5));
        assert!(close(env.value_at(0.4), 0.0));
    }

    #[test]
    fn waveforms_span_unit_range() {
        for waveform in [Waveform::Sine, Waveform::Triangle, Waveform::Square, Waveform::Sawtooth] {
            let (lo, hi) = (0..1000)
                .map(|i| waveform.sample(i as f32 / 1000.0))
                .fold((f32::MAX, f32::MIN), |(lo, hi), s| (lo.min(s), hi.max(s)));
            assert!(lo >= -1.0 && hi <= 1.0, "{waveform:?}");
            assert!(hi - lo > 1.9, "{waveform:?} spans {lo}..{hi}");
        }
    }

    #[test]
    fn default_q_depends_on_kind() {
        assert_eq!(FilterSpec::new(FilterKind::Bandpass, 3000.0).q(), 1.0);
        assert_eq!(
            FilterSpec::new(FilterKind::Highpass, 7000.0).q(),
            biquad::Q_BUTTERWORTH_F32
        );
        assert_eq!(FilterSpec::new(FilterKind::Lowpass, 500.0).with_q(4.0).q(), 4.0);
    }
}
