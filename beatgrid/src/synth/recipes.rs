// The drum kit. One recipe per instrument, all 'static.

use super::recipe::{
    Anchor, CompressorSpec, Envelope, FilterKind, FilterSpec, Layer, Source, VoiceRecipe, Waveform,
};
use crate::shared::Instrument;

// sub + click + body, glued by one compressor
static KICK: VoiceRecipe = VoiceRecipe {
    layers: &[
        Layer {
            source: Source::Oscillator {
                waveform: Waveform::Sine,
                frequency: Envelope::new(60.0, &[Anchor::exp(0.2, 30.0)]),
            },
            filters: &[],
            gain: Envelope::new(2.0, &[Anchor::exp(0.4, 0.001)]),
        },
        Layer {
            source: Source::Oscillator {
                waveform: Waveform::Triangle,
                frequency: Envelope::new(200.0, &[Anchor::exp(0.02, 40.0)]),
            },
            filters: &[],
            gain: Envelope::new(1.0, &[Anchor::exp(0.05, 0.001)]),
        },
        Layer {
            source: Source::Oscillator {
                waveform: Waveform::Sine,
                frequency: Envelope::new(120.0, &[Anchor::exp(0.1, 50.0)]),
            },
            filters: &[],
            gain: Envelope::new(1.0, &[Anchor::exp(0.2, 0.001)]),
        },
    ],
    compressor: Some(CompressorSpec {
        threshold_db: -12.0,
        knee_db: 6.0,
        ratio: 4.0,
        attack_secs: 0.001,
        release_secs: 0.1,
    }),
};

static SNARE: VoiceRecipe = VoiceRecipe {
    layers: &[Layer {
        source: Source::Noise { duration: 0.2 },
        filters: &[FilterSpec::new(FilterKind::Bandpass, 3000.0)],
        gain: Envelope::new(0.7, &[Anchor::exp(0.2, 0.01)]),
    }],
    compressor: None,
};

static CLAP: VoiceRecipe = VoiceRecipe {
    layers: &[Layer {
        source: Source::Noise { duration: 0.1 },
        filters: &[],
        gain: Envelope::new(0.8, &[Anchor::exp(0.1, 0.01)]),
    }],
    compressor: None,
};

static CLOSED_HIHAT: VoiceRecipe = VoiceRecipe {
    layers: &[Layer {
        source: Source::Noise { duration: 0.1 },
        filters: &[FilterSpec::new(FilterKind::Highpass, 7000.0)],
        gain: Envelope::new(0.3, &[Anchor::exp(0.1, 0.01)]),
    }],
    compressor: None,
};

static OPEN_HIHAT: VoiceRecipe = VoiceRecipe {
    layers: &[Layer {
        source: Source::Noise { duration: 0.3 },
        filters: &[FilterSpec::new(FilterKind::Highpass, 7000.0)],
        gain: Envelope::new(0.3, &[Anchor::exp(0.3, 0.01)]),
    }],
    compressor: None,
};

static HIGH_TOM: VoiceRecipe = VoiceRecipe {
    layers: &[Layer {
        source: Source::Oscillator {
            waveform: Waveform::Sine,
            frequency: Envelope::new(200.0, &[Anchor::exp(0.1, 100.0)]),
        },
        filters: &[],
        gain: Envelope::new(0.8, &[Anchor::exp(0.1, 0.01)]),
    }],
    compressor: None,
};

static LOW_TOM: VoiceRecipe = VoiceRecipe {
    layers: &[Layer {
        source: Source::Oscillator {
            waveform: Waveform::Sine,
            frequency: Envelope::new(100.0, &[Anchor::exp(0.15, 50.0)]),
        },
        filters: &[],
        gain: Envelope::new(0.8, &[Anchor::exp(0.15, 0.01)]),
    }],
    compressor: None,
};

static CRASH: VoiceRecipe = VoiceRecipe {
    layers: &[Layer {
        source: Source::Noise { duration: 1.0 },
        filters: &[FilterSpec::new(FilterKind::Highpass, 5000.0)],
        gain: Envelope::new(0.5, &[Anchor::exp(1.0, 0.01)]),
    }],
    compressor: None,
};

// band around 8k, then highpassed again to thin it out
static RIDE: VoiceRecipe = VoiceRecipe {
    layers: &[Layer {
        source: Source::Noise { duration: 0.8 },
        filters: &[
            FilterSpec::new(FilterKind::Bandpass, 8000.0).with_q(1.0),
            FilterSpec::new(FilterKind::Highpass, 6000.0),
        ],
        gain: Envelope::new(0.3, &[Anchor::exp(0.8, 0.01)]),
    }],
    compressor: None,
};

impl Instrument {
    pub fn recipe(self) -> &'static VoiceRecipe {
        match self {
            Instrument::Kick => &KICK,
            Instrument::Snare => &SNARE,
            Instrument::Clap => &CLAP,
            Instrument::ClosedHihat => &CLOSED_HIHAT,
            Instrument::OpenHihat => &OPEN_HIHAT,
            Instrument::HighTom => &HIGH_TOM,
            Instrument::LowTom => &LOW_TOM,
            Instrument::Crash => &CRASH,
            Instrument::Ride => &RIDE,
        }
    }
}

/// Noise the whole kit needs: the longest noise layer of any recipe.
pub fn kit_noise_secs() -> f64 {
    Instrument::ALL
        .iter()
        .map(|i| i.recipe().noise_secs())
        .fold(0.0, f64::max)
}
