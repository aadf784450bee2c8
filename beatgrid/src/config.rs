// Machine settings. Everything has a default so a config file only needs
// the keys it wants to change.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct MachineConfig {
    pub tempo: f64,
    pub steps: StepRange,
    pub foreground: TimingProfile,
    pub background: TimingProfile,
    pub lifecycle: LifecycleConfig,
    pub noise: NoiseConfig,
    pub resume_after_resize: bool, // restart playback after a step count change
    pub audition_on_toggle: bool,  // play the sound when a cell is switched on
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            tempo: 120.0,
            steps: StepRange::default(),
            foreground: TimingProfile {
                lookahead_secs: 0.1,
                poll_interval_ms: 25,
            },
            background: TimingProfile {
                lookahead_secs: 2.0,
                poll_interval_ms: 1000,
            },
            lifecycle: LifecycleConfig::default(),
            noise: NoiseConfig::default(),
            resume_after_resize: true,
            audition_on_toggle: true,
        }
    }
}

/// Allowed step counts: `min..=max`, reachable from `min` in `increment`s.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StepRange {
    pub min: usize,
    pub max: usize,
    pub increment: usize,
    pub default: usize,
}

impl Default for StepRange {
    fn default() -> Self {
        Self {
            min: 4,
            max: 32,
            increment: 4,
            default: 16,
        }
    }
}

impl StepRange {
    pub fn contains(&self, steps: usize) -> bool {
        self.increment > 0
            && (self.min..=self.max).contains(&steps)
            && (steps - self.min) % self.increment == 0
    }
}

/// How far ahead the scheduler commits triggers and how often it wakes up.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub struct TimingProfile {
    pub lookahead_secs: f64,
    pub poll_interval_ms: u64,
}

impl TimingProfile {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct LifecycleConfig {
    pub stop_guard_secs: f64,     // max ring past the envelope end
    pub teardown_guard_secs: f64, // wall-clock margin before a voice is dropped
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            stop_guard_secs: 0.02,
            teardown_guard_secs: 0.1,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct NoiseConfig {
    pub seed: Option<u64>,
    // None = long enough for the longest noise recipe
    pub seconds: Option<f64>,
}

impl MachineConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let s = &self.steps;
        anyhow::ensure!(s.increment > 0, "steps.increment must be at least 1");
        anyhow::ensure!(
            s.min > 0 && s.min <= s.max,
            "steps.min ({}) must be in 1..=steps.max ({})",
            s.min,
            s.max
        );
        anyhow::ensure!(
            s.contains(s.default),
            "steps.default ({}) is not an allowed step count",
            s.default
        );
        anyhow::ensure!(
            self.tempo.is_finite() && self.tempo > 0.0,
            "tempo must be a positive BPM, got {}",
            self.tempo
        );
        for (name, profile) in [("foreground", self.foreground), ("background", self.background)] {
            anyhow::ensure!(
                profile.lookahead_secs.is_finite() && profile.lookahead_secs > 0.0,
                "{name}.lookahead_secs must be positive"
            );
            anyhow::ensure!(
                profile.poll_interval_ms > 0,
                "{name}.poll_interval_ms must be positive"
            );
        }
        let l = &self.lifecycle;
        anyhow::ensure!(
            l.stop_guard_secs >= 0.0 && l.teardown_guard_secs >= 0.0,
            "lifecycle guards must not be negative"
        );
        if let Some(seconds) = self.noise.seconds {
            anyhow::ensure!(seconds > 0.0, "noise.seconds must be positive");
        }
        Ok(())
    }

    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let config: MachineConfig = toml::from_str(text).context("malformed machine config")?;
        config.validate()?;
        Ok(config)
    }
}

pub fn load(path: &Path) -> anyhow::Result<MachineConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    MachineConfig::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
}
