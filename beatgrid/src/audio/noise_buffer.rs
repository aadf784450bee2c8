use rand::Rng;

/// White noise rendered once at startup and shared by every noise voice.
#[derive(Clone, Debug)]
pub struct NoiseBuffer {
    pub data: Vec<f32>, // uniform in [-1, 1)
    sample_rate: u32,
}

impl NoiseBuffer {
    pub fn generate<R: Rng + ?Sized>(sample_rate: u32, seconds: f64, rng: &mut R) -> Self {
        let len = (sample_rate as f64 * seconds).ceil() as usize;
        let data = (0..len).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
        Self { data, sample_rate }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn seconds(&self) -> f64 {
        self.data.len() as f64 / self.sample_rate as f64
    }

    // past the end the source has run dry, same as a one-shot buffer player
    pub fn sample(&self, index: usize) -> f32 {
        self.data.get(index).copied().unwrap_or(0.0)
    }
}
