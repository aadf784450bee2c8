// One stereo frame of the mix. Voices are mono and land on both sides.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StereoFrame {
    pub left: f32,
    pub right: f32,
}

impl StereoFrame {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn add_mono(&mut self, sample: f32) {
        self.left += sample;
        self.right += sample;
    }

    pub fn peak(&self) -> f32 {
        self.left.abs().max(self.right.abs())
    }
}
