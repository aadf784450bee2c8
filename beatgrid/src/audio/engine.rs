use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::Sender;

use super::clock::AudioClock;
use super::frame::StereoFrame;
use super::voice::VoiceInstance;
use crate::audio_api::AudioCommand;

pub(crate) const MAX_VOICES: usize = 256; // reserved up front so starting a voice won't malloc

/// The mixer that runs inside the render callback.
///
/// Owns every started voice until it finishes or is released, then hands
/// it back over `retired_tx` so the drop happens elsewhere.
pub struct Engine {
    voices: Vec<Box<VoiceInstance>>,
    clock: AudioClock,
    retired_tx: Option<Sender<Box<VoiceInstance>>>,
    live: Arc<AtomicUsize>,
}

impl Engine {
    pub fn new(clock: AudioClock) -> Self {
        Self {
            voices: Vec::with_capacity(MAX_VOICES),
            clock,
            retired_tx: None,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_retired_tx(&mut self, tx: Sender<Box<VoiceInstance>>) {
        self.retired_tx = Some(tx);
    }

    pub fn clock(&self) -> &AudioClock {
        &self.clock
    }

    /// Counter that mirrors the number of voices held here.
    pub fn live_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.live)
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn handle_cmd(&mut self, cmd: AudioCommand) {
        match cmd {
            AudioCommand::Start(voice) => {
                if self.voices.len() >= MAX_VOICES {
                    // full: steal the voice that started first
                    if let Some(pos) = self.oldest() {
                        let oldest = self.voices.swap_remove(pos);
                        self.retire(oldest);
                    }
                }
                self.voices.push(voice);
            }
            AudioCommand::Release(id) => {
                if let Some(pos) = self.voices.iter().position(|v| v.id() == id) {
                    let voice = self.voices.swap_remove(pos);
                    self.retire(voice);
                }
            }
            AudioCommand::ReleaseAll => {
                while let Some(voice) = self.voices.pop() {
                    self.retire(voice);
                }
            }
        }
        self.live.store(self.voices.len(), Ordering::Release);
    }

    /// Mix all voices into `out` and move the clock past it.
    pub fn render_block(&mut self, out: &mut [StereoFrame]) {
        out.fill(StereoFrame::zero());
        let first_frame = self.clock.frames();
        for voice in &mut self.voices {
            voice.render_into(first_frame, out);
        }
        let next_frame = first_frame + out.len() as u64;
        self.clock.advance(out.len() as u64);

        let mut i = 0;
        while i < self.voices.len() {
            if self.voices[i].is_finished(next_frame) {
                let voice = self.voices.swap_remove(i);
                self.retire(voice);
            } else {
                i += 1;
            }
        }
        self.live.store(self.voices.len(), Ordering::Release);
    }

    // swap_remove reorders the table, so age comes from the start time
    fn oldest(&self) -> Option<usize> {
        self.voices
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.start().total_cmp(&b.start()))
            .map(|(pos, _)| pos)
    }

    fn retire(&mut self, voice: Box<VoiceInstance>) {
        if let Some(tx) = &self.retired_tx {
            // on a full channel the voice comes back and is dropped here
            let _ = tx.try_send(voice);
        }
    }
}
