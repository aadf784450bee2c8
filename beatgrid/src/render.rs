// Offline bounce: run the scheduler against a sink whose clock only moves
// as fast as we render, and collect the mix. Teardown runs on the same
// clock, so a bounce is deterministic for a given noise seed.

use std::path::Path;
use std::sync::RwLock;

use anyhow::Context;

use crate::audio::{OfflineSink, StereoFrame};
use crate::audio_api::AudioSink;
use crate::config::MachineConfig;
use crate::pipeline::session::Session;
use crate::sequencer::{Scheduler, StepSink, TeardownQueue};
use crate::shared::Instrument;
use crate::synth::Synthesizer;

// stop waiting for voices to die out after this long past the end
const MAX_TAIL_SECS: f64 = 5.0;

#[derive(Debug)]
pub struct Bounce {
    pub frames: Vec<StereoFrame>,
    pub sample_rate: u32,
    pub triggers: usize,
    pub skipped: usize,
    pub teardowns: usize,
    pub live_at_end: usize,
}

impl Bounce {
    pub fn seconds(&self) -> f64 {
        self.frames.len() as f64 / self.sample_rate as f64
    }

    pub fn peak(&self) -> f32 {
        self.frames.iter().map(StereoFrame::peak).fold(0.0, f32::max)
    }
}

struct OfflineDispatch<'a> {
    sink: &'a OfflineSink,
    synth: &'a Synthesizer,
    teardowns: &'a mut TeardownQueue<u64>,
    end: f64,
    guard: f64,
    triggers: usize,
    skipped: usize,
}

impl StepSink for OfflineDispatch<'_> {
    fn trigger(&mut self, instrument: Instrument, at: f64) {
        if at >= self.end {
            return;
        }
        let voice = match self.synth.realize(instrument, at, None) {
            Ok(voice) => voice,
            Err(e) => {
                tracing::warn!(%instrument, at, "trigger skipped: {e}");
                self.skipped += 1;
                return;
            }
        };
        let id = voice.id();
        let deadline = at + voice.lifetime() + self.guard;
        if let Err(e) = self.sink.start_voice(voice) {
            tracing::warn!(%instrument, at, "trigger skipped: {e}");
            self.skipped += 1;
            return;
        }
        let rate = self.sink.sample_rate() as f64;
        self.teardowns.schedule(id, (deadline * rate).ceil() as u64);
        self.triggers += 1;
    }

    fn step_advanced(&mut self, _step: usize) {}
}

/// Render `loops` passes over the session's pattern, plus the ring-out.
pub fn bounce(session: &Session, config: &MachineConfig, sample_rate: u32, loops: usize) -> Bounce {
    let sink = OfflineSink::new(sample_rate);
    let synth = Synthesizer::for_config(sample_rate, config);
    let shared = RwLock::new(session.clone());
    let mut scheduler = Scheduler::new(config);
    let mut teardowns = TeardownQueue::new();

    let end = loops as f64 * session.pattern.step_count() as f64 * session.tempo.seconds_per_step();
    let block = (scheduler.timing().poll_interval().as_secs_f64() * sample_rate as f64)
        .round()
        .max(1.0) as usize;
    let end_frame = (end * sample_rate as f64).round() as u64;
    let tail_frame = end_frame + (MAX_TAIL_SECS * sample_rate as f64) as u64;

    let mut frames = Vec::with_capacity(end_frame as usize);
    let mut dispatch = OfflineDispatch {
        sink: &sink,
        synth: &synth,
        teardowns: &mut teardowns,
        end,
        guard: config.lifecycle.teardown_guard_secs,
        triggers: 0,
        skipped: 0,
    };
    let mut fired = 0;

    scheduler.start(sink.now());
    loop {
        let now_frame = sink.clock().frames();
        if now_frame < end_frame {
            scheduler.poll(sink.now(), &shared, &mut dispatch);
        } else if sink.live_voices() == 0 || now_frame >= tail_frame {
            break;
        }
        let limit = if now_frame < end_frame { end_frame } else { tail_frame };
        let len = block.min((limit - now_frame) as usize);
        frames.extend(sink.render(len));

        for id in dispatch.teardowns.drain_due(sink.clock().frames()) {
            sink.release(id);
            fired += 1;
        }
        sink.reclaim();
    }
    scheduler.stop();

    // the rest of the teardowns are for voices that already finished
    for id in dispatch.teardowns.drain_due(u64::MAX) {
        sink.release(id);
        fired += 1;
    }
    sink.reclaim();

    Bounce {
        frames,
        sample_rate,
        triggers: dispatch.triggers,
        skipped: dispatch.skipped,
        teardowns: fired,
        live_at_end: sink.live_voices(),
    }
}

pub fn write_wav(path: &Path, bounce: &Bounce) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate: bounce.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("creating {}", path.display()))?;
    let to_i16 = |s: f32| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
    for frame in &bounce.frames {
        writer.write_sample(to_i16(frame.left))?;
        writer.write_sample(to_i16(frame.right))?;
    }
    writer.finalize().context("finalizing wav")?;
    Ok(())
}
