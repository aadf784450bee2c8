use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::audio_api::{AudioBackend, AudioCommand, AudioSink};
use crate::error::{MachineError, MachineResult};

mod clock;
pub(crate) mod effect;
mod engine;
mod frame;
mod noise_buffer;
mod offline;
pub(crate) mod voice;
mod voice_id;

pub use clock::AudioClock;
pub use effect::Effect;
pub use frame::StereoFrame;
pub use noise_buffer::NoiseBuffer;
pub use offline::OfflineSink;
pub use voice::VoiceInstance;
pub use voice_id::{VoiceId, next_voice_id};

use engine::{Engine, MAX_VOICES};

/// An open output device. Owns the cpal stream, which has to stay on the
/// thread that built it; everything else talks to the device via [`port`].
///
/// [`port`]: AudioHandle::port
pub struct AudioHandle {
    port: Arc<AudioPort>,
    _output_stream: cpal::Stream,
}

impl AudioHandle {
    pub fn port(&self) -> Arc<AudioPort> {
        Arc::clone(&self.port)
    }

    pub fn is_faulted(&self) -> bool {
        self.port.is_faulted()
    }
}

/// The thread-safe side of an [`AudioHandle`].
pub struct AudioPort {
    tx: Sender<AudioCommand>,
    retired_rx: Receiver<Box<VoiceInstance>>,
    clock: AudioClock,
    live: Arc<AtomicUsize>,
    faulted: Arc<AtomicBool>,
}

impl AudioPort {
    fn send(&self, cmd: AudioCommand) {
        if let Err(e) = self.tx.try_send(cmd) {
            tracing::warn!("audio command dropped: {e}");
        }
    }
}

impl AudioSink for AudioPort {
    fn sample_rate(&self) -> u32 {
        self.clock.sample_rate()
    }

    fn now(&self) -> f64 {
        self.clock.now()
    }

    fn start_voice(&self, voice: VoiceInstance) -> MachineResult<()> {
        if self.is_faulted() {
            return Err(MachineError::EngineUnavailable(
                "output stream reported an error".to_string(),
            ));
        }
        match self.tx.try_send(AudioCommand::Start(Box::new(voice))) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(AudioCommand::Start(voice))) => Err(MachineError::voice(
                voice.instrument(),
                "audio command queue is full",
            )),
            Err(_) => Err(MachineError::EngineUnavailable(
                "audio callback has gone away".to_string(),
            )),
        }
    }

    fn release(&self, id: VoiceId) {
        self.send(AudioCommand::Release(id));
    }

    fn release_all(&self) {
        self.send(AudioCommand::ReleaseAll);
    }

    fn reclaim(&self) -> usize {
        self.retired_rx.try_iter().count()
    }

    fn live_voices(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::Acquire)
    }
}

/// Open the default output device and start rendering.
pub fn start_audio() -> anyhow::Result<AudioHandle> {
    let (tx, rx) = crossbeam_channel::bounded::<AudioCommand>(1024);
    let (retired_tx, retired_rx) = crossbeam_channel::bounded(MAX_VOICES * 4);

    let host = cpal::default_host();
    let device = host.default_output_device().context("no default output device")?;
    let config = device.default_output_config().context("no default output config")?;

    let sample_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    tracing::info!(
        device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
        sample_rate,
        channels,
        "opening audio output"
    );

    let clock = AudioClock::new(sample_rate);
    let mut engine = Engine::new(clock.clone());
    engine.set_retired_tx(retired_tx);
    let live = engine.live_counter();
    let faulted = Arc::new(AtomicBool::new(false));

    match config.sample_format() {
        cpal::SampleFormat::F32 => {
            let output_stream = build_output_stream_f32(
                &device,
                &config.into(),
                rx,
                engine,
                channels,
                Arc::clone(&faulted),
            )?;
            output_stream.play().context("failed to play output stream")?;

            Ok(AudioHandle {
                port: Arc::new(AudioPort {
                    tx,
                    retired_rx,
                    clock,
                    live,
                    faulted,
                }),
                _output_stream: output_stream,
            })
        }
        other => anyhow::bail!("unsupported sample format {other:?} (only f32 supported)"),
    }
}

fn build_output_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    rx: Receiver<AudioCommand>,
    mut engine: Engine,
    channels: usize,
    faulted: Arc<AtomicBool>,
) -> anyhow::Result<cpal::Stream> {
    let mut scratch = vec![StereoFrame::zero(); 8192];

    let err_fn = move |err: cpal::StreamError| {
        tracing::error!("audio output stream error: {err}");
        faulted.store(true, Ordering::Release);
    };

    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
            while let Ok(cmd) = rx.try_recv() {
                engine.handle_cmd(cmd);
            }

            let n_frames = data.len() / channels.max(1);
            if scratch.len() < n_frames {
                scratch.resize(n_frames, StereoFrame::zero());
            }
            let frames = &mut scratch[..n_frames];
            engine.render_block(frames);

            for (out, frame) in data.chunks_exact_mut(channels.max(1)).zip(frames.iter()) {
                for (ch, sample) in out.iter_mut().enumerate() {
                    *sample = if ch % 2 == 1 { frame.right } else { frame.left };
                }
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// The default output device, opened lazily and reopened after a fault.
#[derive(Default)]
pub struct DeviceBackend {
    handle: Option<AudioHandle>,
}

impl DeviceBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioBackend for DeviceBackend {
    fn acquire(&mut self) -> MachineResult<Arc<dyn AudioSink>> {
        if let Some(handle) = &self.handle {
            if !handle.is_faulted() {
                return Ok(handle.port());
            }
            tracing::warn!("audio output faulted, reopening");
            self.handle = None;
        }
        let handle = start_audio().map_err(|e| {
            tracing::error!("could not open audio output: {e:#}");
            MachineError::EngineUnavailable(format!("{e:#}"))
        })?;
        let port = handle.port();
        self.handle = Some(handle);
        Ok(port)
    }
}
