//! The drum machine as the outside world sees it.
//!
//! [`DrumMachine`] ties the pieces together: the shared pattern and tempo,
//! an audio backend, the transport thread while playing, and the reaper
//! that tears voices down. Every method is non-blocking apart from `stop`,
//! which waits for the poll thread to exit (at most one poll).

use std::sync::{Arc, Mutex, PoisonError};

use rand::Rng;

use crate::audio::VoiceId;
use crate::audio_api::{AudioBackend, AudioSink};
use crate::config::MachineConfig;
use crate::error::{MachineError, MachineResult, PatternImportMismatch};
use crate::pipeline::pattern::Pattern;
use crate::pipeline::persistence::{self, SavedPattern};
use crate::pipeline::session::{self, Session, SharedSession, Tempo};
use crate::sequencer::{Reaper, Scheduler, StepListener, StepListeners, Transport, Voicer};
use crate::shared::{Instrument, Mode};
use crate::synth::Synthesizer;

pub struct DrumMachine {
    config: MachineConfig,
    session: SharedSession,
    backend: Box<dyn AudioBackend>,
    voicer: Option<Voicer>, // None until the first sink is acquired
    transport: Option<Transport>,
    reaper: Reaper,
    mode: Mode,
    listeners: StepListeners,
}

impl DrumMachine {
    pub fn new(config: MachineConfig, backend: Box<dyn AudioBackend>) -> MachineResult<Self> {
        let session = Session::new_shared(&config)?;
        let reaper = Reaper::spawn()
            .map_err(|e| MachineError::EngineUnavailable(format!("could not start reaper: {e}")))?;
        Ok(Self {
            config,
            session,
            backend,
            voicer: None,
            transport: None,
            reaper,
            mode: Mode::Foreground,
            listeners: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    // Get a voicer for the current sink, acquiring (or re-acquiring) the
    // output on the way. A new sample rate means a new synthesizer. A
    // running transport still bound to an old sink is restarted on the new
    // one from step 0.
    fn voicer(&mut self) -> MachineResult<Voicer> {
        let sink = match self.backend.acquire() {
            Ok(sink) => sink,
            Err(e) => {
                if self.transport.as_ref().is_some_and(|t| t.sink().is_faulted()) {
                    self.stop();
                }
                return Err(e);
            }
        };
        let current = self
            .voicer
            .as_ref()
            .filter(|voicer| Arc::ptr_eq(voicer.sink(), &sink))
            .cloned();
        let voicer = match current {
            Some(voicer) => voicer,
            None => {
                let synth = Arc::new(Synthesizer::for_config(sink.sample_rate(), &self.config));
                tracing::debug!(sample_rate = sink.sample_rate(), "audio sink acquired");
                let voicer = Voicer::new(
                    sink,
                    synth,
                    self.reaper.handle(),
                    self.config.lifecycle.teardown_guard_secs,
                );
                self.voicer = Some(voicer.clone());
                voicer
            }
        };

        let stale = self
            .transport
            .as_ref()
            .is_some_and(|t| !t.is_running() || !Arc::ptr_eq(t.sink(), voicer.sink()));
        if stale {
            tracing::warn!("audio output changed, restarting playback");
            self.start_transport(voicer.clone())?;
        }
        Ok(voicer)
    }

    fn start_transport(&mut self, voicer: Voicer) -> MachineResult<()> {
        if let Some(old) = self.transport.take() {
            old.stop();
        }
        let mut scheduler = Scheduler::new(&self.config);
        scheduler.set_mode(self.mode);
        let transport = Transport::start(
            scheduler,
            Arc::clone(&self.session),
            voicer,
            Arc::clone(&self.listeners),
        )
        .map_err(|e| MachineError::EngineUnavailable(format!("could not start transport: {e}")))?;
        self.transport = Some(transport);
        Ok(())
    }

    /// Flip one cell. Switching a cell on also plays it once, if enabled.
    pub fn toggle_cell(&mut self, instrument: Instrument, step: usize) -> MachineResult<bool> {
        let active = session::write(&self.session).pattern.toggle(instrument, step)?;
        if active && self.config.audition_on_toggle {
            if let Err(e) = self.preview(instrument) {
                tracing::warn!(%instrument, "audition failed: {e}");
            }
        }
        Ok(active)
    }

    /// Set one cell without auditioning it.
    pub fn set_cell(&mut self, instrument: Instrument, step: usize, active: bool) -> MachineResult<()> {
        session::write(&self.session).pattern.set(instrument, step, active)
    }

    pub fn is_active(&self, instrument: Instrument, step: usize) -> bool {
        session::read(&self.session).pattern.get(instrument, step)
    }

    /// Snapshot of the grid.
    pub fn pattern(&self) -> Pattern {
        session::read(&self.session).pattern.clone()
    }

    /// Copy of the pattern and tempo, e.g. for an offline bounce.
    pub fn snapshot(&self) -> Session {
        session::read(&self.session).clone()
    }

    /// Takes effect from the next step the scheduler computes.
    pub fn set_tempo(&mut self, bpm: f64) -> MachineResult<()> {
        let tempo = Tempo::new(bpm)?;
        session::write(&self.session).tempo = tempo;
        Ok(())
    }

    pub fn tempo(&self) -> f64 {
        session::read(&self.session).tempo.bpm()
    }

    /// Resize the grid. Playback is stopped around the remap and, if
    /// configured, restarted from step 0.
    pub fn set_step_count(&mut self, steps: usize) -> MachineResult<()> {
        let range = self.config.steps;
        if !range.contains(steps) {
            return Err(MachineError::InvalidStepCount {
                requested: steps,
                min: range.min,
                max: range.max,
                increment: range.increment,
            });
        }
        if steps == self.step_count() {
            return Ok(());
        }
        let was_playing = self.is_playing();
        self.stop();
        session::write(&self.session).pattern.resize(steps, &range)?;
        tracing::debug!(steps, "step count changed");
        if was_playing && self.config.resume_after_resize {
            self.play()?;
        }
        Ok(())
    }

    pub fn step_count(&self) -> usize {
        session::read(&self.session).pattern.step_count()
    }

    /// Start playing from step 0. While already playing this checks the
    /// output instead: a lost device is reopened (playback restarts on it)
    /// or reported as `EngineUnavailable`.
    pub fn play(&mut self) -> MachineResult<()> {
        let voicer = self.voicer()?;
        if self.is_playing() {
            return Ok(());
        }
        self.start_transport(voicer)?;
        tracing::info!(tempo = self.tempo(), steps = self.step_count(), "playing");
        Ok(())
    }

    /// Stop stepping. Sounds already started ring out.
    pub fn stop(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.stop();
            tracing::info!("stopped");
        }
    }

    /// Returns whether the machine is playing afterwards.
    pub fn toggle_play(&mut self) -> MachineResult<bool> {
        if self.is_playing() {
            self.stop();
        } else {
            self.play()?;
        }
        Ok(self.is_playing())
    }

    /// False after a fault stopped the transport, even before `stop`.
    pub fn is_playing(&self) -> bool {
        self.transport.as_ref().is_some_and(Transport::is_running)
    }

    /// Told by the host when it becomes hidden or visible.
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        if let Some(transport) = &self.transport {
            transport.set_mode(mode);
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Called from the transport thread once per step, in foreground only.
    /// The callback must not register further callbacks.
    pub fn on_step_advance(&mut self, callback: impl FnMut(usize) + Send + 'static) {
        let listener: StepListener = Box::new(callback);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    pub fn export_pattern(&self) -> SavedPattern {
        persistence::export(&session::read(&self.session))
    }

    /// Load `saved` into the grid. Rows that don't fit are skipped and
    /// returned; the rest are applied.
    pub fn import_pattern(&mut self, saved: &SavedPattern) -> Vec<PatternImportMismatch> {
        let warnings = persistence::import(&mut session::write(&self.session), saved);
        for warning in &warnings {
            tracing::warn!("pattern import: {warning}");
        }
        warnings
    }

    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R, density: f64) {
        session::write(&self.session).pattern.randomize(rng, density);
    }

    pub fn reverse(&mut self) {
        session::write(&self.session).pattern.reverse();
    }

    pub fn clear(&mut self) {
        session::write(&self.session).pattern.clear();
    }

    /// Play one instrument now, outside the pattern.
    pub fn preview(&mut self, instrument: Instrument) -> MachineResult<VoiceId> {
        self.voicer()?.trigger_now(instrument)
    }

    /// Voices the output is still holding.
    pub fn live_voices(&self) -> usize {
        self.voicer.as_ref().map_or(0, |v| v.sink().live_voices())
    }

    /// Stop everything now: no ring-out, pending teardowns dropped.
    pub fn destroy(&mut self) {
        self.stop();
        self.reaper.handle().cancel_all();
        if let Some(voicer) = self.voicer.take() {
            let sink: &Arc<dyn AudioSink> = voicer.sink();
            sink.release_all();
            sink.reclaim();
        }
    }
}

impl Drop for DrumMachine {
    fn drop(&mut self) {
        self.destroy();
    }
}
