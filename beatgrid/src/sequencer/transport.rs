// The poll loop. One thread per play: it runs the scheduler, sleeps for
// whatever delay the scheduler asks for, and exits on Stop. Stopping is a
// single message; there is no self-rescheduling timer to chase down. The
// thread also exits on its own once its sink reports a fault.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use super::scheduler::{Scheduler, StepSink};
use super::voicer::Voicer;
use crate::audio_api::AudioSink;
use crate::pipeline::session::SharedSession;
use crate::shared::{Instrument, Mode};

pub type StepListener = Box<dyn FnMut(usize) + Send>;

/// Step-advance callbacks, shared with whoever registers them.
pub type StepListeners = Arc<Mutex<Vec<StepListener>>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportCommand {
    SetMode(Mode),
    Stop,
}

pub struct Transport {
    tx: Sender<TransportCommand>,
    sink: Arc<dyn AudioSink>,
    thread: Option<JoinHandle<()>>,
}

impl Transport {
    /// Start `scheduler` from step 0 at the sink's current time.
    pub fn start(
        mut scheduler: Scheduler,
        session: SharedSession,
        voicer: Voicer,
        listeners: StepListeners,
    ) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let sink = Arc::clone(voicer.sink());
        scheduler.start(voicer.now());
        let thread = thread::Builder::new()
            .name("beatgrid-transport".into())
            .spawn(move || run(scheduler, session, voicer, listeners, rx))?;
        Ok(Self {
            tx,
            sink,
            thread: Some(thread),
        })
    }

    /// The sink this transport triggers into.
    pub fn sink(&self) -> &Arc<dyn AudioSink> {
        &self.sink
    }

    /// False once the poll thread has exited, e.g. after a fault.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn set_mode(&self, mode: Mode) {
        let _ = self.tx.send(TransportCommand::SetMode(mode));
    }

    /// Stop polling. Triggers already handed to the sink keep ringing.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.tx.send(TransportCommand::Stop);
        if let Some(thread) = self.thread.take() {
            // a step listener stopping playback can't wait for itself
            if thread.thread().id() == thread::current().id() {
                return;
            }
            if thread.join().is_err() {
                tracing::error!("transport thread panicked");
            }
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Dispatch<'a> {
    voicer: &'a Voicer,
    listeners: &'a StepListeners,
}

impl StepSink for Dispatch<'_> {
    fn trigger(&mut self, instrument: Instrument, at: f64) {
        // one bad voice never takes the rest of the step with it
        if let Err(e) = self.voicer.trigger(instrument, at) {
            tracing::warn!(%instrument, at, "trigger skipped: {e}");
        }
    }

    fn step_advanced(&mut self, step: usize) {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners.iter_mut() {
            listener(step);
        }
    }
}

fn run(
    mut scheduler: Scheduler,
    session: SharedSession,
    voicer: Voicer,
    listeners: StepListeners,
    rx: Receiver<TransportCommand>,
) {
    tracing::debug!(mode = ?scheduler.mode(), "transport running");
    let mut dispatch = Dispatch {
        voicer: &voicer,
        listeners: &listeners,
    };
    loop {
        if voicer.sink().is_faulted() {
            tracing::error!("audio output faulted, transport stopping");
            break;
        }
        let delay = scheduler.poll(voicer.now(), &session, &mut dispatch);
        crossbeam_channel::select! {
            recv(rx) -> cmd => match cmd {
                Ok(TransportCommand::SetMode(mode)) => {
                    tracing::debug!(?mode, "transport mode changed");
                    scheduler.set_mode(mode);
                }
                Ok(TransportCommand::Stop) | Err(_) => break,
            },
            recv(crossbeam_channel::after(delay)) -> _ => {}
        }
    }
    scheduler.stop();
    tracing::debug!("transport stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{OfflineSink, VoiceId, VoiceInstance};
    use crate::config::MachineConfig;
    use crate::error::MachineResult;
    use crate::pipeline::session::{self, Session};
    use crate::sequencer::lifecycle::Reaper;
    use crate::synth::Synthesizer;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant};

    // an offline sink whose output can be made to fail
    struct Flaky {
        inner: OfflineSink,
        faulted: AtomicBool,
    }

    impl AudioSink for Flaky {
        fn sample_rate(&self) -> u32 {
            self.inner.sample_rate()
        }
        fn now(&self) -> f64 {
            self.inner.now()
        }
        fn start_voice(&self, voice: VoiceInstance) -> MachineResult<()> {
            self.inner.start_voice(voice)
        }
        fn release(&self, id: VoiceId) {
            self.inner.release(id);
        }
        fn release_all(&self) {
            self.inner.release_all();
        }
        fn reclaim(&self) -> usize {
            self.inner.reclaim()
        }
        fn live_voices(&self) -> usize {
            self.inner.live_voices()
        }
        fn is_faulted(&self) -> bool {
            self.faulted.load(Ordering::Acquire)
        }
    }

    #[test]
    fn runs_until_stopped_and_reports_steps() {
        let config = MachineConfig::default();
        let shared = Session::new_shared(&config).unwrap();
        session::write(&shared)
            .pattern
            .set(Instrument::Kick, 0, true)
            .unwrap();

        let sink: Arc<dyn AudioSink> = Arc::new(OfflineSink::new(8000));
        let reaper = Reaper::spawn().unwrap();
        let voicer = Voicer::new(
            Arc::clone(&sink),
            Arc::new(Synthesizer::new(8000, None, 0.0)),
            reaper.handle(),
            0.1,
        );
        let steps = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&steps);
        let listener: StepListener = Box::new(move |step: usize| {
            seen.lock().unwrap().push(step);
        });
        let listeners: StepListeners = Arc::new(Mutex::new(vec![listener]));

        let transport = Transport::start(Scheduler::new(&config), shared, voicer, listeners).unwrap();
        thread::sleep(Duration::from_millis(100));
        transport.stop();

        // the offline clock never moved: exactly step 0 sits inside the window
        assert_eq!(*steps.lock().unwrap(), vec![0]);
        assert_eq!(sink.live_voices(), 1);
    }

    #[test]
    fn stops_by_itself_when_the_sink_faults() {
        let config = MachineConfig::default();
        let shared = Session::new_shared(&config).unwrap();
        let flaky = Arc::new(Flaky {
            inner: OfflineSink::new(8000),
            faulted: AtomicBool::new(false),
        });
        let sink: Arc<dyn AudioSink> = flaky.clone();
        let reaper = Reaper::spawn().unwrap();
        let voicer = Voicer::new(
            Arc::clone(&sink),
            Arc::new(Synthesizer::new(8000, None, 0.0)),
            reaper.handle(),
            0.1,
        );
        let listeners: StepListeners = Arc::new(Mutex::new(Vec::new()));
        let transport = Transport::start(Scheduler::new(&config), shared, voicer, listeners).unwrap();
        assert!(Arc::ptr_eq(transport.sink(), &sink));
        thread::sleep(Duration::from_millis(50));
        assert!(transport.is_running());

        flaky.faulted.store(true, Ordering::Release);
        let give_up = Instant::now() + Duration::from_secs(2);
        while transport.is_running() && Instant::now() < give_up {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!transport.is_running());
        transport.stop();
    }
}
