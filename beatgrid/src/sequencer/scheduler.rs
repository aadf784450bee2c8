//! The step scheduler.
//!
//! A pure state machine: it is handed the audio clock reading on every poll
//! and commits every step that falls inside the lookahead window. Nothing
//! in here sleeps or owns a thread; see [`super::transport`] for the loop
//! that drives it against a real device.

use std::sync::RwLock;
use std::time::Duration;

use crate::config::{MachineConfig, TimingProfile};
use crate::pipeline::session::{self, Session};
use crate::shared::{Instrument, Mode};

/// Receives what a poll commits.
pub trait StepSink {
    /// Start `instrument` at `at` on the audio clock.
    fn trigger(&mut self, instrument: Instrument, at: f64);

    /// The cursor moved past `step`. Only called in foreground.
    fn step_advanced(&mut self, step: usize);
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TransportState {
    Stopped,
    Running {
        current_step: usize,
        next_event_time: f64,
    },
}

#[derive(Clone, Debug)]
pub struct Scheduler {
    state: TransportState,
    mode: Mode,
    foreground: TimingProfile,
    background: TimingProfile,
}

impl Scheduler {
    pub fn new(config: &MachineConfig) -> Self {
        Self {
            state: TransportState::Stopped,
            mode: Mode::Foreground,
            foreground: config.foreground,
            background: config.background,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, TransportState::Running { .. })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn timing(&self) -> TimingProfile {
        match self.mode {
            Mode::Foreground => self.foreground,
            Mode::Background => self.background,
        }
    }

    /// Only the poll cadence and window change; committed times stay put.
    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Begin at step 0, with the first step due right now.
    pub fn start(&mut self, now: f64) {
        self.state = TransportState::Running {
            current_step: 0,
            next_event_time: now,
        };
    }

    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
    }

    /// Commit every step due before `now + lookahead` and return how long
    /// to wait before polling again.
    ///
    /// Each step's cells and the tempo are read under one short read lock
    /// that is released before anything is dispatched, so a sink may edit
    /// the pattern from inside `trigger` without affecting the batch.
    pub fn poll<S: StepSink + ?Sized>(
        &mut self,
        now: f64,
        session: &RwLock<Session>,
        sink: &mut S,
    ) -> Duration {
        let timing = self.timing();
        let horizon = now + timing.lookahead_secs;

        while let TransportState::Running {
            current_step,
            next_event_time,
        } = self.state
        {
            if next_event_time >= horizon {
                break;
            }
            let (step, active, seconds_per_step, step_count) = {
                let session = session::read(session);
                let step_count = session.pattern.step_count();
                // step count only changes while stopped, but don't trust it
                let step = if current_step < step_count { current_step } else { 0 };
                (
                    step,
                    session.pattern.active_at(step),
                    session.tempo.seconds_per_step(),
                    step_count,
                )
            };

            for instrument in active {
                sink.trigger(instrument, next_event_time);
            }
            if self.mode == Mode::Foreground {
                sink.step_advanced(step);
            }

            self.state = TransportState::Running {
                current_step: (step + 1) % step_count.max(1),
                next_event_time: next_event_time + seconds_per_step,
            };
        }
        timing.poll_interval()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::session::Tempo;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorder {
        triggers: Vec<(Instrument, f64)>,
        steps: Vec<usize>,
    }

    impl StepSink for Recorder {
        fn trigger(&mut self, instrument: Instrument, at: f64) {
            self.triggers.push((instrument, at));
        }

        fn step_advanced(&mut self, step: usize) {
            self.steps.push(step);
        }
    }

    impl Recorder {
        fn times(&self, instrument: Instrument) -> Vec<f64> {
            self.triggers
                .iter()
                .filter(|(i, _)| *i == instrument)
                .map(|(_, t)| *t)
                .collect()
        }
    }

    fn session_with(cells: &[(Instrument, usize)]) -> RwLock<Session> {
        let mut session = Session::new(&MachineConfig::default()).unwrap();
        for &(instrument, step) in cells {
            session.pattern.set(instrument, step, true).unwrap();
        }
        RwLock::new(session)
    }

    fn every_step(instrument: Instrument) -> Vec<(Instrument, usize)> {
        (0..16).map(|s| (instrument, s)).collect()
    }

    fn run(scheduler: &mut Scheduler, session: &RwLock<Session>, polls: &[f64]) -> Recorder {
        let mut recorder = Recorder::default();
        for &now in polls {
            scheduler.poll(now, session, &mut recorder);
        }
        recorder
    }

    #[test]
    fn sixteenths_at_120_are_an_eighth_of_a_second_apart() {
        let session = session_with(&every_step(Instrument::Kick));
        let mut scheduler = Scheduler::new(&MachineConfig::default());
        scheduler.start(0.0);
        let polls: Vec<f64> = (0..80).map(|i| i as f64 * 0.025).collect();
        let recorder = run(&mut scheduler, &session, &polls);

        let times = recorder.times(Instrument::Kick);
        // last poll at 1.975 commits up to 2.075
        assert_eq!(times.len(), 17);
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], 0.125);
        }
        assert_eq!(times[16] - times[0], 2.0);
        assert_eq!(recorder.steps, [(0..16).collect::<Vec<_>>(), vec![0]].concat());
    }

    #[test]
    fn poll_jitter_does_not_move_timestamps() {
        let session = session_with(&every_step(Instrument::Snare));
        let steady = {
            let mut scheduler = Scheduler::new(&MachineConfig::default());
            scheduler.start(0.5);
            let polls: Vec<f64> = (0..40).map(|i| 0.5 + i as f64 * 0.025).collect();
            run(&mut scheduler, &session, &polls).times(Instrument::Snare)
        };
        let jittery = {
            let mut scheduler = Scheduler::new(&MachineConfig::default());
            scheduler.start(0.5);
            let polls = [0.5, 0.51, 0.58, 0.61, 0.77, 0.9, 0.93, 1.2, 1.21, 1.4, 1.475];
            run(&mut scheduler, &session, &polls).times(Instrument::Snare)
        };
        assert_eq!(steady, jittery);
    }

    #[test]
    fn tempo_change_only_affects_later_steps() {
        let session = session_with(&every_step(Instrument::Kick));
        let mut scheduler = Scheduler::new(&MachineConfig::default());
        let mut recorder = Recorder::default();
        scheduler.start(0.0);

        // commits t=0, and 0.125 is already the next event time
        scheduler.poll(0.0, &session, &mut recorder);
        session::write(&session).tempo = Tempo::new(60.0).unwrap();
        scheduler.poll(0.1, &session, &mut recorder);
        scheduler.poll(0.3, &session, &mut recorder);
        scheduler.poll(0.55, &session, &mut recorder);

        assert_eq!(recorder.times(Instrument::Kick), vec![0.0, 0.125, 0.375, 0.625]);
    }

    #[test]
    fn late_poll_catches_up_in_one_batch() {
        let session = session_with(&every_step(Instrument::Clap));
        let mut scheduler = Scheduler::new(&MachineConfig::default());
        let mut recorder = Recorder::default();
        scheduler.start(0.0);
        scheduler.poll(0.0, &session, &mut recorder);
        assert_eq!(recorder.triggers.len(), 1);

        scheduler.poll(1.0, &session, &mut recorder);
        let expected: Vec<f64> = (0..9).map(|i| i as f64 * 0.125).collect();
        assert_eq!(recorder.times(Instrument::Clap), expected);
        assert_eq!(recorder.steps, (0..9).collect::<Vec<_>>());
    }

    #[test]
    fn background_widens_window_and_stays_quiet() {
        let config = MachineConfig::default();
        let session = session_with(&every_step(Instrument::Ride));
        let mut scheduler = Scheduler::new(&config);
        let mut recorder = Recorder::default();
        scheduler.set_mode(Mode::Background);
        scheduler.start(0.0);

        let delay = scheduler.poll(0.0, &session, &mut recorder);

        assert_eq!(delay, Duration::from_millis(1000));
        assert_eq!(recorder.triggers.len(), 16);
        assert!(recorder.steps.is_empty());

        scheduler.set_mode(Mode::Foreground);
        let delay = scheduler.poll(1.0, &session, &mut recorder);
        assert_eq!(delay, Duration::from_millis(25));
        // the window is already covered past 1.1
        assert_eq!(recorder.triggers.len(), 16);
        assert!(recorder.steps.is_empty());
    }

    #[test]
    fn switching_modes_keeps_the_same_timestamps() {
        let session = session_with(&every_step(Instrument::LowTom));
        let polls: Vec<f64> = (0..120).map(|i| i as f64 * 0.025).collect();

        let mut plain = Scheduler::new(&MachineConfig::default());
        plain.start(0.0);
        let plain = run(&mut plain, &session, &polls).times(Instrument::LowTom);

        let mut switching = Scheduler::new(&MachineConfig::default());
        let mut recorder = Recorder::default();
        switching.start(0.0);
        for (i, &now) in polls.iter().enumerate() {
            if i == 30 {
                switching.set_mode(Mode::Background);
            }
            if i == 90 {
                switching.set_mode(Mode::Foreground);
            }
            switching.poll(now, &session, &mut recorder);
        }
        let switching = recorder.times(Instrument::LowTom);

        // background ran ahead of foreground; compare the common prefix
        assert!(switching.len() >= plain.len());
        assert_eq!(&switching[..plain.len()], &plain[..]);
    }

    #[test]
    fn stopped_scheduler_commits_nothing() {
        let session = session_with(&every_step(Instrument::Kick));
        let mut scheduler = Scheduler::new(&MachineConfig::default());
        let recorder = run(&mut scheduler, &session, &[0.0, 1.0]);
        assert!(recorder.triggers.is_empty());

        scheduler.start(0.0);
        scheduler.stop();
        assert_eq!(scheduler.state(), TransportState::Stopped);
        let recorder = run(&mut scheduler, &session, &[0.0, 1.0]);
        assert!(recorder.triggers.is_empty());
    }

    #[test]
    fn simultaneous_instruments_share_a_timestamp() {
        let session = session_with(&[
            (Instrument::Kick, 4),
            (Instrument::ClosedHihat, 4),
            (Instrument::Crash, 4),
        ]);
        let mut scheduler = Scheduler::new(&MachineConfig::default());
        scheduler.start(0.0);
        let recorder = run(&mut scheduler, &session, &[0.0, 0.5]);
        assert_eq!(
            recorder.triggers,
            vec![
                (Instrument::Kick, 0.5),
                (Instrument::ClosedHihat, 0.5),
                (Instrument::Crash, 0.5)
            ]
        );
    }

    // Sink that edits the pattern it is being fed from.
    struct Meddler {
        session: Arc<RwLock<Session>>,
        seen: Vec<(Instrument, f64)>,
    }

    impl StepSink for Meddler {
        fn trigger(&mut self, instrument: Instrument, at: f64) {
            if self.seen.is_empty() {
                let mut session = session::write(&self.session);
                session.pattern.set(Instrument::Snare, 0, false).unwrap();
                session.pattern.set(Instrument::Clap, 1, true).unwrap();
            }
            self.seen.push((instrument, at));
        }

        fn step_advanced(&mut self, _step: usize) {}
    }

    #[test]
    fn edits_during_dispatch_leave_the_batch_alone() {
        let session = Arc::new(session_with(&[(Instrument::Kick, 0), (Instrument::Snare, 0)]));
        let mut meddler = Meddler {
            session: Arc::clone(&session),
            seen: Vec::new(),
        };
        let mut scheduler = Scheduler::new(&MachineConfig::default());
        scheduler.start(0.0);
        scheduler.poll(0.1, &session, &mut meddler);

        assert_eq!(
            meddler.seen,
            vec![
                (Instrument::Kick, 0.0),
                (Instrument::Snare, 0.0),
                (Instrument::Clap, 0.125)
            ]
        );
        assert!(!session::read(&session).pattern.get(Instrument::Snare, 0));
    }
}
