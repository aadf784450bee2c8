//! Voice teardown.
//!
//! Every started voice gets a wall-clock deadline a little past the end of
//! its sound. A dedicated reaper thread sleeps until the earliest deadline,
//! releases whatever is due and drops retired voices. The sink is only held
//! weakly: if the machine has gone away by the time a deadline comes up, the
//! teardown does nothing.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use crate::audio::VoiceId;
use crate::audio_api::AudioSink;

// how long after a release the reaper comes back to drop the retired voice
const RECLAIM_DELAY: Duration = Duration::from_millis(50);

/// When to tear a voice down:
/// `real_now + (trigger_at - audio_now) + lifetime + guard`.
pub fn teardown_deadline(
    real_now: Instant,
    trigger_at: f64,
    audio_now: f64,
    lifetime: f64,
    guard: f64,
) -> Instant {
    let secs = (trigger_at - audio_now).max(0.0) + lifetime.max(0.0) + guard.max(0.0);
    real_now + Duration::from_secs_f64(if secs.is_finite() { secs } else { 0.0 })
}

/// Pending teardowns ordered by deadline. Generic over the deadline so the
/// offline renderer can run it on audio time.
#[derive(Debug)]
pub struct TeardownQueue<D: Ord> {
    heap: BinaryHeap<Reverse<(D, VoiceId)>>,
}

impl<D: Ord + Copy> Default for TeardownQueue<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: Ord + Copy> TeardownQueue<D> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    pub fn schedule(&mut self, id: VoiceId, deadline: D) {
        self.heap.push(Reverse((deadline, id)));
    }

    pub fn next_deadline(&self) -> Option<D> {
        self.heap.peek().map(|Reverse((deadline, _))| *deadline)
    }

    /// Remove and return every voice due at or before `now`, earliest first.
    pub fn drain_due(&mut self, now: D) -> Vec<VoiceId> {
        let mut due = Vec::new();
        while let Some(Reverse((deadline, id))) = self.heap.peek() {
            if *deadline > now {
                break;
            }
            due.push(*id);
            self.heap.pop();
        }
        due
    }

    /// Forget every pending teardown; returns how many were dropped.
    pub fn cancel_all(&mut self) -> usize {
        let n = self.heap.len();
        self.heap.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

enum ReaperCmd {
    Schedule {
        id: VoiceId,
        deadline: Instant,
        sink: Weak<dyn AudioSink>,
    },
    CancelAll,
    Shutdown,
}

/// Owns the reaper thread. Dropping it stops the thread without waiting
/// for pending deadlines.
pub struct Reaper {
    handle: ReaperHandle,
    thread: Option<JoinHandle<()>>,
}

/// Cheap, cloneable way to hand voices to the reaper.
#[derive(Clone)]
pub struct ReaperHandle {
    tx: Sender<ReaperCmd>,
    fired: Arc<AtomicUsize>,
}

impl Reaper {
    pub fn spawn() -> std::io::Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let fired = Arc::new(AtomicUsize::new(0));
        let thread_fired = Arc::clone(&fired);
        let thread = thread::Builder::new()
            .name("beatgrid-reaper".into())
            .spawn(move || run(rx, thread_fired))?;
        Ok(Self {
            handle: ReaperHandle { tx, fired },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> ReaperHandle {
        self.handle.clone()
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        let _ = self.handle.tx.send(ReaperCmd::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("reaper thread panicked");
            }
        }
    }
}

impl ReaperHandle {
    pub fn schedule(&self, id: VoiceId, deadline: Instant, sink: &Arc<dyn AudioSink>) {
        let _ = self.tx.send(ReaperCmd::Schedule {
            id,
            deadline,
            sink: Arc::downgrade(sink),
        });
    }

    pub fn cancel_all(&self) {
        let _ = self.tx.send(ReaperCmd::CancelAll);
    }

    /// Teardowns that have come due so far, including no-ops for sinks
    /// that were already gone.
    pub fn fired(&self) -> usize {
        self.fired.load(Ordering::Acquire)
    }
}

fn run(rx: Receiver<ReaperCmd>, fired: Arc<AtomicUsize>) {
    let mut queue = TeardownQueue::<Instant>::new();
    let mut sinks: HashMap<VoiceId, Weak<dyn AudioSink>> = HashMap::new();
    let mut released: Vec<Weak<dyn AudioSink>> = Vec::new();
    let mut reclaim_at: Option<Instant> = None;

    loop {
        let wake = match (queue.next_deadline(), reclaim_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        let timeout = match wake {
            Some(at) => crossbeam_channel::at(at),
            None => crossbeam_channel::never(),
        };

        crossbeam_channel::select! {
            recv(rx) -> msg => match msg {
                Ok(ReaperCmd::Schedule { id, deadline, sink }) => {
                    queue.schedule(id, deadline);
                    sinks.insert(id, sink);
                }
                Ok(ReaperCmd::CancelAll) => {
                    let dropped = queue.cancel_all();
                    sinks.clear();
                    tracing::debug!(dropped, "teardowns cancelled");
                }
                Ok(ReaperCmd::Shutdown) | Err(_) => break,
            },
            recv(timeout) -> _ => {}
        }

        let now = Instant::now();
        let due = queue.drain_due(now);
        if !due.is_empty() {
            for id in &due {
                // gone means the machine was torn down first: nothing to do
                let Some(sink) = sinks.remove(id).and_then(|weak| weak.upgrade()) else {
                    continue;
                };
                sink.release(*id);
                if !released.iter().any(|w| std::ptr::addr_eq(w.as_ptr(), Arc::as_ptr(&sink))) {
                    released.push(Arc::downgrade(&sink));
                }
            }
            fired.fetch_add(due.len(), Ordering::AcqRel);
            tracing::debug!(count = due.len(), pending = queue.len(), "voices torn down");
            reclaim_at = Some(now + RECLAIM_DELAY);
        }

        if reclaim_at.is_some_and(|at| at <= now) {
            for sink in released.drain(..).filter_map(|weak| weak.upgrade()) {
                sink.reclaim();
            }
            reclaim_at = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::OfflineSink;
    use crate::shared::Instrument;
    use crate::synth::Synthesizer;

    #[test]
    fn deadline_counts_lead_time_lifetime_and_guard() {
        let t0 = Instant::now();
        let secs = |at: Instant| (at - t0).as_secs_f64();
        assert!((secs(teardown_deadline(t0, 10.5, 10.0, 0.4, 0.1)) - 1.0).abs() < 1e-6);
        // triggers already in the past add no lead time
        assert!((secs(teardown_deadline(t0, 9.0, 10.0, 0.4, 0.1)) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn queue_releases_in_deadline_order() {
        let mut queue = TeardownQueue::new();
        queue.schedule(VoiceId(1), 30u64);
        queue.schedule(VoiceId(2), 10);
        queue.schedule(VoiceId(3), 20);
        assert_eq!(queue.next_deadline(), Some(10));
        assert!(queue.drain_due(5).is_empty());
        assert_eq!(queue.drain_due(20), vec![VoiceId(2), VoiceId(3)]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.cancel_all(), 1);
        assert!(queue.is_empty());
        assert_eq!(queue.next_deadline(), None);
    }

    fn started_voice(sink: &Arc<dyn AudioSink>) -> VoiceId {
        let synth = Synthesizer::new(sink.sample_rate(), None, 0.0);
        let voice = synth.realize(Instrument::Kick, 0.0, None).unwrap();
        let id = voice.id();
        sink.start_voice(voice).unwrap();
        id
    }

    fn wait_for(mut done: impl FnMut() -> bool) -> bool {
        let give_up = Instant::now() + Duration::from_secs(5);
        while Instant::now() < give_up {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn reaper_releases_after_the_deadline() {
        // the offline clock never moves here, so only the reaper can free it
        let sink: Arc<dyn AudioSink> = Arc::new(OfflineSink::new(8000));
        let reaper = Reaper::spawn().unwrap();
        let id = started_voice(&sink);
        let scheduled = Instant::now();
        reaper
            .handle()
            .schedule(id, scheduled + Duration::from_millis(150), &sink);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(sink.live_voices(), 1);

        assert!(wait_for(|| sink.live_voices() == 0));
        let elapsed = scheduled.elapsed();
        assert!(elapsed >= Duration::from_millis(150), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(300), "{elapsed:?}");
        assert!(wait_for(|| reaper.handle().fired() == 1));
    }

    #[test]
    fn teardown_after_sink_is_gone_is_a_no_op() {
        let reaper = Reaper::spawn().unwrap();
        let sink: Arc<dyn AudioSink> = Arc::new(OfflineSink::new(8000));
        let id = started_voice(&sink);
        reaper.handle().schedule(id, Instant::now() + Duration::from_millis(20), &sink);
        drop(sink);

        let handle = reaper.handle();
        assert!(wait_for(|| handle.fired() == 1));
        drop(reaper);
    }

    #[test]
    fn cancel_all_drops_pending_teardowns() {
        let reaper = Reaper::spawn().unwrap();
        let sink: Arc<dyn AudioSink> = Arc::new(OfflineSink::new(8000));
        let id = started_voice(&sink);
        let handle = reaper.handle();
        handle.schedule(id, Instant::now() + Duration::from_millis(50), &sink);
        handle.cancel_all();

        thread::sleep(Duration::from_millis(200));
        assert_eq!(handle.fired(), 0);
        assert_eq!(sink.live_voices(), 1);
    }
}
