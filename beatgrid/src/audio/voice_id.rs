use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Identity of one triggered voice, used to tear it down later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VoiceId(pub u64);

// atomic counter so the transport thread and the ui thread can both mint ids
pub fn next_voice_id() -> VoiceId {
    VoiceId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
}
