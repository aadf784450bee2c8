pub mod lifecycle;
pub mod scheduler;
pub mod transport;
pub mod voicer;

pub use lifecycle::{Reaper, ReaperHandle, TeardownQueue, teardown_deadline};
pub use scheduler::{Scheduler, StepSink, TransportState};
pub use transport::{StepListener, StepListeners, Transport, TransportCommand};
pub use voicer::Voicer;
