//! Audio activity probing against PulseAudio

mod probe;

pub use probe::{AudioProbe, ProbeError};
