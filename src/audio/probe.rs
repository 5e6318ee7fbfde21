//! PulseAudio activity probe.
//!
//! Answers one question per poll: is any sink input currently routed to
//! the default output sink? The default sink is resolved once when the
//! probe is acquired; any PulseAudio failure invalidates the whole probe
//! and the caller must acquire a fresh one, re-resolving the default sink.
//!
//! pulsectl controllers are not `Send`, so they are created inside
//! `spawn_blocking` closures rather than held across awaits.

use pulsectl::controllers::{AppControl, DeviceControl, SinkController};
use thiserror::Error;
use tracing::debug;

/// Probe-level failure. Unlike a failed socket command this is not worth
/// retrying per tick: the PulseAudio session is gone and must be rebuilt.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The PulseAudio server could not be reached or the query failed.
    #[error("audio server unavailable: {0}")]
    Unavailable(String),

    /// The blocking query task was cancelled or panicked.
    #[error("audio query task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

/// One probing session against one resolved default sink.
pub struct AudioProbe {
    default_sink: u32,
}

impl AudioProbe {
    /// Connect to PulseAudio and resolve the index of the default sink.
    pub async fn acquire() -> Result<Self, ProbeError> {
        let default_sink = tokio::task::spawn_blocking(resolve_default_sink).await??;
        debug!(default_sink, "audio probe acquired");

        Ok(Self { default_sink })
    }

    /// Index of the sink this probe watches.
    pub fn default_sink(&self) -> u32 {
        self.default_sink
    }

    /// Whether any active stream is routed to the default sink.
    pub async fn is_audio_playing(&self) -> Result<bool, ProbeError> {
        let sink = self.default_sink;
        tokio::task::spawn_blocking(move || any_stream_on_sink(sink)).await?
    }
}

/// Resolve the default sink name to its index, falling back to the first
/// listed sink when the name does not match any device.
fn resolve_default_sink() -> Result<u32, ProbeError> {
    let mut controller = pulse_controller()?;

    let server_info = controller
        .get_server_info()
        .map_err(|e| ProbeError::Unavailable(e.to_string()))?;
    let default_name = server_info.default_sink_name;

    let sinks = controller
        .list_devices()
        .map_err(|e| ProbeError::Unavailable(e.to_string()))?;

    let index = default_name
        .as_deref()
        .and_then(|name| sinks.iter().find(|sink| sink.name.as_deref() == Some(name)))
        .or_else(|| sinks.first())
        .map(|sink| sink.index)
        .unwrap_or(0);

    Ok(index)
}

fn any_stream_on_sink(sink: u32) -> Result<bool, ProbeError> {
    let mut controller = pulse_controller()?;

    let inputs = controller
        .list_applications()
        .map_err(|e| ProbeError::Unavailable(e.to_string()))?;

    // connection_id is the index of the sink the stream is attached to.
    Ok(inputs.iter().any(|input| input.connection_id == sink))
}

fn pulse_controller() -> Result<SinkController, ProbeError> {
    SinkController::create().map_err(|e| ProbeError::Unavailable(e.to_string()))
}
