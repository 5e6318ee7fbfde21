//! speaker-power-daemon: keeps a speaker's power socket in sync with playback
//!
//! This daemon runs as a user service (same user as PulseAudio) and provides:
//! - Polling of PulseAudio for streams routed to the default sink
//! - A power controller that switches a Tasmota socket on with playback
//!   and off after a cooldown of silence
//! - A BlueZ pairing agent so the known speaker can pair with a fixed PIN
//!
//! The power loop and the pairing agent are fully independent; neither
//! shares state with the other.

mod audio;
mod bluetooth;
mod config;
mod lifecycle;
mod socket;

use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::audio::AudioProbe;
use crate::bluetooth::PairingAgent;
use crate::config::Config;
use crate::lifecycle::ShutdownSignal;
use crate::socket::{PowerController, PowerSwitch, TasmotaClient};

/// Pause before retrying probe acquisition when PulseAudio is down.
const PROBE_RETRY_DELAY: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "speaker-power-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    info!(socket_host = %config.socket_host, "configuration loaded");

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    let client = TasmotaClient::new(
        &config.socket_host,
        &config.socket_username,
        &config.socket_password,
        config.command_timeout,
    )?;
    let mut controller = PowerController::new(client, config.off_delay);

    // Force the socket off before trusting any state; a previous run may
    // have crashed with it on.
    controller.initialize().await;

    // Register the pairing agent. Failure is not fatal: the power loop
    // works without it, the speaker just cannot pair fresh.
    let _agent = match PairingAgent::register(&config.speaker_alias, config.pairing_pin).await {
        Ok(agent) => {
            info!("Bluetooth pairing agent active");
            Some(agent)
        }
        Err(e) => {
            error!(?e, "failed to register Bluetooth pairing agent");
            warn!("continuing without pairing support");
            None
        }
    };

    info!("daemon initialized, entering polling loop");

    tokio::select! {
        _ = run_polling_loop(&config, &mut controller) => {
            info!("polling loop exited");
        }
        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    info!("speaker-power-daemon stopped");

    Ok(())
}

/// Drive the controller from audio activity, forever.
///
/// The outer loop owns the PulseAudio session: whenever a query fails the
/// probe is dropped and re-acquired, which also re-resolves the default
/// sink. Socket command failures stay in the inner loop; the next tick
/// retries them because the activity/state mismatch persists.
async fn run_polling_loop<S: PowerSwitch>(config: &Config, controller: &mut PowerController<S>) {
    loop {
        let probe = match AudioProbe::acquire().await {
            Ok(probe) => probe,
            Err(e) => {
                warn!("audio probe unavailable: {e}");
                sleep(PROBE_RETRY_DELAY).await;
                continue;
            }
        };
        info!(default_sink = probe.default_sink(), "audio probe ready");

        loop {
            let audio_playing = match probe.is_audio_playing().await {
                Ok(playing) => playing,
                Err(e) => {
                    warn!("audio probe failed, reacquiring: {e}");
                    break;
                }
            };

            if let Err(e) = controller.tick(audio_playing).await {
                warn!("socket command failed: {e}");
            }

            sleep(config.poll_interval).await;
        }
    }
}
