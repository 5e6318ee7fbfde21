//! BlueZ pairing agent with a fixed PIN.
//!
//! Lets the known speaker pair and stream without any user interaction:
//! the adapter is made discoverable under a fixed alias, PIN and passkey
//! requests are answered with the configured PIN, and service
//! authorization is granted for A2DP and AVRCP only. This component is
//! fully independent of the power controller; it shares no state with it.

use std::process::Command;

use bluer::agent::{Agent, AgentHandle, AuthorizeService, ReqError, ReqResult};
use bluer::{Adapter, Session, Uuid};
use thiserror::Error;
use tracing::{debug, info, warn};

/// A2DP audio sink/source profile.
const A2DP_UUID: Uuid = Uuid::from_u128(0x0000110d_0000_1000_8000_00805f9b34fb);

/// AVRCP remote control profile.
const AVRCP_UUID: Uuid = Uuid::from_u128(0x0000110e_0000_1000_8000_00805f9b34fb);

/// Module parameter that must be set for legacy pairing to complete.
const DISABLE_ERTM_PATH: &str = "/sys/module/bluetooth/parameters/disable_ertm";

#[derive(Error, Debug)]
pub enum AgentError {
    /// BlueZ D-Bus failure while configuring the adapter or registering.
    #[error("BlueZ error: {0}")]
    BlueZ(#[from] bluer::Error),
}

/// Registered pairing agent. Dropping it unregisters the agent and closes
/// the BlueZ session.
pub struct PairingAgent {
    _session: Session,
    _handle: AgentHandle,
}

impl PairingAgent {
    /// Configure the default adapter and register as the default agent.
    pub async fn register(alias: &str, pin: u32) -> Result<Self, AgentError> {
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;
        info!(adapter = adapter.name(), "using Bluetooth adapter");

        configure_adapter(&adapter, alias).await?;
        prepare_legacy_pairing(adapter.name());

        let agent = Agent {
            request_default: true,
            request_pin_code: Some(Box::new(move |req| {
                Box::pin(async move {
                    info!(device = %req.device, "PIN code requested");
                    Ok(pin.to_string())
                })
            })),
            request_passkey: Some(Box::new(move |req| {
                Box::pin(async move {
                    info!(device = %req.device, "passkey requested");
                    Ok(pin)
                })
            })),
            authorize_service: Some(Box::new(|req| {
                Box::pin(async move { authorize_service(&req) })
            })),
            ..Default::default()
        };

        let handle = session.register_agent(agent).await?;
        info!(alias, "pairing agent registered");

        Ok(Self {
            _session: session,
            _handle: handle,
        })
    }
}

/// Grant exactly the two audio profiles the speaker needs.
fn authorize_service(req: &AuthorizeService) -> ReqResult<()> {
    if is_authorized_service(req.service) {
        info!(device = %req.device, service = %req.service, "service authorized");
        Ok(())
    } else {
        warn!(device = %req.device, service = %req.service, "service rejected");
        Err(ReqError::Rejected)
    }
}

fn is_authorized_service(service: Uuid) -> bool {
    service == A2DP_UUID || service == AVRCP_UUID
}

/// Make the adapter permanently discoverable and pairable under the
/// configured alias.
async fn configure_adapter(adapter: &Adapter, alias: &str) -> Result<(), AgentError> {
    adapter.set_powered(true).await?;
    adapter.set_alias(alias.to_string()).await?;
    adapter.set_discoverable_timeout(0).await?;
    adapter.set_discoverable(true).await?;
    adapter.set_pairable(true).await?;
    debug!(alias, "adapter configured for pairing");
    Ok(())
}

/// Force PIN-based (legacy) pairing and disable ERTM.
///
/// With Secure Simple Pairing enabled the controller negotiates keys on
/// its own and the fixed PIN is never consulted; with ERTM enabled some
/// speakers fail bonding with status 0x0e. Both knobs need root, so
/// failures only warn and pairing may still work on already-prepared
/// hosts.
fn prepare_legacy_pairing(adapter_name: &str) {
    match Command::new("hciconfig")
        .args([adapter_name, "sspmode", "0"])
        .status()
    {
        Ok(status) if status.success() => debug!("secure simple pairing disabled"),
        Ok(status) => warn!(%status, "hciconfig sspmode failed"),
        Err(e) => warn!("could not run hciconfig: {e}"),
    }

    if let Err(e) = std::fs::write(DISABLE_ERTM_PATH, "1") {
        warn!("could not disable ERTM: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_profiles_authorized() {
        assert!(is_authorized_service(A2DP_UUID));
        assert!(is_authorized_service(AVRCP_UUID));
    }

    #[test]
    fn test_other_services_rejected() {
        // HFP hands-free, not on the allow list
        let hfp = Uuid::from_u128(0x0000111e_0000_1000_8000_00805f9b34fb);
        assert!(!is_authorized_service(hfp));
    }
}
