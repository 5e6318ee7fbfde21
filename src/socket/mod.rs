//! Remote power socket control
//!
//! The core of the daemon: a state machine that keeps the socket's power
//! state in sync with audio activity, and the Tasmota HTTP client it
//! drives.

mod controller;
mod error;
mod tasmota;

pub use controller::{PowerController, PowerSwitch};
pub use error::SocketError;
pub use tasmota::TasmotaClient;
