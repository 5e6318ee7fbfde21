//! BlueZ pairing agent for the speaker

mod agent;

pub use agent::{AgentError, PairingAgent};
