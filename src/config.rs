//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

const ENV_PREFIX: &str = "SPEAKER_POWER_";

/// Daemon configuration, immutable after load.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host or IP of the Tasmota socket
    pub socket_host: String,
    /// Tasmota web credentials
    pub socket_username: String,
    pub socket_password: String,
    /// How long audio must be absent before the socket is switched off
    pub off_delay: Duration,
    /// Cadence of the audio polling loop
    pub poll_interval: Duration,
    /// Timeout applied to each socket HTTP command
    pub command_timeout: Duration,
    /// Bluetooth alias the speaker pairs against
    pub speaker_alias: String,
    /// Fixed PIN answered to pairing requests
    pub pairing_pin: u32,
}

/// Optional config file contents; every field may be omitted.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    socket_host: Option<String>,
    socket_username: Option<String>,
    socket_password: Option<String>,
    off_delay_secs: Option<u64>,
    poll_interval_secs: Option<u64>,
    command_timeout_secs: Option<u64>,
    speaker_alias: Option<String>,
    pairing_pin: Option<u32>,
}

impl Config {
    /// Load configuration: built-in defaults, overridden by the config
    /// file when present, overridden by `SPEAKER_POWER_*` env vars.
    pub fn load() -> Result<Self> {
        let file = match Self::config_path() {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let parsed: FileConfig = serde_json::from_str(&raw)
                    .with_context(|| format!("invalid config file {}", path.display()))?;
                debug!(path = %path.display(), "config file loaded");
                parsed
            }
            _ => FileConfig::default(),
        };

        Ok(Self {
            socket_host: env_str("SOCKET_HOST")
                .or(file.socket_host)
                .unwrap_or_else(|| "192.168.1.226".to_string()),
            socket_username: env_str("SOCKET_USERNAME")
                .or(file.socket_username)
                .unwrap_or_else(|| "admin".to_string()),
            socket_password: env_str("SOCKET_PASSWORD")
                .or(file.socket_password)
                .unwrap_or_else(|| "admin".to_string()),
            off_delay: Duration::from_secs(
                env_parse("OFF_DELAY_SECS")?.or(file.off_delay_secs).unwrap_or(10),
            ),
            poll_interval: Duration::from_secs(
                env_parse("POLL_INTERVAL_SECS")?
                    .or(file.poll_interval_secs)
                    .unwrap_or(1),
            ),
            command_timeout: Duration::from_secs(
                env_parse("COMMAND_TIMEOUT_SECS")?
                    .or(file.command_timeout_secs)
                    .unwrap_or(5),
            ),
            speaker_alias: env_str("SPEAKER_ALIAS")
                .or(file.speaker_alias)
                .unwrap_or_else(|| "KitchenBeats".to_string()),
            pairing_pin: env_parse("PAIRING_PIN")?.or(file.pairing_pin).unwrap_or(6969),
        })
    }

    /// `~/.config/speaker-power-daemon/config.json`
    fn config_path() -> Option<PathBuf> {
        let home = std::env::var("HOME").ok()?;
        Some(
            PathBuf::from(home)
                .join(".config")
                .join("speaker-power-daemon")
                .join("config.json"),
        )
    }
}

fn env_str(name: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{name}")).ok()
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let var = format!("{ENV_PREFIX}{name}");
    match std::env::var(&var) {
        Ok(value) => {
            let parsed = value.parse().with_context(|| format!("invalid {var}"))?;
            Ok(Some(parsed))
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_config_partial() {
        let parsed: FileConfig =
            serde_json::from_str(r#"{"socket_host": "10.0.0.5", "off_delay_secs": 30}"#).unwrap();
        assert_eq!(parsed.socket_host.as_deref(), Some("10.0.0.5"));
        assert_eq!(parsed.off_delay_secs, Some(30));
        assert!(parsed.pairing_pin.is_none());
    }

    #[test]
    fn test_file_config_empty_object() {
        let parsed: FileConfig = serde_json::from_str("{}").unwrap();
        assert!(parsed.socket_host.is_none());
    }

    #[test]
    fn test_unknown_env_values_rejected() {
        std::env::set_var("SPEAKER_POWER_TEST_PIN", "not-a-number");
        let result: Result<Option<u32>> = env_parse("TEST_PIN");
        assert!(result.is_err());
        std::env::remove_var("SPEAKER_POWER_TEST_PIN");
    }
}
