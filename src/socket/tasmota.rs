//! HTTP client for Tasmota power sockets.
//!
//! Tasmota exposes its command interface as plain GET requests against
//! `/cm`, with credentials passed as query parameters. Both power commands
//! are idempotent, so resending one after a failure is always safe.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use super::controller::PowerSwitch;
use super::error::SocketError;

/// Client for one Tasmota socket, bound to its address and credentials.
pub struct TasmotaClient {
    http: Client,
    host: String,
    username: String,
    password: String,
}

impl TasmotaClient {
    /// Create a client with a bounded per-request timeout so a hung socket
    /// cannot stall the polling loop.
    pub fn new(
        host: &str,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, SocketError> {
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            host: host.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Build the command URL for a given Tasmota command.
    fn command_url(&self, cmnd: &str) -> String {
        format!(
            "http://{}/cm?user={}&password={}&cmnd={}",
            self.host, self.username, self.password, cmnd
        )
    }

    /// Send one command and map the response status.
    async fn send_command(&self, cmnd: &str) -> Result<(), SocketError> {
        let url = self.command_url(cmnd);
        debug!(cmnd, "sending socket command");

        let response = self.http.get(&url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(SocketError::CommandRejected(status));
        }

        Ok(())
    }
}

impl PowerSwitch for TasmotaClient {
    async fn power_on(&self) -> Result<(), SocketError> {
        self.send_command("Power%20On").await
    }

    async fn power_off(&self) -> Result<(), SocketError> {
        self.send_command("Power%20Off").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> TasmotaClient {
        TasmotaClient::new("192.168.1.226", "admin", "secret", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_command_url_embeds_credentials() {
        let client = test_client();
        assert_eq!(
            client.command_url("Power%20On"),
            "http://192.168.1.226/cm?user=admin&password=secret&cmnd=Power%20On"
        );
    }

    #[test]
    fn test_command_url_per_command() {
        let client = test_client();
        assert!(client.command_url("Power%20Off").ends_with("cmnd=Power%20Off"));
    }
}
