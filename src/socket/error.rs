//! Error types for socket commands.

use thiserror::Error;

/// Failure of a single power command against the remote socket.
///
/// Neither variant is fatal: the controller stays in a consistent state
/// after a failed command and the next tick retries naturally, because the
/// mismatch between audio activity and believed power state persists until
/// a command succeeds.
#[derive(Error, Debug)]
pub enum SocketError {
    /// The socket could not be reached (timeout, refused, DNS).
    #[error("socket unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// The socket responded with a non-success status code.
    #[error("socket rejected command with status {0}")]
    CommandRejected(reqwest::StatusCode),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_display_includes_status() {
        let err = SocketError::CommandRejected(reqwest::StatusCode::UNAUTHORIZED);
        assert!(err.to_string().contains("401"));
    }
}
