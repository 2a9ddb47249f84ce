//! Error type shared by every relay component.

/// Result alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Failures the relay can observe.
///
/// `Http`, `Status` and `Daemon` are the "could not reach it" class;
/// `Malformed` and `Slack` mean the peer answered but not with what we
/// expected.  Neither class is ever allowed to escape a handler: callers
/// log them and continue with degraded output.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// HTTP request failed before a response arrived
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Peer answered with a non-success status
    #[error("{url} returned HTTP {status}")]
    Status { status: u16, url: String },

    /// Media daemon unreachable, timed out, or returned a JSON-RPC error
    #[error("media daemon error: {0}")]
    Daemon(String),

    /// Reachable, but the payload is missing the expected structure
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Slack Web API answered `ok: false`
    #[error("Slack API error: {0}")]
    Slack(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Inbound request failed signature verification
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl RelayError {
    pub fn daemon(msg: impl Into<String>) -> Self {
        Self::Daemon(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// True for the unreachable / non-success class of failures.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Status { .. } | Self::Daemon(_))
    }

    /// Short label for log lines.
    pub fn class(&self) -> &'static str {
        if self.is_transport() {
            "unreachable"
        } else {
            "bad response"
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}
