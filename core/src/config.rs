//! Client configuration.
//!
//! There is no process-wide default client: callers build a `ClientConfig`,
//! construct one [`Client`](crate::Client) from it and reuse that client.

use std::time::Duration;

/// Identifier sent in `User-Agent` unless the config overrides it.
pub const DEFAULT_USER_AGENT: &str = concat!("rpc-core/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Always overwrites whatever `User-Agent` a request carried.
    pub user_agent: String,
    /// Whole-call deadline handed to the transport. `None` waits forever.
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
