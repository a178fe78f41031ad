//! Runtime configuration.

use std::time::Duration;

use cmlink_client::SessionConfig;
use serde::{Deserialize, Serialize};

/// Time allowed for a TCP connect before it counts as failed.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Connect timeout applied by the connector
    pub connect_timeout: Duration,
    /// Session configuration (endpoints, limits)
    pub session: SessionConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self { connect_timeout: DEFAULT_CONNECT_TIMEOUT, session: SessionConfig::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_wrap_the_session_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.session, SessionConfig::default());
    }
}
