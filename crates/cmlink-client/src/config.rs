//! Session configuration.

use std::{fmt, time::Duration};

use cmlink_core::pump::PumpConfig;
use serde::{Deserialize, Serialize};

/// How long an incoming typing notice stays visible.
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_secs(20);

/// A backend connection-manager address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name or IP address
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl Endpoint {
    /// Create an endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Endpoints to pick from on each connect attempt
    pub endpoints: Vec<Endpoint>,
    /// Frame pump limits
    pub pump: PumpConfig,
    /// Display timeout attached to incoming typing notices
    pub typing_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            pump: PumpConfig::default(),
            typing_timeout: DEFAULT_TYPING_TIMEOUT,
        }
    }
}

impl SessionConfig {
    /// Default configuration with the given endpoint pool.
    pub fn with_endpoints(endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        Self { endpoints: endpoints.into_iter().collect(), ..Self::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_displays_as_host_port() {
        assert_eq!(Endpoint::new("cm0.example.net", 27017).to_string(), "cm0.example.net:27017");
    }

    #[test]
    fn defaults_have_no_endpoints() {
        let config = SessionConfig::default();
        assert!(config.endpoints.is_empty());
        assert_eq!(config.typing_timeout, Duration::from_secs(20));
    }
}
