//! Session configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// The filesystem address of the daemon's socket
pub const DEFAULT_SOCKET_PATH: &str = "/var/run/btled";

/// Environment variable that overrides the socket path in [`Config::from_env`]
pub const SOCKET_PATH_ENV: &str = "BTLED_SOCKET";

/// Configuration of a connection to the daemon
///
/// Every field has a default, so a configuration file only needs to list the values it changes.
/// Durations are given in milliseconds.
///
/// ```
/// let config: btled::Config = serde_json::from_str(r#"{ "command_timeout": 2000 }"#).unwrap();
///
/// assert_eq!(std::time::Duration::from_secs(2), config.command_timeout);
/// assert_eq!(std::path::Path::new("/var/run/btled"), config.socket_path);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the daemon's Unix stream socket
    pub socket_path: PathBuf,
    /// How long to wait for the daemon to send the MTU after connecting
    #[serde(with = "millis")]
    pub mtu_timeout: Duration,
    /// Default timeout of a command
    #[serde(with = "millis")]
    pub command_timeout: Duration,
    /// Timeout of the connect command
    #[serde(with = "millis")]
    pub connect_timeout: Duration,
    /// Interval the receive loop polls the socket at
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Upper bound on waiting for the receive thread to exit when closing
    #[serde(with = "millis")]
    pub join_timeout: Duration,
    /// Answer loopback self-test frames
    pub loopback: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            mtu_timeout: Duration::from_secs(1),
            command_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_millis(100),
            join_timeout: Duration::from_secs(1),
            loopback: false,
        }
    }
}

impl Config {
    /// Create the default configuration with the socket path taken from `BTLED_SOCKET`, if set
    pub fn from_env() -> Self {
        let mut config = Config::default();

        if let Some(path) = std::env::var_os(SOCKET_PATH_ENV) {
            log::debug!("socket path taken from {}", SOCKET_PATH_ENV);

            config.socket_path = path.into();
        }

        config
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis().try_into().unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config() {
        let config: Config = serde_json::from_str(r#"{ "socket_path": "/tmp/btled", "loopback": true }"#).unwrap();

        assert_eq!(PathBuf::from("/tmp/btled"), config.socket_path);

        assert!(config.loopback);

        assert_eq!(Duration::from_secs(15), config.connect_timeout);
    }

    #[test]
    fn durations_as_milliseconds() {
        let config = Config {
            poll_interval: Duration::from_millis(25),
            ..Config::default()
        };

        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(25, json["poll_interval"]);

        assert_eq!(config, serde_json::from_value(json).unwrap());
    }
}
