//! Settings types.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BulletinSettings {
    /// Network and connection settings.
    pub server: ServerSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

impl BulletinSettings {
    /// Reject combinations the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.server;
        if s.max_connections == 0 {
            return Err(SettingsError::invalid("server.maxConnections", "must be at least 1"));
        }
        if s.queue_capacity == 0 {
            return Err(SettingsError::invalid("server.queueCapacity", "must be at least 1"));
        }
        if s.heartbeat_interval_secs == 0 || s.heartbeat_timeout_secs < s.heartbeat_interval_secs {
            return Err(SettingsError::invalid(
                "server.heartbeatTimeoutSecs",
                format!(
                    "({}) must be >= heartbeatIntervalSecs ({}) > 0",
                    s.heartbeat_timeout_secs, s.heartbeat_interval_secs
                ),
            ));
        }
        Ok(())
    }
}

/// Server network and connection settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Maximum simultaneously open connections.
    pub max_connections: usize,
    /// Outbound queue bound per connection, in bulletins.
    pub queue_capacity: usize,
    /// Seconds between server Ping frames.
    pub heartbeat_interval_secs: u64,
    /// Seconds without client activity before the connection is dropped.
    pub heartbeat_timeout_secs: u64,
    /// Grace period for flushing a draining connection, in milliseconds.
    pub drain_grace_ms: u64,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_connections: 1024,
            queue_capacity: 256,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            drain_grace_ms: 2_000,
            max_message_size: 64 * 1024,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter (`RUST_LOG` overrides it).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn server_defaults() {
        let s = ServerSettings::default();
        assert_eq!(s.host, "127.0.0.1");
        assert_eq!(s.port, 0);
        assert_eq!(s.max_connections, 1024);
        assert_eq!(s.queue_capacity, 256);
        assert_eq!(s.heartbeat_interval_secs, 30);
        assert_eq!(s.heartbeat_timeout_secs, 90);
        assert_eq!(s.drain_grace_ms, 2_000);
        assert_eq!(s.max_message_size, 65_536);
    }

    #[test]
    fn defaults_are_valid() {
        assert!(BulletinSettings::default().validate().is_ok());
    }

    #[test]
    fn camel_case_keys() {
        let json = serde_json::to_value(BulletinSettings::default()).unwrap();
        assert!(json["server"]["maxConnections"].is_number());
        assert!(json["server"]["queueCapacity"].is_number());
        assert!(json["server"]["drainGraceMs"].is_number());
        assert_eq!(json["logging"]["level"], "info");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: BulletinSettings =
            serde_json::from_str(r#"{"server":{"port":4000}}"#).unwrap();
        assert_eq!(s.server.port, 4000);
        assert_eq!(s.server.queue_capacity, 256);
        assert_eq!(s.logging, LoggingSettings::default());
    }

    #[test]
    fn zero_queue_capacity_invalid() {
        let mut s = BulletinSettings::default();
        s.server.queue_capacity = 0;
        assert_matches!(
            s.validate(),
            Err(SettingsError::Invalid { field: "server.queueCapacity", .. })
        );
    }

    #[test]
    fn zero_max_connections_invalid() {
        let mut s = BulletinSettings::default();
        s.server.max_connections = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn timeout_shorter_than_interval_invalid() {
        let mut s = BulletinSettings::default();
        s.server.heartbeat_interval_secs = 30;
        s.server.heartbeat_timeout_secs = 10;
        assert!(s.validate().is_err());
    }
}
