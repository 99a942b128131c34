//! ---
//! vlink_section: "01-core-functionality"
//! vlink_subsection: "module"
//! vlink_type: "source"
//! vlink_scope: "code"
//! vlink_description: "Shared primitives and utilities for the core runtime."
//! vlink_version: "v0.0.0-prealpha"
//! vlink_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

use crate::logging::LogFormat;

fn default_serial_device() -> String {
    "/dev/ttymxc1".to_owned()
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_redis_addr() -> String {
    "localhost:6379".to_owned()
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Runtime configuration for the bridge daemon.
///
/// Populated from command line flags by the binary; serde defaults keep the
/// struct usable from tests and future file-based deployments without
/// repeating the fallback values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path of the UART device connected to the BLE co-processor.
    #[serde(default = "default_serial_device")]
    pub serial_device: String,
    /// Serial baud rate.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// `host:port` of the Redis state bus.
    #[serde(default = "default_redis_addr")]
    pub redis_addr: String,
    /// Redis password, empty for unauthenticated instances.
    #[serde(default)]
    pub redis_password: String,
    /// Redis logical database number.
    #[serde(default)]
    pub redis_db: i64,
    /// Log output format for the daemon.
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Config {
    /// Compose the Redis connection URL from the address/password/db trio.
    pub fn redis_url(&self) -> String {
        if self.redis_password.is_empty() {
            format!("redis://{}/{}", self.redis_addr, self.redis_db)
        } else {
            format!(
                "redis://:{}@{}/{}",
                self.redis_password, self.redis_addr, self.redis_db
            )
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial_device: default_serial_device(),
            baud_rate: default_baud_rate(),
            redis_addr: default_redis_addr(),
            redis_password: String::new(),
            redis_db: 0,
            log_format: default_log_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redis_url_without_password() {
        let config = Config::default();
        assert_eq!(config.redis_url(), "redis://localhost:6379/0");
    }

    #[test]
    fn redis_url_with_password_and_db() {
        let config = Config {
            redis_password: "hunter2".to_owned(),
            redis_db: 3,
            ..Config::default()
        };
        assert_eq!(config.redis_url(), "redis://:hunter2@localhost:6379/3");
    }
}
