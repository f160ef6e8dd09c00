//! Error types for the battery-stats daemon.
//!
//! Per-component error enums with descriptive, contextual messages. The
//! accounting engine itself is infallible apart from writing report lines;
//! everything here belongs to the transport and startup surface.

use thiserror::Error;

/// Errors raised while locating the battery device.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("no battery found")]
    NoBattery,

    #[error("multiple batteries not supported ({count} found)")]
    MultipleBatteries { count: usize },

    #[error("D-Bus call failed: {0}")]
    Bus(#[from] zbus::Error),

    #[error("failed to write discovery report: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to configuration management.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Failed to write configuration: {0}")]
    WriteError(#[from] std::io::Error),
}

/// Top-level daemon errors.
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Battery discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("D-Bus error: {0}")]
    Bus(#[from] zbus::Error),

    #[error("Report output error: {0}")]
    Output(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_messages_share_one_register() {
        // "D-Bus" is a proper noun; every other variant reads lowercase.
        let messages = [
            DiscoveryError::NoBattery.to_string(),
            DiscoveryError::MultipleBatteries { count: 2 }.to_string(),
            DiscoveryError::Io(std::io::Error::new(std::io::ErrorKind::Other, "denied"))
                .to_string(),
        ];
        for message in messages {
            assert!(
                message.chars().next().is_some_and(|c| c.is_lowercase()),
                "unexpected casing: {message}"
            );
        }
    }
}
