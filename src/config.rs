//! Runtime Configuration
//!
//! Connection timing and queue sizing, read from `MATEY_*` environment
//! variables with defaults matching the broker's own settings.

use std::time::Duration;

use crate::core::ids::{LocalIdentity, ParticipantId};
use crate::network::stomp::HeartBeat;

/// Default broker endpoint.
pub const DEFAULT_BROKER_URL: &str = "ws://localhost:8080/ws";

/// Fixed delay between reconnect attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Default heartbeat interval, both directions.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(4000);

/// Default capacity of the client event queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A numeric variable did not parse.
    #[error("{var} must be a non-negative integer, got {value:?}")]
    InvalidNumber {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
    },

    /// Value parsed but is unusable.
    #[error("{var}: {reason}")]
    OutOfRange {
        /// Variable name.
        var: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Broker WebSocket URL.
    pub broker_url: String,
    /// Fixed retry interval after a failed or lost connection.
    pub reconnect_delay: Duration,
    /// How often we offer to send heartbeats. Zero disables them.
    pub heartbeat_outgoing: Duration,
    /// How often we want to hear from the broker. The link is declared dead
    /// after twice the agreed period without traffic. Zero disables the check.
    pub heartbeat_incoming: Duration,
    /// Capacity of the serialized event queue and the outbound frame queue.
    pub event_queue_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            broker_url: DEFAULT_BROKER_URL.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            heartbeat_outgoing: DEFAULT_HEARTBEAT,
            heartbeat_incoming: DEFAULT_HEARTBEAT,
            event_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Create config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let millis = |var: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(var) {
                Some(raw) => parse_u64(var, &raw).map(Duration::from_millis),
                None => Ok(default),
            }
        };

        let reconnect_delay = millis("MATEY_RECONNECT_DELAY_MS", defaults.reconnect_delay)?;
        if reconnect_delay.is_zero() {
            return Err(ConfigError::OutOfRange {
                var: "MATEY_RECONNECT_DELAY_MS",
                reason: "reconnect delay must be positive",
            });
        }

        let event_queue_capacity = match lookup("MATEY_QUEUE_CAPACITY") {
            Some(raw) => parse_u64("MATEY_QUEUE_CAPACITY", &raw)? as usize,
            None => defaults.event_queue_capacity,
        };
        if event_queue_capacity == 0 {
            return Err(ConfigError::OutOfRange {
                var: "MATEY_QUEUE_CAPACITY",
                reason: "queue capacity must be positive",
            });
        }

        Ok(Self {
            broker_url: lookup("MATEY_BROKER_URL").unwrap_or(defaults.broker_url),
            reconnect_delay,
            heartbeat_outgoing: millis("MATEY_HEARTBEAT_OUT_MS", defaults.heartbeat_outgoing)?,
            heartbeat_incoming: millis("MATEY_HEARTBEAT_IN_MS", defaults.heartbeat_incoming)?,
            event_queue_capacity,
        })
    }

    /// Heartbeat offer for the CONNECT frame. The broker's reply decides
    /// the periods actually used.
    pub fn heart_beat(&self) -> HeartBeat {
        HeartBeat::new(
            self.heartbeat_outgoing.as_millis() as u64,
            self.heartbeat_incoming.as_millis() as u64,
        )
    }
}

/// Local identity from `MATEY_USER_ID` / `MATEY_USERNAME`.
///
/// Missing values fall back to a random id and a guest name.
pub fn identity_from_env() -> LocalIdentity {
    identity_from_lookup(|var| std::env::var(var).ok())
}

fn identity_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> LocalIdentity {
    let id = lookup("MATEY_USER_ID")
        .filter(|v| !v.trim().is_empty())
        .map(ParticipantId::new)
        .unwrap_or_else(ParticipantId::random);
    let display_name = lookup("MATEY_USERNAME")
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| format!("guest-{}", id.as_str().chars().take(8).collect::<String>()));
    LocalIdentity { id, display_name }
}

fn parse_u64(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: raw.to_string(),
    })
}
