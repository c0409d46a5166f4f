//! Bridge configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Unset or unparsable values fall back
//! to the defaults listed on each field.

use std::time::Duration;

use crate::bridge::{BridgeSettings, ReconnectPolicy};

/// Top-level bridge configuration.
///
/// Loaded once at startup via [`BridgeConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Broker host name (`BROKER_HOST`, default `localhost`).
    pub broker_host: String,

    /// Broker port (`BROKER_PORT`, default `8000`).
    pub broker_port: u16,

    /// Origin tag on outbound notifications (`BRIDGE_ORIGIN`, default `coap`).
    pub origin: String,

    /// Seconds of silence before a node is declared dead
    /// (`NODE_MAX_TIME_SECS`, default `120`).
    pub node_max_time_secs: u64,

    /// Milliseconds between dead-node sweeps (`SWEEP_INTERVAL_MS`, default `1000`).
    pub sweep_interval_ms: u64,

    /// Broker handshake timeout in seconds (`CONNECT_TIMEOUT_SECS`, default `10`).
    pub connect_timeout_secs: u64,

    /// Seconds between reconnect attempts; `0` disables reconnection
    /// (`RECONNECT_DELAY_SECS`, default `0`).
    pub reconnect_delay_secs: u64,

    /// Consecutive failed connects tolerated; `0` is unlimited
    /// (`RECONNECT_MAX_ATTEMPTS`, default `0`).
    pub reconnect_max_attempts: u32,

    /// Default log level `debug` instead of `info` (`BRIDGE_DEBUG`, default `false`).
    pub debug: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 8000,
            origin: "coap".to_string(),
            node_max_time_secs: 120,
            sweep_interval_ms: 1000,
            connect_timeout_secs: 10,
            reconnect_delay_secs: 0,
            reconnect_max_attempts: 0,
            debug: false,
        }
    }
}

impl BridgeConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `BRIDGE_ORIGIN` or `BROKER_HOST` is set but blank.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if `BRIDGE_ORIGIN` or `BROKER_HOST` is blank.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Box<dyn std::error::Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let broker_host = lookup("BROKER_HOST").unwrap_or(defaults.broker_host);
        if broker_host.trim().is_empty() {
            return Err("BROKER_HOST must not be blank".into());
        }
        let origin = lookup("BRIDGE_ORIGIN").unwrap_or(defaults.origin);
        if origin.trim().is_empty() {
            return Err("BRIDGE_ORIGIN must not be blank".into());
        }

        Ok(Self {
            broker_host,
            broker_port: parse_var(&lookup, "BROKER_PORT", defaults.broker_port),
            origin,
            node_max_time_secs: parse_var(&lookup, "NODE_MAX_TIME_SECS", defaults.node_max_time_secs),
            sweep_interval_ms: parse_var(&lookup, "SWEEP_INTERVAL_MS", defaults.sweep_interval_ms),
            connect_timeout_secs: parse_var(
                &lookup,
                "CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout_secs,
            ),
            reconnect_delay_secs: parse_var(
                &lookup,
                "RECONNECT_DELAY_SECS",
                defaults.reconnect_delay_secs,
            ),
            reconnect_max_attempts: parse_var(
                &lookup,
                "RECONNECT_MAX_ATTEMPTS",
                defaults.reconnect_max_attempts,
            ),
            debug: parse_bool(&lookup, "BRIDGE_DEBUG", defaults.debug),
        })
    }

    /// WebSocket URL of the broker endpoint.
    #[must_use]
    pub fn broker_url(&self) -> String {
        format!("ws://{}:{}/broker", self.broker_host, self.broker_port)
    }

    /// Silence after which a node is declared dead.
    #[must_use]
    pub const fn node_max_time(&self) -> Duration {
        Duration::from_secs(self.node_max_time_secs)
    }

    /// Broker handshake timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Bridge tunables derived from this configuration.
    #[must_use]
    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            origin: self.origin.clone(),
            sweep_interval: Duration::from_millis(self.sweep_interval_ms),
            reconnect: ReconnectPolicy::from_settings(
                Duration::from_secs(self.reconnect_delay_secs),
                self.reconnect_max_attempts,
            ),
        }
    }
}

/// Parses `key` as `T`, returning `default` on missing or invalid values.
fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Parses `key` as a boolean. Accepts `"true"`, `"1"`, `"false"`, `"0"`
/// (case-insensitive). Returns `default` otherwise.
fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}
