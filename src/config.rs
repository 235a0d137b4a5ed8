//! Startup configuration.
//!
//! Everything has a default except the master key, which must come from
//! `ENCRYPTION_MASTER_KEY`. A missing or malformed key is fatal at startup.

use std::str::FromStr;
use std::time::Duration;

use docshield_crypto::KeyMaterial;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::watermark::WatermarkStyle;

pub const RATE_LIMIT_MAX_ENV: &str = "RATE_LIMIT_MAX";
pub const RATE_LIMIT_WINDOW_MS_ENV: &str = "RATE_LIMIT_WINDOW_MS";
pub const NONCE_RETENTION_DAYS_ENV: &str = "NONCE_RETENTION_DAYS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 200,
            window_ms: 60_000,
        }
    }
}

/// Thresholds for surfacing clients with repeated rejected access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SuspiciousConfig {
    pub since_minutes: u32,
    pub min_failures: u64,
}

impl Default for SuspiciousConfig {
    fn default() -> Self {
        Self {
            since_minutes: 60,
            min_failures: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeliveryConfig {
    pub rate_limit: RateLimitConfig,
    pub nonce_retention_days: u32,
    pub sweep_interval_secs: u64,
    pub suspicious: SuspiciousConfig,
    pub watermark: WatermarkStyle,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            nonce_retention_days: 7,
            sweep_interval_secs: 300,
            suspicious: SuspiciousConfig::default(),
            watermark: WatermarkStyle::default(),
        }
    }
}

impl DeliveryConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup` (an environment stand-in).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = parse_var(&lookup, RATE_LIMIT_MAX_ENV)? {
            config.rate_limit.max_requests = v;
        }
        if let Some(v) = parse_var(&lookup, RATE_LIMIT_WINDOW_MS_ENV)? {
            config.rate_limit.window_ms = v;
        }
        if let Some(v) = parse_var(&lookup, NONCE_RETENTION_DAYS_ENV)? {
            config.nonce_retention_days = v;
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON configuration document. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would disable a protection outright.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.window_ms == 0 {
            return Err(ConfigError::InvalidValue {
                name: RATE_LIMIT_WINDOW_MS_ENV,
                value: "0".into(),
            });
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Load the process master key. Call once at startup.
pub fn load_master_key() -> Result<KeyMaterial, ConfigError> {
    KeyMaterial::from_env().map_err(ConfigError::MasterKey)
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => Ok(Some(value)),
            Err(_) => Err(ConfigError::InvalidValue { name, value: raw }),
        },
    }
}
