//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use serde::Deserialize;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0), // Bind to 0.0.0.0 for Docker
            port: 3000,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

/// Tunables for risk gating and velocity tracking
#[derive(Debug, Clone, Deserialize)]
pub struct GovernanceConfig {
    /// Risk ceiling at or below which a proposal may skip review
    pub auto_merge_threshold: f64,
    /// Penalty added to the velocity tracker for every created proposal
    pub velocity_increment: f64,
    /// Hours for the velocity penalty to decay to half its value
    pub velocity_half_life_hours: f64,
    /// Cadence of the host's expiry sweep
    pub expiry_sweep_interval_secs: u64,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            auto_merge_threshold: 0.2,
            velocity_increment: crate::governance::velocity::DEFAULT_VELOCITY_INCREMENT,
            velocity_half_life_hours: 1.0,
            expiry_sweep_interval_secs: 30,
        }
    }
}

impl GovernanceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.auto_merge_threshold) {
            return Err(ConfigError::InvalidValue(format!(
                "AUTO_MERGE_THRESHOLD must be within [0, 1], got {}",
                self.auto_merge_threshold
            )));
        }
        if !self.velocity_increment.is_finite() || self.velocity_increment <= 0.0 {
            return Err(ConfigError::InvalidValue(format!(
                "VELOCITY_INCREMENT must be positive, got {}",
                self.velocity_increment
            )));
        }
        if !self.velocity_half_life_hours.is_finite() || self.velocity_half_life_hours <= 0.0 {
            return Err(ConfigError::InvalidValue(format!(
                "VELOCITY_HALF_LIFE_HOURS must be positive, got {}",
                self.velocity_half_life_hours
            )));
        }
        if self.expiry_sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "EXPIRY_SWEEP_INTERVAL_SECS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete application settings
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub governance: GovernanceConfig,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let server = ServerConfig {
            host: std::env::var("HOST")
                .ok()
                .and_then(|h| h.parse().ok())
                .unwrap_or_else(|| ServerConfig::default().host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or_else(|| ServerConfig::default().port),
        };

        let cors = CorsConfig {
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|| CorsConfig::default().allowed_origins),
        };

        let defaults = GovernanceConfig::default();
        let governance = GovernanceConfig {
            auto_merge_threshold: env_or("AUTO_MERGE_THRESHOLD", defaults.auto_merge_threshold)?,
            velocity_increment: env_or("VELOCITY_INCREMENT", defaults.velocity_increment)?,
            velocity_half_life_hours: env_or(
                "VELOCITY_HALF_LIFE_HOURS",
                defaults.velocity_half_life_hours,
            )?,
            expiry_sweep_interval_secs: env_or(
                "EXPIRY_SWEEP_INTERVAL_SECS",
                defaults.expiry_sweep_interval_secs,
            )?,
        };
        governance.validate()?;

        Ok(Self {
            server,
            cors,
            governance,
        })
    }
}

/// Read a typed variable, falling back to `default` when unset.
/// A set but unparseable value is an error rather than a silent default.
fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::ParseError(format!("{} has invalid value '{}'", key, raw))),
        Err(_) => Ok(default),
    }
}
