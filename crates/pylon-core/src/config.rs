//! Configuration for the pipeline.
//!
//! # Configuration Sources
//!
//! - JSON files (see `pylon init`)
//! - Environment variables (prefixed with `PYLON_`), applied on top of the file or defaults
//! - Programmatic defaults and the builder
//!
//! # Example
//!
//! ```rust,ignore
//! use pylon_core::config::PylonConfig;
//!
//! let config = PylonConfig::builder()
//!     .fee_collector("pylo1feecollector")
//!     .default_fee_bps(1_000)
//!     .build()?;
//! ```

use serde::{Deserialize, Serialize};

use crate::bounds::RuntimeBounds;
use crate::types::{Address, FeeRate};
use crate::{PylonError, Result};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Complete pipeline configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PylonConfig {
    /// Fee collection.
    pub fees: FeeConfig,

    /// Epoch reward distribution.
    pub distribution: DistributionConfig,

    /// Safety bounds.
    pub bounds: RuntimeBounds,

    /// Logging.
    pub logging: LoggingConfig,
}

impl PylonConfig {
    pub fn builder() -> PylonConfigBuilder {
        PylonConfigBuilder::default()
    }

    /// Defaults plus `PYLON_*` environment overrides:
    /// - `PYLON_FEE_COLLECTOR` - fee collector account
    /// - `PYLON_DEFAULT_FEE_BPS` - default fee in basis points (0..=10000)
    /// - `PYLON_DISTR_EPOCH_IDENTIFIER` - epoch identifier that triggers distribution
    /// - `PYLON_MAX_PENDING_EXECUTIONS` - pending-set bound
    /// - `PYLON_LOG_LEVEL` - logging level (trace, debug, info, warn, error)
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply `PYLON_*` environment overrides to `self`, then validate.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(collector) = lookup("PYLON_FEE_COLLECTOR") {
            self.fees.fee_collector = collector;
        }

        if let Some(bps) = lookup("PYLON_DEFAULT_FEE_BPS") {
            self.fees.default_fee_bps = bps.parse().map_err(|e| {
                PylonError::ConfigError(format!("Invalid PYLON_DEFAULT_FEE_BPS: {}", e))
            })?;
        }

        if let Some(id) = lookup("PYLON_DISTR_EPOCH_IDENTIFIER") {
            self.distribution.epoch_identifier = id;
        }

        if let Some(max) = lookup("PYLON_MAX_PENDING_EXECUTIONS") {
            self.bounds.max_pending_executions = max.parse().map_err(|e| {
                PylonError::ConfigError(format!("Invalid PYLON_MAX_PENDING_EXECUTIONS: {}", e))
            })?;
        }

        if let Some(level) = lookup("PYLON_LOG_LEVEL") {
            self.logging.level = level;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        Address::new(self.fees.fee_collector.clone())
            .map_err(|e| PylonError::ConfigError(format!("fee_collector: {e}")))?;

        if self.fees.default_fee_bps > 10_000 {
            return Err(PylonError::ConfigError(
                "default_fee_bps must be between 0 and 10000".into(),
            ));
        }

        if self.distribution.epoch_identifier.trim().is_empty() {
            return Err(PylonError::ConfigError(
                "distribution epoch_identifier must be non-empty".into(),
            ));
        }

        self.bounds
            .validate()
            .map_err(|e| PylonError::ConfigError(e.to_string()))?;

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(PylonError::ConfigError(format!(
                "unknown log level {:?} (expected one of {})",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }

    pub fn fee_collector(&self) -> Result<Address> {
        Address::new(self.fees.fee_collector.clone())
            .map_err(|e| PylonError::ConfigError(format!("fee_collector: {e}")))
    }

    pub fn default_fee_rate(&self) -> Result<FeeRate> {
        FeeRate::from_bps(self.fees.default_fee_bps)
            .map_err(|e| PylonError::ConfigError(format!("default_fee_bps: {e}")))
    }
}

/// Fee collection configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeConfig {
    /// Account that receives recipe fees and funds epoch rewards.
    pub fee_collector: String,

    /// Fee applied to recipes without their own rate, in basis points.
    pub default_fee_bps: u32,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            fee_collector: "fee_collector".into(),
            default_fee_bps: 1_000, // 10%
        }
    }
}

/// Reward distribution configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    /// Only epoch-end callbacks carrying this identifier distribute rewards.
    pub epoch_identifier: String,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            epoch_identifier: "day".into(),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Whether to include event targets (module paths) in log lines.
    pub include_targets: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            include_targets: false,
        }
    }
}

/// Builder for PylonConfig.
#[derive(Default)]
pub struct PylonConfigBuilder {
    config: PylonConfig,
}

impl PylonConfigBuilder {
    pub fn fee_collector(mut self, collector: impl Into<String>) -> Self {
        self.config.fees.fee_collector = collector.into();
        self
    }

    pub fn default_fee_bps(mut self, bps: u32) -> Self {
        self.config.fees.default_fee_bps = bps;
        self
    }

    pub fn epoch_identifier(mut self, id: impl Into<String>) -> Self {
        self.config.distribution.epoch_identifier = id.into();
        self
    }

    pub fn bounds(mut self, bounds: RuntimeBounds) -> Self {
        self.config.bounds = bounds;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<PylonConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = PylonConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_fee_rate().unwrap(), FeeRate::default());
        assert_eq!(config.distribution.epoch_identifier, "day");
    }

    #[test]
    fn builder_creates_valid_config() {
        let config = PylonConfig::builder()
            .fee_collector("pylo1fees")
            .default_fee_bps(250)
            .epoch_identifier("week")
            .log_level("debug")
            .build()
            .expect("should build");

        assert_eq!(config.fee_collector().unwrap().as_str(), "pylo1fees");
        assert_eq!(config.default_fee_rate().unwrap(), FeeRate::from_bps(250).unwrap());
        assert_eq!(config.distribution.epoch_identifier, "week");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn fee_above_one_hundred_percent_rejected() {
        assert!(PylonConfig::builder().default_fee_bps(10_001).build().is_err());
    }

    #[test]
    fn blank_collector_and_bad_level_rejected() {
        assert!(PylonConfig::builder().fee_collector(" ").build().is_err());
        assert!(PylonConfig::builder().log_level("loud").build().is_err());
    }

    #[test]
    fn overrides_apply_and_validate() {
        let vars: HashMap<&str, &str> = [
            ("PYLON_FEE_COLLECTOR", "pylo1pool"),
            ("PYLON_DEFAULT_FEE_BPS", "500"),
            ("PYLON_DISTR_EPOCH_IDENTIFIER", "hour"),
            ("PYLON_MAX_PENDING_EXECUTIONS", "10"),
        ]
        .into_iter()
        .collect();
        let config = PylonConfig::default()
            .with_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.fees.fee_collector, "pylo1pool");
        assert_eq!(config.fees.default_fee_bps, 500);
        assert_eq!(config.distribution.epoch_identifier, "hour");
        assert_eq!(config.bounds.max_pending_executions, 10);

        let bad = PylonConfig::default()
            .with_overrides(|k| (k == "PYLON_DEFAULT_FEE_BPS").then(|| "ten".to_string()));
        assert!(matches!(bad, Err(PylonError::ConfigError(_))));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: PylonConfig =
            serde_json::from_str(r#"{"fees": {"fee_collector": "pylo1x"}}"#).unwrap();
        assert_eq!(config.fees.fee_collector, "pylo1x");
        assert_eq!(config.fees.default_fee_bps, 1_000);
        assert_eq!(config.bounds, RuntimeBounds::default());
    }
}
