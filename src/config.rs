//! Configuration for the flare monitor.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Tunables of one detection pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Vote threshold in background standard deviations
    pub nsigma: f64,
    /// Samples required for full confidence
    pub nflare: usize,
    /// Background window length in samples
    pub nbgnd: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            nsigma: 2.5,
            nflare: 10,
            nbgnd: 50,
        }
    }
}

impl DetectorConfig {
    pub fn new(nsigma: f64, nflare: usize, nbgnd: usize) -> Self {
        Self {
            nsigma,
            nflare,
            nbgnd,
        }
    }

    /// Check that the tunables describe a usable detector.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.nsigma.is_finite() || self.nsigma <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "nsigma must be a positive number, got {}",
                self.nsigma
            )));
        }
        if self.nflare == 0 {
            return Err(ConfigError::Invalid("nflare must be at least 1".into()));
        }
        if self.nbgnd <= self.nflare {
            return Err(ConfigError::Invalid(format!(
                "nbgnd ({}) must exceed nflare ({})",
                self.nbgnd, self.nflare
            )));
        }
        Ok(())
    }
}

/// What to do with a flare that is still open when a batch ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenFlarePolicy {
    /// List it now, graded on the samples seen so far
    #[default]
    Finalize,
    /// Leave it out of the report until it closes
    Defer,
}

/// Main configuration for the monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Vote threshold in background standard deviations
    pub nsigma: f64,
    /// Samples required for full confidence
    pub nflare: usize,
    /// Background window of the fast-trigger instance
    pub nbgnd: usize,
    /// Background window of the stable-trigger instance
    pub nbgnd2: usize,

    /// Directory receiving the daily flare lists
    pub output_dir: PathBuf,

    /// Path for storing ingest statistics
    pub data_path: PathBuf,

    /// Poll interval of the live file tail
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,

    /// Handling of flares still open at the end of a batch
    pub open_flare_policy: OpenFlarePolicy,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("flaremon");
        let detector = DetectorConfig::default();

        Self {
            nsigma: detector.nsigma,
            nflare: detector.nflare,
            nbgnd: detector.nbgnd,
            nbgnd2: 200,
            output_dir: data_dir.join("flarelist"),
            data_path: data_dir,
            poll_interval: Duration::from_secs(60),
            open_flare_policy: OpenFlarePolicy::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::Io(e.to_string()))?;
            Self::from_json(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from JSON; missing fields take their defaults.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("flaremon")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| ConfigError::Io(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Tunables of the fast-trigger instance.
    pub fn fast_detector(&self) -> DetectorConfig {
        DetectorConfig::new(self.nsigma, self.nflare, self.nbgnd)
    }

    /// Tunables of the stable-trigger instance.
    pub fn slow_detector(&self) -> DetectorConfig {
        DetectorConfig::new(self.nsigma, self.nflare, self.nbgnd2)
    }

    /// Validate both detector instances.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fast_detector().validate()?;
        self.slow_detector().validate()
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.nsigma, 2.5);
        assert_eq!(config.nflare, 10);
        assert_eq!(config.nbgnd, 50);
        assert_eq!(config.nbgnd2, 200);
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.open_flare_policy, OpenFlarePolicy::Finalize);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_instance_tunables() {
        let config = Config::default();
        assert_eq!(config.fast_detector(), DetectorConfig::new(2.5, 10, 50));
        assert_eq!(config.slow_detector(), DetectorConfig::new(2.5, 10, 200));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            Config::from_json(r#"{"nbgnd2": 300, "open_flare_policy": "defer"}"#).unwrap();
        assert_eq!(config.nbgnd2, 300);
        assert_eq!(config.nbgnd, 50);
        assert_eq!(config.open_flare_policy, OpenFlarePolicy::Defer);
    }

    #[test]
    fn test_invalid_tunables() {
        assert!(DetectorConfig::new(0.0, 10, 50).validate().is_err());
        assert!(DetectorConfig::new(f64::NAN, 10, 50).validate().is_err());
        assert!(DetectorConfig::new(2.5, 0, 50).validate().is_err());
        assert!(DetectorConfig::new(2.5, 10, 10).validate().is_err());
    }
}
