//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `hkhub.toml` in the working directory. Every field has a
//! default so the file is optional. Environment variables take precedence
//! over file values.

use std::time::Duration;

use hkhub_domain::setup_code::SetupCode;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Pairing behaviour.
    pub pairing: PairingConfig,
    /// Integration toggles.
    pub integrations: IntegrationsConfig,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Deadline for each pairing step, in seconds.
    pub timeout_secs: u64,
    /// When set, unpaired devices are paired with this code as soon as
    /// they are discovered.
    pub setup_code: Option<String>,
}

/// Per-integration toggles.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    /// Enable the virtual/demo accessories.
    pub virtual_enabled: bool,
    /// Setup code shared by every virtual accessory.
    pub virtual_setup_code: String,
}

impl Config {
    /// Load configuration from `hkhub.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if
    /// the result does not validate.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("hkhub.toml")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("HKHUB_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("HKHUB_PAIRING_TIMEOUT_SECS")
            && let Ok(secs) = val.parse()
        {
            self.pairing.timeout_secs = secs;
        }
        if let Ok(val) = std::env::var("HKHUB_SETUP_CODE") {
            self.pairing.setup_code = Some(val);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pairing.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "pairing timeout must be non-zero".to_string(),
            ));
        }
        self.auto_pair_code()?;
        self.virtual_setup_code()?;
        Ok(())
    }

    #[must_use]
    pub fn pairing_timeout(&self) -> Duration {
        Duration::from_secs(self.pairing.timeout_secs)
    }

    /// The code used to pair newly discovered devices, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the code is malformed.
    pub fn auto_pair_code(&self) -> Result<Option<SetupCode>, ConfigError> {
        self.pairing
            .setup_code
            .as_deref()
            .map(|raw| parse_code("pairing.setup_code", raw))
            .transpose()
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the code is malformed.
    pub fn virtual_setup_code(&self) -> Result<SetupCode, ConfigError> {
        parse_code(
            "integrations.virtual_setup_code",
            &self.integrations.virtual_setup_code,
        )
    }
}

fn parse_code(field: &str, raw: &str) -> Result<SetupCode, ConfigError> {
    SetupCode::parse(raw)
        .map_err(|_| ConfigError::Validation(format!("{field} must look like 123-45-678")))
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "hkhubd=info,hkhub_app=info,hkhub_adapter_virtual=info".to_string(),
        }
    }
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            setup_code: None,
        }
    }
}

impl Default for IntegrationsConfig {
    fn default() -> Self {
        Self {
            virtual_enabled: true,
            virtual_setup_code: "031-45-154".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
