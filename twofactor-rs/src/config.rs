//! Configuration for twofactor-rs

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TwoFactorError};

/// Environment variable overriding `storage.encryption_key`
pub const ENCRYPTION_KEY_ENV: &str = "TWOFACTOR_ENCRYPTION_KEY";

/// Environment variable overriding `yubico.api_key`
pub const YUBICO_API_KEY_ENV: &str = "TWOFACTOR_YUBICO_API_KEY";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub totp: TotpSettings,
    #[serde(default)]
    pub yubico: YubicoSettings,
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Time-based code settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TotpSettings {
    /// Issuer name shown in authenticator apps
    #[serde(default = "default_issuer")]
    pub issuer: String,
    /// Number of digits in a code
    #[serde(default = "default_digits")]
    pub digits: usize,
    /// Time step in seconds
    #[serde(default = "default_step")]
    pub step: u64,
    /// Adjacent steps accepted when verifying a login code
    #[serde(default = "default_verify_window")]
    pub verify_window: u8,
    /// Adjacent steps accepted for the proof code during enrollment
    #[serde(default = "default_enrollment_window")]
    pub enrollment_window: u8,
}

/// YubiCloud (or compatible) validation server settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct YubicoSettings {
    /// API client id
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Base64 API key; responses are signature-checked when set
    pub api_key: Option<String>,
    /// Validation endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Upper bound for one remote verification call
    #[serde(default = "default_yubico_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub database_url: String,
    /// Base64 encoded 256-bit key used to encrypt TOTP secrets at rest
    #[serde(default)]
    pub encryption_key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "pretty", "compact" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_issuer() -> String {
    "Dashboard".to_string()
}

fn default_digits() -> usize {
    6
}

fn default_step() -> u64 {
    30
}

fn default_verify_window() -> u8 {
    2
}

fn default_enrollment_window() -> u8 {
    8
}

fn default_client_id() -> String {
    "1".to_string()
}

fn default_api_url() -> String {
    "https://api.yubico.com/wsapi/2.0/verify".to_string()
}

fn default_yubico_timeout() -> u64 {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for TotpSettings {
    fn default() -> Self {
        Self {
            issuer: default_issuer(),
            digits: default_digits(),
            step: default_step(),
            verify_window: default_verify_window(),
            enrollment_window: default_enrollment_window(),
        }
    }
}

impl Default for YubicoSettings {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            api_key: None,
            api_url: default_api_url(),
            timeout_seconds: default_yubico_timeout(),
        }
    }
}

impl YubicoSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TwoFactorError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&content)
            .map_err(|e| TwoFactorError::Config(format!("Failed to parse config: {}", e)))?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Development configuration (local SQLite file, no encryption key)
    pub fn development() -> Self {
        let mut config = Self {
            totp: TotpSettings::default(),
            yubico: YubicoSettings::default(),
            storage: StorageConfig {
                database_url: "sqlite://twofactor.db?mode=rwc".to_string(),
                encryption_key: String::new(),
            },
            logging: LoggingConfig::default(),
        };
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(ENCRYPTION_KEY_ENV) {
            self.storage.encryption_key = key;
        }
        if let Ok(key) = std::env::var(YUBICO_API_KEY_ENV) {
            self.yubico.api_key = Some(key);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(6..=8).contains(&self.totp.digits) {
            return Err(TwoFactorError::Config(format!(
                "totp.digits must be between 6 and 8, got {}",
                self.totp.digits
            )));
        }

        if self.totp.step == 0 {
            return Err(TwoFactorError::Config("totp.step must be positive".to_string()));
        }

        if self.totp.enrollment_window < self.totp.verify_window {
            return Err(TwoFactorError::Config(
                "totp.enrollment_window must not be narrower than totp.verify_window".to_string(),
            ));
        }

        url::Url::parse(&self.yubico.api_url).map_err(|e| {
            TwoFactorError::Config(format!("Invalid Yubico API URL '{}': {}", self.yubico.api_url, e))
        })?;

        if self.yubico.timeout_seconds == 0 {
            return Err(TwoFactorError::Config(
                "yubico.timeout_seconds must be positive".to_string(),
            ));
        }

        if self.storage.encryption_key.is_empty() {
            return Err(TwoFactorError::Config(format!(
                "storage.encryption_key is not set (or export {})",
                ENCRYPTION_KEY_ENV
            )));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::development()
    }
}
