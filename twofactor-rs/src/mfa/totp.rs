//! TOTP (Time-based One-Time Password) service
//!
//! Implements RFC 6238 code generation and windowed validation. The clock is
//! injected so the skew window can be tested deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use totp_rs::{Algorithm, Secret, TOTP};
use tracing::warn;

use super::types::TotpSetup;
use crate::config::TotpSettings;
use crate::error::{Result, TwoFactorError};

/// Source of the current unix time in seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp().max(0) as u64
    }
}

/// Manually driven clock for tests and replay tooling
#[derive(Debug, Default)]
pub struct FixedClock {
    now: AtomicU64,
}

impl FixedClock {
    pub fn new(now: u64) -> Self {
        Self {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: u64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// TOTP service for generating and validating codes
#[derive(Clone)]
pub struct TotpService {
    settings: TotpSettings,
    clock: Arc<dyn Clock>,
}

impl TotpService {
    /// Create a TOTP service on the wall clock
    pub fn new(settings: TotpSettings) -> Self {
        Self::with_clock(settings, Arc::new(SystemClock))
    }

    pub fn with_clock(settings: TotpSettings, clock: Arc<dyn Clock>) -> Self {
        Self { settings, clock }
    }

    pub fn settings(&self) -> &TotpSettings {
        &self.settings
    }

    /// Generate a new 160-bit base32 secret
    pub fn generate_secret(&self) -> String {
        Secret::generate_secret().to_encoded().to_string()
    }

    /// Create setup data for the enrollment screen (secret + QR code)
    pub fn setup(&self, account_name: &str) -> Result<TotpSetup> {
        let secret = self.generate_secret();
        let totp = self.build_totp(&secret, 0, account_name)?;

        let provisioning_uri = totp.get_url();
        let qr_code = totp
            .get_qr_base64()
            .map_err(|e| TwoFactorError::Crypto(format!("Failed to generate QR code: {}", e)))?;

        Ok(TotpSetup {
            secret,
            qr_code: format!("data:image/png;base64,{}", qr_code),
            provisioning_uri,
        })
    }

    /// Check that a secret decodes and is long enough to enroll
    pub fn check_secret(&self, secret: &str) -> Result<()> {
        self.build_totp(secret, 0, "").map(|_| ())
    }

    /// Validate a code against the current time, accepting `window` steps on
    /// either side
    pub fn validate(&self, secret: &str, code: &str, window: u8) -> Result<bool> {
        self.validate_at(secret, code, window, self.clock.now())
    }

    /// Validate a code as if the current unix time were `time`
    pub fn validate_at(&self, secret: &str, code: &str, window: u8, time: u64) -> Result<bool> {
        let totp = self.build_totp(secret, window, "")?;
        let code = normalize_code(code);

        if code.len() != self.settings.digits || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Ok(false);
        }

        if time < u64::from(window) * self.settings.step {
            warn!(time, "Clock is before the TOTP window start, rejecting code");
            return Ok(false);
        }

        Ok(totp.check(&code, time))
    }

    /// Generate the code for the current time
    pub fn generate_current(&self, secret: &str) -> Result<String> {
        self.generate_at(secret, self.clock.now())
    }

    /// Generate the code for a given unix time
    pub fn generate_at(&self, secret: &str, time: u64) -> Result<String> {
        Ok(self.build_totp(secret, 0, "")?.generate(time))
    }

    fn build_totp(&self, secret: &str, skew: u8, account_name: &str) -> Result<TOTP> {
        let bytes = Secret::Encoded(normalize_secret(secret))
            .to_bytes()
            .map_err(|e| TwoFactorError::InvalidSecret(format!("{:?}", e)))?;

        TOTP::new(
            Algorithm::SHA1,
            self.settings.digits,
            skew,
            self.settings.step,
            bytes,
            Some(self.settings.issuer.clone()),
            account_name.to_string(),
        )
        .map_err(|e| TwoFactorError::InvalidSecret(format!("{:?}", e)))
    }
}

impl Default for TotpService {
    fn default() -> Self {
        Self::new(TotpSettings::default())
    }
}

/// Remove the spaces and dashes users copy along with the digits
fn normalize_code(code: &str) -> String {
    code.trim().replace([' ', '-'], "")
}

fn normalize_secret(secret: &str) -> String {
    secret
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=')
        .collect::<String>()
        .to_ascii_uppercase()
}
