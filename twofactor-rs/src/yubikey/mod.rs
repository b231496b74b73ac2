//! YubiKey OTP support
//!
//! Hardware-token validation happens in two steps:
//! 1. The submitted string is parsed locally and its public id compared with
//!    the enrolled prefix. Mismatches never reach the network.
//! 2. A single, time-boxed call to the validation server checks authenticity
//!    and freshness (the server owns the anti-replay counter).

pub mod client;
pub mod otp;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub use client::YubicoClient;
pub use otp::YubikeyOtp;

/// Answer of the remote validation service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOutcome {
    /// Authentic and fresh; the server advanced its counter
    Valid,
    /// Not produced by the registered token (or the answer was forged)
    InvalidSignature,
    /// Counter did not advance: this OTP was seen before
    Replayed,
    /// Server unreachable, too slow or answering garbage
    TransportFailure(String),
}

impl TokenOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, TokenOutcome::Valid)
    }
}

/// Result of validating a submitted string against one enrolled token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenValidation {
    /// Not an OTP of this token; no remote call was made
    NotThisToken,
    /// The prefix matched and the server answered (or failed to)
    Checked(TokenOutcome),
}

impl TokenValidation {
    pub fn is_valid(&self) -> bool {
        matches!(self, TokenValidation::Checked(TokenOutcome::Valid))
    }
}

/// Remote verification service holding token keys and replay counters
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OtpVerifier: Send + Sync {
    /// Verify one OTP. Implementations should give up after `timeout`; the
    /// validator enforces the bound regardless.
    async fn verify(&self, otp: &str, timeout: Duration) -> TokenOutcome;
}

/// Validates submitted OTPs against enrolled token prefixes
#[derive(Clone)]
pub struct HardwareTokenValidator {
    verifier: Arc<dyn OtpVerifier>,
}

impl HardwareTokenValidator {
    pub fn new(verifier: Arc<dyn OtpVerifier>) -> Self {
        Self { verifier }
    }

    /// Validate `otp` against the token identified by `prefix`
    pub async fn validate(&self, prefix: &str, otp: &str, timeout: Duration) -> TokenValidation {
        match YubikeyOtp::parse(otp) {
            Some(parsed) if parsed.matches_prefix(prefix) => {
                TokenValidation::Checked(self.check_remote(&parsed, timeout).await)
            }
            _ => TokenValidation::NotThisToken,
        }
    }

    /// Ask the validation server about an already parsed OTP.
    ///
    /// Never retries. Returns `TransportFailure` once `timeout` has elapsed.
    pub async fn check_remote(&self, otp: &YubikeyOtp, timeout: Duration) -> TokenOutcome {
        debug!(prefix = otp.prefix(), "Verifying YubiKey OTP remotely");

        match tokio::time::timeout(timeout, self.verifier.verify(otp.otp(), timeout)).await {
            Ok(outcome) => outcome,
            Err(_) => TokenOutcome::TransportFailure(format!(
                "no answer from validation server within {:?}",
                timeout
            )),
        }
    }
}
