//! Verification orchestrator
//!
//! Decides whether a submitted code satisfies one of a user's enabled
//! methods. The decision is session-free; callers record the session marker.
//!
//! # Security
//! - Every candidate is evaluated, in enrollment order
//! - At most one remote call per verification (only prefix-matching tokens)
//! - Remote failures count as a non-match and never propagate
//! - The returned value carries no failure reason; reasons go to the audit log

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::audit::{self, AuditEvent};
use super::totp::TotpService;
use super::types::{Credential, FailureReason, TwoFactorMethod, Verification};
use crate::error::Result;
use crate::storage::CredentialStore;
use crate::yubikey::{HardwareTokenValidator, TokenOutcome, YubikeyOtp};

pub struct Verifier {
    store: Arc<dyn CredentialStore>,
    totp: TotpService,
    tokens: HardwareTokenValidator,
    window: u8,
    token_timeout: Duration,
}

impl Verifier {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        totp: TotpService,
        tokens: HardwareTokenValidator,
        token_timeout: Duration,
    ) -> Self {
        let window = totp.settings().verify_window;
        Self {
            store,
            totp,
            tokens,
            window,
            token_timeout,
        }
    }

    /// Verify `code` against the user's enabled methods.
    ///
    /// Only storage failures are returned as errors.
    pub async fn verify(&self, user_id: &str, code: &str) -> Result<Verification> {
        let methods = self.store.find_enabled_methods(user_id).await?;

        if methods.is_empty() {
            audit::log_event(
                AuditEvent::VerifyFailed,
                user_id,
                None,
                Some(FailureReason::NoEnabledMethods),
            );
            return Ok(Verification::NoMatch);
        }

        let submitted_otp = YubikeyOtp::parse(code);
        let mut remote: Option<TokenOutcome> = None;
        let mut matches = Vec::new();
        let mut last_reason = FailureReason::ValidationMismatch;

        for method in &methods {
            match self
                .check_method(method, code, submitted_otp.as_ref(), &mut remote)
                .await
            {
                Ok(()) => matches.push(&method.id),
                Err(reason) => {
                    audit::log_event(AuditEvent::MethodRejected, user_id, Some(&method.id), Some(reason));
                    if reason != FailureReason::ValidationMismatch {
                        last_reason = reason;
                    }
                }
            }
        }

        let Some(&winner) = matches.first() else {
            audit::log_event(AuditEvent::VerifyFailed, user_id, None, Some(last_reason));
            return Ok(Verification::NoMatch);
        };

        if matches.len() > 1 {
            info!(
                user_id,
                matched = matches.len(),
                "Code satisfied several methods, using the first enrolled"
            );
        }

        audit::log_event(AuditEvent::VerifySuccess, user_id, Some(winner), None);
        Ok(Verification::Matched(winner.clone()))
    }

    async fn check_method(
        &self,
        method: &TwoFactorMethod,
        code: &str,
        submitted_otp: Option<&YubikeyOtp>,
        remote: &mut Option<TokenOutcome>,
    ) -> std::result::Result<(), FailureReason> {
        match &method.credential {
            Credential::TimeBased { secret } => match self.totp.validate(secret, code, self.window) {
                Ok(true) => Ok(()),
                Ok(false) => Err(FailureReason::ValidationMismatch),
                Err(e) => {
                    warn!(method_id = %method.id, error = %e, "Stored TOTP secret is unusable");
                    Err(FailureReason::InvalidSecret)
                }
            },
            Credential::HardwareToken { prefix } => {
                let Some(otp) = submitted_otp.filter(|otp| otp.matches_prefix(prefix)) else {
                    return Err(FailureReason::ValidationMismatch);
                };

                // One remote call per verification, shared by every method
                // enrolled with this prefix
                let outcome = match remote.clone() {
                    Some(outcome) => outcome,
                    None => {
                        let outcome = self.tokens.check_remote(otp, self.token_timeout).await;
                        *remote = Some(outcome.clone());
                        outcome
                    }
                };

                match outcome {
                    TokenOutcome::Valid => Ok(()),
                    TokenOutcome::InvalidSignature => Err(FailureReason::ValidationMismatch),
                    TokenOutcome::Replayed => Err(FailureReason::ReplayDetected),
                    TokenOutcome::TransportFailure(reason) => {
                        warn!(method_id = %method.id, %reason, "YubiKey validation server failure");
                        Err(FailureReason::TransportFailure)
                    }
                }
            }
        }
    }
}
