//! MFA Manager - enrollment, management and challenge handling

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info};

use super::audit::{self, AuditEvent};
use super::session::{Session, SessionMarker};
use super::totp::TotpService;
use super::types::*;
use super::verifier::Verifier;
use crate::config::Config;
use crate::error::{Result, TwoFactorError};
use crate::storage::{CredentialStore, SecretCipher, SqliteCredentialStore};
use crate::yubikey::{
    HardwareTokenValidator, OtpVerifier, TokenOutcome, TokenValidation, YubicoClient, YubikeyOtp,
};

/// MFA Manager for a user's second-factor methods
pub struct MfaManager {
    store: Arc<dyn CredentialStore>,
    totp: TotpService,
    tokens: HardwareTokenValidator,
    verifier: Verifier,
    token_timeout: Duration,
}

impl MfaManager {
    /// Create a manager from its collaborators
    pub fn new(
        store: Arc<dyn CredentialStore>,
        totp: TotpService,
        remote: Arc<dyn OtpVerifier>,
        token_timeout: Duration,
    ) -> Self {
        let tokens = HardwareTokenValidator::new(remote);
        let verifier = Verifier::new(store.clone(), totp.clone(), tokens.clone(), token_timeout);

        Self {
            store,
            totp,
            tokens,
            verifier,
            token_timeout,
        }
    }

    /// Build the production stack: SQLite store, Yubico client, wall clock
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let cipher = SecretCipher::from_base64(&config.storage.encryption_key)?;
        let store = SqliteCredentialStore::new(&config.storage.database_url, cipher).await?;
        let client = YubicoClient::new(&config.yubico)?;

        info!(
            database = %config.storage.database_url,
            yubico = %config.yubico.api_url,
            "Two-factor manager ready"
        );

        Ok(Self::new(
            Arc::new(store),
            TotpService::new(config.totp.clone()),
            Arc::new(client),
            config.yubico.timeout(),
        ))
    }

    /// Generate a secret and QR code for the enrollment screen.
    ///
    /// Nothing is persisted until [`MfaManager::enroll_time_based`].
    pub fn setup_time_based(&self, user_id: &str, account_name: &str) -> Result<TotpSetup> {
        let setup = self.totp.setup(account_name)?;
        audit::log_event(AuditEvent::SetupStarted, user_id, None, None);
        Ok(setup)
    }

    /// Decide whether `code` satisfies one of the user's enabled methods
    pub async fn verify_otp(&self, user_id: &str, code: &str) -> Result<Verification> {
        self.verifier.verify(user_id, code).await
    }

    /// Verify and, on success, record the method in the session
    pub async fn complete_challenge<S: Session + ?Sized>(
        &self,
        user_id: &str,
        code: &str,
        session: &mut S,
    ) -> Result<Verification> {
        let verification = self.verifier.verify(user_id, code).await?;

        if let Verification::Matched(id) = &verification {
            SessionMarker::record(session, id);
        }

        Ok(verification)
    }

    /// Whether the user must still pass a challenge in this session.
    ///
    /// Users without enabled methods are never challenged. A marker naming a
    /// method that was since disabled or removed does not count.
    pub async fn requires_challenge<S: Session + ?Sized>(
        &self,
        user_id: &str,
        session: &S,
    ) -> Result<bool> {
        let enabled = self.store.find_enabled_methods(user_id).await?;
        if enabled.is_empty() {
            return Ok(false);
        }

        Ok(match SessionMarker::current(session) {
            Some(marker) => !enabled.iter().any(|m| m.id == marker),
            None => true,
        })
    }

    /// Enroll an authenticator app after checking a proof code
    pub async fn enroll_time_based(
        &self,
        user_id: &str,
        name: &str,
        secret: &str,
        proof_code: &str,
    ) -> Result<TwoFactorMethod> {
        validate_name(name)?;
        self.totp.check_secret(secret)?;

        let window = self.totp.settings().enrollment_window;
        if !self.totp.validate(secret, proof_code, window)? {
            audit::log_event(
                AuditEvent::EnrollmentFailed,
                user_id,
                None,
                Some(FailureReason::EnrollmentConflict),
            );
            return Err(TwoFactorError::InvalidCode);
        }

        let method = TwoFactorMethod::new(
            user_id,
            name,
            Credential::TimeBased {
                secret: secret.trim().to_string(),
            },
        );
        self.store.save(&method).await?;

        audit::log_event(AuditEvent::EnrollmentCompleted, user_id, Some(&method.id), None);
        Ok(method)
    }

    /// Enroll a YubiKey from one freshly generated OTP.
    ///
    /// Only the public id is kept; the OTP itself is consumed by the server.
    pub async fn enroll_hardware_token(
        &self,
        user_id: &str,
        name: &str,
        otp: &str,
    ) -> Result<TwoFactorMethod> {
        validate_name(name)?;

        let parsed = match YubikeyOtp::parse(otp) {
            Some(parsed) if !parsed.prefix().is_empty() => parsed,
            _ => {
                debug!(user_id, "Submitted string is not a YubiKey OTP with a public id");
                return Err(self.enrollment_failed(user_id, FailureReason::EnrollmentConflict));
            }
        };

        let outcome = match self
            .tokens
            .validate(parsed.prefix(), otp, self.token_timeout)
            .await
        {
            TokenValidation::Checked(outcome) => outcome,
            TokenValidation::NotThisToken => {
                return Err(self.enrollment_failed(user_id, FailureReason::EnrollmentConflict));
            }
        };

        match outcome {
            TokenOutcome::Valid => {}
            TokenOutcome::Replayed => {
                audit::log_event(
                    AuditEvent::EnrollmentFailed,
                    user_id,
                    None,
                    Some(FailureReason::ReplayDetected),
                );
                return Err(TwoFactorError::ReplayedCode);
            }
            TokenOutcome::InvalidSignature => {
                return Err(self.enrollment_failed(user_id, FailureReason::ValidationMismatch));
            }
            TokenOutcome::TransportFailure(reason) => {
                debug!(user_id, %reason, "YubiKey enrollment could not be verified");
                return Err(self.enrollment_failed(user_id, FailureReason::TransportFailure));
            }
        }

        let method = TwoFactorMethod::new(
            user_id,
            name,
            Credential::HardwareToken {
                prefix: parsed.prefix().to_string(),
            },
        );
        self.store.save(&method).await?;

        audit::log_event(AuditEvent::EnrollmentCompleted, user_id, Some(&method.id), None);
        Ok(method)
    }

    /// Enroll an authenticator app and mark the session as verified with it.
    ///
    /// The session is left untouched when enrollment fails.
    pub async fn enroll_time_based_in_session<S: Session + ?Sized>(
        &self,
        user_id: &str,
        name: &str,
        secret: &str,
        proof_code: &str,
        session: &mut S,
    ) -> Result<TwoFactorMethod> {
        let method = self
            .enroll_time_based(user_id, name, secret, proof_code)
            .await?;
        SessionMarker::record(session, &method.id);
        Ok(method)
    }

    /// Enroll a YubiKey and mark the session as verified with it
    pub async fn enroll_hardware_token_in_session<S: Session + ?Sized>(
        &self,
        user_id: &str,
        name: &str,
        otp: &str,
        session: &mut S,
    ) -> Result<TwoFactorMethod> {
        let method = self.enroll_hardware_token(user_id, name, otp).await?;
        SessionMarker::record(session, &method.id);
        Ok(method)
    }

    /// Rename, enable or disable one of the user's methods
    pub async fn update_method(
        &self,
        user_id: &str,
        method_id: &MethodId,
        patch: MethodPatch,
    ) -> Result<TwoFactorMethod> {
        if patch.is_empty() {
            return Err(TwoFactorError::InvalidInput("nothing to update".to_string()));
        }
        if let Some(name) = &patch.name {
            validate_name(name)?;
        }

        let mut method = self
            .store
            .find_method(user_id, method_id)
            .await?
            .ok_or_else(|| TwoFactorError::MethodNotFound(method_id.to_string()))?;

        if let Some(name) = patch.name {
            method.name = name.trim().to_string();
        }
        if let Some(enabled) = patch.enabled {
            method.enabled = enabled;
        }
        method.updated_at = Utc::now();

        self.store.update(&method).await?;

        audit::log_event(AuditEvent::MethodUpdated, user_id, Some(&method.id), None);
        Ok(method)
    }

    /// Update a method and record it in the session
    pub async fn update_method_in_session<S: Session + ?Sized>(
        &self,
        user_id: &str,
        method_id: &MethodId,
        patch: MethodPatch,
        session: &mut S,
    ) -> Result<TwoFactorMethod> {
        let method = self.update_method(user_id, method_id, patch).await?;
        SessionMarker::record(session, &method.id);
        Ok(method)
    }

    /// Delete one of the user's methods
    pub async fn remove_method(&self, user_id: &str, method_id: &MethodId) -> Result<()> {
        if !self.store.delete(user_id, method_id).await? {
            return Err(TwoFactorError::MethodNotFound(method_id.to_string()));
        }

        audit::log_event(AuditEvent::MethodRemoved, user_id, Some(method_id), None);
        Ok(())
    }

    /// Delete every method of a user (account deletion)
    pub async fn remove_all_for_user(&self, user_id: &str) -> Result<u64> {
        let removed = self.store.delete_for_user(user_id).await?;
        info!(user_id, removed, "Removed all two-factor methods");
        Ok(removed)
    }

    /// All methods of the user, enabled or not, in enrollment order
    pub async fn list_methods(&self, user_id: &str) -> Result<Vec<TwoFactorMethod>> {
        self.store.find_methods(user_id).await
    }

    fn enrollment_failed(&self, user_id: &str, reason: FailureReason) -> TwoFactorError {
        audit::log_event(AuditEvent::EnrollmentFailed, user_id, None, Some(reason));
        TwoFactorError::InvalidCode
    }
}

/// Method names are required and at most 255 characters
fn validate_name(name: &str) -> Result<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(TwoFactorError::InvalidInput("name is required".to_string()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(TwoFactorError::InvalidInput(format!(
            "name must be at most {} characters",
            MAX_NAME_LENGTH
        )));
    }

    Ok(())
}
