//! MFA types and data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a user-assigned method name
pub const MAX_NAME_LENGTH: usize = 255;

/// Opaque, stable identifier of an enrolled method
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MethodId(String);

impl MethodId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MethodId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for MethodId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Credential backing a method. Exactly one kind per method.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credential {
    /// Base32 shared secret for time-based codes
    TimeBased { secret: String },
    /// Modhex public id of one YubiKey; key material stays on the token
    HardwareToken { prefix: String },
}

impl Credential {
    pub fn kind(&self) -> CredentialKind {
        match self {
            Credential::TimeBased { .. } => CredentialKind::TimeBased,
            Credential::HardwareToken { .. } => CredentialKind::HardwareToken,
        }
    }
}

// Never print the shared secret.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::TimeBased { .. } => f
                .debug_struct("TimeBased")
                .field("secret", &"<redacted>")
                .finish(),
            Credential::HardwareToken { prefix } => f
                .debug_struct("HardwareToken")
                .field("prefix", prefix)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    TimeBased,
    HardwareToken,
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialKind::TimeBased => write!(f, "totp"),
            CredentialKind::HardwareToken => write!(f, "yubikey"),
        }
    }
}

/// An enrolled second-factor method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoFactorMethod {
    pub id: MethodId,
    /// Owning user
    pub user_id: String,
    /// User-assigned label
    pub name: String,
    /// Disabled methods are never offered to the verifier
    pub enabled: bool,
    pub credential: Credential,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TwoFactorMethod {
    /// Build a freshly enrolled (enabled) method
    pub fn new(user_id: &str, name: &str, credential: Credential) -> Self {
        let now = Utc::now();
        Self {
            id: MethodId::generate(),
            user_id: user_id.to_string(),
            name: name.trim().to_string(),
            enabled: true,
            credential,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> CredentialKind {
        self.credential.kind()
    }
}

/// Toggle or rename request for an existing method
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MethodPatch {
    pub name: Option<String>,
    pub enabled: Option<bool>,
}

impl MethodPatch {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            enabled: None,
        }
    }

    pub fn enabled(enabled: bool) -> Self {
        Self {
            name: None,
            enabled: Some(enabled),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.enabled.is_none()
    }
}

/// Outcome of one verification. Carries no failure reason on purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// The code satisfied this method
    Matched(MethodId),
    /// The code is not valid
    NoMatch,
}

impl Verification {
    pub fn is_match(&self) -> bool {
        matches!(self, Verification::Matched(_))
    }

    pub fn method_id(&self) -> Option<&MethodId> {
        match self {
            Verification::Matched(id) => Some(id),
            Verification::NoMatch => None,
        }
    }
}

/// Internal failure reasons, only ever written to the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Wrong digits, or the OTP was rejected by the validation server
    ValidationMismatch,
    /// Hardware-token counter did not advance
    ReplayDetected,
    /// Validation server unreachable, slow or misbehaving
    TransportFailure,
    /// Proof code or OTP failed during enrollment
    EnrollmentConflict,
    /// Verification attempted for a user without enabled methods
    NoEnabledMethods,
    /// Stored secret could not be decoded
    InvalidSecret,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ValidationMismatch => write!(f, "validation_mismatch"),
            FailureReason::ReplayDetected => write!(f, "replay_detected"),
            FailureReason::TransportFailure => write!(f, "transport_failure"),
            FailureReason::EnrollmentConflict => write!(f, "enrollment_conflict"),
            FailureReason::NoEnabledMethods => write!(f, "no_enabled_methods"),
            FailureReason::InvalidSecret => write!(f, "invalid_secret"),
        }
    }
}

/// MFA setup data for the enrollment screen
#[derive(Debug, Clone, Serialize)]
pub struct TotpSetup {
    /// The secret in base32 format (for manual entry)
    pub secret: String,
    /// QR code as data URI (base64 PNG)
    pub qr_code: String,
    /// The provisioning URI for authenticator apps
    pub provisioning_uri: String,
}
