//! Audit trail for two-factor events
//!
//! Detailed failure reasons only ever go here (structured `tracing` events on
//! the `twofactor::audit` target). Codes and secrets are never logged.

use std::fmt;

use super::types::{FailureReason, MethodId};

/// Types of MFA events for audit logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    /// Setup data generated for the enrollment screen
    SetupStarted,
    /// A method was enrolled
    EnrollmentCompleted,
    /// Proof code or OTP rejected during enrollment
    EnrollmentFailed,
    /// One candidate method rejected the submitted code
    MethodRejected,
    /// Verification succeeded
    VerifySuccess,
    /// Verification failed
    VerifyFailed,
    /// Method renamed, enabled or disabled
    MethodUpdated,
    /// Method deleted
    MethodRemoved,
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditEvent::SetupStarted => write!(f, "setup_started"),
            AuditEvent::EnrollmentCompleted => write!(f, "enrollment_completed"),
            AuditEvent::EnrollmentFailed => write!(f, "enrollment_failed"),
            AuditEvent::MethodRejected => write!(f, "method_rejected"),
            AuditEvent::VerifySuccess => write!(f, "verify_success"),
            AuditEvent::VerifyFailed => write!(f, "verify_failed"),
            AuditEvent::MethodUpdated => write!(f, "method_updated"),
            AuditEvent::MethodRemoved => write!(f, "method_removed"),
        }
    }
}

/// Log an MFA event
pub fn log_event(
    event: AuditEvent,
    user_id: &str,
    method_id: Option<&MethodId>,
    reason: Option<FailureReason>,
) {
    let method = method_id.map(MethodId::as_str).unwrap_or("-");
    let reason = reason.map(|r| r.to_string()).unwrap_or_default();

    match event {
        AuditEvent::MethodRejected => tracing::debug!(
            target: "twofactor::audit",
            event = %event, user_id, method_id = method, reason = %reason,
            "two-factor event"
        ),
        AuditEvent::VerifyFailed | AuditEvent::EnrollmentFailed => tracing::warn!(
            target: "twofactor::audit",
            event = %event, user_id, method_id = method, reason = %reason,
            "two-factor event"
        ),
        _ => tracing::info!(
            target: "twofactor::audit",
            event = %event, user_id, method_id = method,
            "two-factor event"
        ),
    }
}
