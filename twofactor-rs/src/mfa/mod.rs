//! Multi-Factor Authentication (MFA) module
//!
//! A user may enroll any number of second-factor methods: authenticator apps
//! (TOTP) and YubiKeys (hardware OTP). A login is complete once the submitted
//! code satisfies any one enabled method.

pub mod audit;
pub mod manager;
pub mod session;
pub mod totp;
pub mod types;
pub mod verifier;

pub use manager::MfaManager;
pub use session::{MemorySession, Session, SessionMarker};
pub use totp::{Clock, FixedClock, SystemClock, TotpService};
pub use types::*;
pub use verifier::Verifier;
