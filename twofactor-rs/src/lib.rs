//! twofactor-rs: Two-factor verification core
//!
//! Decides whether a submitted one-time code satisfies one of a user's
//! enrolled second-factor methods.
//!
//! # Features
//!
//! - **TOTP**: RFC 6238 codes from authenticator apps, with a tolerance window
//! - **YubiKey OTP**: local public-id matching, then one time-boxed call to a
//!   Yubico-compatible validation server
//! - **Management**: enroll, rename, enable/disable and remove methods
//! - **Storage**: SQLite, TOTP secrets encrypted at rest
//!
//! # Security Features
//!
//! - Uniform failure: callers only ever see match / no match
//! - Failure reasons go to the audit log (`twofactor::audit` target)
//! - Constant-time code comparison
//! - Remote failures never count as success
//!
//! # Example
//!
//! ```no_run
//! use twofactor_rs::config::Config;
//! use twofactor_rs::mfa::{MemorySession, MfaManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("twofactor.toml")?;
//!     let manager = MfaManager::from_config(&config).await?;
//!
//!     let mut session = MemorySession::new();
//!     if manager.requires_challenge("alice", &session).await? {
//!         let verification = manager
//!             .complete_challenge("alice", "123456", &mut session)
//!             .await?;
//!         println!("matched: {}", verification.is_match());
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration management
//! - [`error`]: Error types and handling
//! - [`mfa`]: Methods, verification and enrollment
//! - [`storage`]: Credential storage backends
//! - [`yubikey`]: YubiKey OTP parsing and remote validation

pub mod config;
pub mod error;
pub mod mfa;
pub mod storage;
pub mod yubikey;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, TwoFactorError};
pub use mfa::{MfaManager, Verification};
