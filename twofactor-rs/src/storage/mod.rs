//! Credential storage
//!
//! Provides the [`CredentialStore`] boundary and its backends:
//! - [`sqlite`]: SQLite storage with secrets encrypted at rest
//! - [`cipher`]: AES-256-GCM secret encryption

pub mod cipher;
pub mod sqlite;

use async_trait::async_trait;

use crate::error::Result;
use crate::mfa::types::{MethodId, TwoFactorMethod};

pub use cipher::SecretCipher;
pub use sqlite::SqliteCredentialStore;

/// Persistence of enrolled two-factor methods.
///
/// Listing operations return methods in enrollment order. Every mutation is
/// a single record write.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Enabled methods of a user, in enrollment order
    async fn find_enabled_methods(&self, user_id: &str) -> Result<Vec<TwoFactorMethod>>;

    /// All methods of a user, in enrollment order
    async fn find_methods(&self, user_id: &str) -> Result<Vec<TwoFactorMethod>>;

    /// One method, only if it belongs to `user_id`
    async fn find_method(&self, user_id: &str, id: &MethodId) -> Result<Option<TwoFactorMethod>>;

    /// Persist a newly enrolled method
    async fn save(&self, method: &TwoFactorMethod) -> Result<()>;

    /// Persist name, enabled flag and update time of an existing method
    async fn update(&self, method: &TwoFactorMethod) -> Result<()>;

    /// Delete one method of a user. Returns false if nothing was deleted.
    async fn delete(&self, user_id: &str, id: &MethodId) -> Result<bool>;

    /// Delete every method of a user (account deletion)
    async fn delete_for_user(&self, user_id: &str) -> Result<u64>;
}
