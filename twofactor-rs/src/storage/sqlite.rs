//! SQLite credential store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use super::cipher::SecretCipher;
use super::CredentialStore;
use crate::error::{Result, TwoFactorError};
use crate::mfa::types::{Credential, MethodId, TwoFactorMethod};

type MethodRow = (
    String,
    String,
    String,
    i64,
    Option<String>,
    Option<String>,
    String,
    String,
);

const SELECT_COLUMNS: &str = "SELECT id, user_id, name, enabled, totp_secret, yubikey_prefix, created_at, updated_at FROM two_factor_methods";

/// SQLite backed [`CredentialStore`]. TOTP secrets are stored encrypted.
#[derive(Clone)]
pub struct SqliteCredentialStore {
    db: SqlitePool,
    cipher: SecretCipher,
}

impl SqliteCredentialStore {
    /// Connect to `database_url` and create the schema if needed
    pub async fn new(database_url: &str, cipher: SecretCipher) -> Result<Self> {
        // Every connection to an in-memory database is a separate database
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let db = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        let store = Self { db, cipher };
        store.init_db().await?;
        Ok(store)
    }

    /// Initialize database tables
    pub async fn init_db(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS two_factor_methods (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                totp_secret TEXT,
                yubikey_prefix TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                CHECK ((totp_secret IS NULL) <> (yubikey_prefix IS NULL))
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_two_factor_methods_user ON two_factor_methods(user_id)",
        )
        .execute(&self.db)
        .await?;

        debug!("two_factor_methods schema ready");
        Ok(())
    }

    /// Health check - verify database connectivity
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    fn row_to_method(&self, row: MethodRow) -> Result<TwoFactorMethod> {
        let (id, user_id, name, enabled, totp_secret, yubikey_prefix, created_at, updated_at) = row;

        let credential = match (totp_secret, yubikey_prefix) {
            (Some(stored), None) => Credential::TimeBased {
                secret: self.cipher.decrypt(&stored, &id)?,
            },
            (None, Some(prefix)) => Credential::HardwareToken { prefix },
            _ => {
                return Err(corrupt_row(&id, "credential columns"));
            }
        };

        Ok(TwoFactorMethod {
            created_at: parse_timestamp(&id, &created_at)?,
            updated_at: parse_timestamp(&id, &updated_at)?,
            id: MethodId::from(id),
            user_id,
            name,
            enabled: enabled != 0,
            credential,
        })
    }

    /// Rows that fail to decode are logged and left out
    fn rows_to_methods(&self, rows: Vec<MethodRow>) -> Vec<TwoFactorMethod> {
        rows.into_iter()
            .filter_map(|row| {
                let id = row.0.clone();
                let user_id = row.1.clone();
                match self.row_to_method(row) {
                    Ok(method) => Some(method),
                    Err(e) => {
                        warn!(
                            user_id = %user_id,
                            method_id = %id,
                            error = %e,
                            "Skipping unreadable two-factor method"
                        );
                        None
                    }
                }
            })
            .collect()
    }
}

fn parse_timestamp(id: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| corrupt_row(id, "timestamp"))
}

fn corrupt_row(id: &str, what: &str) -> TwoFactorError {
    TwoFactorError::Database(sqlx::Error::Protocol(format!(
        "two_factor_methods row {} has an invalid {}",
        id, what
    )))
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn find_enabled_methods(&self, user_id: &str) -> Result<Vec<TwoFactorMethod>> {
        let rows = sqlx::query_as::<_, MethodRow>(&format!(
            "{} WHERE user_id = ? AND enabled = 1 ORDER BY rowid ASC",
            SELECT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(self.rows_to_methods(rows))
    }

    async fn find_methods(&self, user_id: &str) -> Result<Vec<TwoFactorMethod>> {
        let rows = sqlx::query_as::<_, MethodRow>(&format!(
            "{} WHERE user_id = ? ORDER BY rowid ASC",
            SELECT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(self.rows_to_methods(rows))
    }

    async fn find_method(&self, user_id: &str, id: &MethodId) -> Result<Option<TwoFactorMethod>> {
        let row = sqlx::query_as::<_, MethodRow>(&format!(
            "{} WHERE user_id = ? AND id = ?",
            SELECT_COLUMNS
        ))
        .bind(user_id)
        .bind(id.as_str())
        .fetch_optional(&self.db)
        .await?;

        row.map(|row| self.row_to_method(row)).transpose()
    }

    async fn save(&self, method: &TwoFactorMethod) -> Result<()> {
        let (totp_secret, yubikey_prefix) = match &method.credential {
            Credential::TimeBased { secret } => {
                (Some(self.cipher.encrypt(secret, method.id.as_str())?), None)
            }
            Credential::HardwareToken { prefix } => (None, Some(prefix.clone())),
        };

        sqlx::query(
            r#"
            INSERT INTO two_factor_methods
                (id, user_id, name, enabled, totp_secret, yubikey_prefix, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(method.id.as_str())
        .bind(&method.user_id)
        .bind(&method.name)
        .bind(i64::from(method.enabled))
        .bind(totp_secret)
        .bind(yubikey_prefix)
        .bind(method.created_at.to_rfc3339())
        .bind(method.updated_at.to_rfc3339())
        .execute(&self.db)
        .await?;

        info!(user_id = %method.user_id, method_id = %method.id, kind = %method.kind(), "Two-factor method stored");
        Ok(())
    }

    async fn update(&self, method: &TwoFactorMethod) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE two_factor_methods
            SET name = ?, enabled = ?, updated_at = ?
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(&method.name)
        .bind(i64::from(method.enabled))
        .bind(method.updated_at.to_rfc3339())
        .bind(method.id.as_str())
        .bind(&method.user_id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn delete(&self, user_id: &str, id: &MethodId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM two_factor_methods WHERE id = ? AND user_id = ?")
            .bind(id.as_str())
            .bind(user_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_for_user(&self, user_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM two_factor_methods WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
