use thiserror::Error;

#[derive(Error, Debug)]
pub enum TwoFactorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Invalid TOTP secret: {0}")]
    InvalidSecret(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Two-factor method not found: {0}")]
    MethodNotFound(String),

    /// The submitted code did not prove possession of the credential
    #[error("Invalid one-time code")]
    InvalidCode,

    /// The hardware token OTP was accepted before (counter not advanced)
    #[error("One-time code was already used")]
    ReplayedCode,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl TwoFactorError {
    /// Message safe to show to the end user.
    ///
    /// Internal failures collapse into a generic message so that storage or
    /// transport problems cannot be told apart from a wrong code.
    pub fn user_message(&self) -> &'static str {
        match self {
            TwoFactorError::ReplayedCode => "The supplied OTP has been used before.",
            TwoFactorError::InvalidInput(_) => "The submitted data is invalid.",
            TwoFactorError::MethodNotFound(_) => "This 2FA method does not exist.",
            _ => "Invalid OTP supplied. Please try again!",
        }
    }
}

pub type Result<T> = std::result::Result<T, TwoFactorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_internal_details() {
        let err = TwoFactorError::Crypto("aead open failed".to_string());
        assert_eq!(err.user_message(), TwoFactorError::InvalidCode.user_message());

        let err = TwoFactorError::InvalidSecret("bad base32".to_string());
        assert!(!err.user_message().contains("base32"));
    }

    #[test]
    fn test_replay_is_reported_distinctly() {
        assert_ne!(
            TwoFactorError::ReplayedCode.user_message(),
            TwoFactorError::InvalidCode.user_message()
        );
    }
}
