//! Local YubiKey OTP parsing
//!
//! A YubiKey OTP is `<public id><ciphertext>` in modhex: a public id of up to
//! 16 characters identifying the token, followed by 32 characters of AES
//! ciphertext. Users may type a static password in front of it, separated by
//! `:`. Parsing never touches the network.

use std::fmt;

/// Modhex alphabet used by YubiKeys (keyboard-layout independent)
pub const MODHEX_ALPHABET: &str = "cbdefghijklnrtuv";

/// Length of the encrypted part of every OTP
pub const CIPHERTEXT_LENGTH: usize = 32;

/// Maximum length of the public id
pub const MAX_PREFIX_LENGTH: usize = 16;

const PASSWORD_DELIMITER: char = ':';

/// A syntactically valid YubiKey OTP split into its parts
#[derive(Clone, PartialEq, Eq)]
pub struct YubikeyOtp {
    password: Option<String>,
    otp: String,
    prefix_len: usize,
}

impl YubikeyOtp {
    /// Parse a submitted string. Returns `None` when it is not a YubiKey OTP,
    /// e.g. a six digit TOTP code.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();

        let (password, otp) = match input.rsplit_once(PASSWORD_DELIMITER) {
            Some((password, otp)) => (Some(password.to_string()), otp),
            None => (None, input),
        };

        let otp = otp.to_ascii_lowercase();
        if otp.len() < CIPHERTEXT_LENGTH || otp.len() > CIPHERTEXT_LENGTH + MAX_PREFIX_LENGTH {
            return None;
        }
        if !otp.chars().all(is_modhex) {
            return None;
        }

        Some(Self {
            password,
            prefix_len: otp.len() - CIPHERTEXT_LENGTH,
            otp,
        })
    }

    /// Public id of the token that produced this OTP
    pub fn prefix(&self) -> &str {
        &self.otp[..self.prefix_len]
    }

    /// Encrypted part (changes with every touch)
    pub fn ciphertext(&self) -> &str {
        &self.otp[self.prefix_len..]
    }

    /// The OTP as sent to the validation server, without any password
    pub fn otp(&self) -> &str {
        &self.otp
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    /// Whether this OTP was produced by the token with the given public id
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        !prefix.is_empty() && self.prefix() == prefix
    }
}

impl fmt::Debug for YubikeyOtp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YubikeyOtp")
            .field("prefix", &self.prefix())
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn is_modhex(c: char) -> bool {
    MODHEX_ALPHABET.contains(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OTP: &str = "ccccccbbddccdefghijklnrtuvcbdefghijklnrtuvcb";

    #[test]
    fn test_parse_standard_otp() {
        let parsed = YubikeyOtp::parse(OTP).unwrap();
        assert_eq!(parsed.prefix(), "ccccccbbddcc");
        assert_eq!(parsed.ciphertext().len(), CIPHERTEXT_LENGTH);
        assert_eq!(parsed.otp(), OTP);
        assert_eq!(parsed.password(), None);
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        let parsed = YubikeyOtp::parse(&OTP.to_uppercase()).unwrap();
        assert_eq!(parsed.prefix(), "ccccccbbddcc");
    }

    #[test]
    fn test_parse_with_password() {
        let input = format!("hunter2:{}", OTP);
        let parsed = YubikeyOtp::parse(&input).unwrap();
        assert_eq!(parsed.password(), Some("hunter2"));
        assert_eq!(parsed.otp(), OTP);
    }

    #[test]
    fn test_prefixless_otp() {
        let parsed = YubikeyOtp::parse(&OTP[12..]).unwrap();
        assert_eq!(parsed.prefix(), "");
        assert!(!parsed.matches_prefix(""));
    }

    #[test]
    fn test_rejects_totp_codes_and_garbage() {
        assert!(YubikeyOtp::parse("123456").is_none());
        assert!(YubikeyOtp::parse("").is_none());
        // 'a' is not modhex
        assert!(YubikeyOtp::parse(&OTP.replace('c', "a")).is_none());
        // too long: 17 character prefix
        assert!(YubikeyOtp::parse(&format!("ccccccccccccccccc{}", &OTP[12..])).is_none());
    }

    #[test]
    fn test_matches_prefix() {
        let parsed = YubikeyOtp::parse(OTP).unwrap();
        assert!(parsed.matches_prefix("ccccccbbddcc"));
        assert!(!parsed.matches_prefix("ccccccddeeff"));
    }

    #[test]
    fn test_debug_hides_password() {
        let parsed = YubikeyOtp::parse(&format!("hunter2:{}", OTP)).unwrap();
        let printed = format!("{:?}", parsed);
        assert!(!printed.contains("hunter2"));
    }
}
