//! Yubico validation protocol 2.0 client
//!
//! Sends `GET <api_url>?id=..&nonce=..&otp=..[&h=..]` and reads a plain text
//! answer made of `key=value` lines. When an API key is configured, requests
//! are signed and answers must carry a valid HMAC-SHA1 signature `h`.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::distributions::Alphanumeric;
use rand::Rng;
use ring::hmac;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::{OtpVerifier, TokenOutcome};
use crate::config::YubicoSettings;
use crate::error::{Result, TwoFactorError};

const NONCE_LENGTH: usize = 32;

/// HTTP client for a YubiCloud compatible validation server
#[derive(Clone)]
pub struct YubicoClient {
    client: reqwest::Client,
    api_url: String,
    client_id: String,
    api_key: Option<hmac::Key>,
}

impl YubicoClient {
    pub fn new(settings: &YubicoSettings) -> Result<Self> {
        let api_key = match settings.api_key.as_deref() {
            Some(key) if !key.is_empty() => Some(decode_api_key(key)?),
            _ => None,
        };

        let client = reqwest::Client::builder()
            .user_agent(concat!("twofactor-rs/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_url: settings.api_url.clone(),
            client_id: settings.client_id.clone(),
            api_key,
        })
    }

    async fn request(&self, otp: &str, timeout: Duration) -> Result<TokenOutcome> {
        let nonce = generate_nonce();

        let mut params = BTreeMap::new();
        params.insert("id".to_string(), self.client_id.clone());
        params.insert("nonce".to_string(), nonce.clone());
        params.insert("otp".to_string(), otp.to_string());
        if let Some(key) = &self.api_key {
            let signature = sign_params(key, &params);
            params.insert("h".to_string(), signature);
        }

        let response = self
            .client
            .get(&self.api_url)
            .query(&params)
            .timeout(timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Ok(TokenOutcome::TransportFailure(format!(
                "validation server answered HTTP {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        Ok(self.interpret(&parse_response(&body), otp, &nonce))
    }

    /// Map a parsed answer to an outcome, checking echo fields and signature
    fn interpret(&self, fields: &BTreeMap<String, String>, otp: &str, nonce: &str) -> TokenOutcome {
        let Some(status) = fields.get("status") else {
            return TokenOutcome::TransportFailure("answer without status".to_string());
        };

        if let Some(key) = &self.api_key {
            if !verify_response_signature(key, fields) {
                warn!("Validation server answer failed signature check");
                return TokenOutcome::InvalidSignature;
            }
        }

        match status.as_str() {
            "OK" => {
                let echoed = fields.get("otp").map(String::as_str) == Some(otp)
                    && fields.get("nonce").map(String::as_str) == Some(nonce);
                if echoed {
                    TokenOutcome::Valid
                } else {
                    warn!("Validation server answer does not echo our request");
                    TokenOutcome::InvalidSignature
                }
            }
            "REPLAYED_OTP" => TokenOutcome::Replayed,
            "BAD_OTP" | "BAD_SIGNATURE" => TokenOutcome::InvalidSignature,
            other => TokenOutcome::TransportFailure(format!("validation server status {}", other)),
        }
    }
}

#[async_trait]
impl OtpVerifier for YubicoClient {
    async fn verify(&self, otp: &str, timeout: Duration) -> TokenOutcome {
        match self.request(otp, timeout).await {
            Ok(outcome) => {
                debug!(?outcome, "Validation server answered");
                outcome
            }
            Err(TwoFactorError::Http(e)) if e.is_timeout() => {
                TokenOutcome::TransportFailure(format!("timed out after {:?}", timeout))
            }
            Err(e) => TokenOutcome::TransportFailure(e.to_string()),
        }
    }
}

fn decode_api_key(key: &str) -> Result<hmac::Key> {
    let bytes = BASE64
        .decode(key.trim())
        .map_err(|e| TwoFactorError::Config(format!("Invalid Yubico API key: {}", e)))?;
    Ok(hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, &bytes))
}

fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LENGTH)
        .map(char::from)
        .collect()
}

/// Parse `key=value` lines of an answer body
pub fn parse_response(body: &str) -> BTreeMap<String, String> {
    body.lines()
        .filter_map(|line| line.trim().split_once('='))
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Message covered by the signature: all pairs except `h`, sorted by key
fn signed_message(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .filter(|(key, _)| key.as_str() != "h")
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&")
}

/// Compute the base64 HMAC-SHA1 signature over a parameter set
pub fn sign_params(key: &hmac::Key, params: &BTreeMap<String, String>) -> String {
    let tag = hmac::sign(key, signed_message(params).as_bytes());
    BASE64.encode(tag.as_ref())
}

fn verify_response_signature(key: &hmac::Key, fields: &BTreeMap<String, String>) -> bool {
    let Some(signature) = fields.get("h") else {
        return false;
    };
    let Ok(tag) = BASE64.decode(signature) else {
        return false;
    };
    hmac::verify(key, signed_message(fields).as_bytes(), &tag).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const OTP: &str = "ccccccbbddccdefghijklnrtuvcbdefghijklnrtuvcb";
    const API_KEY: &str = "bW9ja3NlY3JldGtleTEyMzQ=";

    fn client(api_key: Option<&str>) -> YubicoClient {
        YubicoClient::new(&YubicoSettings {
            api_key: api_key.map(str::to_string),
            ..Default::default()
        })
        .unwrap()
    }

    fn answer(status: &str, otp: &str, nonce: &str) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert("t".to_string(), "2024-01-01T00:00:00Z0123".to_string());
        fields.insert("otp".to_string(), otp.to_string());
        fields.insert("nonce".to_string(), nonce.to_string());
        fields.insert("status".to_string(), status.to_string());
        fields
    }

    #[test]
    fn test_parse_response() {
        let body = "h=abc=\r\nt=2024-01-01T00:00:00Z0123\r\notp=xyz\r\nstatus=OK\r\n\r\n";
        let fields = parse_response(body);
        assert_eq!(fields.get("h").unwrap(), "abc=");
        assert_eq!(fields.get("status").unwrap(), "OK");
        assert_eq!(fields.len(), 4);
    }

    #[test]
    fn test_status_mapping() {
        let client = client(None);
        let nonce = "n0nce";

        assert_eq!(client.interpret(&answer("OK", OTP, nonce), OTP, nonce), TokenOutcome::Valid);
        assert_eq!(
            client.interpret(&answer("REPLAYED_OTP", OTP, nonce), OTP, nonce),
            TokenOutcome::Replayed
        );
        assert_eq!(
            client.interpret(&answer("BAD_OTP", OTP, nonce), OTP, nonce),
            TokenOutcome::InvalidSignature
        );
        assert!(matches!(
            client.interpret(&answer("BACKEND_ERROR", OTP, nonce), OTP, nonce),
            TokenOutcome::TransportFailure(_)
        ));
        assert!(matches!(
            client.interpret(&BTreeMap::new(), OTP, nonce),
            TokenOutcome::TransportFailure(_)
        ));
    }

    #[test]
    fn test_ok_without_echo_is_rejected() {
        let client = client(None);
        let fields = answer("OK", OTP, "someone-elses-nonce");
        assert_eq!(client.interpret(&fields, OTP, "n0nce"), TokenOutcome::InvalidSignature);
    }

    #[test]
    fn test_signed_answers() {
        let client = client(Some(API_KEY));
        let key = decode_api_key(API_KEY).unwrap();
        let nonce = "n0nce";

        let mut fields = answer("OK", OTP, nonce);
        let signature = sign_params(&key, &fields);
        fields.insert("h".to_string(), signature);
        assert_eq!(client.interpret(&fields, OTP, nonce), TokenOutcome::Valid);

        // Tampered status with the old signature
        fields.insert("status".to_string(), "REPLAYED_OTP".to_string());
        assert_eq!(client.interpret(&fields, OTP, nonce), TokenOutcome::InvalidSignature);

        // Missing signature
        let unsigned = answer("OK", OTP, nonce);
        assert_eq!(client.interpret(&unsigned, OTP, nonce), TokenOutcome::InvalidSignature);
    }

    #[test]
    fn test_signed_message_excludes_h_and_sorts() {
        let mut params = BTreeMap::new();
        params.insert("otp".to_string(), "b".to_string());
        params.insert("id".to_string(), "a".to_string());
        params.insert("h".to_string(), "sig".to_string());
        assert_eq!(signed_message(&params), "id=a&otp=b");
    }

    #[test]
    fn test_invalid_api_key() {
        let result = YubicoClient::new(&YubicoSettings {
            api_key: Some("not base64!!".to_string()),
            ..Default::default()
        });
        assert!(matches!(result, Err(TwoFactorError::Config(_))));
    }

    #[test]
    fn test_nonce_shape() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), NONCE_LENGTH);
        assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
