//! Shared helpers: an in-process Yubico validation server and test doubles

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ring::hmac;
use twofactor_rs::config::{Config, YubicoSettings};
use twofactor_rs::storage::SecretCipher;
use twofactor_rs::yubikey::client::sign_params;
use twofactor_rs::yubikey::{OtpVerifier, TokenOutcome};

pub const SECRET: &str = "JBSWY3DPEHPK3PXPJBSWY3DPEHPK3PXP";
pub const PREFIX: &str = "ccccccbbddcc";
pub const OTP: &str = "ccccccbbddccdefghijklnrtuvcbdefghijklnrtuvcb";
pub const SECOND_OTP: &str = "ccccccbbddccvutrnlkjihgfedcbvutrnlkjihgfedcb";
/// base64 of "mocksecretkey1234"
pub const API_KEY: &str = "bW9ja3NlY3JldGtleTEyMzQ=";

/// How the emulated server misbehaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Honest,
    /// Sign answers with another key
    ForgedSignature,
    /// Answer OK without echoing the nonce
    NoEcho,
    /// HTTP 500
    ServerError,
    /// Sleep before answering
    Slow(Duration),
    /// Answer with this status
    Status(&'static str),
}

/// Emulates YubiCloud: tracks seen OTPs and signs answers
pub struct YubicoEmulator {
    key: hmac::Key,
    behavior: Mutex<Behavior>,
    seen: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl YubicoEmulator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }
}

pub struct RunningEmulator {
    pub state: Arc<YubicoEmulator>,
    pub url: String,
}

/// Start the emulator on an ephemeral port
pub async fn start_emulator() -> RunningEmulator {
    let key_bytes = BASE64.decode(API_KEY).unwrap();
    let state = Arc::new(YubicoEmulator {
        key: hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, &key_bytes),
        behavior: Mutex::new(Behavior::Honest),
        seen: Mutex::new(HashSet::new()),
        calls: AtomicUsize::new(0),
    });

    let app = Router::new()
        .route("/wsapi/2.0/verify", get(verify))
        .with_state(state.clone());

    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let local_addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    RunningEmulator {
        state,
        url: format!("http://{}/wsapi/2.0/verify", local_addr),
    }
}

async fn verify(
    State(state): State<Arc<YubicoEmulator>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> (StatusCode, String) {
    state.calls.fetch_add(1, Ordering::SeqCst);
    let behavior = *state.behavior.lock().unwrap();

    if let Behavior::Slow(delay) = behavior {
        tokio::time::sleep(delay).await;
    }
    if behavior == Behavior::ServerError {
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }

    let otp = params.get("otp").cloned().unwrap_or_default();
    let nonce = params.get("nonce").cloned().unwrap_or_default();

    let request_signed = match params.get("h") {
        Some(h) => sign_params(&state.key, &params) == *h,
        None => true,
    };

    let status = match behavior {
        Behavior::Status(status) => status.to_string(),
        _ if !request_signed => "BAD_SIGNATURE".to_string(),
        _ if otp.len() < 32 => "BAD_OTP".to_string(),
        _ if !state.seen.lock().unwrap().insert(otp.clone()) => "REPLAYED_OTP".to_string(),
        _ => "OK".to_string(),
    };

    let mut fields = BTreeMap::new();
    fields.insert("t".to_string(), "2024-01-01T00:00:00Z0123".to_string());
    fields.insert("otp".to_string(), otp);
    if behavior != Behavior::NoEcho {
        fields.insert("nonce".to_string(), nonce);
    }
    fields.insert("sl".to_string(), "100".to_string());
    fields.insert("status".to_string(), status);

    let signature = match behavior {
        Behavior::ForgedSignature => {
            let other = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, b"not the shared key");
            sign_params(&other, &fields)
        }
        _ => sign_params(&state.key, &fields),
    };
    fields.insert("h".to_string(), signature);

    let body = fields
        .iter()
        .map(|(key, value)| format!("{}={}\r\n", key, value))
        .collect::<String>();
    (StatusCode::OK, body)
}

pub fn yubico_settings(url: &str) -> YubicoSettings {
    YubicoSettings {
        api_url: url.to_string(),
        api_key: Some(API_KEY.to_string()),
        timeout_seconds: 2,
        ..Default::default()
    }
}

/// Configuration against the emulator and a fresh database file
pub fn test_config(url: &str, dir: &tempfile::TempDir) -> Config {
    let mut config = Config::development();
    config.yubico = yubico_settings(url);
    config.storage.database_url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("twofactor.db").display()
    );
    config.storage.encryption_key = SecretCipher::generate_key().unwrap();
    config
}

/// Remote verifier that counts calls and always gives the same answer
pub struct CountingVerifier {
    calls: AtomicUsize,
    outcome: TokenOutcome,
    delay: Option<Duration>,
}

impl CountingVerifier {
    pub fn new(outcome: TokenOutcome) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            outcome,
            delay: None,
        })
    }

    pub fn hanging() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            outcome: TokenOutcome::Valid,
            delay: Some(Duration::from_secs(30)),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OtpVerifier for CountingVerifier {
    async fn verify(&self, _otp: &str, _timeout: Duration) -> TokenOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.clone()
    }
}
