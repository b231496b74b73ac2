//! Yubico client against an emulated validation server

mod common;

use std::time::{Duration, Instant};

use common::*;
use twofactor_rs::config::YubicoSettings;
use twofactor_rs::yubikey::{OtpVerifier, TokenOutcome, YubicoClient};

const TIMEOUT: Duration = Duration::from_secs(2);

#[tokio::test]
async fn test_fresh_otp_is_valid_then_replayed() {
    let server = start_emulator().await;
    let client = YubicoClient::new(&yubico_settings(&server.url)).unwrap();

    assert_eq!(client.verify(OTP, TIMEOUT).await, TokenOutcome::Valid);
    assert_eq!(client.verify(OTP, TIMEOUT).await, TokenOutcome::Replayed);
    assert_eq!(client.verify(SECOND_OTP, TIMEOUT).await, TokenOutcome::Valid);
    assert_eq!(server.state.calls(), 3);
}

#[tokio::test]
async fn test_unsigned_client_accepts_honest_answer() {
    let server = start_emulator().await;
    let client = YubicoClient::new(&YubicoSettings {
        api_url: server.url.clone(),
        api_key: None,
        ..Default::default()
    })
    .unwrap();

    assert_eq!(client.verify(OTP, TIMEOUT).await, TokenOutcome::Valid);
}

#[tokio::test]
async fn test_forged_answer_is_rejected() {
    let server = start_emulator().await;
    server.state.set_behavior(Behavior::ForgedSignature);
    let client = YubicoClient::new(&yubico_settings(&server.url)).unwrap();

    assert_eq!(client.verify(OTP, TIMEOUT).await, TokenOutcome::InvalidSignature);
}

#[tokio::test]
async fn test_wrong_request_key_is_rejected() {
    let server = start_emulator().await;
    let client = YubicoClient::new(&YubicoSettings {
        api_url: server.url.clone(),
        // base64 of "another-key"
        api_key: Some("YW5vdGhlci1rZXk=".to_string()),
        ..Default::default()
    })
    .unwrap();

    // The server answers BAD_SIGNATURE, signed with its own key, which this
    // client cannot verify either
    assert_eq!(client.verify(OTP, TIMEOUT).await, TokenOutcome::InvalidSignature);
}

#[tokio::test]
async fn test_answer_without_nonce_echo_is_rejected() {
    let server = start_emulator().await;
    server.state.set_behavior(Behavior::NoEcho);
    let client = YubicoClient::new(&yubico_settings(&server.url)).unwrap();

    assert_eq!(client.verify(OTP, TIMEOUT).await, TokenOutcome::InvalidSignature);
}

#[tokio::test]
async fn test_status_mapping() {
    let server = start_emulator().await;
    let client = YubicoClient::new(&yubico_settings(&server.url)).unwrap();

    server.state.set_behavior(Behavior::Status("BAD_OTP"));
    assert_eq!(client.verify(OTP, TIMEOUT).await, TokenOutcome::InvalidSignature);

    server.state.set_behavior(Behavior::Status("REPLAYED_OTP"));
    assert_eq!(client.verify(OTP, TIMEOUT).await, TokenOutcome::Replayed);

    for status in ["BACKEND_ERROR", "NOT_ENOUGH_ANSWERS", "NO_SUCH_CLIENT"] {
        server.state.set_behavior(Behavior::Status(status));
        assert!(matches!(
            client.verify(OTP, TIMEOUT).await,
            TokenOutcome::TransportFailure(_)
        ));
    }
}

#[tokio::test]
async fn test_http_error_is_transport_failure() {
    let server = start_emulator().await;
    server.state.set_behavior(Behavior::ServerError);
    let client = YubicoClient::new(&yubico_settings(&server.url)).unwrap();

    assert!(matches!(
        client.verify(OTP, TIMEOUT).await,
        TokenOutcome::TransportFailure(_)
    ));
}

#[tokio::test]
async fn test_unreachable_server_is_transport_failure() {
    // Bind then drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client =
        YubicoClient::new(&yubico_settings(&format!("http://{}/wsapi/2.0/verify", addr))).unwrap();

    assert!(matches!(
        client.verify(OTP, TIMEOUT).await,
        TokenOutcome::TransportFailure(_)
    ));
}

#[tokio::test]
async fn test_slow_server_is_bounded_by_timeout() {
    let server = start_emulator().await;
    server.state.set_behavior(Behavior::Slow(Duration::from_secs(10)));
    let client = YubicoClient::new(&yubico_settings(&server.url)).unwrap();

    let started = Instant::now();
    let outcome = client.verify(OTP, Duration::from_millis(200)).await;

    assert!(matches!(outcome, TokenOutcome::TransportFailure(_)));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(server.state.calls(), 1);
}
