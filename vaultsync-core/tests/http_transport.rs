//! HTTP transport against a mock vault server.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use vaultsync_core::session::keychain::CSE_V1R1;
use vaultsync_core::sync::models::Password;
use vaultsync_core::{
    ClientConfig, EntityType, HttpTransport, MemoryPasswordStore, OpenOutcome, SessionState,
    Transport, TransportError, VaultClient, VaultError,
};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API: &str = "/index.php/apps/passwords/api/1.0";
/// `alice:app-token`
const BASIC_AUTH: &str = "Basic YWxpY2U6YXBwLXRva2Vu";

const PASSWORD_ID: &str = "9b2f6c4e-1a3d-4e5f-8a7b-6c5d4e3f2a1b";
const REVISION: &str = "0f1e2d3c-4b5a-4968-8776-655443322110";

fn config(server: &MockServer) -> ClientConfig {
    ClientConfig {
        server_url: server.uri(),
        username: "alice".to_string(),
        app_token: "app-token".to_string(),
        request_timeout_secs: 1,
        ..ClientConfig::default()
    }
}

fn transport(server: &MockServer) -> HttpTransport {
    HttpTransport::new(&config(server)).unwrap()
}

fn endpoint(name: &str) -> String {
    format!("{}/{}", API, name)
}

#[tokio::test]
async fn request_challenge_parses_salts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(endpoint("session/request")))
        .and(header("authorization", BASIC_AUTH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "challenge": { "type": "PWDv1r1", "salts": ["aa", "bb", "cc"] }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let challenge = transport(&server).request_challenge().await.unwrap();
    let salts = challenge.salts().unwrap();
    assert_eq!(salts.password, "aa");
    assert_eq!(salts.generic_hash_key, "bb");
    assert_eq!(salts.password_hash, "cc");
}

#[tokio::test]
async fn request_without_challenge() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(endpoint("session/request")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let challenge = transport(&server).request_challenge().await.unwrap();
    assert!(!challenge.requires_password());
}

#[tokio::test]
async fn open_session_posts_secret_and_reads_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(endpoint("session/open")))
        .and(body_json(json!({ "challenge": "c0ffee" })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-API-SESSION", "session-42")
                .set_body_json(json!({
                    "success": true,
                    "keys": { CSE_V1R1: "abcdef" },
                    "sessionLifetime": 600
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let opened = transport(&server).open_session("c0ffee").await.unwrap();
    assert_eq!(opened.session_code.as_deref(), Some("session-42"));
    assert_eq!(opened.lifetime, Some(Duration::from_secs(600)));
    let envelope = opened.keychain.unwrap();
    assert_eq!(envelope.keys.get(CSE_V1R1).map(String::as_str), Some("abcdef"));
}

#[tokio::test]
async fn open_session_without_secret_posts_empty_object() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(endpoint("session/open")))
        .and(body_json(json!({})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-API-SESSION", "s")
                .set_body_json(json!({ "success": true, "keys": [] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let opened = transport(&server).open_session("").await.unwrap();
    assert!(opened.keychain.is_none());
}

#[tokio::test]
async fn rejected_open_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(endpoint("session/open")))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = transport(&server).open_session("bad").await.unwrap_err();
    assert_eq!(err, TransportError::Status(401));
}

#[tokio::test]
async fn keep_alive_sends_session_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(endpoint("session/keepalive")))
        .and(header("X-API-SESSION", "session-42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    transport(&server).keep_alive("session-42").await.unwrap();
}

#[tokio::test]
async fn forbidden_maps_to_deauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(endpoint("session/keepalive")))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let err = transport(&server).keep_alive("x").await.unwrap_err();
    assert_eq!(VaultError::from(err), VaultError::Deauthorized);
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(endpoint("session/request")))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let err = transport(&server).request_challenge().await.unwrap_err();
    assert!(matches!(err, TransportError::Timeout(_)), "got {:?}", err);
}

#[tokio::test]
async fn invalid_json_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(endpoint("folder/list")))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let err = transport(&server)
        .list_entities(EntityType::Folder, Some("s"))
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Malformed(_)));
}

#[tokio::test]
async fn list_entities_builds_records() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(endpoint("password/list")))
        .and(header("X-API-SESSION", "s"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": PASSWORD_ID, "revision": REVISION, "label": "Mail", "cseType": "none" }
        ])))
        .mount(&server)
        .await;

    let records = transport(&server)
        .list_entities(EntityType::Password, Some("s"))
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id.to_string(), PASSWORD_ID);
    assert_eq!(records[0].version, REVISION);
}

#[tokio::test]
async fn client_opens_syncs_and_reads_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(endpoint("session/request")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(endpoint("session/open")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-API-SESSION", "s-1")
                .set_body_json(json!({ "success": true, "keys": [] })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(endpoint("password/list")))
        .and(header("X-API-SESSION", "s-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": PASSWORD_ID, "revision": REVISION, "label": "Mail", "password": "hunter2", "cseType": "none", "cseKey": "" }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(endpoint("session/close")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = ClientConfig {
        cache_path: dir.path().join("cache.db"),
        ..config(&server)
    };
    let client = VaultClient::from_config(&config, Arc::new(MemoryPasswordStore::new())).unwrap();

    assert_eq!(client.open_session(None).await, OpenOutcome::Opened);
    let report = client.trigger_sync(EntityType::Password).await.unwrap();
    assert_eq!(report.upserted, 1);

    let passwords = client.list::<Password>().unwrap();
    assert_eq!(passwords[0].label, "Mail");

    let id = passwords[0].id;
    let value = client
        .decrypt_visible_field(EntityType::Password, id, "password")
        .await
        .unwrap();
    assert_eq!(value.plain(), Some("hunter2"));

    client.logout().await;
    assert_eq!(client.current_session_state(), SessionState::Closed);
}
