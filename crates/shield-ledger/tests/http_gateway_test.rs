//! HTTP ledger gateway against a mock bridge.

use std::sync::Arc;
use std::time::Duration;

use shield_core::{
    Error, Identity, LedgerConfig, NotarizationRecord, NotarizationStatus, Origin, PendingMessage,
};
use shield_ledger::{HttpLedgerGateway, NotarizationClient};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(uri: String, token: Option<&str>) -> LedgerConfig {
    LedgerConfig {
        base_url: uri,
        channel: "cybershieldchannel".to_string(),
        chaincode: "cybershieldcc".to_string(),
        api_token: token.map(str::to_string),
        timeout: Duration::from_secs(2),
    }
}

fn record() -> NotarizationRecord {
    let message = PendingMessage::new(
        Identity::new("alice@x.com").unwrap(),
        Identity::new("bob@x.com").unwrap(),
        "Y3Q=".to_string(),
    )
    .settle(Origin::Remote);
    NotarizationRecord::sent(&message)
}

async fn client_for(server: &MockServer, token: Option<&str>) -> NotarizationClient {
    let client = NotarizationClient::new(Arc::new(HttpLedgerGateway::new(config(
        server.uri(),
        token,
    ))));
    client.connect().await.unwrap();
    client
}

#[tokio::test]
async fn test_store_posts_submit_with_token() {
    let server = MockServer::start().await;
    let record = record();

    Mock::given(method("POST"))
        .and(path("/submit"))
        .and(header("Authorization", "Bearer s3cret"))
        .and(body_partial_json(serde_json::json!({
            "channel": "cybershieldchannel",
            "chaincode": "cybershieldcc",
            "fcn": "StoreMetadata",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some("s3cret")).await;
    client.store(&record).await.unwrap();
}

#[tokio::test]
async fn test_get_parses_entry() {
    let server = MockServer::start().await;
    let record = record();

    let entry = serde_json::json!({
        "key": record.message_id.to_string(),
        "value": serde_json::to_string(&record).unwrap(),
        "owner": "x509::CN=appUser",
        "timestamp": "2026-03-01T10:00:00Z",
    });
    Mock::given(method("POST"))
        .and(path("/evaluate"))
        .and(body_partial_json(serde_json::json!({"fcn": "GetMetadata"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(entry))
        .mount(&server)
        .await;

    let client = client_for(&server, None).await;
    let fetched = client.get(record.message_id).await.unwrap().unwrap();
    assert_eq!(fetched, record);
}

#[tokio::test]
async fn test_get_not_found_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/evaluate"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client_for(&server, None).await;
    assert!(client.get(record().message_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_submit_rejection_is_notarization_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .respond_with(ResponseTemplate::new(500).set_body_string("endorsement failed"))
        .mount(&server)
        .await;

    let client = client_for(&server, None).await;
    let err = client.store(&record()).await.unwrap_err();
    assert!(matches!(err, Error::Notarization(_)));
    assert!(err.to_string().contains("endorsement failed"));
}

#[tokio::test]
async fn test_update_status_reads_then_submits_update() {
    let server = MockServer::start().await;
    let record = record();

    let entry = serde_json::json!({
        "key": record.message_id.to_string(),
        "value": serde_json::to_string(&record).unwrap(),
        "owner": "x509::CN=appUser",
        "timestamp": "2026-03-01T10:00:00Z",
    });
    Mock::given(method("POST"))
        .and(path("/evaluate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(entry))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .and(body_partial_json(serde_json::json!({"fcn": "UpdateMetadata"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, None).await;
    let updated = client
        .update_status(record.message_id, NotarizationStatus::Delivered)
        .await
        .unwrap();
    assert_eq!(updated.status, NotarizationStatus::Delivered);
    assert!(updated.last_updated.is_some());
}

#[tokio::test]
async fn test_slow_bridge_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&server)
        .await;

    let client = client_for(&server, None).await;
    let err = client.store(&record()).await.unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }), "got {:?}", err);
}
