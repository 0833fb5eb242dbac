//! Webhook delivery tests against a local wiremock server.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use opzenix::config::GovernanceRules;
use opzenix::events::ChangeFeed;
use opzenix::governance::permissions::Actor;
use opzenix::governance::service::GovernanceService;
use opzenix::models::audit::AuditEntry;
use opzenix::models::environment::Environment;
use opzenix::models::role::AccountRole;
use opzenix::notification::webhook::{hmac_sha256_hex, GovernanceEvent, WebhookNotifier};
use opzenix::store::memory::MemoryStore;

fn sample_event() -> GovernanceEvent {
    GovernanceEvent::from_audit(&AuditEntry::new(
        "alice",
        "environment.unlocked",
        "environment_lock",
        Environment::Prod,
        Some(Environment::Prod),
        json!({ "comment": "release window" }),
    ))
}

#[tokio::test]
async fn test_send_signs_payload() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("x-opzenix-event", "environment.unlocked"))
        .and(header_exists("x-opzenix-signature"))
        .and(header_exists("x-opzenix-delivery-id"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let notifier = WebhookNotifier::new(vec![], Some("s3cret".into())).unwrap();
    let url = format!("{}/hook", mock_server.uri());
    notifier.send(&url, &sample_event()).await.unwrap();

    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let req = &received[0];

    let signature = req
        .headers
        .get("x-opzenix-signature")
        .unwrap()
        .to_str()
        .unwrap();
    assert_eq!(signature, hmac_sha256_hex("s3cret", &req.body).unwrap());

    let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
    assert_eq!(body["event_type"], "environment.unlocked");
    assert_eq!(body["environment"], "PROD");
    assert_eq!(body["details"]["comment"], "release window");
}

#[tokio::test]
async fn test_unsigned_without_secret() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;

    let notifier = WebhookNotifier::new(vec![], None).unwrap();
    notifier
        .send(&mock_server.uri(), &sample_event())
        .await
        .unwrap();

    let received = mock_server.received_requests().await.unwrap();
    assert!(received[0].headers.get("x-opzenix-signature").is_none());
}

#[tokio::test]
async fn test_retries_after_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let notifier = WebhookNotifier::new(vec![], None)
        .unwrap()
        .with_backoff(vec![0, 0]);
    notifier
        .send(&mock_server.uri(), &sample_event())
        .await
        .unwrap();

    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
    // Retries reuse the delivery id so receivers can deduplicate.
    assert_eq!(
        received[0].headers.get("x-opzenix-delivery-id"),
        received[1].headers.get("x-opzenix-delivery-id")
    );
}

#[tokio::test]
async fn test_gives_up_after_all_attempts() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let notifier = WebhookNotifier::new(vec![], None)
        .unwrap()
        .with_backoff(vec![0, 0, 0]);
    let result = notifier.send(&mock_server.uri(), &sample_event()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_flush_delivers_before_exit() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("x-opzenix-event", "environment.unlocked"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let notifier = WebhookNotifier::new(vec![mock_server.uri()], Some("k".into()))
        .unwrap()
        .with_backoff(vec![0]);
    let svc = GovernanceService::new(
        Arc::new(MemoryStore::new()),
        ChangeFeed::new(16),
        GovernanceRules::default(),
    )
    .with_webhooks(notifier);
    svc.seed_environment_locks().await.unwrap();

    let admin = Actor::new("alice", AccountRole::Admin);
    svc.unlock_environment(&admin, Environment::Prod, "release window")
        .await
        .unwrap();

    // A one-shot command exits right after this; flushing must cover delivery.
    assert_eq!(svc.flush_webhooks().await, 1);

    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(
        received[0].headers.get("x-opzenix-event").unwrap(),
        "environment.unlocked"
    );
}
