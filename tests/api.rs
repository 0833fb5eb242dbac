//! HTTP API tests: the full router driven with `tower::ServiceExt::oneshot`
//! against the in-memory store. No external services required.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use opzenix::config::{Config, GovernanceRules};
use opzenix::events::ChangeFeed;
use opzenix::governance::permissions::Actor;
use opzenix::governance::service::GovernanceService;
use opzenix::models::role::AccountRole;
use opzenix::store::memory::MemoryStore;
use opzenix::AppState;

const API_KEY: &str = "test-key";

async fn test_app() -> Router {
    let store = Arc::new(MemoryStore::new());
    let governance = GovernanceService::new(store, ChangeFeed::new(64), GovernanceRules::default());
    governance.seed_environment_locks().await.unwrap();

    let root = Actor::new("root", AccountRole::Admin);
    governance
        .assign_role(&root, "alice", AccountRole::Admin)
        .await
        .unwrap();
    governance
        .assign_role(&root, "bob", AccountRole::Operator)
        .await
        .unwrap();

    let config = Config {
        port: 0,
        database_url: None,
        api_key: API_KEY.to_string(),
        webhook_urls: vec![],
        webhook_secret: None,
        rules: GovernanceRules::default(),
        change_feed_capacity: 64,
    };

    opzenix::api::app(Arc::new(AppState { governance, config }))
}

fn request(method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-api-key", API_KEY);
    if let Some(user) = user {
        builder = builder.header("x-opzenix-user", user);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, body)
}

mod auth_tests {
    use super::*;

    #[tokio::test]
    async fn test_healthz_needs_no_key() {
        let app = test_app().await;
        let req = Request::builder()
            .uri("/healthz")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_api_key_is_401() {
        let app = test_app().await;
        let req = Request::builder()
            .uri("/api/v1/me")
            .header("x-opzenix-user", "alice")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_bearer_token_is_accepted() {
        let app = test_app().await;
        let req = Request::builder()
            .uri("/api/v1/me")
            .header("authorization", format!("Bearer {}", API_KEY))
            .header("x-opzenix-user", "alice")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_actor_is_401() {
        let app = test_app().await;
        let (status, body) = send(&app, request("GET", "/api/v1/me", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unknown_actor");
    }
}

mod role_tests {
    use super::*;

    #[tokio::test]
    async fn test_me_returns_roles_and_matrix() {
        let app = test_app().await;
        let (status, body) = send(&app, request("GET", "/api/v1/me", Some("bob"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["account_role"], "operator");
        assert_eq!(body["default_mode"], "operations");
        assert_eq!(body["roles"], json!(["tech_lead", "sre"]));
        assert_eq!(body["permissions"]["view"].as_array().unwrap().len(), 5);
        assert_eq!(
            body["permissions"]["approve"],
            json!(["DEV", "QA", "STAGING"])
        );
    }

    #[tokio::test]
    async fn test_unknown_user_is_observer() {
        let app = test_app().await;
        let (status, body) =
            send(&app, request("GET", "/api/v1/me", Some("carol"), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["account_role"], "viewer");
        assert_eq!(body["default_mode"], "observer");
        assert_eq!(body["roles"], json!([]));
    }

    #[tokio::test]
    async fn test_permission_check() {
        let app = test_app().await;
        let (_, body) = send(
            &app,
            request(
                "GET",
                "/api/v1/permissions/check?action=break_glass&environment=prod",
                Some("bob"),
                None,
            ),
        )
        .await;
        assert_eq!(body["allowed"], true);

        let (_, body) = send(
            &app,
            request(
                "GET",
                "/api/v1/permissions/check?action=approve&environment=prod",
                Some("bob"),
                None,
            ),
        )
        .await;
        assert_eq!(body["allowed"], false);
    }

    #[tokio::test]
    async fn test_permission_check_rejects_unknown_environment() {
        let app = test_app().await;
        let (status, body) = send(
            &app,
            request(
                "GET",
                "/api/v1/permissions/check?action=view&environment=moon",
                Some("bob"),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_request");
    }

    #[tokio::test]
    async fn test_only_admin_assigns_roles() {
        let app = test_app().await;
        let (status, _) = send(
            &app,
            request(
                "PUT",
                "/api/v1/roles/carol",
                Some("bob"),
                Some(json!({ "account_role": "admin" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            request(
                "PUT",
                "/api/v1/roles/carol",
                Some("alice"),
                Some(json!({ "account_role": "Operator" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["account_role"], "operator");
        assert_eq!(body["updated_by"], "alice");

        let (_, body) = send(&app, request("GET", "/api/v1/roles/carol", None, None)).await;
        assert_eq!(body["account_role"], "operator");
    }
}

mod approval_tests {
    use super::*;

    async fn open_request(app: &Router, user: &str, env: &str, required: i32) -> String {
        let (status, body) = send(
            app,
            request(
                "POST",
                "/api/v1/approvals",
                Some(user),
                Some(json!({
                    "title": "deploy api",
                    "environment": env,
                    "required_approvals": required,
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "body: {}", body);
        assert_eq!(body["status"], "pending");
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_vote_without_comment_is_400() {
        let app = test_app().await;
        let id = open_request(&app, "bob", "staging", 1).await;

        let (status, body) = send(
            &app,
            request(
                "POST",
                &format!("/api/v1/approvals/{}/votes", id),
                Some("alice"),
                Some(json!({ "decision": "approve" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "comment_required");

        let (_, body) = send(
            &app,
            request("GET", &format!("/api/v1/approvals/{}", id), None, None),
        )
        .await;
        assert_eq!(body["current_approvals"], 0);
    }

    #[tokio::test]
    async fn test_viewer_vote_is_403() {
        let app = test_app().await;
        let id = open_request(&app, "bob", "qa", 1).await;
        let (status, body) = send(
            &app,
            request(
                "POST",
                &format!("/api/v1/approvals/{}/votes", id),
                Some("carol"),
                Some(json!({ "decision": "approve", "comment": "lgtm" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["type"], "permission_error");
    }

    #[tokio::test]
    async fn test_vote_on_resolved_request_is_409() {
        let app = test_app().await;
        let id = open_request(&app, "bob", "staging", 1).await;
        let uri = format!("/api/v1/approvals/{}/votes", id);

        let (status, body) = send(
            &app,
            request(
                "POST",
                &uri,
                Some("alice"),
                Some(json!({ "decision": "approve", "comment": "ship it" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["request"]["status"], "approved");
        assert_eq!(body["outcome"]["audit_action"], "approval.approved");
        assert_eq!(body["vote"]["comment"], "ship it");

        let (status, body) = send(
            &app,
            request(
                "POST",
                &uri,
                Some("bob"),
                Some(json!({ "decision": "reject", "comment": "too late" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "already_resolved");

        let (_, votes) = send(&app, request("GET", &uri, None, None)).await;
        assert_eq!(votes.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_self_approval_is_409() {
        let app = test_app().await;
        let id = open_request(&app, "bob", "dev", 1).await;
        let (status, body) = send(
            &app,
            request(
                "POST",
                &format!("/api/v1/approvals/{}/votes", id),
                Some("bob"),
                Some(json!({ "decision": "approve", "comment": "mine" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "self_approval");
    }

    #[tokio::test]
    async fn test_unknown_decision_is_400() {
        let app = test_app().await;
        let id = open_request(&app, "bob", "dev", 1).await;
        let (status, _) = send(
            &app,
            request(
                "POST",
                &format!("/api/v1/approvals/{}/votes", id),
                Some("alice"),
                Some(json!({ "decision": "maybe", "comment": "hmm" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let app = test_app().await;
        open_request(&app, "bob", "dev", 2).await;
        let (_, all) = send(&app, request("GET", "/api/v1/approvals", None, None)).await;
        assert_eq!(all.as_array().unwrap().len(), 1);
        let (_, approved) =
            send(&app, request("GET", "/api/v1/approvals?status=approved", None, None)).await;
        assert!(approved.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_request_is_404() {
        let app = test_app().await;
        let (status, _) = send(
            &app,
            request(
                "GET",
                &format!("/api/v1/approvals/{}", uuid::Uuid::new_v4()),
                None,
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

mod lock_tests {
    use super::*;

    #[tokio::test]
    async fn test_list_locks_includes_gate() {
        let app = test_app().await;
        let (status, body) =
            send(&app, request("GET", "/api/v1/locks", Some("bob"), None)).await;
        assert_eq!(status, StatusCode::OK);
        let locks = body.as_array().unwrap();
        assert_eq!(locks.len(), 5);

        let prod = locks.iter().find(|l| l["environment"] == "PROD").unwrap();
        assert_eq!(prod["is_locked"], true);
        assert_eq!(prod["gate"]["can_unlock"], false);

        let dev = locks.iter().find(|l| l["environment"] == "DEV").unwrap();
        assert_eq!(dev["gate"]["can_lock"], false);
        assert_eq!(dev["gate"]["can_unlock"], false);
    }

    #[tokio::test]
    async fn test_lock_unlock_flow() {
        let app = test_app().await;

        let (status, body) = send(
            &app,
            request("POST", "/api/v1/locks/qa/lock", Some("bob"), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "body: {}", body);
        assert_eq!(body["is_locked"], true);
        assert_eq!(body["locked_by"], "bob");

        let (status, body) = send(
            &app,
            request("POST", "/api/v1/locks/qa/lock", Some("bob"), None),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "lock_state");

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/v1/locks/qa/unlock",
                Some("bob"),
                Some(json!({ "comment": "  " })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "comment_required");

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/v1/locks/qa/unlock",
                Some("bob"),
                Some(json!({ "comment": "tests fixed" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_locked"], false);
        assert_eq!(body["unlocked_by"], "bob");

        let (_, audit) =
            send(&app, request("GET", "/api/v1/audit?limit=2", None, None)).await;
        let audit = audit.as_array().unwrap();
        assert_eq!(audit[0]["action"], "environment.unlocked");
        assert_eq!(audit[0]["details"]["comment"], "tests fixed");
        assert_eq!(audit[1]["action"], "environment.locked");
    }

    #[tokio::test]
    async fn test_operator_cannot_unlock_prod() {
        let app = test_app().await;
        let (status, _) = send(
            &app,
            request(
                "POST",
                "/api/v1/locks/PROD/unlock",
                Some("bob"),
                Some(json!({ "comment": "please" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/v1/locks/PROD/unlock",
                Some("alice"),
                Some(json!({ "comment": "release window" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_locked"], false);
    }

    #[tokio::test]
    async fn test_lock_with_reason() {
        let app = test_app().await;
        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/v1/locks/dev/lock",
                Some("alice"),
                Some(json!({ "reason": "code freeze" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reason"], "code freeze");
    }
}
