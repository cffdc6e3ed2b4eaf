//! End-to-end HTTP tests
//!
//! Drive the axum router in-process with `tower::ServiceExt::oneshot` against
//! a real DuckDB file.
//!
//! Run with: cargo test --test api_tests -- --nocapture

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use std::sync::Arc;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use tally_core::api::build_router;
use tally_core::config::{Config, CredentialParams};
use tally_core::services::LedgerService;
use tally_core::TallyContext;

struct TestApp {
    router: Router,
    ledger: Arc<LedgerService>,
    _temp_dir: TempDir,
}

impl TestApp {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::with_secret(temp_dir.path(), "api-test-secret");
        config.credentials = CredentialParams::minimal();
        let ctx = TallyContext::from_config(config).unwrap();
        Self {
            router: build_router(ctx.service_state()),
            ledger: Arc::clone(&ctx.ledger_service),
            _temp_dir: temp_dir,
        }
    }

    /// Operator funding; the HTTP surface has no way to add money
    fn fund(&self, id: i64, amount: i64) {
        self.ledger.deposit(id, amount).unwrap();
    }

    async fn send_raw(
        &self,
        method: &str,
        uri: &str,
        token: &str,
        body: &str,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {}", token))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Create an account and return (id, number)
    async fn create(&self, first: &str, password: &str) -> (i64, i64) {
        let (status, body) = self
            .send(
                "POST",
                "/accounts",
                None,
                Some(json!({ "firstName": first, "lastName": "Test", "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body.get("credentialHash").is_none());
        assert!(body.get("password").is_none());
        (body["id"].as_i64().unwrap(), body["number"].as_i64().unwrap())
    }

    async fn login(&self, number: i64, password: &str) -> String {
        let (status, body) = self
            .send(
                "POST",
                "/login",
                None,
                Some(json!({ "number": number, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["number"], number);
        body["token"].as_str().unwrap().to_string()
    }

    async fn balance(&self, id: i64, token: &str) -> i64 {
        let (status, body) = self
            .send("GET", &format!("/accounts/{}", id), Some(token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        body["balance"].as_i64().unwrap()
    }
}

#[tokio::test]
async fn test_ann_pays_bob() {
    let app = TestApp::new();
    let (ann_id, ann_number) = app.create("Ann", "pw1").await;
    let (bob_id, bob_number) = app.create("Bob", "pw2").await;

    app.fund(ann_id, 100);

    let ann_token = app.login(ann_number, "pw1").await;

    let (status, body) = app
        .send(
            "POST",
            &format!("/accounts/{}/transfer", ann_id),
            Some(&ann_token),
            Some(json!({ "toAccountNumber": bob_number, "amount": 50 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "number": ann_number, "balance": 50 }));

    let bob_token = app.login(bob_number, "pw2").await;
    assert_eq!(app.balance(ann_id, &ann_token).await, 50);
    assert_eq!(app.balance(bob_id, &bob_token).await, 50);
}

#[tokio::test]
async fn test_bobs_token_cannot_move_anns_money() {
    let app = TestApp::new();
    let (ann_id, ann_number) = app.create("Ann", "pw1").await;
    let (_, bob_number) = app.create("Bob", "pw2").await;

    app.fund(ann_id, 100);
    let ann_token = app.login(ann_number, "pw1").await;

    let bob_token = app.login(bob_number, "pw2").await;
    let (status, body) = app
        .send(
            "POST",
            &format!("/accounts/{}/transfer", ann_id),
            Some(&bob_token),
            Some(json!({ "toAccountNumber": bob_number, "amount": 30 })),
        )
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({ "error": "access denied" }));
    assert_eq!(app.balance(ann_id, &ann_token).await, 100);
}

#[tokio::test]
async fn test_denials_are_indistinguishable() {
    let app = TestApp::new();
    let (ann_id, ann_number) = app.create("Ann", "pw1").await;
    let ann_token = app.login(ann_number, "pw1").await;

    let cases = [
        (format!("/accounts/{}", ann_id), None),
        (format!("/accounts/{}", ann_id), Some("not.a.token")),
        ("/accounts/abc".to_string(), Some(ann_token.as_str())),
        ("/accounts/987654".to_string(), Some(ann_token.as_str())),
    ];
    for (uri, token) in cases {
        let (status, body) = app.send("GET", &uri, token, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
        assert_eq!(body, json!({ "error": "access denied" }), "{uri}");
    }
}

#[tokio::test]
async fn test_legacy_token_header_is_accepted() {
    let app = TestApp::new();
    let (ann_id, ann_number) = app.create("Ann", "pw1").await;
    let token = app.login(ann_number, "pw1").await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/accounts/{}", ann_id))
                .header("x-jwt-token", token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_transfer_errors() {
    let app = TestApp::new();
    let (ann_id, ann_number) = app.create("Ann", "pw1").await;
    let (_, bob_number) = app.create("Bob", "pw2").await;
    let token = app.login(ann_number, "pw1").await;
    let transfer_uri = format!("/accounts/{}/transfer", ann_id);

    let (status, body) = app
        .send(
            "POST",
            &transfer_uri,
            Some(&token),
            Some(json!({ "toAccountNumber": bob_number, "amount": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "insufficient funds");

    let (status, _) = app
        .send(
            "POST",
            &transfer_uri,
            Some(&token),
            Some(json!({ "toAccountNumber": bob_number, "amount": 0 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            "POST",
            &transfer_uri,
            Some(&token),
            Some(json!({ "toAccountNumber": ann_number, "amount": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown destination looks like any other refusal
    let (status, _) = app
        .send(
            "POST",
            &transfer_uri,
            Some(&token),
            Some(json!({ "toAccountNumber": 1, "amount": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_wrong_password_and_unknown_number_look_the_same() {
    let app = TestApp::new();
    let (_, ann_number) = app.create("Ann", "pw1").await;

    let wrong_password = app
        .send(
            "POST",
            "/login",
            None,
            Some(json!({ "number": ann_number, "password": "nope" })),
        )
        .await;
    let unknown_number = app
        .send(
            "POST",
            "/login",
            None,
            Some(json!({ "number": 1, "password": "pw1" })),
        )
        .await;

    assert_eq!(wrong_password.0, StatusCode::FORBIDDEN);
    assert_eq!(wrong_password, unknown_number);
}

#[tokio::test]
async fn test_update_and_delete_own_account() {
    let app = TestApp::new();
    let (ann_id, ann_number) = app.create("Ann", "pw1").await;
    let token = app.login(ann_number, "pw1").await;

    let (status, body) = app
        .send(
            "PATCH",
            &format!("/accounts/{}", ann_id),
            Some(&token),
            Some(json!({ "lastName": "Park" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["firstName"], "Ann");
    assert_eq!(body["lastName"], "Park");

    let (status, body) = app
        .send("DELETE", &format!("/accounts/{}", ann_id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "deleted": ann_id }));

    // The token outlives the account but opens nothing
    let (status, _) = app
        .send("GET", &format!("/accounts/{}", ann_id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.send("GET", "/accounts", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_create_account_validation() {
    let app = TestApp::new();
    let (status, body) = app
        .send(
            "POST",
            "/accounts",
            None,
            Some(json!({ "firstName": "", "lastName": "Lee", "password": "pw" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("first name"));
}

#[tokio::test]
async fn test_account_holders_cannot_add_money() {
    let app = TestApp::new();
    let (bob_id, bob_number) = app.create("Bob", "pw2").await;
    let token = app.login(bob_number, "pw2").await;

    let (status, _) = app
        .send(
            "POST",
            &format!("/accounts/{}/deposit", bob_id),
            Some(&token),
            Some(json!({ "amount": 1_000_000 })),
        )
        .await;
    assert!(
        status == StatusCode::NOT_FOUND || status == StatusCode::METHOD_NOT_ALLOWED,
        "{status}"
    );
    assert_eq!(app.balance(bob_id, &token).await, 0);
}

#[tokio::test]
async fn test_malformed_bodies_get_json_errors() {
    let app = TestApp::new();
    let (ann_id, ann_number) = app.create("Ann", "pw1").await;
    let token = app.login(ann_number, "pw1").await;
    app.fund(ann_id, 100);

    let cases = [
        (
            "POST",
            format!("/accounts/{}/transfer", ann_id),
            r#"{"toAccountNumber":"abc","amount":1}"#,
        ),
        ("POST", format!("/accounts/{}/transfer", ann_id), r#"{"amount":1}"#),
        ("POST", format!("/accounts/{}/transfer", ann_id), "not json"),
        ("PATCH", format!("/accounts/{}", ann_id), r#"{"firstName":7}"#),
        ("POST", "/login".to_string(), r#"{"number":"x"}"#),
        ("POST", "/accounts".to_string(), r#"{"firstName":"Ann"}"#),
    ];
    for (method, uri, body) in cases {
        let (status, value) = app.send_raw(method, &uri, &token, body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{method} {uri} {body}");
        assert_eq!(
            value,
            json!({ "error": "invalid request body" }),
            "{method} {uri} {body}"
        );
    }
    assert_eq!(app.balance(ann_id, &token).await, 100);
}
