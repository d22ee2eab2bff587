// HTTP-level tests: the real router over an in-memory database.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::Duration;
use serde_json::{Value, json};
use tower::ServiceExt;

use chats_api::tokens::TokenService;
use chats_api::{AppState, AppStateInner, router};
use chats_db::Database;

struct TestApp {
    state: AppState,
}

impl TestApp {
    fn new() -> Self {
        Self::with_tokens(TokenService::new("integration-test-secret"))
    }

    fn with_tokens(tokens: TokenService) -> Self {
        let state = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            tokens,
        });
        Self { state }
    }

    fn sql(&self, statement: &str, params: &[&str]) {
        self.state
            .db
            .with_conn(|c| {
                c.execute(statement, rusqlite::params_from_iter(params))?;
                Ok(())
            })
            .unwrap();
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router(self.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn register(&self, username: &str) {
        let (status, body) = self
            .call(
                Method::POST,
                "/user/register",
                None,
                Some(json!({ "username": username, "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert_eq!(body["success"], "User created.");
    }

    /// Returns (access, refresh).
    async fn login(&self, username: &str) -> (String, String) {
        let (status, body) = self
            .call(
                Method::POST,
                "/user/login",
                None,
                Some(json!({ "username": username, "password": "correct horse" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        (
            body["access"].as_str().unwrap().to_string(),
            body["refresh"].as_str().unwrap().to_string(),
        )
    }

    async fn refresh(&self, refresh: &str) -> (StatusCode, Value) {
        self.call(
            Method::POST,
            "/user/refresh",
            None,
            Some(json!({ "refresh": refresh })),
        )
        .await
    }

    async fn create_profile(&self, token: &str, first: &str, last: &str) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                "/user/profile",
                Some(token),
                Some(json!({ "first_name": first, "last_name": last })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body
    }

    /// Registers and logs in; returns (user id, access token).
    async fn user(&self, username: &str) -> (String, String) {
        self.register(username).await;
        let (access, _) = self.login(username).await;
        let id = self.state.tokens.verify_access(&access).unwrap().to_string();
        (id, access)
    }
}

#[tokio::test]
async fn health_needs_no_auth() {
    let app = TestApp::new();
    let (status, body) = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn register_then_login_issues_two_distinct_tokens() {
    let app = TestApp::new();
    app.register("alice").await;
    let (access, refresh) = app.login("alice").await;

    assert_ne!(access, refresh);
    assert!(app.state.tokens.verify_access(&access).is_ok());
    assert!(app.state.tokens.verify_refresh(&refresh).is_ok());
}

#[tokio::test]
async fn duplicate_or_invalid_registration_is_a_validation_error() {
    let app = TestApp::new();
    app.register("alice").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/user/register",
            None,
            Some(json!({ "username": "alice", "password": "another password" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "username");

    let (status, body) = app
        .call(
            Method::POST,
            "/user/register",
            None,
            Some(json!({ "username": "bob", "password": "short" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "password");
}

#[tokio::test]
async fn wrong_password_is_rejected_without_detail() {
    let app = TestApp::new();
    app.register("alice").await;

    for (username, password) in [("alice", "wrong password"), ("nobody", "correct horse")] {
        let (status, body) = app
            .call(
                Method::POST,
                "/user/login",
                None,
                Some(json!({ "username": username, "password": password })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid username or password");
    }
}

#[tokio::test]
async fn second_login_invalidates_the_first_refresh_token() {
    let app = TestApp::new();
    app.register("alice").await;
    let (_, first_refresh) = app.login("alice").await;
    let (_, second_refresh) = app.login("alice").await;

    let (status, body) = app.refresh(&first_refresh).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "refresh token not found");

    let (status, _) = app.refresh(&second_refresh).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn refresh_rotates_and_retires_the_old_token() {
    let app = TestApp::new();
    app.register("alice").await;
    let (_, refresh) = app.login("alice").await;

    let (status, body) = app.refresh(&refresh).await;
    assert_eq!(status, StatusCode::OK);
    let rotated = body["refresh"].as_str().unwrap().to_string();
    assert_ne!(rotated, refresh);

    let new_access = body["access"].as_str().unwrap();
    let (status, _) = app
        .call(Method::GET, "/user/profile", Some(new_access), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.refresh(&refresh).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "refresh token not found");
}

#[tokio::test]
async fn tampered_refresh_token_is_invalid() {
    let app = TestApp::new();
    app.register("alice").await;
    app.login("alice").await;

    let forged = TokenService::new("not-the-server-secret")
        .issue(uuid::Uuid::new_v4())
        .unwrap();
    let (status, body) = app.refresh(&forged.refresh).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Token is invalid or has expired");
}

#[tokio::test]
async fn protected_routes_need_a_valid_access_token() {
    let app = TestApp::new();
    app.register("alice").await;
    let (_, refresh) = app.login("alice").await;

    for token in [None, Some("garbage"), Some(refresh.as_str())] {
        let (status, body) = app.call(Method::GET, "/message", token, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());
    }
}

#[tokio::test]
async fn deactivated_user_is_locked_out_of_protected_routes() {
    let app = TestApp::new();
    let (id, access) = app.user("alice").await;

    let (status, _) = app.call(Method::GET, "/message", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);

    app.sql("UPDATE users SET is_active = 0 WHERE id = ?1", &[id.as_str()]);
    let (status, _) = app.call(Method::GET, "/message", Some(&access), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn deleted_user_access_token_is_rejected() {
    let app = TestApp::new();
    let (id, access) = app.user("alice").await;

    app.sql("DELETE FROM users WHERE id = ?1", &[id.as_str()]);
    let (status, _) = app.call(Method::GET, "/user/profile", Some(&access), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_refresh_token_cannot_be_exchanged() {
    let tokens = TokenService::new("integration-test-secret")
        .with_lifetimes(Duration::minutes(5), Duration::seconds(-10));
    let app = TestApp::with_tokens(tokens);
    app.register("alice").await;
    let (_, refresh) = app.login("alice").await;

    let (status, body) = app.refresh(&refresh).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Token is invalid or has expired");
}

#[tokio::test]
async fn profile_search_requires_every_term() {
    let app = TestApp::new();
    let (_, jo) = app.user("jsmith").await;
    let (_, ann) = app.user("asmith").await;
    let (_, brown) = app.user("jbrown").await;
    app.create_profile(&jo, "Jo", "Smith").await;
    app.create_profile(&ann, "Ann", "Smith").await;
    app.create_profile(&brown, "Jo", "Brown").await;

    let usernames = |body: &Value| -> Vec<String> {
        body.as_array()
            .unwrap()
            .iter()
            .map(|p| p["username"].as_str().unwrap().to_string())
            .collect()
    };

    let (status, body) = app
        .call(Method::GET, "/user/profile?keyword=Jo%20Smith", Some(&jo), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usernames(&body), ["jsmith"]);

    let (_, body) = app
        .call(Method::GET, "/user/profile?keyword=smith", Some(&jo), None)
        .await;
    assert_eq!(usernames(&body), ["jsmith", "asmith"]);

    let (_, body) = app.call(Method::GET, "/user/profile", Some(&jo), None).await;
    assert_eq!(usernames(&body).len(), 3);
}

#[tokio::test]
async fn oversized_keyword_is_a_validation_error() {
    let app = TestApp::new();
    let (_, alice) = app.user("alice").await;

    let distinct: Vec<String> = (0..100).map(|i| format!("t{}", i)).collect();
    let uri = format!("/user/profile?keyword={}", distinct.join("%20"));
    let (status, body) = app.call(Method::GET, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "keyword");

    let repeated = vec!["alice"; 1000].join("%20");
    let uri = format!("/user/profile?keyword={}", repeated);
    let (status, _) = app.call(Method::GET, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn profiles_are_edited_only_by_their_owner() {
    let app = TestApp::new();
    let (_, alice) = app.user("alice").await;
    let (_, bob) = app.user("bob").await;
    let profile = app.create_profile(&alice, "Alice", "Liddell").await;
    let uri = format!("/user/profile/{}", profile["id"].as_str().unwrap());

    let (status, body) = app
        .call(
            Method::POST,
            "/user/profile",
            Some(&alice),
            Some(json!({ "first_name": "Again", "last_name": "Liddell" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "user");

    let (status, _) = app
        .call(Method::PATCH, &uri, Some(&bob), Some(json!({ "caption": "pwned" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(
            Method::PATCH,
            &uri,
            Some(&alice),
            Some(json!({ "caption": "Down the rabbit hole" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["caption"], "Down the rabbit hole");
    assert_eq!(body["first_name"], "Alice");

    let (status, _) = app.call(Method::DELETE, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call(Method::DELETE, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.call(Method::GET, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn message_with_attachments_round_trip() {
    let app = TestApp::new();
    let (alice_id, alice) = app.user("alice").await;
    let (bob_id, bob) = app.user("bob").await;
    let (_, carol) = app.user("carol").await;

    let (status, created) = app
        .call(
            Method::POST,
            "/message",
            Some(&alice),
            Some(json!({
                "receiver_id": bob_id,
                "message": "photos from the trip",
                "attachments": [
                    { "attachment": "uploads/beach.jpg", "caption": "beach" },
                    { "attachment": "uploads/hike.jpg" }
                ]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);

    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["sender"]["id"], alice_id.as_str());
    assert_eq!(created["sender"]["username"], "alice");
    assert_eq!(created["receiver"]["username"], "bob");
    let attachments = created["attachments"].as_array().unwrap();
    assert_eq!(attachments.len(), 2);
    assert!(attachments.iter().all(|a| a["message_id"] == id.as_str()));
    assert_eq!(attachments[0]["caption"], "beach");
    assert!(attachments[1]["caption"].is_null());

    let uri = format!("/message/{}", id);

    let (status, fetched) = app.call(Method::GET, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["attachments"].as_array().unwrap().len(), 2);

    let (status, _) = app.call(Method::GET, &uri, Some(&carol), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, listed) = app
        .call(Method::GET, &format!("/message?user={}", alice_id), Some(&bob), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, _) = app
        .call(Method::PATCH, &uri, Some(&bob), Some(json!({ "message": "edited" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, edited) = app
        .call(Method::PUT, &uri, Some(&alice), Some(json!({ "message": "edited" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["message"], "edited");
    assert_eq!(edited["attachments"].as_array().unwrap().len(), 2);

    let (status, _) = app.call(Method::DELETE, &uri, Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app.call(Method::DELETE, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.call(Method::GET, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn message_to_unknown_receiver_is_rejected() {
    let app = TestApp::new();
    let (_, alice) = app.user("alice").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/message",
            Some(&alice),
            Some(json!({ "receiver_id": uuid::Uuid::new_v4(), "message": "hello?" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["field"], "receiver_id");

    let (_, listed) = app.call(Method::GET, "/message", Some(&alice), None).await;
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn message_pages_visit_every_message_once() {
    let app = TestApp::new();
    let (_, alice) = app.user("alice").await;
    let (bob_id, _) = app.user("bob").await;

    let mut ids = Vec::new();
    for text in ["m0", "m1", "m2"] {
        let (status, created) = app
            .call(
                Method::POST,
                "/message",
                Some(&alice),
                Some(json!({ "receiver_id": bob_id, "message": text })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", created);
        ids.push(created["id"].as_str().unwrap().to_string());
    }
    // A whole-second timestamp, and two messages sharing one.
    app.sql(
        "UPDATE messages SET created_at = '2020-01-01T00:00:00.000Z' WHERE id = ?1",
        &[ids[0].as_str()],
    );
    app.sql(
        "UPDATE messages SET created_at = '2020-01-01T00:00:05.250Z' WHERE id IN (?1, ?2)",
        &[ids[1].as_str(), ids[2].as_str()],
    );

    let mut seen = Vec::new();
    let mut uri = "/message?limit=1".to_string();
    for _ in 0..10 {
        let (status, page) = app.call(Method::GET, &uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK, "{}", page);
        let Some(last) = page.as_array().unwrap().last() else {
            break;
        };
        seen.push(last["message"].as_str().unwrap().to_string());
        uri = format!(
            "/message?limit=1&before={}&before_id={}",
            last["created_at"].as_str().unwrap(),
            last["id"].as_str().unwrap()
        );
    }

    assert_eq!(seen, ["m2", "m1", "m0"]);
}

#[tokio::test]
async fn unparseable_cursor_is_a_validation_error() {
    let app = TestApp::new();
    let (_, alice) = app.user("alice").await;

    for uri in [
        "/message?before=yesterday",
        "/message?before_id=00000000-0000-0000-0000-000000000000",
    ] {
        let (status, body) = app.call(Method::GET, uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["field"], "before");
    }
}
