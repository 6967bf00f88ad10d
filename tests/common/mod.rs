//! Shared helpers for API integration tests.
//!
//! Each test gets its own in-memory SQLite database and drives the full
//! router in-process with `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use testdeck::api::create_router;
use testdeck::api::handlers::ServerState;
use testdeck::db::Db;
use testdeck::{AuthConfig, Config};
use tower::ServiceExt;

pub const TEST_SECRET: &str = "test-secret-key-minimum-32-chars!!";

pub struct TestApp {
    pub router: Router,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let db = Db::connect("sqlite::memory:").await.expect("in-memory db");
        let config = Config {
            database_url: "sqlite::memory:".into(),
            server_port: 0,
            auth_config: Some(AuthConfig {
                jwt_secret: TEST_SECRET.into(),
                jwt_expiry_secs: 3600,
                allow_registration: true,
            }),
        };
        let state = ServerState::shared(db, config);
        Self {
            router: create_router(state),
        }
    }

    /// Spawn without an auth section (deny-by-default mode).
    pub async fn spawn_without_auth() -> Self {
        let db = Db::connect("sqlite::memory:").await.expect("in-memory db");
        let config = Config {
            database_url: "sqlite::memory:".into(),
            server_port: 0,
            auth_config: None,
        };
        let state = ServerState::shared(db, config);
        Self {
            router: create_router(state),
        }
    }

    /// Fire one request and return (status, parsed JSON body).
    pub async fn request(
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
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request("GET", uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request("POST", uri, Some(token), Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request("PATCH", uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request("DELETE", uri, Some(token), None).await
    }

    /// Register a user and return (user id, bearer token).
    pub async fn register(&self, name: &str, email: &str) -> (i64, String) {
        let (status, body) = self
            .request(
                "POST",
                "/auth/register",
                None,
                Some(json!({ "name": name, "email": email, "password": "password123" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "register failed: {}", body);
        (
            body["user"]["id"].as_i64().unwrap(),
            body["token"].as_str().unwrap().to_string(),
        )
    }

    /// Create a project and return its id.
    pub async fn create_project(&self, token: &str, name: &str) -> i64 {
        let (status, body) = self
            .post("/api/projects", token, json!({ "name": name }))
            .await;
        assert_eq!(status, StatusCode::OK, "create project failed: {}", body);
        body["id"].as_i64().unwrap()
    }

    /// Invite + accept in one go, giving `email`'s account the role.
    pub async fn add_member(
        &self,
        owner_token: &str,
        project_id: i64,
        email: &str,
        member_token: &str,
        role: &str,
    ) {
        let (status, invitation) = self
            .post(
                &format!("/api/projects/{}/invitations", project_id),
                owner_token,
                json!({ "email": email, "role": role }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "invite failed: {}", invitation);

        let token_str = invitation["token"].as_str().unwrap();
        let (status, body) = self
            .post(
                &format!("/api/invitations/{}/accept", token_str),
                member_token,
                json!({}),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "accept failed: {}", body);
    }
}
