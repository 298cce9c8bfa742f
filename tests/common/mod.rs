#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use chamados::api_router::create_router;
use chamados::config::AppConfig;
use chamados::core::shared::models::User;
use chamados::core::shared::state::AppState;
use chamados::core::shared::utils::{create_conn, run_migrations};
use chamados::email::{EmailService, SimulatedTransport};
use chamados::security::{Argon2Config, PasswordService};
use chamados::users::{create_user, Registration};

pub const PASSWORD: &str = "password123";

pub struct TestApp {
    pub state: Arc<AppState>,
    pub mail: Arc<SimulatedTransport>,
    pub router: Router,
    _dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = AppConfig::default();
        config.database.url = dir.path().join("app.db").to_string_lossy().to_string();
        config.database.pool_size = 4;
        config.key_file = dir.path().join(".key");
        config.uploads.dir = dir.path().join("uploads");
        config.session.secret = "integration-secret".to_string();
        config.company_name = "ACME".to_string();
        config.rate_limit.api_per_second = 10_000;
        config.rate_limit.api_burst = 10_000;

        let pool = create_conn(&config.database.url, config.database.pool_size).expect("pool");
        run_migrations(&pool).expect("migrations");
        let mail = Arc::new(SimulatedTransport::new());
        let email = EmailService::new(vec![mail.clone()]);
        let passwords = PasswordService::new(&Argon2Config::minimal()).expect("hasher");
        let state = Arc::new(AppState::from_parts(config, pool, passwords, email));
        let router = create_router(state.clone());

        Self {
            state,
            mail,
            router,
            _dir: dir,
        }
    }

    pub fn user(&self, name: &str, email: &str, is_admin: bool) -> User {
        let mut conn = self.state.db().expect("conn");
        create_user(
            &mut conn,
            &self.state.passwords,
            Registration {
                name,
                email,
                password: PASSWORD,
                confirmation: PASSWORD,
                is_admin,
            },
        )
        .expect("create user")
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.expect("body").to_bytes().to_vec();
        (status, headers, body)
    }

    pub async fn json(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let (status, _, body) = self.send(request).await;
        let value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    /// Logs in through the JSON API and returns the bearer token.
    pub async fn login(&self, email: &str) -> String {
        let (status, body) = self
            .json(json_request(
                "POST",
                "/api/login",
                None,
                serde_json::json!({ "email": email, "password": PASSWORD }),
            ))
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        body["token"].as_str().expect("token").to_string()
    }
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

pub fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).expect("request")
}

pub fn form(uri: &str, fields: &[(&str, &str)]) -> Request<Body> {
    let body = fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .expect("request")
}

pub fn location(headers: &axum::http::HeaderMap) -> String {
    headers
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub const BOUNDARY: &str = "chamados-test-boundary";

/// Multipart upload of one file attached to `ticket_id`.
pub fn upload(token: &str, ticket_id: i64, filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"ticket_id\"\r\n\r\n{ticket_id}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: text/plain\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/attachments")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::from(body))
        .expect("request")
}

pub fn delete(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .expect("request")
}
