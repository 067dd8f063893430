//! In-process stand-in for the portal backend.
//!
//! Serves the login, refresh and a few protected endpoints on a random
//! port, and counts every call so tests can assert on network traffic.
#![allow(dead_code)]

use actix_web::http::StatusCode;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use newsportal::{AuthClient, MemoryTokenStore};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const READER_EMAIL: &str = "reader@example.com";
pub const EDITOR_EMAIL: &str = "editor@example.com";
pub const OUTAGE_EMAIL: &str = "outage@example.com";
pub const UNVERIFIED_EMAIL: &str = "unverified@example.com";
pub const PASSWORD: &str = "Correct-Horse-1";

const JWT_SECRET: &str = "test-secret-key-at-least-32-characters-long";
const ACCESS_TOKEN_EXPIRY: i64 = 900;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Accept the current refresh token and rotate both tokens
    Rotate,
    /// Answer every refresh with this status
    Reject(u16),
    /// Answer 200 with a body that is not a token pair
    Garbage,
}

pub struct BackendState {
    valid_access: Mutex<String>,
    valid_refresh: Mutex<String>,
    refresh_mode: Mutex<RefreshMode>,
    refresh_delay: Mutex<Duration>,
    refresh_calls: AtomicUsize,
    resource_calls: AtomicUsize,
    login_calls: AtomicUsize,
    seen_authorization: Mutex<Vec<String>>,
    seen_client_header: Mutex<Vec<String>>,
    seen_bodies: Mutex<Vec<String>>,
}

impl BackendState {
    fn new() -> Self {
        Self {
            valid_access: Mutex::new(String::new()),
            valid_refresh: Mutex::new(String::new()),
            refresh_mode: Mutex::new(RefreshMode::Rotate),
            refresh_delay: Mutex::new(Duration::ZERO),
            refresh_calls: AtomicUsize::new(0),
            resource_calls: AtomicUsize::new(0),
            login_calls: AtomicUsize::new(0),
            seen_authorization: Mutex::new(Vec::new()),
            seen_client_header: Mutex::new(Vec::new()),
            seen_bodies: Mutex::new(Vec::new()),
        }
    }

    fn issue_tokens(&self, email: &str, role: &str) -> (String, String) {
        let access = generate_access_token(email, role);
        let refresh = generate_refresh_token();
        *self.valid_access.lock().unwrap() = access.clone();
        *self.valid_refresh.lock().unwrap() = refresh.clone();
        (access, refresh)
    }

    fn is_authorized(&self, req: &HttpRequest) -> bool {
        let header = req
            .headers()
            .get("Authorization")
            .and_then(|h| h.to_str().ok())
            .unwrap_or("")
            .to_string();
        let expected = format!("Bearer {}", self.valid_access.lock().unwrap());
        self.seen_authorization.lock().unwrap().push(header.clone());
        if let Some(client) = req.headers().get("X-Client").and_then(|h| h.to_str().ok()) {
            self.seen_client_header.lock().unwrap().push(client.to_string());
        }
        header == expected
    }
}

pub struct TestBackend {
    pub address: String,
    pub state: web::Data<BackendState>,
}

impl TestBackend {
    /// The server forgets the current access token; the next request with it gets 401.
    pub fn expire_access_token(&self) {
        *self.state.valid_access.lock().unwrap() = format!("revoked-{}", generate_refresh_token());
    }

    pub fn set_refresh_mode(&self, mode: RefreshMode) {
        *self.state.refresh_mode.lock().unwrap() = mode;
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        *self.state.refresh_delay.lock().unwrap() = delay;
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn resource_calls(&self) -> usize {
        self.state.resource_calls.load(Ordering::SeqCst)
    }

    pub fn login_calls(&self) -> usize {
        self.state.login_calls.load(Ordering::SeqCst)
    }

    pub fn seen_authorization(&self) -> Vec<String> {
        self.state.seen_authorization.lock().unwrap().clone()
    }

    pub fn seen_client_header(&self) -> Vec<String> {
        self.state.seen_client_header.lock().unwrap().clone()
    }

    pub fn seen_bodies(&self) -> Vec<String> {
        self.state.seen_bodies.lock().unwrap().clone()
    }

    pub fn valid_tokens(&self) -> (String, String) {
        (
            self.state.valid_access.lock().unwrap().clone(),
            self.state.valid_refresh.lock().unwrap().clone(),
        )
    }

    pub fn client(&self, store: Arc<MemoryTokenStore>) -> AuthClient {
        AuthClient::new(self.address.clone(), store, reqwest::Client::new())
    }

    /// A client whose store already holds a fresh session for the reader
    pub async fn logged_in_client(&self) -> (AuthClient, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::new());
        let client = self.client(store.clone());
        client
            .login(READER_EMAIL, PASSWORD)
            .await
            .expect("Failed to log in");
        (client, store)
    }
}

pub fn spawn_backend() -> TestBackend {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    let state = web::Data::new(BackendState::new());
    let server_state = state.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(server_state.clone())
            .route("/api/auth/login", web::post().to(login))
            .route("/api/auth/refresh", web::post().to(refresh))
            .route("/api/articles", web::get().to(articles))
            .route("/api/articles", web::post().to(articles))
            .route("/api/users/me", web::get().to(me))
            .route("/api/status/{code}", web::get().to(fixed_status))
            .route("/api/always-unauthorized", web::get().to(always_unauthorized))
    })
    .workers(1)
    .listen(listener)
    .expect("Failed to bind address")
    .run();

    let _ = tokio::spawn(server);

    TestBackend {
        address: format!("http://127.0.0.1:{}", port),
        state,
    }
}

// --- Token issuing ---

#[derive(Serialize)]
struct TestClaims<'a> {
    sub: &'a str,
    email: &'a str,
    role: &'a str,
    exp: i64,
    iat: i64,
    iss: &'a str,
    jti: String,
}

fn generate_access_token(email: &str, role: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = TestClaims {
        sub: email,
        email,
        role,
        exp: now + ACCESS_TOKEN_EXPIRY,
        iat: now,
        iss: "newsportal-test",
        // Two tokens issued within the same second must still differ.
        jti: generate_refresh_token(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("Failed to generate token")
}

fn generate_refresh_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

// --- Handlers ---

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody {
    refresh_token: String,
}

async fn login(form: web::Json<LoginBody>, state: web::Data<BackendState>) -> HttpResponse {
    state.login_calls.fetch_add(1, Ordering::SeqCst);

    if form.email == OUTAGE_EMAIL {
        return HttpResponse::ServiceUnavailable().finish();
    }

    if form.email == UNVERIFIED_EMAIL {
        return HttpResponse::Ok().json(json!({
            "success": false,
            "message": "Account is not verified"
        }));
    }

    let user = match (form.email.as_str(), form.password.as_str()) {
        (READER_EMAIL, PASSWORD) => json!({"id": 1, "email": READER_EMAIL, "name": "Reader", "role": "user"}),
        (EDITOR_EMAIL, PASSWORD) => json!({"id": "u-2", "email": EDITOR_EMAIL, "name": "Editor", "role": "admin"}),
        _ => {
            return HttpResponse::Unauthorized().json(json!({
                "success": false,
                "message": "Invalid email or password"
            }));
        }
    };

    let role = user["role"].as_str().unwrap_or("user").to_string();
    let (access_token, refresh_token) = state.issue_tokens(&form.email, &role);

    HttpResponse::Ok().json(json!({
        "success": true,
        "data": {
            "accessToken": access_token,
            "refreshToken": refresh_token,
            "user": user
        }
    }))
}

async fn refresh(form: web::Json<RefreshBody>, state: web::Data<BackendState>) -> HttpResponse {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let delay = *state.refresh_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let mode = *state.refresh_mode.lock().unwrap();
    match mode {
        RefreshMode::Reject(code) => {
            let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
            HttpResponse::build(status).json(json!({"message": "Refresh rejected"}))
        }
        RefreshMode::Garbage => HttpResponse::Ok().body("<html>maintenance</html>"),
        RefreshMode::Rotate => {
            let current = state.valid_refresh.lock().unwrap().clone();
            if form.refresh_token != current {
                return HttpResponse::Unauthorized().json(json!({"message": "Invalid refresh token"}));
            }
            let (access_token, refresh_token) = state.issue_tokens(READER_EMAIL, "user");
            HttpResponse::Ok().json(json!({
                "accessToken": access_token,
                "refreshToken": refresh_token
            }))
        }
    }
}

async fn articles(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<BackendState>,
) -> HttpResponse {
    state.resource_calls.fetch_add(1, Ordering::SeqCst);
    state
        .seen_bodies
        .lock()
        .unwrap()
        .push(String::from_utf8_lossy(&body).into_owned());

    if !state.is_authorized(&req) {
        return HttpResponse::Unauthorized().json(json!({"message": "Token expired"}));
    }

    HttpResponse::Ok().json(json!({
        "articles": [
            {"id": 1, "title": "Rust in the newsroom"},
            {"id": 2, "title": "Weekly digest"}
        ]
    }))
}

async fn me(req: HttpRequest, state: web::Data<BackendState>) -> HttpResponse {
    state.resource_calls.fetch_add(1, Ordering::SeqCst);

    if !state.is_authorized(&req) {
        return HttpResponse::Unauthorized().json(json!({"message": "Token expired"}));
    }

    HttpResponse::Ok().json(json!({"id": 1, "email": READER_EMAIL, "name": "Reader", "role": "user"}))
}

async fn fixed_status(
    req: HttpRequest,
    path: web::Path<u16>,
    state: web::Data<BackendState>,
) -> HttpResponse {
    state.resource_calls.fetch_add(1, Ordering::SeqCst);
    state.is_authorized(&req);

    let status = StatusCode::from_u16(path.into_inner()).unwrap_or(StatusCode::IM_A_TEAPOT);
    HttpResponse::build(status).json(json!({"status": status.as_u16()}))
}

async fn always_unauthorized(req: HttpRequest, state: web::Data<BackendState>) -> HttpResponse {
    state.resource_calls.fetch_add(1, Ordering::SeqCst);
    state.is_authorized(&req);
    HttpResponse::Unauthorized().json(json!({"message": "Not for you"}))
}
