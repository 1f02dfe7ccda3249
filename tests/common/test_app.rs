use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use chat_relay::{
    app_context::AppContext,
    auth::TokenIssuer,
    completion::{CompletionClient, Script, ScriptedCompletionClient},
    config::ChatConfig,
    data_connector::{
        MemoryMessageStorage, MemorySessionStorage, SharedMessageStorage, SharedSessionStorage,
    },
    middleware::REQUEST_ID_HEADER,
    server::{build_app, AppState},
    store::MessageStore,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

pub const TEST_SECRET: &[u8] = b"integration-test-secret";
pub const TEST_MAX_PAYLOAD: usize = 256 * 1024;

/// Router plus handles on the pieces tests want to inspect directly.
pub struct TestApp {
    pub router: Router,
    pub store: MessageStore,
    pub completion: ScriptedCompletionClient,
    pub issuer: Arc<TokenIssuer>,
}

/// Create a test Axum application using the actual server's build_app function
pub fn create_test_app(script: Script) -> TestApp {
    create_test_app_with_storage(
        script,
        Arc::new(MemorySessionStorage::new()),
        Arc::new(MemoryMessageStorage::new()),
    )
}

/// Same as [`create_test_app`] over the given storages.
pub fn create_test_app_with_storage(
    script: Script,
    sessions: SharedSessionStorage,
    messages: SharedMessageStorage,
) -> TestApp {
    let completion = ScriptedCompletionClient::new(script);
    build_test_app(Arc::new(completion.clone()), completion, sessions, messages)
}

/// Same as [`create_test_app`], but streams come from `client`. `recorder`
/// is returned as-is for tests that don't use the scripted client.
pub fn create_test_app_with_client(
    client: Arc<dyn CompletionClient>,
    recorder: ScriptedCompletionClient,
) -> TestApp {
    build_test_app(
        client,
        recorder,
        Arc::new(MemorySessionStorage::new()),
        Arc::new(MemoryMessageStorage::new()),
    )
}

fn build_test_app(
    client: Arc<dyn CompletionClient>,
    recorder: ScriptedCompletionClient,
    sessions: SharedSessionStorage,
    messages: SharedMessageStorage,
) -> TestApp {
    let config = ChatConfig::default();
    let issuer = Arc::new(TokenIssuer::new(TEST_SECRET, config.auth.token_ttl_secs));

    let context = AppContext::builder()
        .config(config.clone())
        .session_storage(sessions)
        .message_storage(messages)
        .completion_client(client)
        .token_issuer(Arc::clone(&issuer))
        .build()
        .expect("test context");
    let store = context.store.clone();

    let router = build_app(
        AppState::new(context),
        TEST_MAX_PAYLOAD,
        vec![REQUEST_ID_HEADER.to_string()],
        config.cors_allowed_origins,
    );

    TestApp {
        router,
        store,
        completion: recorder,
        issuer,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(build_request(Method::GET, uri, token, None)).await
    }

    pub async fn post_json(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.send(build_request(Method::POST, uri, token, Some(body)))
            .await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(build_request(Method::DELETE, uri, token, None))
            .await
    }

    /// Anonymous login through the HTTP surface; returns the access token.
    pub async fn login(&self) -> String {
        let response = self.send(build_request(Method::POST, "/auth/anonymous", None, None)).await;
        assert_eq!(response.status, StatusCode::OK);
        response.json()["access_token"]
            .as_str()
            .expect("access_token")
            .to_string()
    }

    /// `POST /chats` with `token`; returns the new session id.
    pub async fn create_session(&self, token: &str) -> String {
        let response = self
            .send(build_request(Method::POST, "/chats", Some(token), None))
            .await;
        assert_eq!(response.status, StatusCode::OK);
        response.json()["session_id"]
            .as_str()
            .expect("session_id")
            .to_string()
    }
}

pub fn build_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Percent-encodes a query value.
pub fn encode_query(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

pub fn stream_uri(session_id: &str, user_input: &str) -> String {
    format!(
        "/chat/stream?session_id={}&user_input={}",
        encode_query(session_id),
        encode_query(user_input)
    )
}

/// Splits an SSE body into `(event, data)` pairs. Multi-line data is joined
/// with `\n`.
pub fn parse_sse(body: &str) -> Vec<(Option<String>, String)> {
    body.split("\n\n")
        .filter(|block| !block.trim().is_empty())
        .map(|block| {
            let mut event = None;
            let mut data = Vec::new();
            for line in block.lines() {
                if let Some(rest) = line.strip_prefix("event:") {
                    event = Some(rest.trim().to_string());
                } else if let Some(rest) = line.strip_prefix("data:") {
                    data.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
                }
            }
            (event, data.join("\n"))
        })
        .collect()
}
