mod common;

use axum::http::{header, StatusCode};
use chat_relay::completion::Script;
use common::test_app::{create_test_app, stream_uri};
use serde_json::json;

#[tokio::test]
async fn test_session_lifecycle() {
    let app = create_test_app(Script::finishing(["Hello"]));
    let token = app.login().await;

    let session_id = app.create_session(&token).await;
    assert!(uuid::Uuid::parse_str(&session_id).is_ok());

    let response = app.get("/chats", Some(&token)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({ "sessions": [{ "id": session_id, "title": "New Chat" }] })
    );

    app.get(&stream_uri(&session_id, "Hi"), None).await;

    let uri = format!("/chats/{}/messages", session_id);
    let response = app.get(&uri, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({ "messages": [
            { "role": "user", "content": "Hi" },
            { "role": "assistant", "content": "Hello" },
        ] })
    );

    let response = app.delete(&format!("/chats/{}", session_id), Some(&token)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({ "detail": "Session deleted successfully" })
    );

    let response = app.get(&uri, None).await;
    assert_eq!(response.json(), json!({ "messages": [] }));

    let response = app.get("/chats", Some(&token)).await;
    assert_eq!(response.json(), json!({ "sessions": [] }));
}

#[tokio::test]
async fn test_sessions_listed_newest_first_and_scoped_to_owner() {
    let app = create_test_app(Script::finishing(["ok"]));
    let alice = app.login().await;
    let bob = app.login().await;

    let first = app.create_session(&alice).await;
    let second = app.create_session(&alice).await;
    let bobs = app.create_session(&bob).await;

    let response = app.get("/chats", Some(&alice)).await;
    let ids: Vec<String> = response.json()["sessions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, vec![second, first]);

    let response = app.get("/chats", Some(&bob)).await;
    assert_eq!(
        response.json(),
        json!({ "sessions": [{ "id": bobs, "title": "New Chat" }] })
    );
}

#[tokio::test]
async fn test_title_set_once_from_first_user_message() {
    let app = create_test_app(Script::finishing(["ok"]));
    let token = app.login().await;
    let session_id = app.create_session(&token).await;

    app.post_json(
        "/chat",
        None,
        json!({ "session_id": session_id, "user_input": "Tell me a joke about cats please" }),
    )
    .await;
    app.post_json(
        "/chat",
        None,
        json!({ "session_id": session_id, "user_input": "Another one" }),
    )
    .await;

    let response = app.get("/chats", Some(&token)).await;
    assert_eq!(
        response.json()["sessions"][0]["title"],
        "Tell me a joke..."
    );
}

#[tokio::test]
async fn test_listing_and_creating_require_token() {
    let app = create_test_app(Script::finishing(["ok"]));

    let response = app.get("/chats", None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers.get(header::WWW_AUTHENTICATE).unwrap(),
        "Bearer"
    );
    assert_eq!(response.json()["error"]["message"], "Not authenticated");

    let response = app.post_json("/chats", Some("not-a-jwt"), json!({})).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_messages_of_unknown_session_are_empty() {
    let app = create_test_app(Script::finishing(["ok"]));

    let response = app.get("/chats/does-not-exist/messages", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!({ "messages": [] }));
}

#[tokio::test]
async fn test_delete_unknown_session_succeeds() {
    let app = create_test_app(Script::finishing(["ok"]));

    let response = app.delete("/chats/does-not-exist", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({ "detail": "Session deleted successfully" })
    );
}
