// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Integration tests
//
// End-to-end tests exercising the full gateway:
// request → adapter → session → prompt → upstream generate → stream → response
//
// Uses wiremock as the upstream backend, tower::ServiceExt::oneshot for
// in-process HTTP, and the real HttpUpstream client.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chatrelay::config::{self, StringSource};
use chatrelay::engine;
use chatrelay::proxy;
use chatrelay::store::SystemClock;
use chatrelay::upstream::{HttpUpstream, UpstreamApi};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Infrastructure
// ---------------------------------------------------------------------------

fn yaml_for(server: &MockServer, with_credentials: bool) -> String {
    let credentials = if with_credentials {
        "credentials:\n  username: relay\n  password: pw\n"
    } else {
        ""
    };
    format!(
        r#"chatrelay: v1
environment: test
upstream:
  base_url: {uri}
  conversation_timeout_ms: 300
{credentials}shared_sentinel: shared-key
models: [assistant, assistant-search]
variants:
  default: 1
  suffixes:
    "-search": 2
"#,
        uri = server.uri()
    )
}

fn app_for(server: &MockServer, with_credentials: bool) -> axum::Router {
    let config = config::load_config(&StringSource {
        content: yaml_for(server, with_credentials),
    })
    .unwrap();
    let config = Arc::new(config);
    let upstream: Arc<dyn UpstreamApi> = Arc::new(HttpUpstream::new(
        reqwest::Client::new(),
        config.upstream.clone(),
        config.credentials.clone(),
    ));
    let engine = engine::build_engine(config, upstream, Arc::new(SystemClock));
    proxy::build_router(Arc::new(engine))
}

fn chat(auth: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json");
    if let Some(auth) = auth {
        builder = builder.header("authorization", format!("Bearer {auth}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn user_body(model: &str, stream: bool, text: &str) -> Value {
    json!({
        "model": model,
        "stream": stream,
        "messages": [{"role": "user", "content": text}]
    })
}

fn ndjson(lines: &[Value]) -> String {
    lines.iter().map(|l| format!("{l}\n")).collect()
}

fn delta(text: &str) -> Value {
    json!({"msgItem": {"theContent": text}})
}

async fn mount_conversation(server: &MockServer, id: &str) {
    Mock::given(method("POST"))
        .and(path("/api/conversation"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"code": 0, "data": {"conversationId": id}})),
        )
        .mount(server)
        .await;
}

async fn mount_generate(server: &MockServer, body: String) {
    Mock::given(method("POST"))
        .and(path("/api/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/x-ndjson")
                .set_body_string(body),
        )
        .mount(server)
        .await;
}

async fn read_text(resp: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn read_json(resp: axum::response::Response) -> Value {
    serde_json::from_str(&read_text(resp).await).unwrap()
}

fn sse_payloads(text: &str) -> Vec<Value> {
    text.split("\n\n")
        .filter_map(|frame| frame.strip_prefix("data: "))
        .filter(|data| *data != "[DONE]")
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

// ---------------------------------------------------------------------------
// Happy paths
// ---------------------------------------------------------------------------

#[tokio::test]
async fn streaming_text_end_to_end() {
    let server = MockServer::start().await;
    mount_conversation(&server, "conv-9").await;
    Mock::given(method("POST"))
        .and(path("/api/chat/completions"))
        .and(header("authorization", "Bearer user-token"))
        .and(body_partial_json(json!({
            "prompt": "Hi",
            "conversationId": "conv-9",
            "assistantType": 1,
            "stream": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(ndjson(&[delta("Hel"), delta("lo")])))
        .expect(1)
        .mount(&server)
        .await;

    let app = app_for(&server, true);
    let resp = app
        .oneshot(chat(Some("user-token"), user_body("assistant", true, "Hi")))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("content-type").unwrap(), "text/event-stream");

    let text = read_text(resp).await;
    let payloads = sse_payloads(&text);
    let contents: Vec<&str> = payloads
        .iter()
        .filter_map(|p| p["choices"][0]["delta"]["content"].as_str())
        .collect();
    assert_eq!(contents, vec!["Hel", "lo"]);
    assert_eq!(payloads[0]["object"], "chat.completion.chunk");
    assert_eq!(payloads[0]["model"], "assistant");
    assert_eq!(payloads.last().unwrap()["choices"][0]["finish_reason"], "stop");
    assert!(text.ends_with("data: [DONE]\n\n"));
}

#[tokio::test]
async fn streaming_tool_call_arguments_concatenate() {
    let server = MockServer::start().await;
    mount_conversation(&server, "conv-1").await;
    let call = r#"{"tool_calls":[{"name":"search","arguments":{"q":"x"}}]}"#;
    // Split the call across deltas so detection has to buffer.
    mount_generate(&server, ndjson(&[delta(&call[..10]), delta(&call[10..])])).await;

    let app = app_for(&server, true);
    let body = json!({
        "model": "assistant",
        "stream": true,
        "messages": [{"role": "user", "content": "find x"}],
        "tools": [{"type": "function", "function": {"name": "search", "parameters": {"type": "object"}}}]
    });
    let resp = app.oneshot(chat(Some("user-token"), body)).await.unwrap();
    let payloads = sse_payloads(&read_text(resp).await);

    let calls: Vec<&Value> = payloads
        .iter()
        .filter_map(|p| p["choices"][0]["delta"]["tool_calls"].get(0))
        .collect();
    assert_eq!(calls[0]["function"]["name"], "search");
    assert_eq!(calls[0]["type"], "function");
    let arguments: String = calls
        .iter()
        .filter_map(|c| c["function"]["arguments"].as_str())
        .collect();
    assert_eq!(arguments, r#"{"q":"x"}"#);
    assert_eq!(payloads.last().unwrap()["choices"][0]["finish_reason"], "tool_calls");
    assert!(payloads
        .iter()
        .all(|p| p["choices"][0]["delta"].get("content").is_none()
            || p["choices"][0]["delta"]["content"].is_null()));
}

#[tokio::test]
async fn buffered_completion_from_single_json_body() {
    let server = MockServer::start().await;
    mount_conversation(&server, "conv-1").await;
    // Non-streamed generation: one JSON object, no trailing newline.
    mount_generate(&server, json!({"code": 0, "data": {"msgItem": {"theContent": "Oslo"}}}).to_string()).await;

    let app = app_for(&server, true);
    let resp = app
        .oneshot(chat(Some("user-token"), user_body("assistant", false, "Capital of Norway?")))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = read_json(resp).await;
    assert_eq!(json["object"], "chat.completion");
    assert_eq!(json["choices"][0]["message"]["role"], "assistant");
    assert_eq!(json["choices"][0]["message"]["content"], "Oslo");
}

#[tokio::test]
async fn shared_sentinel_logs_in_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/user/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 0, "data": {"token": "tok-s"}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/conversation"))
        .and(header("authorization", "Bearer tok-s"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"id": 5}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat/completions"))
        .and(header("authorization", "Bearer tok-s"))
        .respond_with(ResponseTemplate::new(200).set_body_string(ndjson(&[delta("ok")])))
        .expect(2)
        .mount(&server)
        .await;

    let app = app_for(&server, true);
    for text in ["first", "second"] {
        let resp = app
            .clone()
            .oneshot(chat(Some("shared-key"), user_body("assistant", false, text)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn reset_without_prior_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/conversation"))
        .and(body_partial_json(json!({"title": "New chat"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"conversationId": "conv-new"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat/completions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let app = app_for(&server, true);
    let resp = app
        .oneshot(chat(Some("user-token"), user_body("assistant", false, "重置")))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = read_json(resp).await;
    let content = json["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(content.contains("conv-new"), "{content}");
}

#[tokio::test]
async fn search_model_uses_search_variant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/conversation"))
        .and(body_partial_json(json!({"assistantType": 2, "title": "Hi"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"conversationId": "c"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat/completions"))
        .and(body_partial_json(json!({"assistantType": 2})))
        .respond_with(ResponseTemplate::new(200).set_body_string(ndjson(&[delta("ok")])))
        .expect(1)
        .mount(&server)
        .await;

    let app = app_for(&server, true);
    let resp = app
        .oneshot(chat(Some("user-token"), user_body("assistant-search", false, "Hi")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_credential_is_401() {
    let server = MockServer::start().await;
    let app = app_for(&server, true);

    let resp = app
        .oneshot(chat(None, user_body("assistant", false, "Hi")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let json = read_json(resp).await;
    assert_eq!(json["error"]["message"], "missing credential");
}

#[tokio::test]
async fn unknown_model_is_404() {
    let server = MockServer::start().await;
    let app = app_for(&server, true);

    let resp = app
        .oneshot(chat(Some("user-token"), user_body("gpt-4o", false, "Hi")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_body_is_400() {
    let server = MockServer::start().await;
    let app = app_for(&server, true);

    let req = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("authorization", "Bearer user-token")
        .body(Body::from("{\"model\": "))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = read_json(resp).await;
    assert_eq!(json["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn shared_without_credentials_is_503() {
    let server = MockServer::start().await;
    let app = app_for(&server, false);

    let resp = app
        .oneshot(chat(Some("shared-key"), user_body("assistant", false, "Hi")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn generate_failure_is_502() {
    let server = MockServer::start().await;
    mount_conversation(&server, "conv-1").await;
    Mock::given(method("POST"))
        .and(path("/api/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let app = app_for(&server, true);
    let resp = app
        .oneshot(chat(Some("user-token"), user_body("assistant", true, "Hi")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let json = read_json(resp).await;
    assert_eq!(json["error"]["type"], "server_error");
}

#[tokio::test]
async fn slow_conversation_is_504() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/conversation"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"conversationId": "late"}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let app = app_for(&server, true);
    let resp = app
        .oneshot(chat(Some("user-token"), user_body("assistant", false, "Hi")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn models_and_health() {
    let server = MockServer::start().await;
    let app = app_for(&server, true);

    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/v1/models").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let json = read_json(resp).await;
    let ids: Vec<&str> = json["data"].as_array().unwrap().iter().filter_map(|m| m["id"].as_str()).collect();
    assert_eq!(ids, vec!["assistant", "assistant-search"]);

    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(read_json(resp).await, json!({"status": "ok"}));
}
