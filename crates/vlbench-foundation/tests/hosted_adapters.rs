//! Wire-level behaviour of the Anthropic and Gemini adapters.

mod common;

use common::write_png;
use vlbench_foundation::adapters::anthropic::MAX_IMAGE_BYTES;
use vlbench_foundation::adapters::gemini::{BLOCKED_RESPONSE, EMPTY_RESPONSE};
use vlbench_foundation::adapters::{ClaudeAdapter, GeminiAdapter, HostedConfig};
use vlbench_kernel::{GenerationError, Generator, ImageRef, RemoteApiError};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, model: &str) -> HostedConfig {
    HostedConfig {
        api_key: "test-key".to_string(),
        base_url: format!("{}/", server.uri()),
        model: model.to_string(),
        max_tokens: 256,
        temperature: 0.0,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// § 1  Anthropic
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn claude_sends_base64_image_block() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(serde_json::json!({
            "model": "claude-3-5-sonnet-20240620",
            "max_tokens": 256,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [{"type": "text", "text": "Two cats."}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let image = ImageRef::new(write_png(dir.path(), "cats.png"));
    let adapter = ClaudeAdapter::new(reqwest::Client::new(), config(&server, "claude-3-5-sonnet-20240620"));

    assert_eq!(adapter.generate_response("How many cats?", &image).await.unwrap(), "Two cats.");
    assert_eq!(adapter.adapter_name(), "ClaudeResponseGenerator");
}

fn variant(err: &RemoteApiError) -> &'static str {
    match err {
        RemoteApiError::Authentication { .. } => "authentication",
        RemoteApiError::RateLimit { .. } => "rate_limit",
        RemoteApiError::MalformedRequest { .. } => "malformed_request",
        RemoteApiError::Server { .. } => "server",
        _ => "other",
    }
}

#[tokio::test]
async fn claude_status_codes_are_classified() {
    for (status, expected) in [
        (401_u16, "authentication"),
        (429, "rate_limit"),
        (400, "malformed_request"),
        (529, "server"),
    ] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let image = ImageRef::new(write_png(dir.path(), "img.png"));
        let adapter = ClaudeAdapter::new(reqwest::Client::new(), config(&server, "claude"));

        match adapter.generate_response("q", &image).await.unwrap_err() {
            GenerationError::RemoteApi(err) => assert_eq!(variant(&err), expected, "status {status}"),
            other => panic!("status {status}: unexpected {other:?}"),
        }
    }
}

#[tokio::test]
async fn missing_image_is_not_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let adapter = ClaudeAdapter::new(reqwest::Client::new(), config(&server, "claude"));
    let err = adapter
        .generate_response("q", &ImageRef::new("/definitely/missing.png"))
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::InvalidInput(_)));
}

#[tokio::test]
async fn claude_rejects_images_over_the_size_limit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("huge.png");
    let mut bytes = common::PNG_BYTES.to_vec();
    bytes.resize(MAX_IMAGE_BYTES + 1, 0);
    std::fs::write(&path, bytes).unwrap();

    let adapter = ClaudeAdapter::new(reqwest::Client::new(), config(&server, "claude"));
    let err = adapter
        .generate_response("q", &ImageRef::new(&path))
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::InvalidInput(ref message) if message.contains("5 MB")));
}

// ─────────────────────────────────────────────────────────────────────────────
// § 2  Gemini
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn gemini_joins_text_parts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-1.5-pro:generateContent"))
        .and(query_param("key", "test-key"))
        .and(body_partial_json(serde_json::json!({
            "generationConfig": {"maxOutputTokens": 256}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "A "}, {"text": "dog."}]}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let image = ImageRef::new(write_png(dir.path(), "dog.png"));
    let adapter = GeminiAdapter::new(reqwest::Client::new(), config(&server, "gemini-1.5-pro"));
    assert_eq!(adapter.generate_response("What?", &image).await.unwrap(), "A dog.");
}

#[tokio::test]
async fn gemini_blocked_and_empty_are_answers() {
    let dir = tempfile::tempdir().unwrap();
    let image = ImageRef::new(write_png(dir.path(), "img.png"));

    for (body, expected) in [
        (serde_json::json!({"candidates": []}), BLOCKED_RESPONSE),
        (serde_json::json!({"candidates": [{"content": {"parts": []}}]}), EMPTY_RESPONSE),
    ] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
        let adapter = GeminiAdapter::new(reqwest::Client::new(), config(&server, "gemini-1.5-pro"));
        assert_eq!(adapter.generate_response("q", &image).await.unwrap(), expected);
    }
}

#[tokio::test]
async fn gemini_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let image = ImageRef::new(write_png(dir.path(), "img.png"));
    let adapter = GeminiAdapter::new(reqwest::Client::new(), config(&server, "gemini-1.5-pro"));
    let err = adapter.generate_response("q", &image).await.unwrap_err();
    assert!(matches!(
        err,
        GenerationError::RemoteApi(RemoteApiError::Server { status: 503, ref message }) if message == "overloaded"
    ));
}
