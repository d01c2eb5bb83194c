use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use page_translator::TranslateError;
use page_translator::providers::{Translate, TranslateFuture, TranslationRequest};
use page_translator::server::{ChatChunk, DONE_FRAME, ServerState, build_router};
use page_translator::settings::Settings;
use serde_json::{Value, json};
use tower::ServiceExt;

struct Stub;

impl Translate for Stub {
    fn translate(&self, request: TranslationRequest) -> TranslateFuture {
        Box::pin(async move {
            match request.text.as_str() {
                "hello" => Ok("bonjour".to_string()),
                text if text.starts_with("fail") => {
                    Err(TranslateError::upstream("503 Service Unavailable"))
                }
                text => Ok(format!("{}:{}", request.target_lang, text)),
            }
        })
    }
}

fn router(master_key: Option<&str>) -> Router {
    let settings = Settings {
        master_key: master_key.map(str::to_string),
        ..Settings::default()
    };
    build_router(Arc::new(ServerState::new(settings, Arc::new(Stub))))
}

fn post(uri: &str, body: Value, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::post(uri).header("content-type", "application/json");
    if let Some(key) = bearer {
        builder = builder.header("authorization", format!("Bearer {}", key));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn frames(body: &str) -> Vec<String> {
    body.split_inclusive("\n\n").map(str::to_string).collect()
}

fn chunk(frame: &str) -> ChatChunk {
    let json = frame
        .strip_prefix("data: ")
        .and_then(|rest| rest.strip_suffix("\n\n"))
        .unwrap();
    serde_json::from_str(json).unwrap()
}

fn chat_body(text: &str) -> Value {
    json!({
        "model": "google-translate",
        "target_lang": "fr",
        "messages": [{"role": "user", "content": text}],
    })
}

#[tokio::test]
async fn chat_completion_streams_three_frames() {
    let response = router(None)
        .oneshot(post("/v1/chat/completions", chat_body("hello"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["content-type"], "text/event-stream");
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["connection"], "keep-alive");

    let frames = frames(&body_text(response).await);
    assert_eq!(frames.len(), 3);
    let first = chunk(&frames[0]);
    assert_eq!(first.choices[0].delta.content, "bonjour");
    assert_eq!(first.choices[0].finish_reason, None);
    let second = chunk(&frames[1]);
    assert_eq!(second.id, first.id);
    assert_eq!(second.choices[0].delta.content, "");
    assert_eq!(second.choices[0].finish_reason.as_deref(), Some("stop"));
    assert_eq!(frames[2], DONE_FRAME);
}

#[tokio::test]
async fn empty_messages_are_rejected_before_streaming() {
    let response = router(None)
        .oneshot(post("/v1/chat/completions", json!({"messages": []}), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(
        body["detail"],
        "invalid request: Missing valid user message in request."
    );
}

#[tokio::test]
async fn upstream_failure_becomes_an_error_chunk() {
    let response = router(None)
        .oneshot(post("/v1/chat/completions", chat_body("fail now"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let frames = frames(&body_text(response).await);
    assert_eq!(frames.len(), 2);
    let error = chunk(&frames[0]);
    assert!(
        error.choices[0]
            .delta
            .content
            .starts_with("Internal server error:")
    );
    assert_eq!(error.choices[0].finish_reason.as_deref(), Some("stop"));
    assert_eq!(frames[1], DONE_FRAME);
}

#[tokio::test]
async fn master_key_gates_the_api() {
    let app = router(Some("secret"));

    let wrong = app
        .clone()
        .oneshot(post("/v1/chat/completions", chat_body("hello"), Some("wrong")))
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);
    let body: Value = serde_json::from_str(&body_text(wrong).await).unwrap();
    assert_eq!(body["detail"], "Invalid API Key.");

    let missing = app
        .clone()
        .oneshot(post("/v1/chat/completions", chat_body("hello"), None))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    let body: Value = serde_json::from_str(&body_text(missing).await).unwrap();
    assert_eq!(body["detail"], "Bearer Token authentication required.");

    let ok = app
        .clone()
        .oneshot(post("/v1/chat/completions", chat_body("hello"), Some("secret")))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);

    let health = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);
}

#[tokio::test]
async fn sentinel_master_key_disables_auth() {
    let response = router(Some("1"))
        .oneshot(post("/v1/chat/completions", chat_body("hello"), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn models_list_names_the_default_model() {
    let response = router(None)
        .oneshot(Request::get("/v1/models").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["object"], "list");
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["id"], "google-translate");
    assert_eq!(body["data"][0]["object"], "model");
    assert!(body["data"][0]["created"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn root_reports_service_status() {
    let response = router(None)
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("Welcome to page-translator v"));
    assert!(message.ends_with("Service is running normally."));
}

#[tokio::test]
async fn preflight_gets_cors_headers() {
    let response = router(Some("secret"))
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/v1/chat/completions")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn batch_endpoint_keeps_order_and_nulls_failures() {
    let response = router(None)
        .oneshot(post(
            "/v1/batch",
            json!({
                "texts": ["one", "fail two", "three"],
                "target_lang": "de",
                "concurrency": 2,
            }),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["results"], json!(["de:one", null, "de:three"]));
}

#[tokio::test]
async fn batch_endpoint_rejects_zero_concurrency() {
    let response = router(None)
        .oneshot(post(
            "/v1/batch",
            json!({"texts": ["one"], "concurrency": 0}),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn blank_target_language_defaults_to_english() {
    let body = json!({
        "target_lang": "",
        "messages": [{"role": "user", "content": "good morning"}],
    });
    let response = router(None)
        .oneshot(post("/v1/chat/completions", body, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let frames = frames(&body_text(response).await);
    assert_eq!(frames.len(), 3);
    assert_eq!(chunk(&frames[0]).choices[0].delta.content, "en:good morning");
    assert_eq!(frames[2], DONE_FRAME);

    let response = router(None)
        .oneshot(post(
            "/v1/batch",
            json!({"texts": ["one"], "target_lang": " "}),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body["results"], json!(["en:one"]));
}

#[tokio::test]
async fn malformed_chat_bodies_are_bad_requests() {
    for body in [
        json!({"messages": "hello"}),
        json!({"messages": [{"content": "hello"}]}),
    ] {
        let response = router(None)
            .oneshot(post("/v1/chat/completions", body, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()["content-type"], "application/json");
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(
            body["detail"]
                .as_str()
                .unwrap()
                .starts_with("invalid request:")
        );
    }
}

#[tokio::test]
async fn malformed_batch_body_is_a_bad_request() {
    let response = router(None)
        .oneshot(post("/v1/batch", json!({"texts": "one"}), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert!(body["detail"].is_string());
}
