use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::header::{AUTHORIZATION, CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tracing::info;

use super::models::{BatchPayload, ChatRequest, ModelCard, ModelList, WelcomeResponse};
use super::state::ServerState;
use super::translate::{ServerError, prepare_chat, translate_batch};
use crate::error::{AuthError, TranslateError};
use crate::providers::{Backend, GoogleTranslate};
use crate::session::BatchResponse;
use crate::settings::Settings;

pub async fn run_server(settings: Settings, bind: &str) -> Result<()> {
    let key = settings.upstream_key()?.to_string();
    let translator = GoogleTranslate::new(key, settings.request_timeout)?
        .with_url(settings.translate_url.clone());
    let addr = format!("{}:{}", bind, settings.port);
    info!("{} v{} starting...", settings.app_name, settings.app_version);
    let port = settings.port;
    let state = Arc::new(ServerState::new(
        settings,
        Arc::new(Backend::Google(translator)),
    ));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind server address {}", addr))?;
    info!("Server listening on http://localhost:{}", port);
    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

pub fn build_router(state: Arc<ServerState>) -> Router {
    let api = Router::new()
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/batch", post(batch))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(api)
        .with_state(state)
        .layer(middleware::from_fn(log_requests))
        .layer(middleware::from_fn(cors_middleware))
}

async fn root(State(state): State<Arc<ServerState>>) -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: format!(
            "Welcome to {} v{}. Service is running normally.",
            state.settings.app_name, state.settings.app_version
        ),
    })
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn list_models(State(state): State<Arc<ServerState>>) -> Json<ModelList> {
    Json(ModelList {
        object: "list",
        data: vec![ModelCard {
            id: state.settings.default_model.clone(),
            object: "model",
            created: OffsetDateTime::now_utc().unix_timestamp(),
            owned_by: state.settings.app_name.clone(),
        }],
    })
}

async fn chat_completions(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response<Body>, ServerError> {
    let Json(payload) = payload.map_err(rejected)?;
    let (session, request) = prepare_chat(&payload, &state.settings.default_model)?;
    let frames = session
        .into_stream(state.translator.clone(), request)
        .map(Ok::<_, Infallible>);
    let mut response = Response::new(Body::from_stream(frames));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    Ok(response)
}

async fn batch(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<BatchPayload>, JsonRejection>,
) -> Result<Json<BatchResponse>, ServerError> {
    let Json(payload) = payload.map_err(rejected)?;
    translate_batch(state.as_ref(), payload).await.map(Json)
}

fn rejected(rejection: JsonRejection) -> ServerError {
    ServerError::from(TranslateError::invalid(rejection.body_text()))
}

async fn require_bearer(
    State(state): State<Arc<ServerState>>,
    req: Request<Body>,
    next: Next,
) -> Response<Body> {
    if let Some(expected) = state.settings.active_master_key()
        && let Err(err) = check_bearer(req.headers(), expected)
    {
        return ServerError::from(TranslateError::from(err)).into_response();
    }
    next.run(req).await
}

pub(crate) fn check_bearer(headers: &HeaderMap, expected: &str) -> Result<(), AuthError> {
    let Some(value) = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    else {
        return Err(AuthError::Missing);
    };
    if !value.to_ascii_lowercase().contains("bearer") {
        return Err(AuthError::Missing);
    }
    let token = value.split_whitespace().last().unwrap_or_default();
    if token != expected {
        return Err(AuthError::Invalid);
    }
    Ok(())
}

async fn log_requests(req: Request<Body>, next: Next) -> Response<Body> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(req).await;
    info!(
        "{} {} - {}ms",
        method,
        path,
        started.elapsed().as_millis()
    );
    response
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type,authorization"),
    );
}
