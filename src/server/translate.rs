use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::info;

use super::models::{BatchPayload, ChatRequest, ErrorResponse};
use super::state::ServerState;
use super::stream::ChatStreamSession;
use crate::error::TranslateError;
use crate::progress::NoProgress;
use crate::providers::{AUTO_LANG, DEFAULT_TARGET_LANG, TranslationRequest};
use crate::session::{BatchDispatch, BatchRequest, BatchResponse, LocalDispatcher};

#[derive(Debug)]
pub(crate) struct ServerError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl From<TranslateError> for ServerError {
    fn from(err: TranslateError) -> Self {
        ServerError {
            status: err.status(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                detail: self.message,
            }),
        )
            .into_response()
    }
}

const MISSING_USER_MESSAGE: &str = "Missing valid user message in request.";

pub(crate) fn prepare_chat(
    request: &ChatRequest,
    default_model: &str,
) -> Result<(ChatStreamSession, TranslationRequest), TranslateError> {
    let Some(last) = request.messages.last() else {
        return Err(TranslateError::invalid(MISSING_USER_MESSAGE));
    };
    if last.role != "user" {
        return Err(TranslateError::invalid(MISSING_USER_MESSAGE));
    }
    let source_lang = present(request.source_lang.as_deref()).unwrap_or(AUTO_LANG);
    let target_lang = present(request.target_lang.as_deref()).unwrap_or(DEFAULT_TARGET_LANG);
    let translation = TranslationRequest::new(source_lang, target_lang, last.content.to_text())?;
    info!(
        "Translation: source={}, target={}, text=\"{}...\"",
        translation.source_lang,
        translation.target_lang,
        translation.preview()
    );
    let model = present(request.model.as_deref()).unwrap_or(default_model);
    Ok((ChatStreamSession::new(model), translation))
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

pub(crate) async fn translate_batch(
    state: &ServerState,
    payload: BatchPayload,
) -> Result<BatchResponse, ServerError> {
    let concurrency = state.settings.effective_concurrency(payload.concurrency);
    let request = BatchRequest {
        texts: payload.texts,
        source_lang: present(payload.source_lang.as_deref())
            .unwrap_or(AUTO_LANG)
            .to_string(),
        target_lang: present(payload.target_lang.as_deref())
            .unwrap_or(DEFAULT_TARGET_LANG)
            .to_string(),
        concurrency,
    };
    let dispatcher = LocalDispatcher::new(state.translator.clone());
    let response = dispatcher.dispatch_batch(request, &NoProgress).await?;
    Ok(response)
}
