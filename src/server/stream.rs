use futures_util::Stream;
use futures_util::stream;
use std::collections::VecDeque;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::error;
use uuid::Uuid;

use super::models::{ChatChunk, ChunkChoice, ChunkDelta};
use crate::error::TranslateError;
use crate::providers::{Translate, TranslationRequest};

pub const DONE_FRAME: &str = "data: [DONE]\n\n";
const CHUNK_OBJECT: &str = "chat.completion.chunk";
const STOP: &str = "stop";

/// One inbound chat completion turned into a chunk stream. The id is fixed for
/// the whole session so every chunk of one response shares it.
#[derive(Debug, Clone)]
pub struct ChatStreamSession {
    request_id: String,
    model: String,
}

enum Phase {
    Translating(Arc<dyn Translate>, TranslationRequest),
    Emitting(VecDeque<String>),
    Closed,
}

impl ChatStreamSession {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            request_id: format!("chatcmpl-{}", Uuid::new_v4()),
            model: model.into(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn chunk(&self, content: &str, finish_reason: Option<&str>) -> ChatChunk {
        ChatChunk {
            id: self.request_id.clone(),
            object: CHUNK_OBJECT.to_string(),
            created: OffsetDateTime::now_utc().unix_timestamp(),
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    content: content.to_string(),
                },
                finish_reason: finish_reason.map(str::to_string),
            }],
        }
    }

    pub fn frame(&self, content: &str, finish_reason: Option<&str>) -> String {
        let chunk = self.chunk(content, finish_reason);
        match serde_json::to_string(&chunk) {
            Ok(json) => format!("data: {}\n\n", json),
            Err(err) => {
                error!("failed to encode stream chunk: {}", err);
                String::new()
            }
        }
    }

    pub fn success_frames(&self, text: &str) -> VecDeque<String> {
        VecDeque::from([
            self.frame(text, None),
            self.frame("", Some(STOP)),
            DONE_FRAME.to_string(),
        ])
    }

    pub fn error_frames(&self, err: &TranslateError) -> VecDeque<String> {
        VecDeque::from([
            self.frame(&format!("Internal server error: {}", err), Some(STOP)),
            DONE_FRAME.to_string(),
        ])
    }

    /// Issues the single upstream call lazily on first poll, then yields the
    /// buffered frames. The stream always ends with [`DONE_FRAME`], whether the
    /// translation succeeded or not.
    pub fn into_stream(
        self,
        translator: Arc<dyn Translate>,
        request: TranslationRequest,
    ) -> impl Stream<Item = String> + Send + 'static {
        stream::unfold(
            (self, Phase::Translating(translator, request)),
            |(session, phase)| async move {
                let mut frames = match phase {
                    Phase::Translating(translator, request) => {
                        match translator.translate(request).await {
                            Ok(text) => session.success_frames(&text),
                            Err(err) => {
                                error!("Translation error: {}", err);
                                session.error_frames(&err)
                            }
                        }
                    }
                    Phase::Emitting(frames) => frames,
                    Phase::Closed => return None,
                };
                let frame = frames.pop_front()?;
                let next = if frames.is_empty() {
                    Phase::Closed
                } else {
                    Phase::Emitting(frames)
                };
                Some((frame, (session, next)))
            },
        )
    }
}
