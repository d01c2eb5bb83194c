use futures_util::StreamExt;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

use super::{Translate, TranslateFuture, TranslationRequest};
use crate::error::TranslateError;

pub(crate) const DEFAULT_MODEL: &str = "google-translate";

#[derive(Debug, Clone)]
pub struct ChatClient {
    base_url: String,
    model: String,
    key: Option<String>,
    http: reqwest::Client,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TranslateError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into(),
            model: DEFAULT_MODEL.to_string(),
            key: None,
            http,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        if !model.trim().is_empty() {
            self.model = model;
        }
        self
    }

    pub fn with_key(mut self, key: Option<String>) -> Self {
        self.key = key.filter(|value| !value.trim().is_empty());
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn call(&self, request: TranslationRequest) -> Result<String, TranslateError> {
        info!(
            "chat translation: target={}, text=\"{}...\"",
            request.target_lang,
            request.preview()
        );
        let body = json!({
            "model": self.model,
            "source_lang": request.source_lang,
            "target_lang": request.target_lang,
            "messages": [{"role": "user", "content": request.text}],
        });
        let mut builder = self.http.post(self.endpoint()).json(&body);
        if let Some(key) = &self.key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TranslateError::upstream(format!(
                "API error: {}",
                status.as_u16()
            )));
        }

        let mut collector = DeltaCollector::default();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            collector.feed(&chunk?);
            if collector.done {
                break;
            }
        }
        collector.finish();
        Ok(collector.text.trim().to_string())
    }
}

impl Translate for ChatClient {
    fn translate(&self, request: TranslationRequest) -> TranslateFuture {
        let client = self.clone();
        Box::pin(async move { client.call(request).await })
    }
}

/// Accumulates `choices[0].delta.content` across SSE frames that may arrive split
/// over arbitrary byte boundaries.
#[derive(Debug, Default)]
struct DeltaCollector {
    pending: Vec<u8>,
    text: String,
    done: bool,
}

impl DeltaCollector {
    fn feed(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            self.consume_line(&line);
        }
    }

    fn finish(&mut self) {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.consume_line(&line);
        }
    }

    fn consume_line(&mut self, line: &[u8]) {
        if self.done {
            return;
        }
        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim_start();
        if data == "[DONE]" {
            self.done = true;
            return;
        }
        match serde_json::from_str::<Value>(data) {
            Ok(value) => {
                if let Some(content) = value
                    .pointer("/choices/0/delta/content")
                    .and_then(Value::as_str)
                {
                    self.text.push_str(content);
                }
            }
            Err(err) => debug!("skipping malformed stream frame: {}", err),
        }
    }
}
