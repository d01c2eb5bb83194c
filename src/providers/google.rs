use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info};

use super::{Translate, TranslateFuture, TranslationRequest};
use crate::error::TranslateError;
use crate::html::strip_html;

pub const TRANSLATE_URL: &str = "https://translate-pa.googleapis.com/v1/translateHtml";

// The backend only accepts requests that look like they come from its web client.
const ORIGIN: &str = "https://stackoverflow.ai";
const REFERER: &str = "https://stackoverflow.ai/";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/141.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct GoogleTranslate {
    key: String,
    url: String,
    http: reqwest::Client,
}

impl GoogleTranslate {
    pub fn new(key: impl Into<String>, timeout: Duration) -> Result<Self, TranslateError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            key: key.into(),
            url: TRANSLATE_URL.to_string(),
            http,
        })
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        if !url.trim().is_empty() {
            self.url = url;
        }
        self
    }

    async fn call(&self, request: TranslationRequest) -> Result<String, TranslateError> {
        info!(
            "translation: source={}, target={}, text=\"{}...\"",
            request.source_lang,
            request.target_lang,
            request.preview()
        );
        let payload = build_payload(&request);
        let response = self
            .http
            .post(&self.url)
            .header("accept", "*/*")
            .header("accept-language", "zh-CN,zh;q=0.9,en;q=0.8")
            .header("content-type", "application/json+protobuf")
            .header("origin", ORIGIN)
            .header("referer", REFERER)
            .header("user-agent", USER_AGENT)
            .header("x-goog-api-key", &self.key)
            .body(payload.to_string())
            .send()
            .await?;

        let status = response.status();
        debug!("upstream response status: {}", status);
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TranslateError::upstream(format!(
                "{} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )));
        }
        let value: Value = serde_json::from_str(&body)
            .map_err(|err| TranslateError::unexpected(format!("{}: {}", err, body)))?;
        let raw = extract_translation(&value)?;
        Ok(strip_html(raw))
    }
}

impl Translate for GoogleTranslate {
    fn translate(&self, request: TranslationRequest) -> TranslateFuture {
        let client = self.clone();
        Box::pin(async move { client.call(request).await })
    }
}

pub fn build_payload(request: &TranslationRequest) -> Value {
    json!([
        [[request.text], request.source_lang, request.target_lang],
        "te_lib"
    ])
}

pub fn extract_translation(value: &Value) -> Result<&str, TranslateError> {
    value
        .as_array()
        .and_then(|outer| outer.first())
        .and_then(Value::as_array)
        .and_then(|inner| inner.first())
        .and_then(Value::as_str)
        .ok_or_else(|| TranslateError::unexpected(value.to_string()))
}
