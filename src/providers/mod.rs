use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::TranslateError;

mod chat;
mod google;

pub use chat::ChatClient;
pub use google::{GoogleTranslate, TRANSLATE_URL, build_payload, extract_translation};

pub const AUTO_LANG: &str = "auto";
pub const DEFAULT_TARGET_LANG: &str = "en";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub source_lang: String,
    pub target_lang: String,
    pub text: String,
}

impl TranslationRequest {
    pub fn new(
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<Self, TranslateError> {
        let source_lang = source_lang.into();
        let target_lang = target_lang.into();
        let text = text.into();
        if text.is_empty() {
            return Err(TranslateError::invalid("text to translate is empty"));
        }
        if target_lang.trim().is_empty() {
            return Err(TranslateError::invalid("target language is empty"));
        }
        let source_lang = if source_lang.trim().is_empty() {
            AUTO_LANG.to_string()
        } else {
            source_lang
        };
        Ok(Self {
            source_lang,
            target_lang,
            text,
        })
    }

    pub fn preview(&self) -> String {
        self.text.chars().take(50).collect()
    }
}

pub type TranslateFuture = Pin<Box<dyn Future<Output = Result<String, TranslateError>> + Send>>;

pub trait Translate: Send + Sync {
    fn translate(&self, request: TranslationRequest) -> TranslateFuture;
}

impl<T: Translate + ?Sized> Translate for Arc<T> {
    fn translate(&self, request: TranslationRequest) -> TranslateFuture {
        (**self).translate(request)
    }
}

#[derive(Debug, Clone)]
pub enum Backend {
    Google(GoogleTranslate),
    Chat(ChatClient),
}

impl Translate for Backend {
    fn translate(&self, request: TranslationRequest) -> TranslateFuture {
        match self {
            Backend::Google(client) => client.translate(request),
            Backend::Chat(client) => client.translate(request),
        }
    }
}
