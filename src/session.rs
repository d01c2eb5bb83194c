use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{info, warn};

use crate::batch::run_batch;
use crate::error::TranslateError;
use crate::progress::ProgressSink;
use crate::providers::Translate;
use crate::tracker::{MutationTracker, UnitHost};

const MIN_UNIT_CHARS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub texts: Vec<String>,
    pub source_lang: String,
    pub target_lang: String,
    pub concurrency: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<Option<String>>,
}

pub type DispatchFuture<'a> =
    Pin<Box<dyn Future<Output = Result<BatchResponse, TranslateError>> + Send + 'a>>;

/// Boundary between whoever owns the document and whoever runs the batch.
pub trait BatchDispatch: Send + Sync {
    fn dispatch_batch<'a>(
        &'a self,
        request: BatchRequest,
        progress: &'a dyn ProgressSink,
    ) -> DispatchFuture<'a>;
}

#[derive(Debug, Clone)]
pub struct LocalDispatcher<T> {
    translator: T,
}

impl<T: Translate> LocalDispatcher<T> {
    pub fn new(translator: T) -> Self {
        Self { translator }
    }
}

impl<T: Translate> BatchDispatch for LocalDispatcher<T> {
    fn dispatch_batch<'a>(
        &'a self,
        request: BatchRequest,
        progress: &'a dyn ProgressSink,
    ) -> DispatchFuture<'a> {
        Box::pin(async move {
            let results = run_batch(
                &self.translator,
                request.texts,
                &request.source_lang,
                &request.target_lang,
                request.concurrency,
                progress,
            )
            .await?;
            Ok(BatchResponse {
                results: results.into_iter().map(|result| result.text).collect(),
            })
        })
    }
}

/// Sends the whole batch to a remote `/v1/batch` endpoint. The remote side
/// cannot stream per-unit progress back, so the sink hears once, at the end.
#[derive(Debug, Clone)]
pub struct RemoteDispatcher {
    base_url: String,
    key: Option<String>,
    http: reqwest::Client,
}

impl RemoteDispatcher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TranslateError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into(),
            key: None,
            http,
        })
    }

    pub fn with_key(mut self, key: Option<String>) -> Self {
        self.key = key.filter(|value| !value.trim().is_empty());
        self
    }

    async fn send(&self, request: &BatchRequest) -> Result<BatchResponse, TranslateError> {
        let url = format!("{}/v1/batch", self.base_url.trim_end_matches('/'));
        let mut builder = self.http.post(url).json(request);
        if let Some(key) = &self.key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranslateError::upstream(format!(
                "batch endpoint returned {}: {}",
                status.as_u16(),
                body
            )));
        }
        let payload: BatchResponse = response.json().await?;
        if payload.results.len() != request.texts.len() {
            return Err(TranslateError::unexpected(format!(
                "expected {} results, got {}",
                request.texts.len(),
                payload.results.len()
            )));
        }
        Ok(payload)
    }
}

impl BatchDispatch for RemoteDispatcher {
    fn dispatch_batch<'a>(
        &'a self,
        request: BatchRequest,
        progress: &'a dyn ProgressSink,
    ) -> DispatchFuture<'a> {
        Box::pin(async move {
            let response = self.send(&request).await?;
            let total = request.texts.len();
            if total > 0
                && let Err(err) = progress.report(total, total)
            {
                warn!("progress not delivered: {}", err);
            }
            Ok(response)
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub total: usize,
    pub applied: usize,
}

impl SessionReport {
    pub fn failed(&self) -> usize {
        self.total - self.applied
    }
}

/// One document plus the bookkeeping needed to put it back the way it was.
#[derive(Debug)]
pub struct TranslationSession<H> {
    host: H,
    tracker: MutationTracker,
}

impl<H: UnitHost> TranslationSession<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            tracker: MutationTracker::new(),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    pub fn tracker(&self) -> &MutationTracker {
        &self.tracker
    }

    pub fn pending(&self) -> (Vec<usize>, Vec<String>) {
        let mut ids = Vec::new();
        let mut texts = Vec::new();
        for id in self.host.unit_ids() {
            if !self.host.is_attached(id) || self.tracker.is_translated(id) {
                continue;
            }
            let Some(text) = self.host.current_text(id) else {
                continue;
            };
            let text = text.trim();
            if text.chars().count() < MIN_UNIT_CHARS {
                continue;
            }
            ids.push(id);
            texts.push(text.to_string());
        }
        (ids, texts)
    }

    pub async fn translate<D>(
        &mut self,
        dispatcher: &D,
        source_lang: &str,
        target_lang: &str,
        concurrency: usize,
        progress: &dyn ProgressSink,
    ) -> Result<SessionReport, TranslateError>
    where
        D: BatchDispatch + ?Sized,
    {
        let (ids, texts) = self.pending();
        if ids.is_empty() {
            return Ok(SessionReport::default());
        }
        let request = BatchRequest {
            texts,
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
            concurrency,
        };
        let response = dispatcher.dispatch_batch(request, progress).await?;
        if response.results.len() != ids.len() {
            return Err(TranslateError::unexpected(format!(
                "expected {} results, got {}",
                ids.len(),
                response.results.len()
            )));
        }
        let applied = self.apply_results(&ids, &response.results);
        info!("session: applied {} of {} units", applied, ids.len());
        Ok(SessionReport {
            total: ids.len(),
            applied,
        })
    }

    pub fn apply_results(&mut self, ids: &[usize], results: &[Option<String>]) -> usize {
        ids.iter()
            .zip(results)
            .filter(|(id, text)| self.tracker.apply(&mut self.host, **id, text.as_deref()))
            .count()
    }

    pub fn restore(&mut self) -> usize {
        self.tracker.restore_all(&mut self.host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::providers::{TranslateFuture, TranslationRequest};
    use crate::tracker::Page;
    use std::sync::Mutex;

    #[derive(Clone)]
    struct Bracket;

    impl Translate for Bracket {
        fn translate(&self, request: TranslationRequest) -> TranslateFuture {
            Box::pin(async move {
                if request.text.contains("broken") {
                    return Err(TranslateError::upstream("503"));
                }
                Ok(format!("[{}:{}]", request.target_lang, request.text))
            })
        }
    }

    #[tokio::test]
    async fn translates_pending_units_and_restores_exactly() {
        let source = "Hello there\n \nx\n  indented line\nbroken unit";
        let mut session = TranslationSession::new(Page::from_text(source));
        let dispatcher = LocalDispatcher::new(Bracket);

        let (ids, texts) = session.pending();
        assert_eq!(ids, vec![0, 3, 4]);
        assert_eq!(texts, vec!["Hello there", "indented line", "broken unit"]);

        let report = session
            .translate(&dispatcher, "auto", "fr", 2, &NoProgress)
            .await
            .unwrap();
        assert_eq!(report, SessionReport { total: 3, applied: 2 });
        assert_eq!(report.failed(), 1);
        assert_eq!(
            session.host().render(),
            "[fr:Hello there]\n \nx\n[fr:indented line]\nbroken unit"
        );

        assert_eq!(session.restore(), 2);
        assert_eq!(session.host().render(), source);
    }

    #[tokio::test]
    async fn translated_units_are_not_sent_again() {
        let mut session = TranslationSession::new(Page::from_text("one line\nsecond line"));
        let dispatcher = LocalDispatcher::new(Bracket);
        session
            .translate(&dispatcher, "auto", "de", 4, &NoProgress)
            .await
            .unwrap();
        let (ids, _) = session.pending();
        assert!(ids.is_empty());

        let report = session
            .translate(&dispatcher, "auto", "de", 4, &NoProgress)
            .await
            .unwrap();
        assert_eq!(report, SessionReport::default());
        assert_eq!(session.host().render(), "[de:one line]\n[de:second line]");
    }

    #[tokio::test]
    async fn local_dispatch_reports_progress_per_unit() {
        let dispatcher = LocalDispatcher::new(Bracket);
        let seen = Mutex::new(Vec::new());
        let sink = |completed: usize, total: usize| seen.lock().unwrap().push((completed, total));
        let response = dispatcher
            .dispatch_batch(
                BatchRequest {
                    texts: vec!["ab".to_string(), "cd".to_string(), "ef".to_string()],
                    source_lang: "auto".to_string(),
                    target_lang: "ja".to_string(),
                    concurrency: 2,
                },
                &sink,
            )
            .await
            .unwrap();
        assert_eq!(response.results.len(), 3);
        let mut seen = seen.into_inner().unwrap();
        seen.sort();
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[tokio::test]
    async fn mismatched_result_count_is_rejected() {
        struct Short;
        impl BatchDispatch for Short {
            fn dispatch_batch<'a>(
                &'a self,
                _request: BatchRequest,
                _progress: &'a dyn ProgressSink,
            ) -> DispatchFuture<'a> {
                Box::pin(async { Ok(BatchResponse { results: vec![None] }) })
            }
        }
        let mut session = TranslationSession::new(Page::from_text("aa\nbb"));
        let err = session
            .translate(&Short, "auto", "fr", 1, &NoProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, TranslateError::UnexpectedResponseFormat(_)));
        assert!(session.tracker().is_empty());
    }
}
