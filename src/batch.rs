use futures_util::future::join_all;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

use crate::error::TranslateError;
use crate::progress::ProgressSink;
use crate::providers::{Translate, TranslationRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationResult {
    pub index: usize,
    pub text: Option<String>,
}

/// One bounded-concurrency run over an ordered list of texts.
///
/// Units are dispatched in waves of at most `concurrency` requests; a wave
/// starts only once every request of the previous wave has settled, so one
/// slow unit holds back the start of the next wave. Mid-batch cancellation is
/// not part of this type; a caller needing it can split its input and stop
/// between calls.
#[derive(Debug)]
pub struct BatchJob {
    texts: Vec<String>,
    source_lang: String,
    target_lang: String,
    concurrency: usize,
    completed: AtomicUsize,
}

impl BatchJob {
    pub fn new(
        texts: Vec<String>,
        source_lang: impl Into<String>,
        target_lang: impl Into<String>,
        concurrency: usize,
    ) -> Result<Self, TranslateError> {
        if concurrency == 0 {
            return Err(TranslateError::invalid("concurrency must be at least 1"));
        }
        let target_lang = target_lang.into();
        if target_lang.trim().is_empty() {
            return Err(TranslateError::invalid("target language is empty"));
        }
        Ok(Self {
            texts,
            source_lang: source_lang.into(),
            target_lang,
            concurrency,
            completed: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub async fn run<T, P>(&self, translator: &T, progress: &P) -> Vec<TranslationResult>
    where
        T: Translate + ?Sized,
        P: ProgressSink + ?Sized,
    {
        let total = self.texts.len();
        info!(
            "batch: {} units, concurrency {}, target={}",
            total, self.concurrency, self.target_lang
        );
        let mut results: Vec<Option<String>> = vec![None; total];
        let mut start = 0;
        while start < total {
            let end = (start + self.concurrency).min(total);
            debug!("batch: wave {}..{}", start, end);
            let wave = (start..end).map(|index| self.settle(translator, progress, index));
            for settled in join_all(wave).await {
                results[settled.index] = settled.text;
            }
            start = end;
        }
        let failed = results.iter().filter(|text| text.is_none()).count();
        if failed > 0 {
            warn!("batch: {} of {} units failed", failed, total);
        }
        results
            .into_iter()
            .enumerate()
            .map(|(index, text)| TranslationResult { index, text })
            .collect()
    }

    async fn settle<T, P>(&self, translator: &T, progress: &P, index: usize) -> TranslationResult
    where
        T: Translate + ?Sized,
        P: ProgressSink + ?Sized,
    {
        let outcome = match TranslationRequest::new(
            self.source_lang.as_str(),
            self.target_lang.as_str(),
            self.texts[index].as_str(),
        ) {
            Ok(request) => translator.translate(request).await,
            Err(err) => Err(err),
        };
        let text = match outcome {
            Ok(text) => Some(text),
            Err(err) => {
                debug!("batch: unit {} failed: {}", index, err);
                None
            }
        };
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        let total = self.texts.len();
        match panic::catch_unwind(AssertUnwindSafe(|| progress.report(completed, total))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => debug!("batch: progress not delivered: {}", err),
            Err(_) => warn!("batch: progress sink panicked at {}/{}", completed, total),
        }
        TranslationResult { index, text }
    }
}

pub async fn run_batch<T, P>(
    translator: &T,
    texts: Vec<String>,
    source_lang: &str,
    target_lang: &str,
    concurrency: usize,
    progress: &P,
) -> Result<Vec<TranslationResult>, TranslateError>
where
    T: Translate + ?Sized,
    P: ProgressSink + ?Sized,
{
    let job = BatchJob::new(texts, source_lang, target_lang, concurrency)?;
    Ok(job.run(translator, progress).await)
}
