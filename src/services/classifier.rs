use async_trait::async_trait;
use futures::stream;
use futures_util::StreamExt;
use moka::sync::Cache;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::{cell_at, ClassifiedRow, Dataset};

/// What the classification service returns for one text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub categories: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("classifier responded with status {0}")]
    Status(u16),
    #[error("malformed classifier response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Prediction, ClassifierError>;
}

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    text: &'a str,
}

/// Client for the remote `POST /predict` endpoint.
pub struct HttpClassifier {
    client: Client,
    endpoint: String,
}

impl HttpClassifier {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, AppError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build classifier client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/predict", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, text: &str) -> Result<Prediction, ClassifierError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&PredictRequest { text })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClassifierError::Status(response.status().as_u16()));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ClassifierError::Malformed(e.to_string()))
    }
}

/// Memoizes predictions by exact text. Feedback exports tend to repeat
/// short answers ("ok", "good") many times.
pub struct CachedClassifier<C> {
    inner: C,
    cache: Cache<String, Prediction>,
}

impl<C: Classifier> CachedClassifier<C> {
    pub fn new(inner: C, capacity: u64) -> Self {
        Self {
            inner,
            cache: Cache::new(capacity),
        }
    }
}

#[async_trait]
impl<C: Classifier> Classifier for CachedClassifier<C> {
    async fn classify(&self, text: &str) -> Result<Prediction, ClassifierError> {
        if let Some(hit) = self.cache.get(text) {
            return Ok(hit);
        }
        let prediction = self.inner.classify(text).await?;
        self.cache.insert(text.to_string(), prediction.clone());
        Ok(prediction)
    }
}

/// Placeholder confidence shown next to each prediction.
///
/// The service does not report a probability, so this is a random percentage
/// in 40..80 when no category came back and 80..100 otherwise. It carries no
/// information about the model and should be replaced once the service
/// returns real scores.
pub fn simulated_confidence<R: Rng>(prediction: &Prediction, rng: &mut R) -> u8 {
    if prediction.categories.is_empty() {
        rng.random_range(40..80)
    } else {
        rng.random_range(80..100)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackItem {
    pub source_row: usize,
    pub text: String,
}

/// Non-blank cells of the feedback column, in row order.
pub fn feedback_items(dataset: &Dataset, column: usize) -> Vec<FeedbackItem> {
    dataset
        .rows
        .iter()
        .enumerate()
        .filter_map(|(index, row)| {
            let cell = cell_at(row, column);
            (!cell.is_blank()).then(|| FeedbackItem {
                source_row: index,
                text: cell.raw_text().into_owned(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    /// Requests in flight at once. Results are always delivered in input order.
    pub concurrency: usize,
    /// Keep rows classified before a failure or cancellation instead of
    /// discarding the whole batch.
    pub keep_partial: bool,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            concurrency: 1,
            keep_partial: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BatchStatus {
    Completed,
    Cancelled,
    Failed { index: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub rows: Vec<ClassifiedRow>,
    pub status: BatchStatus,
}

/// Classifies `items` in order, stopping early on `cancel`.
///
/// With the default policy this is one request at a time and any failure or
/// cancellation discards everything: the caller gets a single
/// `classification failed` error.
pub async fn classify_batch<C>(
    classifier: &C,
    items: Vec<FeedbackItem>,
    policy: &BatchPolicy,
    cancel: &CancellationToken,
) -> Result<BatchOutcome, AppError>
where
    C: Classifier + ?Sized,
{
    let start = std::time::Instant::now();
    let total = items.len();
    tracing::info!(
        "Classifying {} feedback rows (concurrency: {}, keep partial: {})",
        total,
        policy.concurrency.max(1),
        policy.keep_partial
    );

    let mut predictions = stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| async move {
            let result = classifier.classify(&item.text).await;
            (index, item, result)
        })
        .buffered(policy.concurrency.max(1));

    let mut rows = Vec::with_capacity(total);
    let mut status = BatchStatus::Completed;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                status = BatchStatus::Cancelled;
                break;
            }
            next = predictions.next() => next,
        };
        let Some((index, item, result)) = next else {
            break;
        };

        match result {
            Ok(prediction) => {
                let confidence = simulated_confidence(&prediction, &mut rand::rng());
                rows.push(ClassifiedRow {
                    source_row: item.source_row,
                    text: item.text,
                    categories: prediction.categories,
                    confidence,
                    language: prediction.language,
                });
                if (index + 1) % 50 == 0 {
                    tracing::debug!("Classified {}/{} rows", index + 1, total);
                }
            }
            Err(e) => {
                tracing::error!("Classification of row {} failed: {}", item.source_row, e);
                status = BatchStatus::Failed { index };
                break;
            }
        }
    }

    match (&status, policy.keep_partial) {
        (BatchStatus::Completed, _) => {
            tracing::info!("Classified {} rows in {:?}", rows.len(), start.elapsed());
        }
        (_, true) => {
            tracing::warn!(
                "Batch stopped ({:?}) after {} of {} rows; keeping partial results",
                status,
                rows.len(),
                total
            );
        }
        (BatchStatus::Cancelled, false) => {
            tracing::warn!("Batch cancelled after {} of {} rows", rows.len(), total);
            return Err(AppError::Cancelled);
        }
        (BatchStatus::Failed { .. }, false) => {
            return Err(AppError::Classification("classification failed".to_string()));
        }
    }

    Ok(BatchOutcome { rows, status })
}
