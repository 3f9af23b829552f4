use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::{ClassifiedRow, Dataset};
use crate::services::analytics::RoleMap;
use crate::services::categories::CategorySummary;

/// The uploaded dataset and everything derived from it.
#[derive(Debug, Clone)]
pub struct Session {
    /// Bumped on every upload; batches started against an older generation
    /// are not allowed to write their results back.
    pub generation: u64,
    pub file_name: String,
    pub uploaded_at: DateTime<Utc>,
    pub dataset: Arc<Dataset>,
    pub roles: RoleMap,
    pub classified: Vec<ClassifiedRow>,
    pub categories: CategorySummary,
}

/// Handle for one running classification batch.
#[derive(Debug, Clone)]
pub struct BatchTicket {
    pub id: u64,
    pub generation: u64,
    pub token: CancellationToken,
}

#[derive(Default)]
pub struct SessionStore {
    current: RwLock<Option<Session>>,
    generation: AtomicU64,
    batch_ids: AtomicU64,
    running: Mutex<Option<(u64, CancellationToken)>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a freshly uploaded dataset, dropping previous results and
    /// cancelling any batch still working on the old one.
    pub fn replace(&self, file_name: String, dataset: Dataset, roles: RoleMap) -> u64 {
        self.cancel_batch();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(
            "Session replaced by {} ({} rows), generation {}",
            file_name,
            dataset.row_count(),
            generation
        );
        *self.current.write() = Some(Session {
            generation,
            file_name,
            uploaded_at: Utc::now(),
            dataset: Arc::new(dataset),
            roles,
            classified: Vec::new(),
            categories: CategorySummary::default(),
        });
        generation
    }

    /// Returns whether there was anything to clear.
    pub fn clear(&self) -> bool {
        self.cancel_batch();
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.current.write().take().is_some()
    }

    pub fn read<R>(&self, f: impl FnOnce(&Session) -> R) -> Result<R, AppError> {
        self.current.read().as_ref().map(f).ok_or(AppError::NoDataset)
    }

    pub fn has_dataset(&self) -> bool {
        self.current.read().is_some()
    }

    /// Starts classifying `column` of the dataset at `generation`.
    ///
    /// Results of earlier batches are dropped up front, so a batch that fails
    /// never leaves old rows next to the newly selected feedback column. Any
    /// batch still in flight is cancelled.
    pub fn begin_batch(&self, generation: u64, column: usize) -> Result<BatchTicket, AppError> {
        let mut guard = self.current.write();
        let session = guard
            .as_mut()
            .filter(|s| s.generation == generation)
            .ok_or(AppError::NoDataset)?;
        session.roles.feedback = Some(column);
        session.classified.clear();
        session.categories = CategorySummary::default();

        let id = self.batch_ids.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        if let Some((previous, old)) = self.running.lock().replace((id, token.clone())) {
            tracing::info!("Batch {} superseded by batch {}", previous, id);
            old.cancel();
        }
        Ok(BatchTicket {
            id,
            generation,
            token,
        })
    }

    /// Returns whether a batch was running.
    pub fn cancel_batch(&self) -> bool {
        match self.running.lock().take() {
            Some((id, token)) => {
                tracing::info!("Cancelling batch {}", id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Forgets `ticket` if it is still the running batch.
    pub fn finish_batch(&self, ticket: &BatchTicket) {
        let mut running = self.running.lock();
        if matches!(running.as_ref(), Some((id, _)) if *id == ticket.id) {
            running.take();
        }
    }

    pub fn is_batch_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Writes batch results into the session.
    ///
    /// Returns `false` and leaves the session untouched when the dataset was
    /// replaced since the batch began, or when a newer batch has started.
    pub fn store_classification(&self, ticket: &BatchTicket, rows: Vec<ClassifiedRow>) -> bool {
        let mut guard = self.current.write();
        let latest = self.batch_ids.load(Ordering::SeqCst);
        match guard.as_mut() {
            Some(session) if session.generation == ticket.generation && ticket.id == latest => {
                session.categories = CategorySummary::from_rows(&rows);
                session.classified = rows;
                true
            }
            _ => {
                tracing::warn!(
                    "Discarding {} classified rows from batch {} (generation {}, latest batch {})",
                    rows.len(),
                    ticket.id,
                    ticket.generation,
                    latest
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Cell;

    fn dataset() -> Dataset {
        Dataset::new(vec!["Comment".into()], vec![vec![Cell::from("late")]])
    }

    fn classified(text: &str, category: &str) -> ClassifiedRow {
        ClassifiedRow {
            source_row: 0,
            text: text.to_string(),
            categories: vec![category.to_string()],
            confidence: 90,
            language: None,
        }
    }

    #[test]
    fn reading_without_upload_is_an_error() {
        let store = SessionStore::new();
        assert!(matches!(store.read(|s| s.generation), Err(AppError::NoDataset)));
    }

    #[test]
    fn replacing_clears_previous_results() {
        let store = SessionStore::new();
        let first = store.replace("a.xlsx".into(), dataset(), RoleMap::default());
        let ticket = store.begin_batch(first, 0).unwrap();
        assert!(store.store_classification(&ticket, vec![classified("late", "Delay")]));
        assert_eq!(store.read(|s| s.categories.count("Delay")).unwrap(), 1);

        let second = store.replace("b.xlsx".into(), dataset(), RoleMap::default());
        assert!(second > first);
        assert!(store.read(|s| s.classified.is_empty()).unwrap());
        assert_eq!(store.read(|s| s.file_name.clone()).unwrap(), "b.xlsx");
    }

    #[test]
    fn stale_results_are_discarded() {
        let store = SessionStore::new();
        let old = store.replace("a.xlsx".into(), dataset(), RoleMap::default());
        let ticket = store.begin_batch(old, 0).unwrap();
        store.replace("b.xlsx".into(), dataset(), RoleMap::default());
        assert!(!store.store_classification(&ticket, vec![classified("late", "Delay")]));
        assert!(store.read(|s| s.categories.is_empty()).unwrap());
    }

    #[test]
    fn new_batch_cancels_the_running_one() {
        let store = SessionStore::new();
        let generation = store.replace("a.xlsx".into(), dataset(), RoleMap::default());
        let first = store.begin_batch(generation, 0).unwrap();
        let second = store.begin_batch(generation, 0).unwrap();
        assert!(first.token.is_cancelled());
        assert!(!second.token.is_cancelled());

        store.finish_batch(&first);
        assert!(store.is_batch_running());
        store.finish_batch(&second);
        assert!(!store.is_batch_running());
    }

    #[test]
    fn reset_cancels_and_clears() {
        let store = SessionStore::new();
        let generation = store.replace("a.xlsx".into(), dataset(), RoleMap::default());
        let ticket = store.begin_batch(generation, 0).unwrap();
        assert!(store.clear());
        assert!(ticket.token.is_cancelled());
        assert!(!store.has_dataset());
        assert!(!store.clear());
    }

    #[test]
    fn beginning_a_batch_drops_earlier_results() {
        let store = SessionStore::new();
        let generation = store.replace("a.xlsx".into(), dataset(), RoleMap::default());
        let first = store.begin_batch(generation, 0).unwrap();
        assert!(store.store_classification(&first, vec![classified("late", "Delay")]));

        store.begin_batch(generation, 1).unwrap();
        assert_eq!(store.read(|s| s.roles.feedback).unwrap(), Some(1));
        assert!(store.read(|s| s.classified.is_empty() && s.categories.is_empty()).unwrap());
        assert!(store.begin_batch(generation + 1, 0).is_err());
    }

    #[test]
    fn superseded_batch_cannot_overwrite_newer_results() {
        let store = SessionStore::new();
        let generation = store.replace("a.xlsx".into(), dataset(), RoleMap::default());
        let older = store.begin_batch(generation, 0).unwrap();
        let newer = store.begin_batch(generation, 0).unwrap();

        assert!(store.store_classification(&newer, vec![classified("fresh", "Delay")]));
        assert!(older.token.is_cancelled());
        assert!(!store.store_classification(&older, vec![classified("stale", "Payment")]));

        let texts = store
            .read(|s| s.classified.iter().map(|r| r.text.clone()).collect::<Vec<_>>())
            .unwrap();
        assert_eq!(texts, vec!["fresh"]);
        assert_eq!(store.read(|s| s.categories.count("Payment")).unwrap(), 0);
    }

    #[test]
    fn explicitly_cancelled_latest_batch_keeps_its_partial_rows() {
        let store = SessionStore::new();
        let generation = store.replace("a.xlsx".into(), dataset(), RoleMap::default());
        let ticket = store.begin_batch(generation, 0).unwrap();
        assert!(store.cancel_batch());
        assert!(ticket.token.is_cancelled());
        assert!(store.store_classification(&ticket, vec![classified("late", "Delay")]));
    }
}
