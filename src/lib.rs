use std::sync::Arc;

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;

use crate::config::Config;
use crate::error::AppError;
use crate::services::classifier::{CachedClassifier, Classifier, HttpClassifier};
use crate::services::session::SessionStore;

// Application state
pub struct AppState {
    pub config: Config,
    pub classifier: Arc<dyn Classifier>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, AppError> {
        let http = HttpClassifier::new(&config.classifier_url, config.classifier_timeout())?;
        tracing::info!("Classifier endpoint: {}", http.endpoint());

        let classifier: Arc<dyn Classifier> = match config.classifier_cache_capacity {
            0 => Arc::new(http),
            capacity => Arc::new(CachedClassifier::new(http, capacity)),
        };
        Ok(Self::with_classifier(config, classifier))
    }

    pub fn with_classifier(config: Config, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            config,
            classifier,
            sessions: SessionStore::new(),
        }
    }
}
