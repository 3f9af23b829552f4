pub mod analytics;
pub mod categories;
pub mod classifier;
pub mod export;
pub mod file_processor;
pub mod session;
