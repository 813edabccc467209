// src/models/mod.rs

//! Domain models for the ingestion pipeline.

mod config;
mod listing;
mod query;
mod run;

// Re-export all public types
pub use config::{
    Config, LoggingConfig, NotifyConfig, ScrapingConfig, SourceConfig, SourceKind, StoreBackend,
    StoreConfig,
};
pub use listing::{IdentityPolicy, ListingKey, ListingRecord, RawListing};
pub use query::SearchQuery;
pub use run::{NotifyResult, NotifyTally, RunReport, RunStage, RunState};
