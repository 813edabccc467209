//! Storage abstractions for listing persistence.
//!
//! Two interchangeable backends hold every listing ever ingested:
//! - [`SqliteStore`]: keyed table, uniqueness enforced by the primary key
//! - [`CsvSnapshotStore`]: one CSV file, rewritten atomically under a lock
//!
//! Both expose the same column layout to readers:
//!
//! ```text
//! id|key, title, company, location, site, job_url, date_added
//! ```

pub mod encode;
pub mod lock;
pub mod schema;
pub mod snapshot;
pub mod sqlite;

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{IdentityPolicy, ListingKey, ListingRecord, StoreBackend, StoreConfig};

// Re-export for convenience
pub use snapshot::CsvSnapshotStore;
pub use sqlite::SqliteStore;

/// Read access to a store.
#[async_trait]
pub trait ListingReader: Send + Sync {
    /// All stored listings, newest `observed_at` first.
    async fn load_all(&self) -> Result<Vec<ListingRecord>>;
}

/// Trait for listing storage backends.
#[async_trait]
pub trait ListingStore: ListingReader {
    /// Identity policy this store was created under.
    fn policy(&self) -> IdentityPolicy;

    /// Every identity currently stored, read as one consistent snapshot.
    async fn existing_identities(&self) -> Result<HashSet<ListingKey>>;

    /// Insert the listings whose identity is not stored yet, all or nothing.
    ///
    /// Identities are checked again while holding the write side, so a
    /// listing stored by an overlapping run since `existing_identities` is
    /// skipped rather than rejected. Returns the listings actually inserted,
    /// in input order. An identity repeated within `records` fails the call
    /// with `IntegrityViolation` and nothing is written.
    async fn append(&self, records: &[ListingRecord]) -> Result<Vec<ListingRecord>>;

    /// Release underlying resources. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}

/// Open the configured store for reading and writing.
pub async fn open_store(config: &StoreConfig) -> Result<Box<dyn ListingStore>> {
    let timeout = Duration::from_secs(config.lock_timeout_secs);
    log::debug!(
        "Opening {:?} store at {} ({} identity)",
        config.backend,
        config.path.display(),
        config.identity
    );

    let store: Box<dyn ListingStore> = match config.backend {
        StoreBackend::Sqlite => {
            Box::new(SqliteStore::open(&config.path, config.identity, timeout).await?)
        }
        StoreBackend::Csv => {
            Box::new(CsvSnapshotStore::open(&config.path, config.identity, timeout).await?)
        }
    };
    Ok(store)
}

/// Open the configured store without write access.
///
/// Returns `None` if the store has not been created yet.
pub async fn open_reader(config: &StoreConfig) -> Result<Option<Box<dyn ListingReader>>> {
    let exists = tokio::fs::try_exists(&config.path)
        .await
        .map_err(|e| AppError::storage(format!("stat {}", config.path.display()), e))?;
    if !exists {
        return Ok(None);
    }

    let reader: Box<dyn ListingReader> = match config.backend {
        StoreBackend::Sqlite => Box::new(SqliteStore::open_read_only(&config.path).await?),
        StoreBackend::Csv => Box::new(CsvSnapshotStore::open_read_only(&config.path).await?),
    };
    Ok(Some(reader))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(tmp: &TempDir, backend: StoreBackend, file: &str) -> StoreConfig {
        StoreConfig {
            backend,
            path: tmp.path().join("nested").join(file),
            identity: IdentityPolicy::StableId,
            lock_timeout_secs: 1,
        }
    }

    #[tokio::test]
    async fn test_reader_absent_before_first_open() {
        let tmp = TempDir::new().unwrap();
        let config = config(&tmp, StoreBackend::Csv, "master_jobs.csv");
        assert!(open_reader(&config).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_creates_store_for_each_backend() {
        let tmp = TempDir::new().unwrap();
        for (backend, file) in [
            (StoreBackend::Sqlite, "jobs.db"),
            (StoreBackend::Csv, "master_jobs.csv"),
        ] {
            let config = config(&tmp, backend, file);
            let mut store = open_store(&config).await.unwrap();
            assert_eq!(store.policy(), IdentityPolicy::StableId);
            store.close().await.unwrap();

            let reader = open_reader(&config).await.unwrap().unwrap();
            assert!(reader.load_all().await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_reader_reports_unreachable_path() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();

        let mut config = config(&tmp, StoreBackend::Sqlite, "jobs.db");
        config.path = blocker.join("jobs.db");
        let err = open_reader(&config).await.err().unwrap();
        assert!(matches!(err, AppError::StorageUnavailable { .. }));
    }
}
