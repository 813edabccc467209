//! Flat CSV snapshot store.
//!
//! The whole store lives in one CSV file that is read and rewritten on every
//! append. Writers serialize on an advisory lock; readers never lock and see
//! either the old or the new file because replacement is an atomic rename.
//!
//! ## Layout
//!
//! ```text
//! {dir}/
//! ├── master_jobs.csv        # Snapshot (header + one row per listing)
//! ├── master_jobs.csv.lock   # Writer lock
//! └── master_jobs.csv.tmp    # Next snapshot, only while appending
//! ```

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{IdentityPolicy, ListingKey, ListingRecord};
use crate::storage::encode::{self, StoredRow};
use crate::storage::lock;
use crate::storage::{ListingReader, ListingStore};

/// CSV snapshot backend.
#[derive(Debug)]
pub struct CsvSnapshotStore {
    path: PathBuf,
    policy: IdentityPolicy,
    lock_path: PathBuf,
    lock_file: Option<File>,
    lock_timeout: Duration,
}

impl CsvSnapshotStore {
    /// Open (or create) a snapshot at `path`.
    ///
    /// A missing snapshot is created with only a header row.
    pub async fn open(
        path: impl Into<PathBuf>,
        policy: IdentityPolicy,
        lock_timeout: Duration,
    ) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::storage(format!("create {}", parent.display()), e))?;
        }

        let lock_path = lock::lock_path_for(&path);
        let lock_file = lock::open_lock_file(&lock_path)?;

        let store = Self {
            path,
            policy,
            lock_path,
            lock_file: Some(lock_file),
            lock_timeout,
        };

        if store.read_rows().await?.is_none() {
            let file = store.lock_file()?;
            let _guard = lock::acquire(file, &store.lock_path, store.lock_timeout).await?;
            // Another writer may have created it while we waited.
            if store.read_rows().await?.is_none() {
                log::info!("Creating empty snapshot at {}", store.path.display());
                store.write_rows(&[]).await?;
            }
        }

        Ok(store)
    }

    /// Open an existing snapshot for reading only.
    ///
    /// The policy is taken from the header. No lock file is touched.
    pub async fn open_read_only(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| AppError::storage(format!("read {}", path.display()), e))?;
        let policy = Self::header_policy(&bytes, &path)?;

        Ok(Self {
            lock_path: lock::lock_path_for(&path),
            path,
            policy,
            lock_file: None,
            lock_timeout: Duration::ZERO,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling of the snapshot named after its full file name.
    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn lock_file(&self) -> Result<&File> {
        self.lock_file
            .as_ref()
            .ok_or_else(|| AppError::storage(self.path.display().to_string(), "store is not open for writing"))
    }

    /// Policy recorded in a snapshot header.
    fn header_policy(bytes: &[u8], path: &Path) -> Result<IdentityPolicy> {
        let mut reader = csv::ReaderBuilder::new().from_reader(bytes);
        let headers = reader.headers()?;
        match headers.get(0) {
            Some("id") => Ok(IdentityPolicy::StableId),
            Some("key") => Ok(IdentityPolicy::Composite),
            other => Err(AppError::storage(
                path.display().to_string(),
                format!("unrecognised identity column {:?}", other),
            )),
        }
    }

    /// Read all rows, or `None` if the snapshot does not exist yet.
    async fn read_rows(&self) -> Result<Option<Vec<StoredRow>>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::storage(format!("read {}", self.path.display()), e));
            }
        };

        let found = Self::header_policy(&bytes, &self.path)?;
        if found != self.policy {
            return Err(AppError::integrity(
                self.path.display().to_string(),
                format!(
                    "snapshot was created under the {found} policy, opened as {}",
                    self.policy
                ),
            ));
        }

        let mut reader = csv::ReaderBuilder::new().from_reader(bytes.as_slice());
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(StoredRow::from_fields(record.iter()));
        }
        Ok(Some(rows))
    }

    /// Serialize rows and atomically replace the snapshot.
    async fn write_rows(&self, rows: &[StoredRow]) -> Result<()> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(encode::header(self.policy))?;
        for row in rows {
            writer.write_record(row.fields())?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| AppError::storage("encode snapshot", e))?;

        let tmp = self.temp_path();
        let replace = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&bytes).await?;
            file.flush().await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, &self.path).await
        };

        if let Err(e) = replace.await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(AppError::storage(format!("write {}", self.path.display()), e));
        }
        Ok(())
    }
}

#[async_trait]
impl ListingReader for CsvSnapshotStore {
    async fn load_all(&self) -> Result<Vec<ListingRecord>> {
        let rows = self.read_rows().await?.unwrap_or_default();
        let mut records = encode::decode_rows(rows, self.policy);
        encode::sort_newest_first(&mut records);
        Ok(records)
    }
}

#[async_trait]
impl ListingStore for CsvSnapshotStore {
    fn policy(&self) -> IdentityPolicy {
        self.policy
    }

    async fn existing_identities(&self) -> Result<HashSet<ListingKey>> {
        let rows = self.read_rows().await?.unwrap_or_default();
        Ok(rows.into_iter().map(|row| ListingKey::new(row.key)).collect())
    }

    async fn append(&self, records: &[ListingRecord]) -> Result<Vec<ListingRecord>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let batch = encode::encode_batch(records, self.policy)?;

        let file = self.lock_file()?;
        let _guard = lock::acquire(file, &self.lock_path, self.lock_timeout).await?;

        // Re-read under the lock; another run may have appended since our
        // identities were read.
        let mut rows = self.read_rows().await?.unwrap_or_default();
        let stored: HashSet<&str> = rows.iter().map(|row| row.key.as_str()).collect();
        let (fresh, taken): (Vec<_>, Vec<_>) = batch
            .into_iter()
            .zip(records)
            .partition(|(row, _)| !stored.contains(row.key.as_str()));
        drop(stored);

        if !taken.is_empty() {
            log::warn!(
                "{} of {} listings were stored by another run meanwhile; skipped",
                taken.len(),
                records.len()
            );
        }
        if fresh.is_empty() {
            return Ok(Vec::new());
        }

        let mut inserted = Vec::with_capacity(fresh.len());
        for (row, record) in fresh {
            rows.push(row);
            inserted.push(record.clone());
        }

        self.write_rows(&rows).await?;
        log::debug!(
            "Snapshot {} now holds {} listings",
            self.path.display(),
            rows.len()
        );
        Ok(inserted)
    }

    async fn close(&mut self) -> Result<()> {
        if self.lock_file.take().is_some() {
            log::debug!("Closed snapshot store {}", self.path.display());
        }
        Ok(())
    }
}
