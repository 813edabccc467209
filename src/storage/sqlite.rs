//! SQLite table store.
//!
//! Wraps [`tokio_rusqlite`] so database access runs on a dedicated thread
//! without blocking the async runtime. Uniqueness is enforced by the primary
//! key and every append is one transaction.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{OpenFlags, OptionalExtension as _, TransactionBehavior};

use crate::error::{AppError, Result};
use crate::models::{IdentityPolicy, ListingKey, ListingRecord};
use crate::storage::encode::{self, StoredRow};
use crate::storage::schema::{self, POLICY_ENTRY};
use crate::storage::{ListingReader, ListingStore};

/// A listing store backed by a single SQLite file.
pub struct SqliteStore {
    path: PathBuf,
    policy: IdentityPolicy,
    conn: Option<tokio_rusqlite::Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at `path` and run schema initialisation.
    ///
    /// `busy_timeout` bounds how long a write waits on another connection.
    pub async fn open(
        path: impl AsRef<Path>,
        policy: IdentityPolicy,
        busy_timeout: Duration,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::storage(format!("create {}", parent.display()), e))?;
        }

        let conn = tokio_rusqlite::Connection::open(&path)
            .await
            .map_err(|e| AppError::storage(format!("open {}", path.display()), e))?;

        let store = Self {
            path,
            policy,
            conn: Some(conn),
        };
        store.init_schema(busy_timeout).await?;
        Ok(store)
    }

    /// Open an in-memory store.
    pub async fn open_in_memory(policy: IdentityPolicy) -> Result<Self> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| AppError::storage(":memory:", e))?;
        let store = Self {
            path: PathBuf::from(":memory:"),
            policy,
            conn: Some(conn),
        };
        store.init_schema(Duration::ZERO).await?;
        Ok(store)
    }

    /// Open an existing store with a read-only connection.
    ///
    /// The identity policy is read from the store itself.
    pub async fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = tokio_rusqlite::Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .await
        .map_err(|e| AppError::storage(format!("open {}", path.display()), e))?;

        let stored: Option<String> = conn
            .call(|conn| {
                let value = conn
                    .query_row(
                        "SELECT value FROM store_meta WHERE name = ?1",
                        rusqlite::params![POLICY_ENTRY],
                        |r| r.get(0),
                    )
                    .optional()?;
                Ok(value)
            })
            .await
            .map_err(|e| AppError::storage(format!("read {}", path.display()), e))?;

        let policy = stored
            .as_deref()
            .and_then(IdentityPolicy::parse)
            .ok_or_else(|| {
                AppError::storage(path.display().to_string(), "not a listing store")
            })?;

        Ok(Self {
            path,
            policy,
            conn: Some(conn),
        })
    }

    fn conn(&self) -> Result<&tokio_rusqlite::Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| AppError::storage(self.path.display().to_string(), "store is closed"))
    }

    fn context(&self, action: &str) -> String {
        format!("{} {}", action, self.path.display())
    }

    /// Create tables and check the store's policy matches ours.
    async fn init_schema(&self, busy_timeout: Duration) -> Result<()> {
        let policy = self.policy;
        let found: Option<String> = self
            .conn()?
            .call(move |conn| {
                if !busy_timeout.is_zero() {
                    conn.busy_timeout(busy_timeout)?;
                }
                conn.execute_batch(schema::META)?;

                let tx = conn.transaction()?;
                let found: Option<String> = tx
                    .query_row(
                        "SELECT value FROM store_meta WHERE name = ?1",
                        rusqlite::params![POLICY_ENTRY],
                        |r| r.get(0),
                    )
                    .optional()?;

                if found.is_none() {
                    tx.execute(
                        "INSERT INTO store_meta (name, value) VALUES (?1, ?2)",
                        rusqlite::params![POLICY_ENTRY, policy.as_str()],
                    )?;
                }
                if found.as_deref().is_none_or(|v| v == policy.as_str()) {
                    tx.execute_batch(&schema::jobs_table(policy))?;
                }
                tx.commit()?;
                Ok(found)
            })
            .await
            .map_err(|e| AppError::storage(self.context("initialise"), e))?;

        match found {
            Some(stored) if stored != policy.as_str() => Err(AppError::integrity(
                self.path.display().to_string(),
                format!("store was created under the {stored} policy, opened as {policy}"),
            )),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ListingReader for SqliteStore {
    async fn load_all(&self) -> Result<Vec<ListingRecord>> {
        let sql = format!(
            "SELECT {}, title, company, location, site, job_url, date_added
               FROM jobs
              ORDER BY date_added DESC, rowid ASC",
            self.policy.key_column()
        );

        let rows: Vec<StoredRow> = self
            .conn()?
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], |r| {
                        Ok(StoredRow {
                            key: r.get(0)?,
                            title: r.get(1)?,
                            company: r.get(2)?,
                            location: r.get(3)?,
                            site: r.get::<_, Option<String>>(4)?.unwrap_or_default(),
                            job_url: r.get(5)?,
                            date_added: r.get(6)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(|e| AppError::storage(self.context("read"), e))?;

        Ok(encode::decode_rows(rows, self.policy))
    }
}

#[async_trait]
impl ListingStore for SqliteStore {
    fn policy(&self) -> IdentityPolicy {
        self.policy
    }

    async fn existing_identities(&self) -> Result<HashSet<ListingKey>> {
        let sql = format!("SELECT {} FROM jobs", self.policy.key_column());
        self.conn()?
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let keys = stmt
                    .query_map([], |r| r.get::<_, String>(0))?
                    .map(|key| key.map(ListingKey::new))
                    .collect::<std::result::Result<HashSet<_>, _>>()?;
                Ok(keys)
            })
            .await
            .map_err(|e| AppError::storage(self.context("read"), e))
    }

    async fn append(&self, records: &[ListingRecord]) -> Result<Vec<ListingRecord>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let rows = encode::encode_batch(records, self.policy)?;
        let sql = format!(
            "INSERT INTO jobs ({key}, title, company, location, site, job_url, date_added)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT ({key}) DO NOTHING",
            key = self.policy.key_column()
        );

        // Indices of the rows the table accepted. A row that hits the primary
        // key was stored by another writer after our identities were read.
        let inserted: Vec<usize> = self
            .conn()?
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let mut inserted = Vec::with_capacity(rows.len());
                {
                    let mut stmt = tx.prepare(&sql)?;
                    for (idx, row) in rows.iter().enumerate() {
                        let site = (!row.site.is_empty()).then_some(row.site.as_str());
                        let changed = stmt.execute(rusqlite::params![
                            row.key,
                            row.title,
                            row.company,
                            row.location,
                            site,
                            row.job_url,
                            row.date_added,
                        ])?;
                        if changed == 1 {
                            inserted.push(idx);
                        }
                    }
                }
                tx.commit()?;
                Ok(inserted)
            })
            .await
            .map_err(|e| AppError::storage(self.context("append to"), e))?;

        if inserted.len() < records.len() {
            log::warn!(
                "{} of {} listings were stored by another run meanwhile; skipped",
                records.len() - inserted.len(),
                records.len()
            );
        }
        Ok(inserted.into_iter().map(|idx| records[idx].clone()).collect())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close()
                .await
                .map_err(|e| AppError::storage(self.context("close"), e))?;
            log::debug!("Closed SQLite store {}", self.path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn listing(id: &str, title: &str, hour: u32) -> ListingRecord {
        ListingRecord {
            id: Some(id.to_string()),
            title: title.to_string(),
            company: "Acme".to_string(),
            location: "Remote".to_string(),
            site: None,
            job_url: format!("https://example.com/{}", id),
            observed_at: Utc.with_ymd_and_hms(2025, 2, 1, hour, 0, 0).unwrap(),
        }
    }

    async fn store() -> SqliteStore {
        SqliteStore::open_in_memory(IdentityPolicy::StableId)
            .await
            .expect("in-memory store")
    }

    #[tokio::test]
    async fn test_empty_store() {
        let s = store().await;
        assert!(s.existing_identities().await.unwrap().is_empty());
        assert!(s.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_and_load_newest_first() {
        let s = store().await;
        assert_eq!(s.append(&[listing("1", "Engineer", 8)]).await.unwrap().len(), 1);
        assert_eq!(s.append(&[listing("2", "Analyst", 10)]).await.unwrap().len(), 1);

        let all = s.load_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id.as_deref(), Some("2"));
        assert_eq!(all[1].site, None);

        let ids = s.existing_identities().await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&ListingKey::new("1")));
    }

    #[tokio::test]
    async fn test_repeat_within_append_rolls_back_whole_call() {
        let s = store().await;
        let err = s
            .append(&[
                listing("2", "Analyst", 9),
                listing("1", "Engineer", 9),
                listing("1", "Engineer", 10),
            ])
            .await
            .unwrap_err();
        match err {
            AppError::IntegrityViolation { identity, .. } => assert_eq!(identity, "1"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(s.existing_identities().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_writers_keep_every_new_listing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("jobs.db");
        let a = SqliteStore::open(&path, IdentityPolicy::StableId, Duration::from_secs(5))
            .await
            .unwrap();
        let b = SqliteStore::open(&path, IdentityPolicy::StableId, Duration::from_secs(5))
            .await
            .unwrap();

        // Both runs reconciled against the empty store before either wrote.
        let first = a
            .append(&[listing("1", "Engineer", 8), listing("2", "Analyst", 8)])
            .await
            .unwrap();
        let second = b
            .append(&[listing("2", "Analyst", 9), listing("3", "Designer", 9)])
            .await
            .unwrap();

        assert_eq!(first.len(), 2);
        let second_ids: Vec<_> = second.iter().filter_map(|r| r.id.as_deref()).collect();
        assert_eq!(second_ids, vec!["3"]);

        let stored = a.existing_identities().await.unwrap();
        assert_eq!(stored.len(), 3);
        // The first observation of listing 2 is kept.
        let all = a.load_all().await.unwrap();
        let two = all.iter().find(|r| r.id.as_deref() == Some("2")).unwrap();
        assert_eq!(two.observed_at, Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_observed_at_is_not_rewritten() {
        let s = store().await;
        s.append(&[listing("1", "Engineer", 8)]).await.unwrap();
        assert!(s.append(&[listing("1", "Engineer", 20)]).await.unwrap().is_empty());

        let all = s.load_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].observed_at, Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_reopen_with_other_policy_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("jobs.db");
        let mut s = SqliteStore::open(&path, IdentityPolicy::StableId, Duration::from_secs(1))
            .await
            .unwrap();
        s.close().await.unwrap();

        let err = SqliteStore::open(&path, IdentityPolicy::Composite, Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::IntegrityViolation { .. }));
    }

    #[tokio::test]
    async fn test_read_only_connection_cannot_write() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("jobs.db");
        let mut s = SqliteStore::open(&path, IdentityPolicy::Composite, Duration::from_secs(1))
            .await
            .unwrap();
        let mut record = listing("1", "Engineer", 8);
        record.id = None;
        s.append(&[record]).await.unwrap();
        s.close().await.unwrap();

        let reader = SqliteStore::open_read_only(&path).await.unwrap();
        assert_eq!(reader.policy(), IdentityPolicy::Composite);
        assert_eq!(reader.load_all().await.unwrap().len(), 1);
        assert!(reader.append(&[listing("2", "Analyst", 9)]).await.is_err());
    }

    #[tokio::test]
    async fn test_close_twice_is_safe() {
        let mut s = store().await;
        s.close().await.unwrap();
        s.close().await.unwrap();
        assert!(matches!(
            s.existing_identities().await.unwrap_err(),
            AppError::StorageUnavailable { .. }
        ));
    }
}
