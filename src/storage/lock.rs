//! Advisory writer lock for the snapshot store.
//!
//! Uses `fs2` so the lock is an OS-level `flock`/`LockFileEx` on a sidecar
//! file. It is released when the guard drops or the process exits.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::error::{AppError, Result};

/// Poll interval while another writer holds the lock.
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Get the lock file path for a store path.
///
/// - `/data/master_jobs.csv` → `/data/master_jobs.csv.lock`
/// - `/data/jobs` → `/data/jobs.lock`
pub fn lock_path_for(store_path: &Path) -> PathBuf {
    let mut lock_path = store_path.to_path_buf();
    match lock_path.extension() {
        Some(ext) => {
            let new_ext = format!("{}.lock", ext.to_string_lossy());
            lock_path.set_extension(new_ext);
        }
        None => {
            lock_path.set_extension("lock");
        }
    }
    lock_path
}

/// Open (or create) the lock file without locking it.
pub fn open_lock_file(lock_path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .map_err(|e| AppError::storage(format!("lock file {}", lock_path.display()), e))
}

/// Holds the exclusive lock until dropped.
#[derive(Debug)]
pub struct WriterLock<'a> {
    file: &'a File,
}

impl Drop for WriterLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(self.file) {
            log::debug!("Failed to release snapshot lock: {}", e);
        }
    }
}

/// Acquire the exclusive lock, polling until `timeout` elapses.
pub async fn acquire<'a>(file: &'a File, lock_path: &Path, timeout: Duration) -> Result<WriterLock<'a>> {
    let deadline = Instant::now() + timeout;
    loop {
        match FileExt::try_lock_exclusive(file) {
            Ok(()) => {
                log::debug!("Acquired snapshot lock {}", lock_path.display());
                return Ok(WriterLock { file });
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                if Instant::now() >= deadline {
                    return Err(AppError::storage(
                        format!("lock file {}", lock_path.display()),
                        format!("held by another writer for more than {}s", timeout.as_secs()),
                    ));
                }
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
            Err(e) => {
                return Err(AppError::storage(
                    format!("lock file {}", lock_path.display()),
                    e,
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_path_for() {
        assert_eq!(
            lock_path_for(Path::new("/data/master_jobs.csv")),
            PathBuf::from("/data/master_jobs.csv.lock")
        );
        assert_eq!(
            lock_path_for(Path::new("/data/jobs")),
            PathBuf::from("/data/jobs.lock")
        );
    }

    #[tokio::test]
    async fn test_second_writer_times_out() {
        let tmp = TempDir::new().unwrap();
        let lock_path = tmp.path().join("store.csv.lock");

        let first = open_lock_file(&lock_path).unwrap();
        let second = open_lock_file(&lock_path).unwrap();

        let _held = acquire(&first, &lock_path, Duration::from_secs(1)).await.unwrap();
        let err = acquire(&second, &lock_path, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StorageUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_lock_released_on_drop() {
        let tmp = TempDir::new().unwrap();
        let lock_path = tmp.path().join("store.csv.lock");

        let first = open_lock_file(&lock_path).unwrap();
        let second = open_lock_file(&lock_path).unwrap();

        {
            let _held = acquire(&first, &lock_path, Duration::from_secs(1)).await.unwrap();
        }
        assert!(acquire(&second, &lock_path, Duration::from_millis(200)).await.is_ok());
    }
}
