//! Cross-process lock for the session file.
//!
//! The in-process mutex in `SessionStore` already serializes writers within
//! one process; this guards against a second attache process touching the
//! same file. The lock is a sibling `<file>.lock` created with
//! `create_new`, so acquisition is a single atomic filesystem operation.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::Error;

/// A lock file older than this was abandoned by a crashed process and may
/// be taken over.
const STALE_AFTER: Duration = Duration::from_millis(5000);

struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove lock file {}: {}", self.path.display(), e);
        }
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

/// A lock whose mtime cannot be read, or lies in the future, counts as
/// fresh; only a provably old lock is taken over.
fn is_stale(lock: &Path) -> bool {
    let Ok(modified) = lock.metadata().and_then(|m| m.modified()) else {
        return false;
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age >= STALE_AFTER)
        .unwrap_or(false)
}

/// Run `f` while holding the exclusive lock guarding `path`. The lock file
/// is removed when `f` returns, error or not.
pub fn with_lock<T, F>(path: &Path, f: F) -> Result<T, Error>
where
    F: FnOnce() -> Result<T, Error>,
{
    let lock = lock_path(path);
    let mut took_over = false;

    loop {
        match OpenOptions::new().write(true).create_new(true).open(&lock) {
            Ok(_) => break,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if is_stale(&lock) && !took_over {
                    tracing::warn!("Taking over stale lock {}", lock.display());
                    let _ = std::fs::remove_file(&lock);
                    // Retry once; losing the re-acquire race means the lock
                    // is genuinely held again.
                    took_over = true;
                    continue;
                }
                return Err(Error::Session(format!(
                    "Lock file is held: {}",
                    lock.display()
                )));
            }
            Err(e) => return Err(e.into()),
        }
    }

    let _guard = LockGuard { path: lock };
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lock_is_released_after_the_closure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");

        let value = with_lock(&path, || Ok(42)).unwrap();
        assert_eq!(value, 42);
        assert!(!lock_path(&path).exists());

        // Released even when the closure errors.
        let result: Result<(), Error> =
            with_lock(&path, || Err(Error::Session("boom".to_string())));
        assert!(result.is_err());
        assert!(!lock_path(&path).exists());
    }

    #[test]
    fn held_lock_is_refused() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sessions.json");

        with_lock(&path, || {
            let nested: Result<(), Error> = with_lock(&path, || Ok(()));
            assert!(nested.is_err());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn fresh_lock_is_not_stale() {
        let dir = TempDir::new().unwrap();
        let lock = dir.path().join("sessions.json.lock");
        std::fs::write(&lock, b"").unwrap();
        assert!(!is_stale(&lock));
        assert!(!is_stale(&dir.path().join("missing.lock")));
    }
}
