//! Advisory file locking for network-shared index stores.
//!
//! flock does not travel well over NFS, so the lock is a plain sibling file
//! created with `O_EXCL`. The lock carries a small JSON payload (pid, exe,
//! acquisition time) for operators staring at a stuck mount, and it has a
//! bounded lifetime: a holder that crashed without cleanup is expired and
//! broken by the next waiter.

use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Lifetime bound on a held lock.
pub const DEFAULT_LOCK_LIFETIME: Duration = Duration::from_secs(600);

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Serialize, Deserialize)]
struct LockPayload {
    pid: u32,
    exe: Option<String>,
    acquired_at: String,
}

/// Lock file path for an index path: `data.db` becomes `data.db.lock`.
pub fn lock_path_for(index_path: &Path) -> PathBuf {
    let mut lock_path = index_path.to_path_buf();
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

/// An exclusive on-disk lock, released on drop.
#[derive(Debug)]
pub struct FsLock {
    path: PathBuf,
}

impl FsLock {
    /// Acquire the lock. A lock file older than `lifetime` is treated as
    /// abandoned and broken, so a crashed holder frees its waiters after at
    /// most `lifetime`. The wait itself gives up after twice that, which is
    /// only reachable when a live holder keeps the lock fresh.
    pub async fn acquire(path: &Path, lifetime: Duration) -> Result<Self> {
        let deadline = Instant::now() + lifetime * 2;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    let payload = LockPayload {
                        pid: std::process::id(),
                        exe: std::env::current_exe()
                            .ok()
                            .map(|p| p.display().to_string()),
                        acquired_at: Utc::now().to_rfc3339(),
                    };
                    if let Ok(bytes) = serde_json::to_vec_pretty(&payload) {
                        let _ = file.write_all(&bytes);
                    }
                    debug!(lock = %path.display(), "acquired index lock");
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    if holder_expired(path, lifetime) {
                        warn!(lock = %path.display(), "breaking expired index lock");
                        let _ = fs::remove_file(path);
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(Error::Lock(format!(
                            "timed out waiting for {}",
                            path.display()
                        )));
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FsLock {
    fn drop(&mut self) {
        debug!(lock = %self.path.display(), "releasing index lock");
        if let Err(err) = fs::remove_file(&self.path) {
            debug!(lock = %self.path.display(), error = %err, "failed to remove lock file");
        }
    }
}

fn holder_expired(path: &Path, lifetime: Duration) -> bool {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|mtime| mtime.elapsed().ok())
        .is_some_and(|age| age > lifetime)
}
