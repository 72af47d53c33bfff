//! Run-wide mutual exclusion.
//!
//! Only one synchronisation run may touch a fetch directory at a time. The
//! lock is an advisory `flock` on a well-known file; it is released when the
//! [`RunLock`] is dropped, whichever way the run ends.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::UtcDateTime;
use tokio::time::Instant;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Written into the lock file by the holder, for whoever is left waiting.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
struct Holder {
    pid: u32,
    started: i64,
}

/// Held for the duration of a run.
#[derive(Debug)]
pub struct RunLock {
    file: Flock<File>,
    path: PathBuf,
}

impl RunLock {
    /// Take the lock, polling until `timeout` elapses.
    pub async fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let deadline = Instant::now() + timeout;
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .or_raise(|| ErrorKind::Lock(path.to_path_buf()))?;
        loop {
            match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
                Ok(locked) => {
                    let mut lock = Self { file: locked, path: path.to_path_buf() };
                    if let Err(err) = lock.write_holder() {
                        debug!(path = %path.display(), error = %err, "unable to record lock holder");
                    }
                    debug!(path = %path.display(), "acquired run lock");
                    return Ok(lock);
                },
                Err((returned, errno)) if errno == Errno::EWOULDBLOCK => {
                    if Instant::now() >= deadline {
                        warn!(path = %path.display(), holder = ?read_holder(path), "lock is held by another run");
                        exn::bail!(ErrorKind::LockTimeout(path.to_path_buf()));
                    }
                    file = returned;
                    tokio::time::sleep(POLL_INTERVAL).await;
                },
                Err((_, errno)) => return Err(errno).or_raise(|| ErrorKind::Lock(path.to_path_buf())),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_holder(&mut self) -> std::io::Result<()> {
        let holder = Holder { pid: std::process::id(), started: UtcDateTime::now().unix_timestamp() };
        let content = serde_json::to_vec(&holder).map_err(std::io::Error::other)?;
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&content)?;
        self.file.flush()
    }

    /// Release the lock now rather than at the end of the scope.
    pub fn release(self) {
        if let Err(err) = self.file.set_len(0) {
            debug!(path = %self.path.display(), error = %err, "unable to clear lock holder");
        }
        debug!(path = %self.path.display(), "released run lock");
    }
}

fn read_holder(path: &Path) -> Option<Holder> {
    let content = std::fs::read(path).ok()?;
    serde_json::from_slice(&content).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_writes_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layerindex.lock");
        let lock = RunLock::acquire(&path, Duration::from_secs(1)).await.unwrap();
        let holder = read_holder(lock.path()).unwrap();
        assert_eq!(holder.pid, std::process::id());
        lock.release();
        assert!(read_holder(&path).is_none());
    }

    #[tokio::test]
    async fn test_second_acquire_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layerindex.lock");
        let _held = RunLock::acquire(&path, Duration::from_secs(1)).await.unwrap();
        let err = RunLock::acquire(&path, Duration::from_millis(300)).await.unwrap_err();
        assert_eq!(*err, ErrorKind::LockTimeout(path));
    }

    #[tokio::test]
    async fn test_acquire_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layerindex.lock");
        let first = RunLock::acquire(&path, Duration::from_secs(1)).await.unwrap();
        drop(first);
        RunLock::acquire(&path, Duration::from_millis(100)).await.unwrap();
    }

    #[tokio::test]
    async fn test_waits_for_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layerindex.lock");
        let held = RunLock::acquire(&path, Duration::from_secs(1)).await.unwrap();
        let releaser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            held.release();
        });
        RunLock::acquire(&path, Duration::from_secs(5)).await.unwrap();
        releaser.await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("layerindex.lock");
        let err = RunLock::acquire(&path, Duration::from_secs(1)).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Lock(path));
    }
}
