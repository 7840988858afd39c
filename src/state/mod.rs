//! Persisted delegate payloads, one file per container.
//!
//! ADD writes the exact bytes it sends to the delegate before delegating, so
//! DEL can tear the attachment down even when the runtime no longer supplies
//! the network configuration.

use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::{close, fsync, write};
use std::fs::{self, DirBuilder};
use std::io::{self, ErrorKind};
use std::os::unix::fs::DirBuilderExt;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::StateError;

/// Directory of persisted delegate payloads keyed by container ID
#[derive(Debug, Clone)]
pub struct StateStore {
    dir: PathBuf,
}

/// Removes a loaded state file once the caller knows the outcome.
#[derive(Debug)]
#[must_use = "the state file is only removed when the cleanup is finished"]
pub struct StateCleanup {
    path: PathBuf,
}

impl StateCleanup {
    /// Delete the state file if `outcome` is a success, keep it otherwise.
    ///
    /// Deletion failures are ignored: the file may already be gone.
    pub fn finish<T, E>(self, outcome: &Result<T, E>) {
        if outcome.is_err() {
            debug!(path = %self.path.display(), "Keeping state file after failed teardown");
            return;
        }
        if let Err(err) = fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %err, "Ignoring state file removal error");
        }
    }

    /// Path of the state file this cleanup owns
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore {
    /// Create a store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the state files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the state file for a container
    pub fn path_for(&self, container_id: &str) -> Result<PathBuf, StateError> {
        if !is_valid_container_id(container_id) {
            return Err(StateError::InvalidContainerId {
                container_id: container_id.to_string(),
            });
        }
        Ok(self.dir.join(container_id))
    }

    /// Durably write `bytes` as the state for `container_id`, replacing any
    /// previous state.
    pub fn save(&self, container_id: &str, bytes: &[u8]) -> Result<PathBuf, StateError> {
        let path = self.path_for(container_id)?;

        DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(&self.dir)
            .map_err(|source| StateError::CreateDir {
                path: self.dir.clone(),
                source,
            })?;

        let fd = open(
            path.as_path(),
            OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC | OFlag::O_CLOEXEC,
            Mode::S_IRUSR | Mode::S_IWUSR,
        )
        .map_err(|errno| StateError::Write {
            path: path.clone(),
            source: io::Error::from(errno),
        })?;

        // Close even if the write or sync failed, but report the first error.
        let written = write_and_sync(fd, &path, bytes);
        let closed = close(fd).map_err(|errno| StateError::Close {
            path: path.clone(),
            source: io::Error::from(errno),
        });
        written?;
        closed?;

        debug!(path = %path.display(), len = bytes.len(), "Persisted delegate config");
        Ok(path)
    }

    /// Read the state for `container_id`.
    ///
    /// Returns [`StateError::NotFound`] when nothing is persisted. Otherwise
    /// returns the bytes together with a [`StateCleanup`] for the file.
    pub fn load(&self, container_id: &str) -> Result<(Vec<u8>, StateCleanup), StateError> {
        let path = self.path_for(container_id)?;

        match fs::read(&path) {
            Ok(bytes) => Ok((bytes, StateCleanup { path })),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StateError::NotFound {
                container_id: container_id.to_string(),
            }),
            Err(source) => Err(StateError::Read { path, source }),
        }
    }

    /// Remove the state for `container_id`; returns whether it existed.
    pub fn remove(&self, container_id: &str) -> Result<bool, StateError> {
        let path = self.path_for(container_id)?;

        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StateError::Remove { path, source }),
        }
    }

    /// Container IDs with persisted state, sorted
    pub fn list(&self) -> Result<Vec<String>, StateError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StateError::List {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StateError::List {
                path: self.dir.clone(),
                source,
            })?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            match entry.file_name().into_string() {
                Ok(name) if is_file && is_valid_container_id(&name) => ids.push(name),
                Ok(name) => warn!(entry = %name, "Skipping unexpected entry in state directory"),
                Err(name) => warn!(entry = ?name, "Skipping non UTF-8 entry in state directory"),
            }
        }
        ids.sort();
        Ok(ids)
    }
}

fn write_and_sync(fd: RawFd, path: &Path, bytes: &[u8]) -> Result<(), StateError> {
    let written = write(fd, bytes).map_err(|errno| StateError::Write {
        path: path.to_path_buf(),
        source: io::Error::from(errno),
    })?;
    if written < bytes.len() {
        return Err(StateError::ShortWrite {
            path: path.to_path_buf(),
            written,
            expected: bytes.len(),
        });
    }
    fsync(fd).map_err(|errno| StateError::Sync {
        path: path.to_path_buf(),
        source: io::Error::from(errno),
    })
}

/// Container IDs must be usable as a single path component.
pub fn is_valid_container_id(container_id: &str) -> bool {
    let mut chars = container_id.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphanumeric() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        }
        _ => false,
    }
}
