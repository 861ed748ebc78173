//! Session state store for facts that outlive a single dispatch invocation.
//!
//! The file-backed implementation keeps one file per `(session_id, key)`
//! pair under the state directory: `{session_id}-{key}`. Hook events for one
//! session are serialized by the host, so no locking is performed.
//!
//! State correctness is safety-sensitive: unlike the fail-open matching path,
//! store errors are typed and propagate to the caller.

use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

use crate::paths;

/// Errors from session state operations.
#[derive(Debug, Error)]
pub enum StateError {
    /// A session id or key that cannot form a safe file name.
    #[error("invalid state path component {0:?}")]
    InvalidComponent(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// External key/value facts keyed by `(session_id, key)`.
#[cfg_attr(test, mockall::automock)]
pub trait StateStore {
    fn get(&self, session_id: &str, key: &str) -> Result<Option<String>, StateError>;
    fn set(&self, session_id: &str, key: &str, value: &str) -> Result<(), StateError>;
    fn clear(&self, session_id: &str, key: &str) -> Result<(), StateError>;
    fn exists(&self, session_id: &str, key: &str) -> Result<bool, StateError>;
}

/// File-per-key state store rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileStateStore { dir: dir.into() }
    }

    /// Store rooted at the resolved default state directory.
    pub fn open_default() -> Self {
        FileStateStore::new(paths::state_dir())
    }

    fn state_path(&self, session_id: &str, key: &str) -> Result<PathBuf, StateError> {
        validate_component(session_id)?;
        validate_component(key)?;
        Ok(self.dir.join(format!("{session_id}-{key}")))
    }
}

/// Reject components that are empty or could escape the state directory.
fn validate_component(component: &str) -> Result<(), StateError> {
    if component.is_empty()
        || component == "."
        || component == ".."
        || component.contains(['/', '\\'])
    {
        return Err(StateError::InvalidComponent(component.to_string()));
    }
    Ok(())
}

impl StateStore for FileStateStore {
    fn get(&self, session_id: &str, key: &str) -> Result<Option<String>, StateError> {
        let path = self.state_path(session_id, key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, session_id: &str, key: &str, value: &str) -> Result<(), StateError> {
        let path = self.state_path(session_id, key)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(&path, value)?;
        debug!("Set state {} for session {}", key, session_id);
        Ok(())
    }

    fn clear(&self, session_id: &str, key: &str) -> Result<(), StateError> {
        let path = self.state_path(session_id, key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, session_id: &str, key: &str) -> Result<bool, StateError> {
        let path = self.state_path(session_id, key)?;
        Ok(path.try_exists()?)
    }
}
