//! State Storage

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use jiff::Timestamp;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

/// Errors reading or writing the persisted state.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The stored state exists but could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        /// Location of the state
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// The state could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// Location of the state
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// The stored state could not be moved aside.
    #[error("failed to quarantine {}: {source}", path.display())]
    Quarantine {
        /// Location of the state
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },
}

/// Where the encoded state lives.
#[cfg_attr(test, mockall::automock)]
pub trait StateStorage {
    /// Read the stored state, `None` if nothing has been stored yet.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if stored state exists but cannot be read.
    fn load(&self) -> Result<Option<String>, StorageError>;

    /// Replace the stored state with `contents`.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the state cannot be written. The previous
    /// state must still be intact when this fails.
    fn save(&mut self, contents: &str) -> Result<(), StorageError>;

    /// Move unreadable stored state out of the way so a later save cannot overwrite it.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the state cannot be moved.
    fn quarantine(&mut self) -> Result<Option<PathBuf>, StorageError>;
}

/// State kept in a single file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Store state at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn directory(&self) -> &Path {
        self.path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
    }

    fn write_error(&self, source: io::Error) -> StorageError {
        StorageError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl StateStorage for FileStorage {
    fn load(&self) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn save(&mut self, contents: &str) -> Result<(), StorageError> {
        let directory = self.directory();

        fs::create_dir_all(directory).map_err(|err| self.write_error(err))?;

        let mut file = NamedTempFile::new_in(directory).map_err(|err| self.write_error(err))?;

        file.write_all(contents.as_bytes())
            .map_err(|err| self.write_error(err))?;

        file.as_file()
            .sync_all()
            .map_err(|err| self.write_error(err))?;

        file.persist(&self.path)
            .map_err(|err| self.write_error(err.error))?;

        debug!(path = %self.path.display(), bytes = contents.len(), "state written");

        Ok(())
    }

    fn quarantine(&mut self) -> Result<Option<PathBuf>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let mut target = self.path.clone().into_os_string();

        target.push(format!(".corrupt-{}", Timestamp::now().as_second()));

        let target = PathBuf::from(target);

        fs::rename(&self.path, &target).map_err(|source| StorageError::Quarantine {
            path: self.path.clone(),
            source,
        })?;

        Ok(Some(target))
    }
}

/// State kept in memory, for embedding without a file and for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    contents: Option<String>,
}

impl MemoryStorage {
    /// Create storage with nothing stored.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create storage that already holds `contents`.
    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: Some(contents.into()),
        }
    }

    /// What was last stored
    pub fn contents(&self) -> Option<&str> {
        self.contents.as_deref()
    }
}

impl StateStorage for MemoryStorage {
    fn load(&self) -> Result<Option<String>, StorageError> {
        Ok(self.contents.clone())
    }

    fn save(&mut self, contents: &str) -> Result<(), StorageError> {
        self.contents = Some(contents.to_string());

        Ok(())
    }

    fn quarantine(&mut self) -> Result<Option<PathBuf>, StorageError> {
        self.contents = None;

        Ok(None)
    }
}
