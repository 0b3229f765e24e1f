//! Durable state of a run: the assembled document and the set of completed
//! chapter ids, each kept in one file that is only ever replaced whole.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tome_core::ProgressSet;
use tome_logging::tome_debug;

use crate::filename::{document_filename, progress_filename};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("output directory {path:?} is unusable: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("progress file {path:?} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },
}

/// Creates `dir` if missing and rejects paths that are not directories.
pub fn ensure_output_dir(dir: &Path) -> Result<(), StoreError> {
    let unusable = |source| StoreError::OutputDir {
        path: dir.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).map_err(unusable)?;
    if !fs::metadata(dir).map_err(unusable)?.is_dir() {
        return Err(unusable(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "path is not a directory",
        )));
    }
    Ok(())
}

/// Completed chapter ids, stored as a sorted JSON array of strings.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    dir: PathBuf,
    filename: String,
}

impl ProgressStore {
    pub fn new(dir: PathBuf, filename: impl Into<String>) -> Self {
        Self {
            dir,
            filename: filename.into(),
        }
    }

    pub fn for_title(dir: PathBuf, title: &str) -> Self {
        Self::new(dir, progress_filename(title))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.filename)
    }

    /// A missing file is an empty set; an unreadable one is an error.
    pub fn load(&self) -> Result<ProgressSet, StoreError> {
        let path = self.path();
        let Some(content) = read_optional(&path)? else {
            return Ok(ProgressSet::new());
        };
        let ids: Vec<String> =
            serde_json::from_str(&content).map_err(|err| StoreError::Corrupt {
                path: path.clone(),
                message: err.to_string(),
            })?;
        tome_debug!("Loaded {} completed chapter ids from {:?}", ids.len(), path);
        Ok(ids.into_iter().collect())
    }

    pub fn save(&self, set: &ProgressSet) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(&set.to_sorted_vec()).map_err(|err| {
            StoreError::Corrupt {
                path: self.path(),
                message: err.to_string(),
            }
        })?;
        replace_file(&self.dir, &self.path(), &content)
    }
}

/// The assembled output document, always rewritten whole.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    dir: PathBuf,
    filename: String,
}

impl DocumentStore {
    pub fn new(dir: PathBuf, filename: impl Into<String>) -> Self {
        Self {
            dir,
            filename: filename.into(),
        }
    }

    pub fn for_title(dir: PathBuf, title: &str) -> Self {
        Self::new(dir, document_filename(title))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.filename)
    }

    pub fn read(&self) -> Result<Option<String>, StoreError> {
        read_optional(&self.path())
    }

    pub fn write(&self, content: &str) -> Result<(), StoreError> {
        replace_file(&self.dir, &self.path(), content)
    }
}

/// Writes a synced temp file next to `target` and renames it over the
/// target, so readers see either the old or the new content.
fn replace_file(dir: &Path, target: &Path, content: &str) -> Result<(), StoreError> {
    let failed = |source| StoreError::Write {
        path: target.to_path_buf(),
        source,
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(failed)?;
    tmp.write_all(content.as_bytes()).map_err(failed)?;
    tmp.as_file_mut().sync_all().map_err(failed)?;
    tmp.persist(target).map_err(|err| failed(err.error))?;
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}
