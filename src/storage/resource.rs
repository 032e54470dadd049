use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::storage::{Error, Result};

/// Filesystem-backed resource storage, split into the two buckets the
/// contexts know about: service-template (`blueprint`) resources and
/// service-instance (`deployment`) resources.
///
/// A missing entry or path surfaces as [`Error::Storage`]; the contexts
/// use that as the signal to fall through from the deployment bucket to
/// the blueprint bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceStorage {
    root: PathBuf,
}

impl ResourceStorage {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    #[must_use]
    pub fn blueprint(&self) -> ResourceBucket {
        ResourceBucket {
            dir: self.root.join("blueprint"),
        }
    }

    #[must_use]
    pub fn deployment(&self) -> ResourceBucket {
        ResourceBucket {
            dir: self.root.join("deployment"),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// One bucket of entries; an entry is a directory of resources keyed by
/// relative path.
#[derive(Debug, Clone)]
pub struct ResourceBucket {
    dir: PathBuf,
}

impl ResourceBucket {
    fn entry_path(&self, entry_id: &str, path: Option<&str>) -> PathBuf {
        let entry = self.dir.join(entry_id);
        match path {
            Some(path) => entry.join(path),
            None => entry,
        }
    }

    fn existing(&self, entry_id: &str, path: Option<&str>) -> Result<PathBuf> {
        let source = self.entry_path(entry_id, path);
        if source.exists() {
            Ok(source)
        } else {
            Err(Error::Storage {
                message: format!("resource not found: {}", source.display()),
            })
        }
    }

    /// Store bytes under `entry_id/path`, creating parents as needed.
    pub fn put(&self, entry_id: &str, path: &str, content: &[u8]) -> Result<()> {
        let destination = self.entry_path(entry_id, Some(path));
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(destination, content)?;
        Ok(())
    }

    /// Copy a resource (file or directory tree) to `destination`.
    pub fn download(&self, entry_id: &str, destination: &Path, path: Option<&str>) -> Result<()> {
        let source = self.existing(entry_id, path)?;
        if source.is_dir() {
            copy_tree(&source, destination)
        } else {
            if let Some(parent) = destination.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&source, destination)?;
            Ok(())
        }
    }

    pub fn read(&self, entry_id: &str, path: &str) -> Result<Vec<u8>> {
        let source = self.existing(entry_id, Some(path))?;
        Ok(fs::read(source)?)
    }
}

fn copy_tree(source: &Path, destination: &Path) -> Result<()> {
    fs::create_dir_all(destination)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let target = destination.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
