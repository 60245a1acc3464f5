//! Snapshot of the files a server hands out.
//!
//! The catalog is filled by a single directory scan (`attach`) before
//! serving starts and is read-only afterwards, so it is shared between
//! worker threads behind a plain `Arc` without locking. Random selection
//! uses the calling thread's own generator.

use rand::Rng;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A file captured at attach time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    /// Size observed during the scan. Not refreshed afterwards.
    pub size: u64,
}

impl FileEntry {
    /// File name without its directory.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A file chosen for serving, opened for reading.
pub struct FileStream {
    pub name: String,
    /// Size recorded in the catalog, not re-checked on open.
    pub size: u64,
    pub reader: Box<dyn Read + Send>,
}

impl std::fmt::Debug for FileStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStream")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Anything that can hand out a random file to serve.
pub trait FileSource: Send + Sync {
    fn get_random_file(&self) -> Result<FileStream, CatalogError>;
}

/// Immutable list of servable files in one directory.
#[derive(Debug)]
pub struct FileCatalog {
    dir: PathBuf,
    files: Vec<FileEntry>,
}

impl FileCatalog {
    /// Create an empty catalog for `dir`. Call `attach` before serving.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            files: Vec::new(),
        }
    }

    /// Scan the directory, replacing any previous contents.
    ///
    /// Only regular files are recorded; entries are kept in path order.
    /// Returns the number of files found.
    pub fn attach(&mut self) -> Result<usize, CatalogError> {
        let io_err = |source: std::io::Error| CatalogError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let metadata = entry.metadata().map_err(io_err)?;
            if !metadata.is_file() {
                debug!(path = %entry.path().display(), "Skipping non-file entry");
                continue;
            }
            files.push(FileEntry {
                path: entry.path(),
                size: metadata.len(),
            });
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));

        self.files = files;

        info!(
            dir = %self.dir.display(),
            files = self.files.len(),
            total_bytes = self.files.iter().map(|f| f.size).sum::<u64>(),
            "Catalog attached"
        );

        Ok(self.files.len())
    }

    pub fn count(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Draw a uniformly random index in `[0, count)`.
    ///
    /// Uses the calling thread's generator, created lazily on first use.
    pub fn random_index(&self) -> Option<usize> {
        if self.files.is_empty() {
            return None;
        }
        Some(rand::thread_rng().gen_range(0..self.files.len()))
    }

    /// Pick a random file and open it for reading.
    pub fn get_random_file(&self) -> Result<FileStream, CatalogError> {
        let idx = self.random_index().ok_or(CatalogError::Empty)?;
        let entry = &self.files[idx];

        let file = File::open(&entry.path).map_err(|source| CatalogError::Io {
            path: entry.path.clone(),
            source,
        })?;

        Ok(FileStream {
            name: entry.display_name(),
            size: entry.size,
            reader: Box::new(file),
        })
    }
}

impl FileSource for FileCatalog {
    fn get_random_file(&self) -> Result<FileStream, CatalogError> {
        FileCatalog::get_random_file(self)
    }
}

/// File catalog errors.
#[derive(Debug)]
pub enum CatalogError {
    /// No files to choose from.
    Empty,
    /// Scanning the directory or opening a file failed.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::Empty => write!(f, "no files available"),
            CatalogError::Io { path, source } => {
                write!(f, "I/O error on '{}': {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for CatalogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogError::Io { source, .. } => Some(source),
            CatalogError::Empty => None,
        }
    }
}
