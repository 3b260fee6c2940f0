// src/fs/mod.rs

//! Filesystem abstraction.
//!
//! The filesystem is the only persisted state of a run: presence and
//! modification time of every input and output decide what has to run.
//! Everything that reads that state (configuration resolver, staleness
//! evaluation, output bookkeeping in the executor) goes through
//! [`FileSystem`] so tests can use [`mock::MockFileSystem`].

use std::fmt::Debug;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result};

pub mod mock;

/// Abstract filesystem interface.
pub trait FileSystem: Send + Sync + Debug {
    fn read_to_string(&self, path: &Path) -> Result<String>;
    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>>;
    fn write(&self, path: &Path, contents: &[u8]) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    fn canonicalize(&self, path: &Path) -> Result<PathBuf>;

    /// Return a list of entries in a directory.
    /// Returns full paths.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Modification time of `path`, or `None` if it does not exist.
    fn modified(&self, path: &Path) -> Result<Option<SystemTime>>;

    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Remove a file or a whole directory tree. Missing paths are not an error.
    fn remove(&self, path: &Path) -> Result<()>;

    /// Set the modification time of an existing file or directory to now.
    fn touch(&self, path: &Path) -> Result<()>;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).with_context(|| format!("reading file {:?}", path))
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn Read + Send>> {
        let file = fs::File::open(path).with_context(|| format!("opening file {:?}", path))?;
        Ok(Box::new(file))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
        }
        let mut file = fs::File::create(path).with_context(|| format!("creating file {:?}", path))?;
        file.write_all(contents).with_context(|| format!("writing to file {:?}", path))?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        fs::canonicalize(path).with_context(|| format!("canonicalizing {:?}", path))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path).with_context(|| format!("reading dir {:?}", path))? {
            let entry = entry?;
            entries.push(entry.path());
        }
        Ok(entries)
    }

    fn modified(&self, path: &Path) -> Result<Option<SystemTime>> {
        match fs::metadata(path) {
            Ok(meta) => {
                let mtime = meta
                    .modified()
                    .with_context(|| format!("reading modification time of {:?}", path))?;
                Ok(Some(mtime))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading metadata of {:?}", path)),
        }
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("creating dir {:?}", path))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        let meta = match fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e).with_context(|| format!("reading metadata of {:?}", path)),
        };
        if meta.is_dir() {
            fs::remove_dir_all(path).with_context(|| format!("removing dir {:?}", path))
        } else {
            fs::remove_file(path).with_context(|| format!("removing file {:?}", path))
        }
    }

    fn touch(&self, path: &Path) -> Result<()> {
        let file = fs::File::open(path).with_context(|| format!("opening {:?} to touch", path))?;
        file.set_modified(SystemTime::now())
            .with_context(|| format!("updating modification time of {:?}", path))
    }
}

/// A [`FileSystem`] anchored at the pipeline's working directory.
///
/// Matches, templates and commands all use paths relative to the working
/// directory (commands run with it as their cwd); `Workspace` turns them into
/// real paths whenever the filesystem itself is consulted.
#[derive(Debug, Clone)]
pub struct Workspace {
    fs: Arc<dyn FileSystem>,
    root: PathBuf,
}

impl Workspace {
    pub fn new(fs: Arc<dyn FileSystem>, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }

    /// Workspace on the real filesystem.
    pub fn real(root: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(RealFileSystem), root)
    }

    pub fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a workspace-relative path. Absolute paths are returned as is.
    pub fn path(&self, rel: &Path) -> PathBuf {
        if rel.is_absolute() {
            rel.to_path_buf()
        } else {
            self.root.join(rel)
        }
    }

    pub fn exists(&self, rel: &Path) -> bool {
        self.fs.exists(&self.path(rel))
    }

    pub fn modified(&self, rel: &Path) -> Result<Option<SystemTime>> {
        self.fs.modified(&self.path(rel))
    }

    /// List a directory, returning entries relative to the workspace root.
    pub fn list_dir(&self, rel: &Path) -> Result<Vec<PathBuf>> {
        let entries = self.fs.read_dir(&self.path(rel))?;
        Ok(entries
            .into_iter()
            .map(|p| match p.strip_prefix(&self.root) {
                Ok(stripped) if !rel.is_absolute() => stripped.to_path_buf(),
                _ => p,
            })
            .collect())
    }

    pub fn is_dir(&self, rel: &Path) -> bool {
        self.fs.is_dir(&self.path(rel))
    }
}
