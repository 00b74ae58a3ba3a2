//! Where template sources come from.
//!
//! Template names are `/`-rooted paths with `.` and `..` already resolved
//! (see [`canonical_path`]). A [`Loader`] maps such a name to bytes.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::PathBuf;
use std::sync::RwLock;

/// Source of template text.
pub trait Loader: Send + Sync {
    /// Whether a template exists under this canonical name.
    fn exists(&self, path: &str) -> bool;

    /// Open the template for reading.
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>>;
}

/// Loads templates from a directory on disk.
#[derive(Debug, Clone)]
pub struct OsFileSystemLoader {
    root: PathBuf,
}

impl OsFileSystemLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl Loader for OsFileSystemLoader {
    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(File::open(self.resolve(path))?))
    }
}

/// Keeps template sources in memory.
#[derive(Debug, Default)]
pub struct InMemLoader {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a template. `path` is canonicalised first.
    pub fn set(&self, path: &str, source: impl Into<Vec<u8>>) -> io::Result<()> {
        let mut files = self
            .files
            .write()
            .map_err(|_| io::Error::other("lock poisoned"))?;
        files.insert(canonical_path("/", path), source.into());
        Ok(())
    }

    pub fn remove(&self, path: &str) -> io::Result<bool> {
        let mut files = self
            .files
            .write()
            .map_err(|_| io::Error::other("lock poisoned"))?;
        Ok(files.remove(&canonical_path("/", path)).is_some())
    }
}

impl Loader for InMemLoader {
    fn exists(&self, path: &str) -> bool {
        self.files
            .read()
            .map(|files| files.contains_key(path))
            .unwrap_or(false)
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        let files = self
            .files
            .read()
            .map_err(|_| io::Error::other("lock poisoned"))?;
        match files.get(path) {
            Some(source) => Ok(Box::new(Cursor::new(source.clone()))),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{path}: no such template"),
            )),
        }
    }
}

/// Resolve `path` against `base_dir` into a canonical template name.
///
/// Absolute paths ignore `base_dir`. `..` never climbs above the root.
pub fn canonical_path(base_dir: &str, path: &str) -> String {
    let joined = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{base_dir}/{path}")
    };
    let mut parts: Vec<&str> = Vec::new();
    for part in joined.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            _ => parts.push(part),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Directory part of a canonical template name.
pub fn dir_of(name: &str) -> &str {
    match name.rfind('/') {
        Some(0) | None => "/",
        Some(i) => &name[..i],
    }
}
