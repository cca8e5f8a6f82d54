use media_api::{Listing, Storage, StorageError};
use parking_lot::Mutex;
use std::{
    collections::{BTreeSet, HashSet},
    fs, io,
    path::{Component, Path, PathBuf},
};
use tracing::{debug, warn};

/// Media storage in a directory on local disk.
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root directory if needed.
    pub fn create(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a storage path onto disk, refusing anything that escapes the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path.trim_start_matches('/'));
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => return Err(StorageError::InvalidPath(path.to_string())),
            }
        }
        Ok(self.root.join(relative))
    }
}

fn map_io(path: &str, err: io::Error) -> StorageError {
    match err.kind() {
        io::ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
        io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(path.to_string()),
        _ => StorageError::Io {
            path: path.to_string(),
            source: err,
        },
    }
}

impl Storage for LocalStorage {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    fn list_dir(&self, path: &str) -> Result<Listing, StorageError> {
        let dir = self.resolve(path)?;
        let mut listing = Listing::default();
        for entry in fs::read_dir(&dir).map_err(|e| map_io(path, e))? {
            let entry = entry.map_err(|e| map_io(path, e))?;
            let file_type = entry.file_type().map_err(|e| map_io(path, e))?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!("skipping non UTF-8 entry {:?} in {}", raw, dir.display());
                    continue;
                }
            };
            if file_type.is_dir() {
                listing.dirs.push(name);
            } else if file_type.is_file() {
                listing.files.push(name);
            } else {
                debug!("skipping {} in {}: not a regular file", name, dir.display());
            }
        }
        listing.dirs.sort();
        listing.files.sort();
        Ok(listing)
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let full = self.resolve(path)?;
        full.try_exists().map_err(|e| map_io(path, e))
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        if full == self.root {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        let metadata = fs::symlink_metadata(&full).map_err(|e| map_io(path, e))?;
        if metadata.is_dir() {
            fs::remove_dir(&full).map_err(|e| map_io(path, e))
        } else {
            fs::remove_file(&full).map_err(|e| map_io(path, e))
        }
    }
}

/// Object-store style storage kept in memory: a flat set of keys where
/// directories only exist as key prefixes.
#[derive(Default)]
pub struct MemoryStorage {
    files: Mutex<BTreeSet<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<I, S>(files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let storage = Self::new();
        for file in files {
            storage.put(file.as_ref());
        }
        storage
    }

    pub fn put(&self, path: &str) {
        self.files.lock().insert(normalize(path).to_string());
    }

    pub fn files(&self) -> Vec<String> {
        self.files.lock().iter().cloned().collect()
    }

    fn is_dir(files: &BTreeSet<String>, dir: &str) -> bool {
        dir.is_empty() || files.iter().any(|f| f.starts_with(&format!("{}/", dir)))
    }
}

fn normalize(path: &str) -> &str {
    path.trim_matches('/')
}

impl Storage for MemoryStorage {
    fn location(&self) -> String {
        "memory://".to_string()
    }

    fn list_dir(&self, path: &str) -> Result<Listing, StorageError> {
        let dir = normalize(path);
        let files = self.files.lock();
        if !Self::is_dir(&files, dir) {
            return Err(StorageError::NotFound(path.to_string()));
        }
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };
        let mut listing = Listing::default();
        let mut seen_dirs = HashSet::new();
        for key in files.iter().filter(|f| f.starts_with(&prefix)) {
            let rest = &key[prefix.len()..];
            match rest.split_once('/') {
                Some((sub, _)) => {
                    if seen_dirs.insert(sub.to_string()) {
                        listing.dirs.push(sub.to_string());
                    }
                }
                None => listing.files.push(rest.to_string()),
            }
        }
        Ok(listing)
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let key = normalize(path);
        let files = self.files.lock();
        Ok(files.contains(key) || Self::is_dir(&files, key))
    }

    fn delete(&self, path: &str) -> Result<(), StorageError> {
        let key = normalize(path);
        let mut files = self.files.lock();
        if files.remove(key) {
            return Ok(());
        }
        if Self::is_dir(&files, key) {
            return Err(StorageError::Io {
                path: path.to_string(),
                source: io::Error::new(io::ErrorKind::Other, "directory not empty"),
            });
        }
        Err(StorageError::NotFound(path.to_string()))
    }
}
