use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use sha2::{Digest, Sha256};

use crate::error::FsError;
use crate::result::FsResult;

/// File system abstraction for one repository image.
///
/// Paths are absolute, `/`-separated and relative to the repository root
/// (`/specification.yml`, `/files/logo.png`, `/.git/HEAD`). Writing a file
/// creates any missing parent directories.
pub trait FileSystem: Send + Sync {
    /// Check if a file or directory exists
    fn exists(&self, path: &str) -> bool;

    /// Check if the path is a directory
    fn is_dir(&self, path: &str) -> bool;

    /// Read raw file contents
    fn read(&self, path: &str) -> FsResult<Vec<u8>>;

    /// Write raw file contents, replacing any existing file
    fn write(&self, path: &str, contents: &[u8]) -> FsResult<()>;

    /// Remove a file
    fn remove_file(&self, path: &str) -> FsResult<()>;

    /// Create a directory (and its parents)
    fn create_dir(&self, path: &str) -> FsResult<()>;

    /// List entry names of a directory, sorted
    fn read_dir(&self, path: &str) -> FsResult<Vec<String>>;

    /// Remove everything in the image
    fn wipe(&self) -> FsResult<()>;

    /// Directory holding the image, when it lives on disk
    fn local_root(&self) -> Option<&Path> {
        None
    }

    /// Read a UTF-8 file
    fn read_to_string(&self, path: &str) -> FsResult<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes).map_err(|_| FsError::InvalidUtf8(normalize(path)))
    }

    /// Read a UTF-8 file, mapping "not found" to `None`
    fn read_optional(&self, path: &str) -> FsResult<Option<String>> {
        match self.read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Remove a file if it is present. Returns whether anything was removed.
    fn remove_if_exists(&self, path: &str) -> FsResult<bool> {
        if self.exists(path) && !self.is_dir(path) {
            self.remove_file(path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Normalize a path to `/a/b` form
pub fn normalize(path: &str) -> String {
    let parts: Vec<&str> = path
        .split('/')
        .filter(|p| !p.is_empty() && *p != ".")
        .collect();
    format!("/{}", parts.join("/"))
}

fn parent_of(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => None,
    }
}

#[derive(Debug, Clone)]
enum Entry {
    File(Vec<u8>),
    Dir,
}

/// In-memory file system image
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_parents(entries: &mut BTreeMap<String, Entry>, path: &str) -> FsResult<()> {
        let mut current = parent_of(path);
        while let Some(dir) = current {
            if dir == "/" {
                break;
            }
            match entries.get(&dir) {
                Some(Entry::File(_)) => return Err(FsError::NotADirectory(dir)),
                Some(Entry::Dir) => {}
                None => {
                    entries.insert(dir.clone(), Entry::Dir);
                }
            }
            current = parent_of(&dir);
        }
        Ok(())
    }
}

impl FileSystem for MemoryFileSystem {
    fn exists(&self, path: &str) -> bool {
        let path = normalize(path);
        path == "/"
            || self
                .entries
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .contains_key(&path)
    }

    fn is_dir(&self, path: &str) -> bool {
        let path = normalize(path);
        path == "/"
            || matches!(
                self.entries
                    .read()
                    .unwrap_or_else(|e| e.into_inner())
                    .get(&path),
                Some(Entry::Dir)
            )
    }

    fn read(&self, path: &str) -> FsResult<Vec<u8>> {
        let path = normalize(path);
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        match entries.get(&path) {
            Some(Entry::File(bytes)) => Ok(bytes.clone()),
            Some(Entry::Dir) => Err(FsError::IsADirectory(path)),
            None => Err(FsError::NotFound(path)),
        }
    }

    fn write(&self, path: &str, contents: &[u8]) -> FsResult<()> {
        let path = normalize(path);
        if path == "/" {
            return Err(FsError::IsADirectory(path));
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(Entry::Dir) = entries.get(&path) {
            return Err(FsError::IsADirectory(path));
        }
        Self::ensure_parents(&mut entries, &path)?;
        entries.insert(path, Entry::File(contents.to_vec()));
        Ok(())
    }

    fn remove_file(&self, path: &str) -> FsResult<()> {
        let path = normalize(path);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        match entries.get(&path) {
            Some(Entry::File(_)) => {
                entries.remove(&path);
                Ok(())
            }
            Some(Entry::Dir) => Err(FsError::IsADirectory(path)),
            None => Err(FsError::NotFound(path)),
        }
    }

    fn create_dir(&self, path: &str) -> FsResult<()> {
        let path = normalize(path);
        if path == "/" {
            return Ok(());
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if let Some(Entry::File(_)) = entries.get(&path) {
            return Err(FsError::NotADirectory(path));
        }
        Self::ensure_parents(&mut entries, &path)?;
        entries.insert(path, Entry::Dir);
        Ok(())
    }

    fn read_dir(&self, path: &str) -> FsResult<Vec<String>> {
        let path = normalize(path);
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        if path != "/" {
            match entries.get(&path) {
                Some(Entry::Dir) => {}
                Some(Entry::File(_)) => return Err(FsError::NotADirectory(path)),
                None => return Err(FsError::NotFound(path)),
            }
        }
        let prefix = if path == "/" { "/".to_string() } else { format!("{}/", path) };
        let names = entries
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .collect();
        Ok(names)
    }

    fn wipe(&self) -> FsResult<()> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        Ok(())
    }
}

/// File system image rooted at a directory on disk
#[derive(Debug, Clone)]
pub struct DiskFileSystem {
    root: PathBuf,
}

impl DiskFileSystem {
    pub fn new(root: PathBuf) -> FsResult<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let normalized = normalize(path);
        let relative = normalized.trim_start_matches('/');
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }
}

fn map_io(path: &str, e: std::io::Error) -> FsError {
    if e.kind() == std::io::ErrorKind::NotFound {
        FsError::NotFound(normalize(path))
    } else {
        FsError::Io(e)
    }
}

impl FileSystem for DiskFileSystem {
    fn local_root(&self) -> Option<&Path> {
        Some(&self.root)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn is_dir(&self, path: &str) -> bool {
        self.resolve(path).is_dir()
    }

    fn read(&self, path: &str) -> FsResult<Vec<u8>> {
        let full = self.resolve(path);
        if full.is_dir() {
            return Err(FsError::IsADirectory(normalize(path)));
        }
        std::fs::read(full).map_err(|e| map_io(path, e))
    }

    fn write(&self, path: &str, contents: &[u8]) -> FsResult<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(full, contents)?;
        Ok(())
    }

    fn remove_file(&self, path: &str) -> FsResult<()> {
        let full = self.resolve(path);
        if full.is_dir() {
            return Err(FsError::IsADirectory(normalize(path)));
        }
        std::fs::remove_file(full).map_err(|e| map_io(path, e))
    }

    fn create_dir(&self, path: &str) -> FsResult<()> {
        std::fs::create_dir_all(self.resolve(path))?;
        Ok(())
    }

    fn read_dir(&self, path: &str) -> FsResult<Vec<String>> {
        let full = self.resolve(path);
        if full.is_file() {
            return Err(FsError::NotADirectory(normalize(path)));
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(full).map_err(|e| map_io(path, e))? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn wipe(&self) -> FsResult<()> {
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root)?;
        }
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }
}

/// Hands out one file system image per repository URL
pub trait FileSystemProvider: Send + Sync {
    /// Open the image for `url`, creating it on first access
    fn open(&self, url: &str) -> FsResult<Arc<dyn FileSystem>>;

    /// Open the image for `url` with all of its contents removed
    fn open_wiped(&self, url: &str) -> FsResult<Arc<dyn FileSystem>> {
        let fs = self.open(url)?;
        fs.wipe()?;
        Ok(fs)
    }
}

/// Keeps images in memory for the life of the process
#[derive(Default)]
pub struct MemoryFileSystemProvider {
    images: Mutex<HashMap<String, Arc<MemoryFileSystem>>>,
}

impl MemoryFileSystemProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileSystemProvider for MemoryFileSystemProvider {
    fn open(&self, url: &str) -> FsResult<Arc<dyn FileSystem>> {
        let mut images = self.images.lock().unwrap_or_else(|e| e.into_inner());
        let fs = images
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(MemoryFileSystem::new()))
            .clone();
        Ok(fs)
    }
}

/// Keeps each image in its own directory under a common root.
///
/// Directory names are derived from a hash of the URL so arbitrary URLs map
/// onto safe names.
#[derive(Debug, Clone)]
pub struct DiskFileSystemProvider {
    root: PathBuf,
}

impl DiskFileSystemProvider {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn image_dir(&self, url: &str) -> PathBuf {
        let digest = Sha256::digest(url.as_bytes());
        let name: String = digest[..16].iter().map(|b| format!("{:02x}", b)).collect();
        self.root.join(name)
    }
}

impl FileSystemProvider for DiskFileSystemProvider {
    fn open(&self, url: &str) -> FsResult<Arc<dyn FileSystem>> {
        Ok(Arc::new(DiskFileSystem::new(self.image_dir(url))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("specification.yml"), "/specification.yml");
        assert_eq!(normalize("//files//a.png/"), "/files/a.png");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize(""), "/");
    }

    #[test]
    fn test_memory_write_creates_parents() {
        let fs = MemoryFileSystem::new();
        fs.write("/files/img/logo.png", b"png").unwrap();

        assert!(fs.is_dir("/files"));
        assert!(fs.is_dir("/files/img"));
        assert_eq!(fs.read("/files/img/logo.png").unwrap(), b"png");
        assert_eq!(fs.read_dir("/").unwrap(), vec!["files"]);
        assert_eq!(fs.read_dir("/files").unwrap(), vec!["img"]);
    }

    #[test]
    fn test_memory_missing_file() {
        let fs = MemoryFileSystem::new();
        let err = fs.read("/nope.md").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(fs.read_optional("/nope.md").unwrap(), None);
        assert!(!fs.remove_if_exists("/nope.md").unwrap());
    }

    #[test]
    fn test_memory_remove_and_wipe() {
        let fs = MemoryFileSystem::new();
        fs.write("/a.md", b"a").unwrap();
        fs.write("/b.md", b"b").unwrap();

        fs.remove_file("/a.md").unwrap();
        assert!(!fs.exists("/a.md"));
        assert!(fs.exists("/b.md"));

        fs.wipe().unwrap();
        assert!(fs.read_dir("/").unwrap().is_empty());
    }

    #[test]
    fn test_memory_provider_reuses_image() {
        let provider = MemoryFileSystemProvider::new();
        let fs = provider.open("https://example.com/repo.git").unwrap();
        fs.write("/x.md", b"x").unwrap();

        let again = provider.open("https://example.com/repo.git").unwrap();
        assert!(again.exists("/x.md"));

        let wiped = provider.open_wiped("https://example.com/repo.git").unwrap();
        assert!(!wiped.exists("/x.md"));
    }

    #[test]
    fn test_disk_file_system() {
        let dir = tempfile::tempdir().unwrap();
        let provider = DiskFileSystemProvider::new(dir.path().to_path_buf());
        let fs = provider.open("https://example.com/repo.git").unwrap();

        fs.write("/files/notes.txt", b"hello").unwrap();
        assert_eq!(fs.read_to_string("/files/notes.txt").unwrap(), "hello");
        assert_eq!(fs.read_dir("/files").unwrap(), vec!["notes.txt"]);

        fs.remove_file("/files/notes.txt").unwrap();
        assert!(fs.read("/files/notes.txt").unwrap_err().is_not_found());

        fs.write("/a.md", b"a").unwrap();
        fs.wipe().unwrap();
        assert!(fs.read_dir("/").unwrap().is_empty());

        let root = fs.local_root().unwrap();
        assert_eq!(root, provider.image_dir("https://example.com/repo.git"));
        assert!(MemoryFileSystem::new().local_root().is_none());
    }
}
