//! User attachments stored under `/files`.

use specbook_common::FileSystem;

use crate::error::{SyncError, SyncResult};
use crate::git::GitEngine;
use crate::layout::{attachment_file, FILES_DIR, GIT_DIR};

const OCTET_STREAM: &str = "application/octet-stream";

/// File contents with a content type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

/// Content type for the image formats browsers render inline
pub fn guess_mime_type(file: &str) -> &'static str {
    let extension = file.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match extension.as_str() {
        "svg" => "image/svg+xml",
        "apng" => "image/apng",
        "avif" => "image/avif",
        "gif" => "image/gif",
        "jpg" | "jpeg" => "image/jpg",
        "png" => "image/png",
        "webp" => "image/webp",
        _ => OCTET_STREAM,
    }
}

/// A bare file name; anything that could escape `/files` is refused
fn check_name(name: &str) -> SyncResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return Err(SyncError::InvalidFileName(name.to_string()));
    }
    Ok(())
}

/// Entry names under `path`, without the git directory. A missing
/// directory lists as empty.
pub fn list_files(fs: &dyn FileSystem, path: &str) -> SyncResult<Vec<String>> {
    match fs.read_dir(path) {
        Ok(names) => Ok(names.into_iter().filter(|n| n != GIT_DIR).collect()),
        Err(e) if e.is_not_found() => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// Store `data` as `/files/<name>`. The file is staged on the next commit.
pub fn upload_file(fs: &dyn FileSystem, name: &str, data: &[u8]) -> SyncResult<()> {
    check_name(name)?;
    fs.create_dir(FILES_DIR)?;
    fs.write(&attachment_file(name), data)?;
    Ok(())
}

/// Unstage and delete `/files/<name>`
pub async fn delete_file(git: &dyn GitEngine, fs: &dyn FileSystem, name: &str) -> SyncResult<()> {
    check_name(name)?;
    let path = attachment_file(name);
    git.remove(fs, &path).await?;
    fs.remove_file(&path)?;
    Ok(())
}

/// Contents of `file` (relative to the repository root), or `None` when it
/// does not exist
pub fn fetch_file_as_blob(fs: &dyn FileSystem, file: &str, guess_mime: bool) -> SyncResult<Option<Blob>> {
    if !fs.exists(file) || fs.is_dir(file) {
        return Ok(None);
    }
    let bytes = fs.read(file)?;
    let mime_type = if guess_mime { guess_mime_type(file) } else { OCTET_STREAM };
    Ok(Some(Blob { bytes, mime_type }))
}

pub fn is_file_in_repository(fs: &dyn FileSystem, file: &str) -> bool {
    fs.exists(file)
}
