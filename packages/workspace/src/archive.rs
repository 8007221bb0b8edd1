//! Zip archive of an entire repository image, git data included.

use std::io::{Cursor, Write};

use specbook_common::FileSystem;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::SyncResult;

pub fn archive_repository(fs: &dyn FileSystem) -> SyncResult<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    add_dir(&mut zip, fs, "", options)?;

    Ok(zip.finish()?.into_inner())
}

fn add_dir(
    zip: &mut ZipWriter<Cursor<Vec<u8>>>,
    fs: &dyn FileSystem,
    dir: &str,
    options: SimpleFileOptions,
) -> SyncResult<()> {
    for name in fs.read_dir(if dir.is_empty() { "/" } else { dir })? {
        let path = if dir.is_empty() { name } else { format!("{}/{}", dir, name) };
        if fs.is_dir(&path) {
            add_dir(zip, fs, &path, options)?;
        } else {
            let contents = fs.read(&path)?;
            zip.start_file(path, options)?;
            zip.write_all(&contents).map_err(ZipError::from)?;
        }
    }
    Ok(())
}
