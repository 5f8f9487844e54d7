//! Small filesystem helpers shared by the config layer and the local store.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

/// Write `data` to `path` through a sibling temp file and an atomic rename.
///
/// Readers observe either the previous contents or the new contents, never a partial file.
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = parent_dir(path)?;
    std::fs::create_dir_all(dir)?;
    staged(dir, data)?.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// Like [`atomic_write`], but fails with `ErrorKind::AlreadyExists` instead of replacing `path`.
pub fn atomic_write_new(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = parent_dir(path)?;
    staged(dir, data)?
        .persist_noclobber(path)
        .map_err(|err| err.error)?;
    Ok(())
}

fn parent_dir(path: &Path) -> std::io::Result<&Path> {
    path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "target path has no parent directory",
        )
    })
}

/// Synced temp file next to the target, removed on drop unless persisted.
fn staged(dir: &Path, data: &[u8]) -> std::io::Result<NamedTempFile> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".scribble-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}
