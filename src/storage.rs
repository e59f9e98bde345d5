use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Writes `contents` to a temporary file next to `path`, syncs it and renames
/// it over `path`. Readers see either the previous file or the complete new
/// one, and a failed write leaves nothing behind.
pub fn write_atomically(path: &Path, contents: &[&[u8]]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    // Dropped on every early return, which removes the temporary file.
    let mut file = NamedTempFile::new_in(parent)?;
    for part in contents {
        file.write_all(part)?;
    }
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
