//! Filesystem helpers for writing fetched pages to disk.

use std::path::Path;

use crate::BinbResult;

/// Write each `(filename, bytes)` pair into `dir`, creating it if needed.
///
/// Filenames are expected to already be final (e.g. `"0001.jpg"`, produced
/// by [`crate::session::BookSession::fetch_all`]); this just performs the
/// actual writes.
pub fn write_pages(dir: &Path, pages: &[(String, Vec<u8>)]) -> BinbResult<()> {
    std::fs::create_dir_all(dir)?;
    for (filename, bytes) in pages {
        std::fs::write(dir.join(filename), bytes)?;
    }
    Ok(())
}
