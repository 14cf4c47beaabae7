//! Temp-file-then-rename writes.
//!
//! A reader of the output directory sees either the previous file or the
//! complete new one, never a partial write.

use std::io::{BufWriter, Write};
use std::path::Path;

use rangefetch_core::AppError;
use tempfile::NamedTempFile;

/// Write `path` atomically. `fill` receives a buffered writer over the temp file.
pub fn write_atomic<F>(path: &Path, fill: F) -> Result<(), AppError>
where
    F: FnOnce(&mut dyn Write) -> Result<(), AppError>,
{
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let temp = NamedTempFile::new_in(parent)
        .map_err(|e| AppError::ExportError(format!("Failed to create temp file: {e}")))?;

    let mut writer = BufWriter::new(temp);
    fill(&mut writer)?;
    let temp = writer
        .into_inner()
        .map_err(|e| AppError::ExportError(format!("Failed to flush temp file: {e}")))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| AppError::ExportError(format!("Failed to sync temp file: {e}")))?;

    temp.persist(path).map_err(|e| {
        AppError::ExportError(format!("Failed to persist {}: {e}", path.display()))
    })?;
    Ok(())
}

/// Check that a temp file can be created in `dir`.
pub fn ensure_writable(dir: &Path) -> Result<(), AppError> {
    NamedTempFile::new_in(dir).map(drop).map_err(|e| {
        AppError::ExportError(format!(
            "Output directory {} is not writable: {e}",
            dir.display()
        ))
    })
}
