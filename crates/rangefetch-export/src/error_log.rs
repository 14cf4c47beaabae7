//! Error logs: written at each checkpoint, read back for a targeted re-run.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::Path;

use rangefetch_core::AppError;
use rangefetch_core::models::{ErrorRecord, Identifier};

/// Header names accepted for the identifier column, in order of preference.
const ID_COLUMNS: &[&str] = &["id", "cinemaid"];

pub fn write_errors_csv(out: &mut dyn Write, errors: &[ErrorRecord]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(out);
    for error in errors {
        writer
            .serialize(error)
            .map_err(|e| AppError::ExportError(format!("Failed to write error log: {e}")))?;
    }
    writer.flush()?;
    Ok(())
}

/// Identifiers from an error-log CSV, de-duplicated, in file order.
pub fn load_error_ids(path: &Path) -> Result<Vec<Identifier>, AppError> {
    let file = std::fs::File::open(path).map_err(|e| {
        AppError::ExportError(format!("Failed to open error log {}: {e}", path.display()))
    })?;
    let ids = read_error_ids(file)?;
    tracing::info!(path = %path.display(), count = ids.len(), "Loaded identifiers from error log");
    Ok(ids)
}

pub fn read_error_ids(input: impl Read) -> Result<Vec<Identifier>, AppError> {
    let mut reader = csv::Reader::from_reader(input);
    let headers = reader
        .headers()
        .map_err(|e| AppError::ExportError(format!("Failed to read error log header: {e}")))?
        .clone();

    let column = ID_COLUMNS
        .iter()
        .find_map(|name| headers.iter().position(|h| h.trim() == *name))
        .ok_or_else(|| {
            AppError::ExportError(format!(
                "Error log has no identifier column (expected one of {})",
                ID_COLUMNS.join(", ")
            ))
        })?;

    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row.map_err(|e| AppError::ExportError(format!("Bad error log row: {e}")))?;
        let raw = row.get(column).unwrap_or_default().trim();
        if raw.is_empty() {
            continue;
        }
        let id: Identifier = raw.parse().map_err(|_| {
            // +2: one for the header, one for 1-based numbering.
            AppError::ExportError(format!("Invalid identifier '{raw}' on line {}", line + 2))
        })?;
        if seen.insert(id) {
            ids.push(id);
        }
    }
    Ok(ids)
}
