use std::path::PathBuf;

use chrono::Local;
use rangefetch_core::AppError;
use rangefetch_core::models::Snapshot;
use rangefetch_core::traits::CheckpointSink;
use serde_json::Value;

use crate::atomic::{ensure_writable, write_atomic};
use crate::config::{ExportConfig, ProjectionFormat};
use crate::error_log::write_errors_csv;
use crate::spreadsheet::{write_errors_xlsx, write_projection_xlsx, write_records_xlsx};
use crate::table::{project, write_projection_csv, write_records_csv};

/// Checkpoint sink writing timestamped CSV, JSON and XLSX files into one directory.
///
/// Every save produces a fresh set of files named `<stem>_<YYYYmmdd_HHMMSS>.<ext>`;
/// earlier checkpoints are left in place. Empty collections produce no file.
#[derive(Debug, Clone)]
pub struct FileSink {
    config: ExportConfig,
}

impl FileSink {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Write every file for `snapshot` and return their paths.
    pub fn write(&self, snapshot: &Snapshot) -> Result<Vec<PathBuf>, AppError> {
        let stamp = snapshot
            .taken_at
            .with_timezone(&Local)
            .format("%Y%m%d_%H%M%S")
            .to_string();
        let dir = &self.config.output_dir;
        let mut written = Vec::new();

        if !snapshot.records.is_empty() {
            let records = &snapshot.records;
            let stem = &self.config.records_name;

            let path = dir.join(format!("{stem}_{stamp}.json"));
            write_atomic(&path, |out| {
                let rows: Vec<&Value> = records.iter().map(|r| &r.data).collect();
                serde_json::to_writer(&mut *out, &rows)?;
                Ok(())
            })?;
            written.push(path);

            let path = dir.join(format!("{stem}_{stamp}.csv"));
            write_atomic(&path, |out| write_records_csv(out, records))?;
            written.push(path);

            if self.config.spreadsheet {
                let path = dir.join(format!("{stem}_{stamp}.xlsx"));
                write_atomic(&path, |out| write_records_xlsx(out, records))?;
                written.push(path);
            }

            if self.config.jsonl {
                let path = dir.join(format!("{stem}_{stamp}.jsonl"));
                write_atomic(&path, |out| {
                    for record in records {
                        serde_json::to_writer(&mut *out, &record.data)?;
                        out.write_all(b"\n")?;
                    }
                    Ok(())
                })?;
                written.push(path);
            }

            for projection in &self.config.projections {
                let path = dir.join(format!(
                    "{}_{stamp}.{}",
                    projection.name,
                    projection.format.extension()
                ));
                match projection.format {
                    ProjectionFormat::Csv => write_atomic(&path, |out| {
                        write_projection_csv(out, records, &projection.fields)
                    })?,
                    ProjectionFormat::Json => write_atomic(&path, |out| {
                        let rows: Vec<_> = records
                            .iter()
                            .map(|r| project(r, &projection.fields))
                            .collect();
                        serde_json::to_writer_pretty(&mut *out, &rows)?;
                        Ok(())
                    })?,
                    ProjectionFormat::Xlsx => write_atomic(&path, |out| {
                        write_projection_xlsx(out, records, &projection.fields)
                    })?,
                }
                written.push(path);
            }
        }

        if !snapshot.errors.is_empty() {
            let path = dir.join(format!("{}_{stamp}.csv", self.config.errors_name));
            write_atomic(&path, |out| write_errors_csv(out, &snapshot.errors))?;
            written.push(path);

            if self.config.spreadsheet {
                let path = dir.join(format!("{}_{stamp}.xlsx", self.config.errors_name));
                write_atomic(&path, |out| write_errors_xlsx(out, &snapshot.errors))?;
                written.push(path);
            }
        }

        Ok(written)
    }
}

impl CheckpointSink for FileSink {
    fn prepare(&self) -> Result<(), AppError> {
        let dir = &self.config.output_dir;
        std::fs::create_dir_all(dir).map_err(|e| {
            AppError::ExportError(format!(
                "Failed to create output directory {}: {e}",
                dir.display()
            ))
        })?;
        ensure_writable(dir)?;
        tracing::debug!(dir = %dir.display(), "Output directory ready");
        Ok(())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), AppError> {
        let written = self.write(snapshot)?;
        tracing::debug!(
            kind = %snapshot.kind,
            files = written.len(),
            dir = %self.config.output_dir.display(),
            "Checkpoint files written"
        );
        Ok(())
    }
}
