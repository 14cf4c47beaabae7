use std::path::PathBuf;

use rangefetch_core::AppError;

/// Copy `source` from each record into a column named `column`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub source: String,
    pub column: String,
}

impl FieldMapping {
    pub fn new(source: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            column: column.into(),
        }
    }

    /// `Field` keeps the name, `Field:Column` renames it.
    pub fn parse(spec: &str) -> Result<Self, AppError> {
        let spec = spec.trim();
        let (source, column) = match spec.split_once(':') {
            Some((source, column)) => (source.trim(), column.trim()),
            None => (spec, spec),
        };
        if source.is_empty() || column.is_empty() {
            return Err(AppError::ConfigError(format!(
                "invalid field mapping '{spec}', expected FIELD or FIELD:COLUMN"
            )));
        }
        Ok(Self::new(source, column))
    }

    /// Parse a comma-separated list of mappings.
    pub fn parse_list(list: &str) -> Result<Vec<Self>, AppError> {
        list.split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Self::parse)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionFormat {
    Csv,
    Json,
    Xlsx,
}

impl ProjectionFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ProjectionFormat::Csv => "csv",
            ProjectionFormat::Json => "json",
            ProjectionFormat::Xlsx => "xlsx",
        }
    }
}

/// A reduced view of the records written next to the full export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub name: String,
    pub format: ProjectionFormat,
    pub fields: Vec<FieldMapping>,
}

impl Projection {
    pub fn new(name: impl Into<String>, format: ProjectionFormat, fields: Vec<FieldMapping>) -> Self {
        Self {
            name: name.into(),
            format,
            fields,
        }
    }
}

/// Where and how checkpoints are written.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    /// File stem of the full record exports.
    pub records_name: String,
    pub errors_name: String,
    pub projections: Vec<Projection>,
    /// Also write the full records as line-delimited JSON.
    pub jsonl: bool,
    /// Also write the full records and the error log as `.xlsx` workbooks.
    pub spreadsheet: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("results"),
            records_name: "all_cinemas_data".to_string(),
            errors_name: "error_logs".to_string(),
            projections: vec![
                Projection::new(
                    "cinema_name_zzid",
                    ProjectionFormat::Xlsx,
                    vec![
                        FieldMapping::new("CinemaID", "CinemaID"),
                        FieldMapping::new("CinemaName", "CinemaName"),
                        FieldMapping::new("ZZID", "ZZID"),
                        FieldMapping::new("ProvinceName", "Province"),
                        FieldMapping::new("CityName", "City"),
                    ],
                ),
                Projection::new(
                    "cinema_simple",
                    ProjectionFormat::Json,
                    vec![
                        FieldMapping::new("CinemaName", "CinemaName"),
                        FieldMapping::new("ZZID", "ZZID"),
                        FieldMapping::new("CinemaID", "CinemaID"),
                    ],
                ),
            ],
            jsonl: true,
            spreadsheet: true,
        }
    }
}

impl ExportConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    /// Replace every projection with the same field list, written as both CSV and JSON.
    pub fn with_fields(mut self, name: impl Into<String>, fields: Vec<FieldMapping>) -> Self {
        let name = name.into();
        self.projections = vec![
            Projection::new(name.clone(), ProjectionFormat::Csv, fields.clone()),
            Projection::new(name, ProjectionFormat::Json, fields),
        ];
        self
    }

    pub fn without_projections(mut self) -> Self {
        self.projections.clear();
        self
    }

    pub fn with_jsonl(mut self, enabled: bool) -> Self {
        self.jsonl = enabled;
        self
    }

    /// Turning spreadsheets off also moves `.xlsx` projections to CSV.
    pub fn with_spreadsheet(mut self, enabled: bool) -> Self {
        self.spreadsheet = enabled;
        if !enabled {
            for projection in &mut self.projections {
                if projection.format == ProjectionFormat::Xlsx {
                    projection.format = ProjectionFormat::Csv;
                }
            }
        }
        self
    }
}
