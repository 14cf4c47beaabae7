//! Excel workbooks: one worksheet, a header row, one row per record.

use std::borrow::Cow;
use std::io::Write;

use rangefetch_core::AppError;
use rangefetch_core::models::{ErrorRecord, SuccessRecord};
use rust_xlsxwriter::{ColNum, RowNum, Workbook, Worksheet, XlsxError};
use serde_json::Value;

use crate::config::FieldMapping;
use crate::table::{field, union_columns};

/// Largest integer an Excel number cell holds without rounding (2^53).
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

const ERROR_COLUMNS: [&str; 3] = ["id", "error", "timestamp"];

#[derive(Debug, PartialEq)]
enum Cell<'a> {
    Blank,
    Text(Cow<'a, str>),
    Number(f64),
    Bool(bool),
}

impl<'a> Cell<'a> {
    /// Integers too wide for a double stay text so identifiers are not rounded.
    fn from_value(value: Option<&'a Value>) -> Self {
        match value {
            None | Some(Value::Null) => Cell::Blank,
            Some(Value::String(s)) => Cell::Text(Cow::Borrowed(s.as_str())),
            Some(Value::Bool(b)) => Cell::Bool(*b),
            Some(Value::Number(n)) => match n.as_f64() {
                Some(f) if n.is_f64() || f.abs() <= MAX_EXACT_INTEGER => Cell::Number(f),
                _ => Cell::Text(Cow::Owned(n.to_string())),
            },
            Some(nested) => Cell::Text(Cow::Owned(nested.to_string())),
        }
    }

    fn write(&self, sheet: &mut Worksheet, row: RowNum, col: ColNum) -> Result<(), XlsxError> {
        match self {
            Cell::Blank => {}
            Cell::Text(s) => {
                sheet.write_string(row, col, &**s)?;
            }
            Cell::Number(n) => {
                sheet.write_number(row, col, *n)?;
            }
            Cell::Bool(b) => {
                sheet.write_boolean(row, col, *b)?;
            }
        }
        Ok(())
    }
}

fn xlsx_error(e: XlsxError) -> AppError {
    AppError::ExportError(format!("Spreadsheet write failed: {e}"))
}

fn too_large(what: &str, index: usize) -> AppError {
    AppError::ExportError(format!("Spreadsheet has too many {what} ({index})"))
}

fn write_workbook<'a, R>(out: &mut dyn Write, headers: &[&str], rows: R) -> Result<(), AppError>
where
    R: IntoIterator<Item = Vec<Option<&'a Value>>>,
{
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();

    for (index, header) in headers.iter().enumerate() {
        let col = ColNum::try_from(index).map_err(|_| too_large("columns", index))?;
        sheet.write_string(0, col, *header).map_err(xlsx_error)?;
    }
    for (index, values) in rows.into_iter().enumerate() {
        let row = RowNum::try_from(index + 1).map_err(|_| too_large("rows", index + 1))?;
        for (index, value) in values.into_iter().enumerate() {
            let col = ColNum::try_from(index).map_err(|_| too_large("columns", index))?;
            Cell::from_value(value)
                .write(sheet, row, col)
                .map_err(xlsx_error)?;
        }
    }

    let bytes = workbook.save_to_buffer().map_err(xlsx_error)?;
    out.write_all(&bytes)?;
    Ok(())
}

/// Full records, one column per key seen in any record.
pub fn write_records_xlsx(out: &mut dyn Write, records: &[SuccessRecord]) -> Result<(), AppError> {
    let columns = union_columns(records);
    let headers: Vec<&str> = columns.iter().map(String::as_str).collect();
    let rows = records
        .iter()
        .map(|record| columns.iter().map(|c| field(record, c)).collect::<Vec<_>>());
    write_workbook(out, &headers, rows)
}

pub fn write_projection_xlsx(
    out: &mut dyn Write,
    records: &[SuccessRecord],
    fields: &[FieldMapping],
) -> Result<(), AppError> {
    let headers: Vec<&str> = fields.iter().map(|f| f.column.as_str()).collect();
    let rows = records
        .iter()
        .map(|record| fields.iter().map(|f| field(record, &f.source)).collect::<Vec<_>>());
    write_workbook(out, &headers, rows)
}

/// Error log with the same columns as its CSV twin.
pub fn write_errors_xlsx(out: &mut dyn Write, errors: &[ErrorRecord]) -> Result<(), AppError> {
    let rows: Vec<[Value; 3]> = errors
        .iter()
        .map(|e| {
            [
                Value::from(e.id),
                Value::String(e.error.clone()),
                Value::String(e.timestamp.to_rfc3339()),
            ]
        })
        .collect();
    write_workbook(
        out,
        &ERROR_COLUMNS,
        rows.iter().map(|row| row.iter().map(Some).collect::<Vec<_>>()),
    )
}
