//! Tabular views over raw JSON records.

use std::collections::HashSet;
use std::io::Write;

use rangefetch_core::AppError;
use rangefetch_core::models::SuccessRecord;
use serde_json::{Map, Value};

use crate::config::FieldMapping;

/// Column used for records whose payload is not a JSON object.
pub const VALUE_COLUMN: &str = "value";

/// Union of all record keys, in the order they are first seen.
pub fn union_columns(records: &[SuccessRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();
    for record in records {
        match &record.data {
            Value::Object(map) => {
                for key in map.keys() {
                    if seen.insert(key.as_str()) {
                        columns.push(key.clone());
                    }
                }
            }
            _ => {
                if seen.insert(VALUE_COLUMN) {
                    columns.push(VALUE_COLUMN.to_string());
                }
            }
        }
    }
    columns
}

/// Render one JSON value as a CSV cell. Nested values are kept as JSON text.
pub fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(nested) => nested.to_string(),
    }
}

pub fn field<'a>(record: &'a SuccessRecord, key: &str) -> Option<&'a Value> {
    match &record.data {
        Value::Object(map) => map.get(key),
        other if key == VALUE_COLUMN => Some(other),
        _ => None,
    }
}

/// Pick and rename the mapped fields of one record. Missing fields become `null`.
pub fn project(record: &SuccessRecord, fields: &[FieldMapping]) -> Map<String, Value> {
    fields
        .iter()
        .map(|f| {
            let value = field(record, &f.source).cloned().unwrap_or(Value::Null);
            (f.column.clone(), value)
        })
        .collect()
}

fn csv_error(e: csv::Error) -> AppError {
    AppError::ExportError(format!("CSV write failed: {e}"))
}

/// Full records as CSV, one column per key seen in any record.
pub fn write_records_csv(out: &mut dyn Write, records: &[SuccessRecord]) -> Result<(), AppError> {
    let columns = union_columns(records);
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(&columns).map_err(csv_error)?;
    for record in records {
        writer
            .write_record(columns.iter().map(|c| cell(field(record, c))))
            .map_err(csv_error)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_projection_csv(
    out: &mut dyn Write,
    records: &[SuccessRecord],
    fields: &[FieldMapping],
) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_writer(out);
    writer
        .write_record(fields.iter().map(|f| f.column.as_str()))
        .map_err(csv_error)?;
    for record in records {
        writer
            .write_record(fields.iter().map(|f| cell(field(record, &f.source))))
            .map_err(csv_error)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn rec(id: u64, data: Value) -> SuccessRecord {
        SuccessRecord::new(id, data)
    }

    #[test]
    fn test_union_keeps_first_seen_order() {
        let records = vec![
            rec(1, json!({"b": 1, "a": 2})),
            rec(2, json!({"c": 3, "a": 4})),
        ];
        let columns = union_columns(&records);
        assert_eq!(columns.len(), 3);
        assert_eq!(columns.last().unwrap(), "c");
    }

    #[test]
    fn test_cells() {
        assert_eq!(cell(None), "");
        assert_eq!(cell(Some(&Value::Null)), "");
        assert_eq!(cell(Some(&json!("上海"))), "上海");
        assert_eq!(cell(Some(&json!(12))), "12");
        assert_eq!(cell(Some(&json!([1, 2]))), "[1,2]");
    }

    #[test]
    fn test_records_csv_fills_missing_columns() {
        let records = vec![rec(1, json!({"a": 1})), rec(2, json!({"b": "x"}))];
        let mut out = Vec::new();
        write_records_csv(&mut out, &records).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].split(',').count(), 2);
    }

    #[test]
    fn test_project_renames_and_nulls() {
        let record = rec(1, json!({"CityName": "Beijing", "ZZID": "11"}));
        let fields = vec![
            FieldMapping::new("CityName", "City"),
            FieldMapping::new("Missing", "Missing"),
        ];
        let projected = project(&record, &fields);
        assert_eq!(projected["City"], "Beijing");
        assert_eq!(projected["Missing"], Value::Null);
    }

    #[test]
    fn test_scalar_payload_uses_value_column() {
        let records = vec![rec(1, json!(5))];
        assert_eq!(union_columns(&records), vec![VALUE_COLUMN.to_string()]);
    }
}
