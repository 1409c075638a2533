// Declarative schema validation over a window of rows.
//
// Schema columns are mapped onto sheet columns by header, then column
// letter, then numeric index. Each cell is checked against its column's
// rules; the first failing rule produces the error. Validation never
// mutates data.

use std::collections::HashMap;

use gridsync_common::cell::CellValue;
use gridsync_common::schema::{ColumnSchema, ColumnType, SheetSchema};
use gridsync_common::types::{
    ValidateRequest, ValidationError, ValidationErrorKind, ValidationResult, ValidationWarning,
};
use regex::Regex;
use tracing::debug;

use crate::store::StoreError;
use crate::workbook::{Window, Workbook};

/// Strings longer than this produce a warning.
const LONG_STRING_CHARS: usize = 1000;

/// Validate the region of `workbook` described by `request`.
pub fn validate_workbook(
    workbook: &Workbook,
    request: &ValidateRequest,
) -> Result<ValidationResult, StoreError> {
    let sheet = request.sheet.as_deref();
    let range = request.range.as_deref();
    let offset = request.offset.unwrap_or(0);
    let max_rows = request.max_rows.unwrap_or(u32::MAX);

    let window = workbook.read_window(sheet, range, offset, max_rows)?;
    // Headers only come with the top of the region.
    let headers: Vec<Option<String>> = if offset == 0 {
        window.columns.iter().map(|c| c.header.clone()).collect()
    } else {
        workbook.read_window(sheet, range, 0, 1)?.columns.into_iter().map(|c| c.header).collect()
    };

    Ok(validate_window(&window, &headers, &request.schema))
}

/// Validate every row of `window`. `headers` runs parallel to
/// `window.columns`.
pub fn validate_window(
    window: &Window,
    headers: &[Option<String>],
    schema: &SheetSchema,
) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let mapping = map_columns(window, headers, schema);

    for column in &schema.columns {
        if column.required && !mapping.contains_key(column.name.as_str()) {
            errors.push(ValidationError {
                row: 0,
                col: 0,
                column_name: column.name.clone(),
                message: format!("Required column '{}' not found", column.name),
                kind: ValidationErrorKind::MissingColumn,
                current_value: CellValue::Empty,
            });
        }
    }

    // Compiled once per call; a bad pattern is reported once per column.
    let mut patterns: HashMap<&str, Regex> = HashMap::new();
    for column in &schema.columns {
        let Some(pattern) = column.regex_pattern.as_deref() else { continue };
        match Regex::new(pattern) {
            Ok(regex) => {
                patterns.insert(column.name.as_str(), regex);
            }
            Err(e) => {
                debug!(column = %column.name, error = %e, "invalid validation pattern");
                let position = mapping.get(column.name.as_str()).copied();
                warnings.push(ValidationWarning {
                    row: 0,
                    col: position.map(|p| window.columns[p].index).unwrap_or(0),
                    column_name: column.name.clone(),
                    message: format!("Invalid regex pattern '{pattern}': {e}"),
                });
            }
        }
    }

    let skip = usize::from(schema.has_header_row && window.offset == 0);
    for (i, row) in window.rows.iter().enumerate().skip(skip) {
        let row_index = window.first_row + i as u32;
        for column in &schema.columns {
            let Some(&position) = mapping.get(column.name.as_str()) else { continue };
            let col_index = window.columns[position].index;
            let value = row.get(position).unwrap_or(&CellValue::Empty);

            let cell = CellCheck {
                row: row_index,
                col: col_index,
                column,
                pattern: patterns.get(column.name.as_str()),
            };
            if let Some(error) = cell.error(value) {
                errors.push(error);
            }
            if let Some(warning) = cell.warning(value) {
                warnings.push(warning);
            }
        }
    }

    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
        warnings,
        rows_checked: window.rows.len().saturating_sub(skip) as u32,
    }
}

/// Schema column name → position in `window.columns`.
fn map_columns<'a>(
    window: &Window,
    headers: &[Option<String>],
    schema: &'a SheetSchema,
) -> HashMap<&'a str, usize> {
    let mut mapping = HashMap::new();
    for column in &schema.columns {
        let name = column.name.as_str();
        let by_header = headers
            .iter()
            .position(|h| h.as_deref().is_some_and(|h| h.eq_ignore_ascii_case(name)));
        let by_letter = || window.columns.iter().position(|c| c.name.eq_ignore_ascii_case(name));
        let by_index = || {
            let index = name.parse::<u32>().ok()?;
            window.columns.iter().position(|c| c.index == index)
        };
        if let Some(position) = by_header.or_else(by_letter).or_else(by_index) {
            mapping.insert(name, position);
        }
    }
    mapping
}

struct CellCheck<'a> {
    row: u32,
    col: u32,
    column: &'a ColumnSchema,
    pattern: Option<&'a Regex>,
}

impl CellCheck<'_> {
    fn fail(
        &self,
        kind: ValidationErrorKind,
        message: String,
        value: &CellValue,
    ) -> ValidationError {
        ValidationError {
            row: self.row,
            col: self.col,
            column_name: self.column.name.clone(),
            message,
            kind,
            current_value: value.clone(),
        }
    }

    fn error(&self, value: &CellValue) -> Option<ValidationError> {
        let column = self.column;
        if value.is_empty() {
            if column.required && !column.allow_empty {
                return Some(self.fail(
                    ValidationErrorKind::MissingRequired,
                    format!("Required field '{}' is empty", column.name),
                    value,
                ));
            }
            return None;
        }

        if !type_matches(value, column.data_type) {
            return Some(self.fail(
                ValidationErrorKind::TypeMismatch,
                format!("Expected type '{}' but got '{}'", column.data_type, value.type_name()),
                value,
            ));
        }

        if let CellValue::Number(n) = value {
            if let Some(min) = column.min_value.filter(|min| n < min) {
                return Some(self.fail(
                    ValidationErrorKind::OutOfRange,
                    format!("Value {n} is below minimum {min}"),
                    value,
                ));
            }
            if let Some(max) = column.max_value.filter(|max| n > max) {
                return Some(self.fail(
                    ValidationErrorKind::OutOfRange,
                    format!("Value {n} is above maximum {max}"),
                    value,
                ));
            }
        }

        if let CellValue::String(s) = value {
            if let Some(regex) = self.pattern.filter(|r| !r.is_match(s)) {
                return Some(self.fail(
                    ValidationErrorKind::PatternMismatch,
                    format!("Value '{s}' does not match pattern '{}'", regex.as_str()),
                    value,
                ));
            }
            if let Some(allowed) = &column.allowed_values {
                if !allowed.iter().any(|a| a.eq_ignore_ascii_case(s)) {
                    return Some(self.fail(
                        ValidationErrorKind::InvalidValue,
                        format!("Value '{s}' is not in allowed values: {}", allowed.join(", ")),
                        value,
                    ));
                }
            }
        }

        None
    }

    fn warning(&self, value: &CellValue) -> Option<ValidationWarning> {
        let message = match value {
            CellValue::String(s) if s.chars().count() > LONG_STRING_CHARS => {
                format!("Very long string value ({} characters)", s.chars().count())
            }
            CellValue::Number(n) if n.is_nan() => "Value is NaN".to_string(),
            CellValue::Number(n) if n.is_infinite() => "Value is infinite".to_string(),
            CellValue::Error(code) => format!("Cell contains error: {code}"),
            _ => return None,
        };
        Some(ValidationWarning {
            row: self.row,
            col: self.col,
            column_name: self.column.name.clone(),
            message,
        })
    }
}

fn type_matches(value: &CellValue, expected: ColumnType) -> bool {
    match (value, expected) {
        (_, ColumnType::Any) => true,
        (CellValue::String(_), ColumnType::String) => true,
        (CellValue::Number(_), ColumnType::Number | ColumnType::String) => true,
        (CellValue::Boolean(_), ColumnType::Boolean | ColumnType::String) => true,
        (CellValue::DateTime(_), ColumnType::Date | ColumnType::Datetime) => true,
        (CellValue::String(s), ColumnType::Number) => s.trim().parse::<f64>().is_ok(),
        (CellValue::String(s), ColumnType::Boolean) => {
            matches!(s.to_lowercase().as_str(), "true" | "false" | "yes" | "no" | "1" | "0")
        }
        (CellValue::Formula { cached_value: Some(cached), .. }, _) => {
            type_matches(cached, expected)
        }
        _ => false,
    }
}
