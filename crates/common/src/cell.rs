// Cell values and the coercion of raw edit input into them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single typed cell value.
///
/// Serialized as `{"type": "...", "value": ...}` so stores and clients agree
/// on the variant without sniffing the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "value")]
pub enum CellValue {
    #[default]
    Empty,
    String(String),
    Number(f64),
    Boolean(bool),
    /// ISO 8601 text, e.g. `2024-03-01T09:30:00`.
    DateTime(String),
    /// Error code text, e.g. `#DIV/0!`.
    Error(String),
    Formula {
        formula: String,
        #[serde(default)]
        cached_value: Option<Box<CellValue>>,
    },
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// False for NaN or infinite numbers, including a formula's cached value.
    /// JSON has no spelling for them.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Number(n) => n.is_finite(),
            Self::Formula { cached_value: Some(cached), .. } => cached.is_finite(),
            _ => true,
        }
    }

    /// Short lowercase name of the variant, used in validation messages and
    /// column type inference.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Boolean(_) => "boolean",
            Self::DateTime(_) => "datetime",
            Self::Error(_) => "error",
            Self::Formula { .. } => "formula",
        }
    }

    /// Text shown in a grid cell. Formulas fall back to their cached value
    /// when present, else the raw expression.
    pub fn display(&self) -> String {
        match self {
            Self::Empty => String::new(),
            Self::String(s) => s.clone(),
            Self::Number(n) => format_number(*n),
            Self::Boolean(true) => "TRUE".to_string(),
            Self::Boolean(false) => "FALSE".to_string(),
            Self::DateTime(dt) => dt.clone(),
            Self::Error(code) => code.clone(),
            Self::Formula { formula, cached_value } => match cached_value {
                Some(cached) => cached.display(),
                None => formula.clone(),
            },
        }
    }

    /// Coerce raw edit input into a cell value.
    ///
    /// - null and the empty string become `Empty`
    /// - booleans and numbers keep their type
    /// - text that parses as a finite number becomes `Number`
    /// - any other text stays `String`
    pub fn from_input(input: EditInput) -> Self {
        match input {
            EditInput::Null => Self::Empty,
            EditInput::Bool(b) => Self::Boolean(b),
            EditInput::Number(n) => Self::Number(n),
            EditInput::Text(text) => {
                if text.is_empty() {
                    return Self::Empty;
                }
                match parse_finite_number(&text) {
                    Some(n) => Self::Number(n),
                    None => Self::String(text),
                }
            }
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Raw value typed into a cell before coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EditInput {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl From<&str> for EditInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for EditInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for EditInput {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for EditInput {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for EditInput {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<EditInput>> From<Option<T>> for EditInput {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

impl From<serde_json::Value> for EditInput {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Null),
            serde_json::Value::String(s) => Self::Text(s),
            other => Self::Text(other.to_string()),
        }
    }
}

fn parse_finite_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── from_input ─────────────────────────────────────────────────

    #[test]
    fn null_and_empty_text_become_empty() {
        assert_eq!(CellValue::from_input(EditInput::Null), CellValue::Empty);
        assert_eq!(CellValue::from_input("".into()), CellValue::Empty);
    }

    #[test]
    fn numeric_text_becomes_number() {
        assert_eq!(CellValue::from_input("42".into()), CellValue::Number(42.0));
        assert_eq!(CellValue::from_input(" -3.5 ".into()), CellValue::Number(-3.5));
        assert_eq!(CellValue::from_input("1e3".into()), CellValue::Number(1000.0));
    }

    #[test]
    fn non_finite_text_stays_string() {
        assert_eq!(CellValue::from_input("inf".into()), CellValue::String("inf".into()));
        assert_eq!(CellValue::from_input("NaN".into()), CellValue::String("NaN".into()));
    }

    #[test]
    fn non_finite_numbers_are_flagged() {
        assert!(CellValue::Number(1.5).is_finite());
        assert!(!CellValue::Number(f64::NAN).is_finite());
        assert!(!CellValue::from_input(f64::NEG_INFINITY.into()).is_finite());
        let formula = CellValue::Formula {
            formula: "=1/0".into(),
            cached_value: Some(Box::new(CellValue::Number(f64::INFINITY))),
        };
        assert!(!formula.is_finite());
        assert!(CellValue::String("NaN".into()).is_finite());
    }

    #[test]
    fn whitespace_only_text_stays_string() {
        assert_eq!(CellValue::from_input("   ".into()), CellValue::String("   ".into()));
    }

    #[test]
    fn plain_text_stays_string() {
        assert_eq!(CellValue::from_input("hello".into()), CellValue::String("hello".into()));
        assert_eq!(CellValue::from_input("12abc".into()), CellValue::String("12abc".into()));
    }

    #[test]
    fn bool_and_number_keep_type() {
        assert_eq!(CellValue::from_input(true.into()), CellValue::Boolean(true));
        assert_eq!(CellValue::from_input(7_i64.into()), CellValue::Number(7.0));
        assert_eq!(CellValue::from_input(2.5.into()), CellValue::Number(2.5));
    }

    #[test]
    fn option_input_maps_none_to_null() {
        let none: Option<&str> = None;
        assert_eq!(EditInput::from(none), EditInput::Null);
        assert_eq!(EditInput::from(Some("x")), EditInput::Text("x".into()));
    }

    #[test]
    fn json_input_is_coerced_by_kind() {
        assert_eq!(EditInput::from(serde_json::json!(null)), EditInput::Null);
        assert_eq!(EditInput::from(serde_json::json!(false)), EditInput::Bool(false));
        assert_eq!(EditInput::from(serde_json::json!(3)), EditInput::Number(3.0));
        assert_eq!(EditInput::from(serde_json::json!("3")), EditInput::Text("3".into()));
    }

    // ── display ────────────────────────────────────────────────────

    #[test]
    fn display_formats_integers_without_fraction() {
        assert_eq!(CellValue::Number(10.0).display(), "10");
        assert_eq!(CellValue::Number(1.25).display(), "1.25");
    }

    #[test]
    fn display_formula_prefers_cached_value() {
        let cached = CellValue::Formula {
            formula: "=SUM(A1:A3)".into(),
            cached_value: Some(Box::new(CellValue::Number(6.0))),
        };
        assert_eq!(cached.display(), "6");

        let raw = CellValue::Formula { formula: "=SUM(A1:A3)".into(), cached_value: None };
        assert_eq!(raw.display(), "=SUM(A1:A3)");
    }

    #[test]
    fn display_booleans_in_sheet_style() {
        assert_eq!(CellValue::Boolean(true).to_string(), "TRUE");
        assert_eq!(CellValue::Boolean(false).to_string(), "FALSE");
    }

    // ── serialization ──────────────────────────────────────────────

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_value(CellValue::Number(1.5)).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "Number", "value": 1.5 }));

        let json = serde_json::to_value(CellValue::Empty).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "Empty" }));
    }

    #[test]
    fn formula_without_cached_value_deserializes() {
        let value: CellValue = serde_json::from_value(serde_json::json!({
            "type": "Formula",
            "value": { "formula": "=A1*2" }
        }))
        .unwrap();
        assert_eq!(value, CellValue::Formula { formula: "=A1*2".into(), cached_value: None });
    }
}
