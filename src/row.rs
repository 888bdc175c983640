// 🧾 Canonical Row - one CSV record keyed by canonical field name
//
// When two source headers normalize to the same field, the value of the later
// header wins. Blank cells read as absent.

use crate::amounts::{parse_amount, sanitize_amount, sanitize_count, AmountParse};
use crate::dates::{parse_date, DateClass};
use chrono::NaiveDateTime;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct CanonicalRow {
    /// 1-based line in the source file (header is line 1)
    line: u64,
    values: HashMap<String, String>,
}

impl CanonicalRow {
    pub fn new(line: u64) -> Self {
        CanonicalRow {
            line,
            values: HashMap::new(),
        }
    }

    /// Zip normalized headers with one record. Extra cells without a header are dropped.
    pub fn from_record(columns: &[String], record: &csv::StringRecord, line: u64) -> Self {
        let mut row = CanonicalRow::new(line);
        for (column, value) in columns.iter().zip(record.iter()) {
            row.set(column, value);
        }
        row
    }

    /// Insert or overwrite a field.
    pub fn set(&mut self, field: &str, value: &str) {
        self.values.insert(field.to_string(), value.to_string());
    }

    pub fn line(&self) -> u64 {
        self.line
    }

    /// Trimmed cell, None when absent or blank.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.values
            .get(field)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn text(&self, field: &str) -> Option<String> {
        self.get(field).map(str::to_string)
    }

    pub fn text_or_empty(&self, field: &str) -> String {
        self.get(field).unwrap_or_default().to_string()
    }

    pub fn amount(&self, field: &str) -> f64 {
        sanitize_amount(self.get(field))
    }

    pub fn amount_parse(&self, field: &str) -> AmountParse {
        parse_amount(self.get(field))
    }

    pub fn count(&self, field: &str) -> i64 {
        sanitize_count(self.get(field))
    }

    pub fn date(&self, field: &str, class: DateClass) -> Option<NaiveDateTime> {
        parse_date(self.get(field), class).value()
    }

    /// yes / true / 1 / y (any case) → true; anything else, including absent → false.
    pub fn flag(&self, field: &str) -> bool {
        self.get(field)
            .map(|v| matches!(v.to_lowercase().as_str(), "yes" | "true" | "1" | "y"))
            .unwrap_or(false)
    }
}
