// 💰 Numeric Sanitizer - currency strings → f64
//
// "₹1,234.50" → 1234.50. Anything unreadable defaults to zero so an import
// keeps moving; the tagged form lets callers tell "empty" from "garbage".

use tracing::debug;

/// Currency markers stripped before parsing, ignoring ASCII case.
/// Longest first so "Rs." wins over "Rs".
const CURRENCY_MARKERS: &[&str] = &["INR", "Rs.", "Rs", "₹", "$", "€", "£"];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AmountParse {
    Parsed(f64),
    Missing,
    Unparseable,
}

impl AmountParse {
    /// Value with the import default (0.0) applied.
    pub fn or_zero(self) -> f64 {
        match self {
            AmountParse::Parsed(v) => v,
            AmountParse::Missing | AmountParse::Unparseable => 0.0,
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            AmountParse::Parsed(v) => Some(v),
            _ => None,
        }
    }
}

/// Parse a money cell without applying any default.
pub fn parse_amount(raw: Option<&str>) -> AmountParse {
    let trimmed = match raw.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => return AmountParse::Missing,
    };

    let cleaned: String = strip_currency_markers(trimmed)
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();

    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => AmountParse::Parsed(v),
        _ => {
            debug!(value = %trimmed, "non-numeric amount, defaulting to zero");
            AmountParse::Unparseable
        }
    }
}

fn strip_currency_markers(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    'scan: while let Some(c) = rest.chars().next() {
        for marker in CURRENCY_MARKERS {
            let matched = rest
                .get(..marker.len())
                .map_or(false, |head| head.eq_ignore_ascii_case(marker));
            if matched {
                rest = &rest[marker.len()..];
                continue 'scan;
            }
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

/// Missing or unreadable → 0.0. Never fails.
pub fn sanitize_amount(raw: Option<&str>) -> f64 {
    parse_amount(raw).or_zero()
}

/// Whole-number counts (pieces). Fractions are truncated.
pub fn sanitize_count(raw: Option<&str>) -> i64 {
    sanitize_amount(raw).trunc() as i64
}
