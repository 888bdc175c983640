// 📅 Date Cascade Parser
//
// Each source export formats dates its own way, so every date class carries
// an ordered list of literal formats. All values are naive local timestamps;
// nothing here converts between timezones.
//
// Cascade: sentinel check → flexible parse → class formats → Unparseable.
// The flexible step is year-first or day-first, never month-first.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::warn;

/// Placeholder words the POS writes into date columns.
pub const DATE_SENTINELS: &[&str] = &["walk in", "customer", "na", "none", "-"];

/// Date halves of the flexible step. Year-first, then day-first.
/// Chrono's `%b` also accepts full month names.
const FLEXIBLE_DATES: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d %b %Y",
    "%d-%b-%Y",
    "%d/%b/%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
];

/// Time halves, appended to every date half. Empty means date only.
const FLEXIBLE_TIMES: &[&str] = &[
    "",
    " %H:%M:%S%.f",
    " %H:%M:%S",
    " %H:%M",
    " %I:%M:%S %p",
    " %I:%M %p",
    "T%H:%M:%S%.f",
    "T%H:%M:%S",
    "T%H:%M",
];

fn flexible_formats() -> &'static [String] {
    static FORMATS: OnceLock<Vec<String>> = OnceLock::new();
    FORMATS.get_or_init(|| {
        FLEXIBLE_DATES
            .iter()
            .flat_map(|date| FLEXIBLE_TIMES.iter().map(move |time| format!("{date}{time}")))
            .collect()
    })
}

// ============================================================================
// DATE CLASS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateClass {
    /// Order export: booking, due and activity dates
    OrderDate,
    /// Payment export: transaction_date / Payment Date
    PaymentDate,
    /// Ledger export
    TransactionDate,
}

impl DateClass {
    pub fn label(&self) -> &'static str {
        match self {
            DateClass::OrderDate => "ORDER_DATE",
            DateClass::PaymentDate => "PAYMENT_DATE",
            DateClass::TransactionDate => "TRANSACTION_DATE",
        }
    }

    /// Literal formats in priority order. Day-first throughout.
    pub fn formats(&self) -> &'static [&'static str] {
        match self {
            DateClass::OrderDate => &[
                "%d %b %Y %I:%M:%S %p", // 31 Dec 2023 02:53:53 PM
                "%d %b %Y %H:%M:%S %p",
                "%d %b %Y",             // 26 Dec 2023
                "%Y-%m-%d %H:%M:%S",
                "%Y-%m-%d",
                "%d/%m/%Y %H:%M:%S",    // 31/12/2023 14:53:53
                "%d/%m/%Y",
                "%d-%m-%Y %H:%M:%S",    // 31-12-2023 14:53:53
                "%d-%m-%Y",
            ],
            DateClass::PaymentDate => &[
                "%d %b %Y %I:%M:%S %p", // 13 Jan 2025 07:28:03 PM
                "%d %b %Y %H:%M:%S %p",
                "%d/%m/%Y %I:%M %p",    // 31/12/2023 02:53 PM
                "%d/%m/%Y %H:%M",
                "%d/%m/%Y",
                "%d %b %Y",
            ],
            DateClass::TransactionDate => &[
                "%d %b %Y %I:%M:%S %p", // 30 Dec 2023 10:40:29 AM
                "%d %b %Y",
            ],
        }
    }
}

// ============================================================================
// PARSE RESULT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateParse {
    Parsed(NaiveDateTime),
    /// Empty cell or a placeholder word; not an error
    Missing,
    /// Something was there but no format accepted it
    Unparseable,
}

impl DateParse {
    pub fn value(self) -> Option<NaiveDateTime> {
        match self {
            DateParse::Parsed(dt) => Some(dt),
            DateParse::Missing | DateParse::Unparseable => None,
        }
    }

    pub fn is_unparseable(&self) -> bool {
        matches!(self, DateParse::Unparseable)
    }
}

// ============================================================================
// PARSING
// ============================================================================

/// Run the full cascade for one cell.
///
/// Never fails: an unreadable value logs a warning and comes back as
/// `Unparseable` so the row keeps going.
pub fn parse_date(raw: Option<&str>, class: DateClass) -> DateParse {
    let value = match raw.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => return DateParse::Missing,
    };

    if is_sentinel(value) {
        return DateParse::Missing;
    }

    if let Some(dt) = parse_flexible(value) {
        return DateParse::Parsed(dt);
    }

    for fmt in class.formats() {
        if let Some(dt) = parse_with_format(value, fmt) {
            return DateParse::Parsed(dt);
        }
    }

    warn!(date_class = class.label(), value = %value, "could not parse date");
    DateParse::Unparseable
}

/// Whole-word match against the sentinel list, so "31-12-2023" is not
/// mistaken for the "-" placeholder.
pub fn is_sentinel(value: &str) -> bool {
    let lowered = value.to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();

    DATE_SENTINELS.iter().any(|sentinel| {
        let needle: Vec<&str> = sentinel.split_whitespace().collect();
        words.windows(needle.len()).any(|window| window == needle.as_slice())
    })
}

/// RFC 3339, then every flexible date/time pairing. Offsets are dropped, not applied.
fn parse_flexible(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }

    flexible_formats()
        .iter()
        .find_map(|fmt| parse_with_format(value, fmt))
}

fn parse_with_format(value: &str, fmt: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
        return Some(dt);
    }

    let has_time = fmt.contains("%H") || fmt.contains("%I");
    if has_time {
        return None;
    }

    NaiveDate::parse_from_str(value, fmt)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn test_missing_and_empty() {
        assert_eq!(parse_date(None, DateClass::OrderDate), DateParse::Missing);
        assert_eq!(parse_date(Some(""), DateClass::OrderDate), DateParse::Missing);
        assert_eq!(parse_date(Some("   "), DateClass::PaymentDate), DateParse::Missing);
    }

    #[test]
    fn test_sentinels_are_missing_for_every_class() {
        let samples = ["walk in", "Walk In Customer", "NA", "none", "-", " - ", "Customer"];
        for class in [DateClass::OrderDate, DateClass::PaymentDate, DateClass::TransactionDate] {
            for sample in samples {
                assert_eq!(
                    parse_date(Some(sample), class),
                    DateParse::Missing,
                    "{} in {}",
                    sample,
                    class.label()
                );
            }
        }
    }

    #[test]
    fn test_dash_dates_are_not_sentinels() {
        assert!(!is_sentinel("31-12-2023"));
        assert!(!is_sentinel("2023-12-31 14:53:53"));
        assert_eq!(
            parse_date(Some("31-12-2023 14:53:53"), DateClass::OrderDate),
            DateParse::Parsed(at(2023, 12, 31, 14, 53, 53))
        );
    }

    #[test]
    fn test_order_formats_agree_on_the_same_instant() {
        let expected = at(2023, 12, 31, 14, 53, 53);
        for raw in [
            "31 Dec 2023 02:53:53 PM",
            "2023-12-31 14:53:53",
            "31/12/2023 14:53:53",
            "31-12-2023 14:53:53",
        ] {
            assert_eq!(
                parse_date(Some(raw), DateClass::OrderDate),
                DateParse::Parsed(expected),
                "{}",
                raw
            );
        }
    }

    #[test]
    fn test_date_only_formats_agree() {
        let expected = at(2023, 12, 26, 0, 0, 0);
        for raw in ["26 Dec 2023", "2023-12-26", "26/12/2023", "26-12-2023"] {
            assert_eq!(
                parse_date(Some(raw), DateClass::OrderDate),
                DateParse::Parsed(expected),
                "{}",
                raw
            );
        }
    }

    #[test]
    fn test_payment_formats() {
        assert_eq!(
            parse_date(Some("13 Jan 2025 07:28:03 PM"), DateClass::PaymentDate),
            DateParse::Parsed(at(2025, 1, 13, 19, 28, 3))
        );
        assert_eq!(
            parse_date(Some("31/12/2023 02:53 PM"), DateClass::PaymentDate),
            DateParse::Parsed(at(2023, 12, 31, 14, 53, 0))
        );
        assert_eq!(
            parse_date(Some("31/12/2023 14:53"), DateClass::PaymentDate),
            DateParse::Parsed(at(2023, 12, 31, 14, 53, 0))
        );
    }

    #[test]
    fn test_day_first_is_respected() {
        // 02/01 is the 2nd of January, never February 1st
        assert_eq!(
            parse_date(Some("02/01/2024"), DateClass::PaymentDate),
            DateParse::Parsed(at(2024, 1, 2, 0, 0, 0))
        );
    }

    #[test]
    fn test_flexible_day_first_forms() {
        let cases = [
            ("31 Dec 2023 14:53:53", at(2023, 12, 31, 14, 53, 53)),
            ("31 Dec 2023 14:53", at(2023, 12, 31, 14, 53, 0)),
            ("31/12/2023 14:53", at(2023, 12, 31, 14, 53, 0)),
            ("31-Dec-2023", at(2023, 12, 31, 0, 0, 0)),
            ("2023/12/31 14:53", at(2023, 12, 31, 14, 53, 0)),
            ("31 December 2023", at(2023, 12, 31, 0, 0, 0)),
            ("31.12.2023 02:53 PM", at(2023, 12, 31, 14, 53, 0)),
            ("31-12-2023 14:53", at(2023, 12, 31, 14, 53, 0)),
        ];
        for class in [DateClass::OrderDate, DateClass::PaymentDate, DateClass::TransactionDate] {
            for (raw, expected) in cases {
                assert_eq!(
                    parse_date(Some(raw), class),
                    DateParse::Parsed(expected),
                    "{} as {}",
                    raw,
                    class.label()
                );
            }
        }
    }

    #[test]
    fn test_month_first_is_never_guessed() {
        for class in [DateClass::OrderDate, DateClass::PaymentDate, DateClass::TransactionDate] {
            assert_eq!(parse_date(Some("12/31/2023"), class), DateParse::Unparseable);
        }
        assert_eq!(
            parse_date(Some("30 Dec 2023 10:40:29 AM"), DateClass::TransactionDate),
            DateParse::Parsed(at(2023, 12, 30, 10, 40, 29))
        );
    }

    #[test]
    fn test_flexible_iso_forms() {
        assert_eq!(
            parse_date(Some("2024-03-05T09:15:00"), DateClass::TransactionDate),
            DateParse::Parsed(at(2024, 3, 5, 9, 15, 0))
        );
        assert_eq!(
            parse_date(Some("2024-03-05T09:15:00+05:30"), DateClass::TransactionDate),
            DateParse::Parsed(at(2024, 3, 5, 9, 15, 0))
        );
    }

    #[test]
    fn test_garbage_is_unparseable_not_a_panic() {
        let result = parse_date(Some("sometime next week"), DateClass::OrderDate);
        assert!(result.is_unparseable());
        assert_eq!(result.value(), None);
    }
}
