// 🏷️ Canonicalizers - free-text payment mode / location → fixed vocabulary
//
// Lookup: exact (after case + whitespace normalization), then "stripped"
// (spaces and slashes removed on both sides), then a deterministic fallback.
// Unknown payment modes are echoed title-cased as PaymentMode::Unlisted;
// they are never coerced to Cash.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// PAYMENT MODE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum PaymentMode {
    Cash,
    Upi,
    BankTransfer,
    CreditCard,
    DebitCard,
    Check,
    DigitalWallet,
    PhonePe,
    GooglePay,
    Paytm,
    Neft,
    Rtgs,
    Imps,
    Package,
    /// Outside the vocabulary; holds the title-cased input
    Unlisted(String),
}

impl PaymentMode {
    pub const ALL: [PaymentMode; 14] = [
        PaymentMode::Cash,
        PaymentMode::Upi,
        PaymentMode::BankTransfer,
        PaymentMode::CreditCard,
        PaymentMode::DebitCard,
        PaymentMode::Check,
        PaymentMode::DigitalWallet,
        PaymentMode::PhonePe,
        PaymentMode::GooglePay,
        PaymentMode::Paytm,
        PaymentMode::Neft,
        PaymentMode::Rtgs,
        PaymentMode::Imps,
        PaymentMode::Package,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            PaymentMode::Cash => "Cash",
            PaymentMode::Upi => "UPI",
            PaymentMode::BankTransfer => "Bank Transfer",
            PaymentMode::CreditCard => "Credit Card",
            PaymentMode::DebitCard => "Debit Card",
            PaymentMode::Check => "Check",
            PaymentMode::DigitalWallet => "Digital Wallet",
            PaymentMode::PhonePe => "PhonePe",
            PaymentMode::GooglePay => "Google Pay",
            PaymentMode::Paytm => "Paytm",
            PaymentMode::Neft => "NEFT",
            PaymentMode::Rtgs => "RTGS",
            PaymentMode::Imps => "IMPS",
            PaymentMode::Package => "Package",
            PaymentMode::Unlisted(text) => text,
        }
    }

    /// Rebuild from the stored label.
    pub fn from_stored(label: &str) -> Self {
        PaymentMode::ALL
            .iter()
            .find(|mode| mode.as_str() == label)
            .cloned()
            .unwrap_or_else(|| PaymentMode::Unlisted(label.to_string()))
    }

    pub fn is_listed(&self) -> bool {
        !matches!(self, PaymentMode::Unlisted(_))
    }
}

impl From<PaymentMode> for String {
    fn from(mode: PaymentMode) -> String {
        match mode {
            PaymentMode::Unlisted(text) => text,
            listed => listed.as_str().to_string(),
        }
    }
}

impl From<String> for PaymentMode {
    fn from(label: String) -> PaymentMode {
        PaymentMode::from_stored(&label)
    }
}

impl fmt::Display for PaymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercased spelling → canonical mode.
const PAYMENT_MODE_ALIASES: &[(&str, PaymentMode)] = &[
    ("phonep", PaymentMode::PhonePe),
    ("phonepe", PaymentMode::PhonePe),
    ("gpay", PaymentMode::GooglePay),
    ("google pay", PaymentMode::GooglePay),
    ("googlepay", PaymentMode::GooglePay),
    ("paytm", PaymentMode::Paytm),
    ("neft", PaymentMode::Neft),
    ("rtgs", PaymentMode::Rtgs),
    ("imps", PaymentMode::Imps),
    ("cash", PaymentMode::Cash),
    ("upi", PaymentMode::Upi),
    ("bank", PaymentMode::BankTransfer),
    ("bank transfer", PaymentMode::BankTransfer),
    ("credit", PaymentMode::CreditCard),
    ("credit card", PaymentMode::CreditCard),
    ("debit", PaymentMode::DebitCard),
    ("debit card", PaymentMode::DebitCard),
    ("credit card/debit card", PaymentMode::CreditCard),
    ("credit/debit card", PaymentMode::CreditCard),
    ("credit/debit", PaymentMode::CreditCard),
    ("card", PaymentMode::CreditCard),
    ("cheque", PaymentMode::Check),
    ("check", PaymentMode::Check),
    ("wallet", PaymentMode::DigitalWallet),
    ("digital", PaymentMode::DigitalWallet),
    ("digital wallet", PaymentMode::DigitalWallet),
    ("package", PaymentMode::Package),
    ("pkg", PaymentMode::Package),
    ("pack", PaymentMode::Package),
];

/// Empty input → None. Unknown text → `Unlisted(title-cased input)`.
pub fn canonicalize_payment_mode(raw: Option<&str>) -> Option<PaymentMode> {
    let key = normalize_space(raw?).to_lowercase();
    if key.is_empty() {
        return None;
    }

    if let Some((_, mode)) = PAYMENT_MODE_ALIASES.iter().find(|(alias, _)| *alias == key) {
        return Some(mode.clone());
    }

    let stripped = strip_separators(&key);
    if let Some((_, mode)) = PAYMENT_MODE_ALIASES
        .iter()
        .find(|(alias, _)| strip_separators(alias) == stripped)
    {
        return Some(mode.clone());
    }

    Some(PaymentMode::Unlisted(title_case(&key)))
}

// ============================================================================
// PAYMENT LOCATION
// ============================================================================

/// Uppercased spelling → canonical location.
const PAYMENT_LOCATION_ALIASES: &[(&str, &str)] = &[
    ("MOBILE APP", "Mobile APP"),
    ("MOBILEAPP", "Mobile APP"),
    ("APP", "Mobile APP"),
    ("MOBILE POS", "Mobile POS"),
    ("MOBILEPOS", "Mobile POS"),
    ("POS", "Mobile POS"),
    ("PAYMENT LINK", "Payment Link"),
    ("PAYMENTLINK", "Payment Link"),
    ("LINK", "Payment Link"),
    ("WALK IN", "Walk in Customer"),
    ("WALKIN", "Walk in Customer"),
    ("WALK IN CUSTOMER", "Walk in Customer"),
    ("WALK-IN", "Walk in Customer"),
];

/// Empty input → None. Unknown text passes through uppercased.
pub fn canonicalize_payment_location(raw: Option<&str>) -> Option<String> {
    let key = normalize_space(raw?).to_uppercase();
    if key.is_empty() {
        return None;
    }

    if let Some((_, location)) = PAYMENT_LOCATION_ALIASES.iter().find(|(alias, _)| *alias == key) {
        return Some(location.to_string());
    }

    let stripped = strip_separators(&key);
    if let Some((_, location)) = PAYMENT_LOCATION_ALIASES
        .iter()
        .find(|(alias, _)| strip_separators(alias) == stripped)
    {
        return Some(location.to_string());
    }

    Some(key)
}

// ============================================================================
// HELPERS
// ============================================================================

/// Trim and collapse internal whitespace runs to one space.
fn normalize_space(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_separators(value: &str) -> String {
    value.chars().filter(|c| *c != ' ' && *c != '/').collect()
}

/// First letter of every alphabetic run upper, the rest lower.
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_alpha = false;

    for c in value.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }

    out
}
