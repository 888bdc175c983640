// 📒 Ledger Transaction - append-only
//
// Imports never update a transaction; every imported payment row appends a
// new one. Rows typed in by hand carry source = manual and are the only
// ones that may be deleted.

use crate::canonical::{canonicalize_payment_mode, PaymentMode};
use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// VOCABULARIES
// ============================================================================

pub const CATEGORY_SALES: &str = "Sales";
pub const CATEGORY_GARMENT_RETURN: &str = "SRN-Garment Return";

pub const INCOME_CATEGORIES: &[&str] = &[
    CATEGORY_SALES,
    "Service",
    "Interest",
    "Commission",
    "Other Income",
];

pub const EXPENSE_CATEGORIES: &[&str] = &[
    "Rent",
    "Utilities",
    "Salaries",
    "Supplies",
    "Marketing",
    "Maintenance",
    CATEGORY_GARMENT_RETURN,
    "Other Expense",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionType {
    Income,
    Expense,
    Transfer,
}

impl TransactionType {
    pub const ALL: [TransactionType; 3] = [
        TransactionType::Income,
        TransactionType::Expense,
        TransactionType::Transfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "Income",
            TransactionType::Expense => "Expense",
            TransactionType::Transfer => "Transfer",
        }
    }

    /// Categories allowed for this type. Transfers are not categorized.
    pub fn categories(&self) -> &'static [&'static str] {
        match self {
            TransactionType::Income => INCOME_CATEGORIES,
            TransactionType::Expense => EXPENSE_CATEGORIES,
            TransactionType::Transfer => &[],
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionType::ALL
            .iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| format!("unknown transaction type '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    Cancelled,
}

impl PaymentStatus {
    pub const ALL: [PaymentStatus; 5] = [
        PaymentStatus::Pending,
        PaymentStatus::Completed,
        PaymentStatus::Failed,
        PaymentStatus::Refunded,
        PaymentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Completed => "Completed",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Refunded => "Refunded",
            PaymentStatus::Cancelled => "Cancelled",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentStatus::ALL
            .iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| format!("unknown payment status '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionSource {
    Manual,
    Csv,
}

impl TransactionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionSource::Manual => "manual",
            TransactionSource::Csv => "csv",
        }
    }
}

impl FromStr for TransactionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(TransactionSource::Manual),
            "csv" => Ok(TransactionSource::Csv),
            other => Err(format!("unknown transaction source '{}'", other)),
        }
    }
}

// ============================================================================
// TRANSACTION ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Row id; None until stored
    pub id: Option<i64>,
    /// Stable identity, assigned at construction
    pub tx_uuid: String,

    pub transaction_date: Option<NaiveDateTime>,
    pub transaction_type: TransactionType,
    pub category: String,

    pub amount: f64,
    pub tax_amount: f64,
    pub total_amount: f64,

    pub payment_mode: Option<PaymentMode>,
    pub payment_status: PaymentStatus,
    pub reference_no: Option<String>,

    /// Linked order; always None for return entries
    pub order_no: Option<String>,
    /// Order number exactly as the export carried it, linked or not
    pub source_order_no: Option<String>,
    pub customer_id: Option<i64>,

    pub description: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    pub source: TransactionSource,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// New unsaved entry: tax 0, total = amount, status Completed.
    pub fn new(
        transaction_type: TransactionType,
        category: &str,
        amount: f64,
        source: TransactionSource,
    ) -> Self {
        Transaction {
            id: None,
            tx_uuid: uuid::Uuid::new_v4().to_string(),
            transaction_date: None,
            transaction_type,
            category: category.to_string(),
            amount,
            tax_amount: 0.0,
            total_amount: amount,
            payment_mode: None,
            payment_status: PaymentStatus::Completed,
            reference_no: None,
            order_no: None,
            source_order_no: None,
            customer_id: None,
            description: None,
            notes: None,
            created_by: None,
            source,
            created_at: Utc::now(),
        }
    }

    pub fn is_manual(&self) -> bool {
        self.source == TransactionSource::Manual
    }
}

// ============================================================================
// MANUAL ENTRY
// ============================================================================

/// Body of a hand-entered transaction. Empty strings count as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ManualTransaction {
    /// YYYY-MM-DD
    pub transaction_date: Option<String>,
    pub transaction_type: String,
    pub category: String,
    pub amount: f64,
    pub tax_amount: Option<f64>,
    pub total_amount: Option<f64>,
    pub payment_mode: Option<String>,
    pub payment_status: Option<String>,
    pub reference_no: Option<String>,
    pub order_no: Option<String>,
    pub customer_id: Option<i64>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

impl ManualTransaction {
    pub fn into_transaction(self) -> StoreResult<Transaction> {
        let transaction_type: TransactionType =
            self.transaction_type.parse().map_err(StoreError::Invalid)?;

        let category = self.category.trim().to_string();
        let allowed = transaction_type.categories();
        if !allowed.is_empty() && !allowed.contains(&category.as_str()) {
            return Err(StoreError::Invalid(format!(
                "category '{}' is not valid for {} transactions",
                category, transaction_type
            )));
        }

        let transaction_date = match blank_to_none(self.transaction_date) {
            Some(raw) => Some(
                NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .map_err(|_| StoreError::Invalid(format!("invalid transaction_date '{}'", raw)))?
                    .and_hms_opt(0, 0, 0)
                    .ok_or_else(|| StoreError::Invalid(format!("invalid transaction_date '{}'", raw)))?,
            ),
            None => None,
        };

        let payment_status = match blank_to_none(self.payment_status) {
            Some(raw) => raw.parse().map_err(StoreError::Invalid)?,
            None => PaymentStatus::Completed,
        };

        let mut tx = Transaction::new(
            transaction_type,
            &category,
            self.amount,
            TransactionSource::Manual,
        );
        tx.transaction_date = transaction_date;
        tx.tax_amount = self.tax_amount.unwrap_or(0.0);
        tx.total_amount = self.total_amount.unwrap_or(self.amount + tx.tax_amount);
        tx.payment_mode = canonicalize_payment_mode(self.payment_mode.as_deref());
        tx.payment_status = payment_status;
        tx.reference_no = blank_to_none(self.reference_no);
        tx.order_no = blank_to_none(self.order_no);
        tx.source_order_no = tx.order_no.clone();
        tx.customer_id = self.customer_id;
        tx.description = blank_to_none(self.description);
        tx.notes = blank_to_none(self.notes);
        tx.created_by = blank_to_none(self.created_by);
        Ok(tx)
    }
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
