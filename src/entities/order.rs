// 📦 Order Entity - keyed by the external order number
//
// The order number comes from the POS and is never regenerated. A re-import
// replaces every mutable field (last write wins) and re-points the customer.

use crate::amounts::AmountParse;
use crate::columns::fields;
use crate::dates::DateClass;
use crate::row::CanonicalRow;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// ORDER STATUS VOCABULARY
// ============================================================================

pub const ORDER_STATUS_DELIVERED: &str = "Delivered";

pub const ORDER_STATUSES: &[&str] = &[
    "Unprocessed",
    "Pending",
    "Processing",
    "Ready",
    ORDER_STATUS_DELIVERED,
    "Cancelled",
];

// ============================================================================
// ORDER ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_no: String,
    pub customer_id: i64,

    // Dates (naive local, as exported)
    pub order_date: Option<NaiveDateTime>,
    pub due_date: Option<NaiveDateTime>,
    pub last_activity: Option<NaiveDateTime>,
    pub last_payment_activity: Option<NaiveDateTime>,

    // Quantities
    pub pieces: i64,
    pub weight: f64,

    // Money
    pub gross_amount: f64,
    pub discount: f64,
    pub tax: f64,
    pub net_amount: f64,
    pub advance: f64,
    pub paid: f64,
    pub adjustment: f64,
    pub balance: f64,
    pub advance_received: f64,
    pub advance_used: f64,

    // Free text and flags
    pub booked_by: Option<String>,
    pub workshop_note: Option<String>,
    pub order_note: Option<String>,
    pub home_delivery: bool,
    pub garments_inspected_by: Option<String>,
    pub order_from_pos: bool,
    pub package: bool,
    pub package_type: Option<String>,
    pub package_name: Option<String>,
    pub feedback: Option<String>,
    pub tags: Option<String>,
    pub comment: Option<String>,
    pub primary_services: Option<String>,
    pub topup_service: Option<String>,
    pub order_status: Option<String>,
    pub coupon_code: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Build from one ORDERS row. Never fails: bad numbers become 0.0 and
    /// bad dates become None.
    pub fn from_row(row: &CanonicalRow, order_no: &str, customer_id: i64) -> Self {
        let net_amount = row.amount(fields::NET_AMOUNT);
        let paid = row.amount(fields::PAID_AMOUNT);
        let adjustment = row.amount(fields::ADJUSTMENT);

        let balance = match row.amount_parse(fields::BALANCE) {
            AmountParse::Parsed(reported) => reported,
            AmountParse::Missing | AmountParse::Unparseable => net_amount - paid - adjustment,
        };

        Order {
            order_no: order_no.to_string(),
            customer_id,
            order_date: row.date(fields::ORDER_DATE_TIME, DateClass::OrderDate),
            due_date: row.date(fields::DUE_DATE, DateClass::OrderDate),
            last_activity: row.date(fields::LAST_ACTIVITY, DateClass::OrderDate),
            last_payment_activity: row.date(fields::LAST_PAYMENT_ACTIVITY, DateClass::OrderDate),
            pieces: row.count(fields::PIECES),
            weight: row.amount(fields::WEIGHT),
            gross_amount: row.amount(fields::GROSS_AMOUNT),
            discount: row.amount(fields::DISCOUNT),
            tax: row.amount(fields::TAX),
            net_amount,
            advance: row.amount(fields::ADVANCE),
            paid,
            adjustment,
            balance,
            advance_received: row.amount(fields::ADVANCE_RECEIVED),
            advance_used: row.amount(fields::ADVANCE_USED),
            booked_by: row.text(fields::BOOKED_BY),
            workshop_note: row.text(fields::WORKSHOP_NOTE),
            order_note: row.text(fields::ORDER_NOTE),
            home_delivery: row.flag(fields::HOME_DELIVERY),
            garments_inspected_by: row.text(fields::GARMENTS_INSPECTED_BY),
            order_from_pos: row.flag(fields::ORDER_FROM_POS),
            package: row.flag(fields::PACKAGE),
            package_type: row.text(fields::PACKAGE_TYPE),
            package_name: row.text(fields::PACKAGE_NAME),
            feedback: row.text(fields::FEEDBACK),
            tags: row.text(fields::TAGS),
            comment: row.text(fields::COMMENT),
            primary_services: row.text(fields::PRIMARY_SERVICES),
            topup_service: row.text(fields::TOPUP_SERVICE),
            order_status: row.text(fields::ORDER_STATUS),
            coupon_code: row.text(fields::COUPON_CODE),
            created_at: Utc::now(),
        }
    }

    /// net − paid − adjustment
    pub fn computed_balance(&self) -> f64 {
        self.net_amount - self.paid - self.adjustment
    }

    /// Fold one payment into the running totals.
    ///
    /// A balance reported by the payment export is authoritative; otherwise the
    /// balance is recomputed. The order is marked delivered.
    pub fn apply_payment(
        &mut self,
        amount: f64,
        adjustment: f64,
        reported_balance: Option<f64>,
        paid_at: Option<NaiveDateTime>,
    ) {
        self.paid += amount;
        self.adjustment += adjustment;
        self.balance = reported_balance.unwrap_or_else(|| self.computed_balance());
        if paid_at.is_some() {
            self.last_payment_activity = paid_at;
        }
        self.order_status = Some(ORDER_STATUS_DELIVERED.to_string());
    }
}

/// Order joined with its customer's name, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct OrderWithCustomer {
    #[serde(flatten)]
    pub order: Order,
    pub customer_code: String,
    pub customer_name: String,
}

/// Optional filters for order listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub customer_id: Option<i64>,
    pub status: Option<String>,
    /// Inclusive lower bound on order_date
    pub start_date: Option<chrono::NaiveDate>,
    /// Inclusive upper bound on order_date (whole day)
    pub end_date: Option<chrono::NaiveDate>,
}
