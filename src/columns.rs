// 🧭 Column Normalizer - raw header spellings → canonical field names
//
// Each upload type has its own alias table: canonical field → accepted
// spellings. Lookup order per header: exact, case-insensitive, verbatim.

use crate::error::{IngestError, IngestResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CANONICAL FIELD NAMES
// ============================================================================

pub mod fields {
    // ORDERS
    pub const ORDER_DATE_TIME: &str = "order_date_time";
    pub const ORDER_NO: &str = "order_no";
    pub const CUSTOMER_CODE: &str = "customer_code";
    pub const CUSTOMER_NAME: &str = "customer_name";
    pub const CUSTOMER_ADDRESS: &str = "customer_address";
    pub const CUSTOMER_PHONE: &str = "customer_phone";
    pub const CUSTOMER_PREFERENCE: &str = "customer_preference";
    pub const DUE_DATE: &str = "due_date";
    pub const LAST_ACTIVITY: &str = "last_activity";
    pub const PIECES: &str = "pieces";
    pub const WEIGHT: &str = "weight";
    pub const GROSS_AMOUNT: &str = "gross_amount";
    pub const DISCOUNT: &str = "discount";
    pub const TAX: &str = "tax";
    pub const NET_AMOUNT: &str = "net_amount";
    pub const ADVANCE: &str = "advance";
    pub const PAID_AMOUNT: &str = "paid_amount";
    pub const ADJUSTMENT: &str = "adjustment";
    pub const BALANCE: &str = "balance";
    pub const ADVANCE_RECEIVED: &str = "advance_received";
    pub const ADVANCE_USED: &str = "advance_used";
    pub const BOOKED_BY: &str = "booked_by";
    pub const WORKSHOP_NOTE: &str = "workshop_note";
    pub const ORDER_NOTE: &str = "order_note";
    pub const HOME_DELIVERY: &str = "home_delivery";
    pub const AREA_LOCATION: &str = "area_location";
    pub const GARMENTS_INSPECTED_BY: &str = "garments_inspected_by";
    pub const CUSTOMER_GSTIN: &str = "customer_gstin";
    pub const REGISTRATION_SOURCE: &str = "registration_source";
    pub const ORDER_FROM_POS: &str = "order_from_pos";
    pub const PACKAGE: &str = "package";
    pub const PACKAGE_TYPE: &str = "package_type";
    pub const PACKAGE_NAME: &str = "package_name";
    pub const FEEDBACK: &str = "feedback";
    pub const TAGS: &str = "tags";
    pub const COMMENT: &str = "comment";
    pub const PRIMARY_SERVICES: &str = "primary_services";
    pub const TOPUP_SERVICE: &str = "topup_service";
    pub const ORDER_STATUS: &str = "order_status";
    pub const LAST_PAYMENT_ACTIVITY: &str = "last_payment_activity";
    pub const COUPON_CODE: &str = "coupon_code";

    // PAYMENTS
    pub const TRANSACTION_DATE: &str = "transaction_date";
    pub const PAYMENT_RECEIVED: &str = "payment_received";
    pub const PAYMENT_MODE: &str = "payment_mode";
    pub const TRANSACTION_ID: &str = "transaction_id";
    pub const ACCEPTED_BY: &str = "accepted_by";
    pub const PAYMENT_LOCATION: &str = "payment_location";

    // TRANSACTIONS
    pub const AMOUNT: &str = "amount";
    pub const REFERENCE_NO: &str = "reference_no";
    pub const NOTES: &str = "notes";
    pub const CREATED_BY: &str = "created_by";
}

use fields::*;

// ============================================================================
// UPLOAD TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadType {
    Orders,
    Payments,
    Transactions,
}

impl UploadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadType::Orders => "ORDERS",
            UploadType::Payments => "PAYMENTS",
            UploadType::Transactions => "TRANSACTIONS",
        }
    }

    pub fn alias_table(&self) -> AliasTable {
        match self {
            UploadType::Orders => ORDER_ALIASES,
            UploadType::Payments => PAYMENT_ALIASES,
            UploadType::Transactions => TRANSACTION_ALIASES,
        }
    }

    pub fn required_columns(&self) -> &'static [&'static str] {
        match self {
            UploadType::Orders => &[
                ORDER_DATE_TIME,
                ORDER_NO,
                CUSTOMER_CODE,
                CUSTOMER_NAME,
                CUSTOMER_PHONE,
                NET_AMOUNT,
            ],
            UploadType::Payments => &[TRANSACTION_DATE, ORDER_NO, PAYMENT_RECEIVED],
            UploadType::Transactions => &[TRANSACTION_DATE, AMOUNT],
        }
    }
}

impl fmt::Display for UploadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "orders" | "order" => Ok(UploadType::Orders),
            "payments" | "payment" => Ok(UploadType::Payments),
            "transactions" | "transaction" => Ok(UploadType::Transactions),
            other => Err(format!(
                "unknown upload type '{}': expected orders, payments or transactions",
                other
            )),
        }
    }
}

// ============================================================================
// ALIAS TABLES
// ============================================================================

/// Canonical field → accepted header spellings, in priority order.
pub type AliasTable = &'static [(&'static str, &'static [&'static str])];

pub const ORDER_ALIASES: AliasTable = &[
    (ORDER_DATE_TIME, &["order date / time", "order date time", "orderdatetime"]),
    (ORDER_NO, &["order no", "orderno", "order number", "ordernumber"]),
    (CUSTOMER_CODE, &["customer code", "customercode", "code"]),
    (CUSTOMER_NAME, &["customer name", "customername", "name"]),
    (CUSTOMER_ADDRESS, &["customer address", "customeraddress", "address"]),
    (CUSTOMER_PHONE, &["customer phone", "customerphone", "phone"]),
    (CUSTOMER_PREFERENCE, &["customer preference", "customerpreference", "preference"]),
    (DUE_DATE, &["due date", "duedate"]),
    (LAST_ACTIVITY, &["last activity", "lastactivity"]),
    (PIECES, &["pcs.", "pieces", "piececount"]),
    (WEIGHT, &["weight"]),
    (GROSS_AMOUNT, &["gross amount", "grossamount"]),
    (DISCOUNT, &["discount"]),
    (TAX, &["tax", "taxamount"]),
    (NET_AMOUNT, &["net amount", "netamount", "totalamount"]),
    (ADVANCE, &["advance", "advanceamount"]),
    (PAID_AMOUNT, &["paid", "paid amount", "paidamount", "payment received"]),
    (ADJUSTMENT, &["adjustment", "adjustments"]),
    (BALANCE, &["balance", "balanceamount"]),
    (ADVANCE_RECEIVED, &["advance received", "advancereceived"]),
    (ADVANCE_USED, &["advance used", "advanceused"]),
    (BOOKED_BY, &["booked by", "bookedby"]),
    (WORKSHOP_NOTE, &["workshop note", "workshopnote"]),
    (ORDER_NOTE, &["order note", "ordernote"]),
    (HOME_DELIVERY, &["home delivery", "homedelivery"]),
    (AREA_LOCATION, &["area location", "arealocation", "area/location"]),
    (GARMENTS_INSPECTED_BY, &["garments inspected by", "garmentsinspectedby"]),
    (CUSTOMER_GSTIN, &["customer gstin", "customergstin", "gstin"]),
    (REGISTRATION_SOURCE, &["registration source", "registrationsource"]),
    (ORDER_FROM_POS, &["order from pos", "orderpos"]),
    (PACKAGE, &["package"]),
    (PACKAGE_TYPE, &["package type", "packagetype"]),
    (PACKAGE_NAME, &["package name", "packagename"]),
    (FEEDBACK, &["feedback"]),
    (TAGS, &["tags"]),
    (COMMENT, &["comment", "comments"]),
    (PRIMARY_SERVICES, &["primary services", "primaryservices"]),
    (TOPUP_SERVICE, &["top up/extra service", "topupservice", "extraservice"]),
    (ORDER_STATUS, &["order status", "orderstatus"]),
    (LAST_PAYMENT_ACTIVITY, &["last payment activity", "lastpaymentactivity"]),
    (COUPON_CODE, &["coupon code", "couponcode"]),
];

pub const PAYMENT_ALIASES: AliasTable = &[
    (TRANSACTION_DATE, &["transaction_date"]),
    (ORDER_NO, &["order_no"]),
    (CUSTOMER_CODE, &["customer_code"]),
    (CUSTOMER_NAME, &["customer_name"]),
    (CUSTOMER_ADDRESS, &["customer_address"]),
    (CUSTOMER_PHONE, &["customer_phone"]),
    (PAYMENT_RECEIVED, &["payment_received", "paid_amount"]),
    (PAYMENT_MODE, &["payment_mode"]),
    (ADJUSTMENT, &["adjustment"]),
    (BALANCE, &["balance"]),
    (TRANSACTION_ID, &["transaction_id"]),
    (ACCEPTED_BY, &["accepted_by"]),
    (PAYMENT_LOCATION, &["payment_location"]),
];

pub const TRANSACTION_ALIASES: AliasTable = &[
    (TRANSACTION_DATE, &["transaction date", "date", "transactiondate"]),
    (ORDER_NO, &["order no", "order number", "orderno", "ordernumber"]),
    (AMOUNT, &["amount", "transaction amount", "transactionamount"]),
    (PAYMENT_MODE, &["payment mode", "mode", "paymentmode"]),
    (REFERENCE_NO, &["reference no", "transaction id", "referenceno"]),
    (NOTES, &["notes", "description"]),
    (CREATED_BY, &["created by", "user", "createdby"]),
];

/// Header names of the POS payment export, rewritten before alias lookup
/// on PAYMENTS uploads (exact match only).
pub const EXPORT_HEADER_STANDARDIZATION: &[(&str, &str)] = &[
    ("Order Date", "order_date"),
    ("Payment Date", TRANSACTION_DATE),
    ("Order No.", ORDER_NO),
    ("Order Number", ORDER_NO),
    ("Customer Code", CUSTOMER_CODE),
    ("Customer Name", CUSTOMER_NAME),
    ("Customer Address", CUSTOMER_ADDRESS),
    ("Customer Mobile No.", CUSTOMER_PHONE),
    ("paid_amount", PAYMENT_RECEIVED),
    ("Payment Amount", PAYMENT_RECEIVED),
    ("Payment Received", PAYMENT_RECEIVED),
    ("Payment Mode", PAYMENT_MODE),
    ("Online TransactionID", TRANSACTION_ID),
    ("Accept By", ACCEPTED_BY),
    ("Payment Made At", PAYMENT_LOCATION),
    ("Balance", BALANCE),
    ("Adjustment", ADJUSTMENT),
    ("Adjustments", ADJUSTMENT),
    ("Type", "type"),
];

// ============================================================================
// NORMALIZER
// ============================================================================

/// Reverse lookup over one alias table.
#[derive(Debug, Clone)]
pub struct ColumnNormalizer {
    upload_type: UploadType,
    exact: HashMap<&'static str, &'static str>,
    folded: HashMap<String, &'static str>,
}

impl ColumnNormalizer {
    pub fn new(upload_type: UploadType) -> Self {
        let (exact, folded) = build_reverse_index(upload_type.alias_table());
        ColumnNormalizer {
            upload_type,
            exact,
            folded,
        }
    }

    pub fn upload_type(&self) -> UploadType {
        self.upload_type
    }

    /// Canonical name for one header; unknown headers come back verbatim.
    pub fn normalize<'h>(&self, header: &'h str) -> Normalized<'h> {
        let header = if self.upload_type == UploadType::Payments {
            standardize_export_header(header)
        } else {
            header
        };

        if let Some(canonical) = self.exact.get(header) {
            return Normalized::Canonical(canonical);
        }
        if let Some(canonical) = self.folded.get(&header.to_lowercase()) {
            return Normalized::Canonical(canonical);
        }
        Normalized::Verbatim(header)
    }

    /// Normalize a full header row, preserving positions.
    pub fn normalize_all<'h, I>(&self, headers: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'h str>,
    {
        headers
            .into_iter()
            .map(|h| self.normalize(h).as_str().to_string())
            .collect()
    }
}

/// Result of normalizing one header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalized<'h> {
    Canonical(&'static str),
    Verbatim(&'h str),
}

impl<'h> Normalized<'h> {
    pub fn as_str(&self) -> &'h str {
        match self {
            Normalized::Canonical(s) => s,
            Normalized::Verbatim(s) => s,
        }
    }

    pub fn is_canonical(&self) -> bool {
        matches!(self, Normalized::Canonical(_))
    }
}

/// Build spelling → canonical maps from an alias table.
///
/// The exact map lets a later table entry override an earlier one for the same
/// spelling; the case-folded map keeps the first entry in table order.
pub fn build_reverse_index(
    table: AliasTable,
) -> (HashMap<&'static str, &'static str>, HashMap<String, &'static str>) {
    let mut exact = HashMap::new();
    let mut folded = HashMap::new();

    for (canonical, spellings) in table {
        for spelling in spellings.iter() {
            exact.insert(*spelling, *canonical);
            folded.entry(spelling.to_lowercase()).or_insert(*canonical);
        }
    }

    (exact, folded)
}

fn standardize_export_header(header: &str) -> &str {
    EXPORT_HEADER_STANDARDIZATION
        .iter()
        .find(|(raw, _)| *raw == header)
        .map(|(_, standard)| *standard)
        .unwrap_or(header)
}

// ============================================================================
// REQUIRED-COLUMN CHECK
// ============================================================================

/// Reject the whole row-set if any required canonical field is absent.
pub fn verify_required_columns(columns: &[String], upload_type: UploadType) -> IngestResult<()> {
    let missing: Vec<String> = upload_type
        .required_columns()
        .iter()
        .filter(|required| !columns.iter().any(|c| c == *required))
        .map(|required| required.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(IngestError::MissingColumns {
            upload_type: upload_type.as_str().to_string(),
            missing,
            available: columns.to_vec(),
        })
    }
}
