// 👤 Customer Entity - identified by the POS customer code
//
// The code is the business identity: first sighting creates the row, every
// later sighting overwrites the profile. The surrogate id never changes.

use crate::columns::fields;
use crate::row::CanonicalRow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    /// Surrogate key referenced by orders and transactions
    pub id: i64,

    /// Unique across the store
    pub customer_code: String,

    #[serde(flatten)]
    pub profile: CustomerProfile,

    pub created_at: DateTime<Utc>,
}

/// Mutable attributes, replaced wholesale on re-import.
///
/// Absent cells are stored as empty strings, matching how the POS leaves
/// optional columns blank.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub preference: String,
    pub gstin: String,
    pub area_location: String,
    pub registration_source: String,
}

impl CustomerProfile {
    pub fn from_row(row: &CanonicalRow) -> Self {
        CustomerProfile {
            name: row.text_or_empty(fields::CUSTOMER_NAME),
            address: row.text_or_empty(fields::CUSTOMER_ADDRESS),
            phone: row.text_or_empty(fields::CUSTOMER_PHONE),
            preference: row.text_or_empty(fields::CUSTOMER_PREFERENCE),
            gstin: row.text_or_empty(fields::CUSTOMER_GSTIN),
            area_location: row.text_or_empty(fields::AREA_LOCATION),
            registration_source: row.text_or_empty(fields::REGISTRATION_SOURCE),
        }
    }
}

/// Compact view used by search results.
#[derive(Debug, Clone, Serialize)]
pub struct CustomerSummary {
    pub id: i64,
    pub customer_code: String,
    pub name: String,
    pub phone: String,
}

impl From<Customer> for CustomerSummary {
    fn from(customer: Customer) -> Self {
        CustomerSummary {
            id: customer.id,
            customer_code: customer.customer_code,
            name: customer.profile.name,
            phone: customer.profile.phone,
        }
    }
}
