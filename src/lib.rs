// POS Reconcile - Core Library
// Ingests POS exports (orders, payments, ledger) and reconciles them into
// customers, orders and an append-only transaction ledger.
// Shared by the CLI, the API server, and tests.

pub mod amounts;        // Numeric sanitizer
pub mod canonical;      // Payment mode / location canonicalizers
pub mod columns;        // Header aliases + required columns
pub mod config;
pub mod dates;          // Date cascade parser
pub mod db;
pub mod encoding;       // Upload encoding resolver
pub mod entities;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod reconciliation; // Customer → order → transaction passes
pub mod row;

// Re-export commonly used types
pub use columns::UploadType;
pub use config::{AppConfig, IngestConfig};
pub use db::{
    open_database, setup_database, Event, LedgerBalance, StoreSummary,
    insert_event, get_events_for_entity, get_events_by_type,
    get_all_customers, find_customer_by_code, search_customers,
    list_orders, find_order,
    get_all_transactions, get_transaction, get_transactions_for_order,
    add_manual_transaction, delete_manual_transaction, export_manual_transactions_csv,
    ledger_balance, store_summary,
};
pub use entities::{
    Customer, CustomerSummary, ManualTransaction, Order, OrderFilter, OrderWithCustomer,
    PaymentStatus, Transaction, TransactionSource, TransactionType,
};
pub use error::{IngestError, StoreError};
pub use ingest::{ingest_upload, ImportSummary};
pub use reconciliation::{PassKind, PassOutcome, ReconciliationEngine, ReconciliationReport, RowIssue};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
