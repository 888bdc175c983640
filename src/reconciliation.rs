// ⚖️ Reconciliation Engine - canonical rows → customers, orders, ledger
//
// One import job runs its passes in order:
//   ORDERS        customers → orders
//   PAYMENTS      payments (order totals + ledger)
//   TRANSACTIONS  ledger entries
//
// Each pass is one SQLite transaction committed after every row was tried.
// Each row runs inside its own savepoint, so a failing row rolls back alone
// and the loop moves on. A pass that fails to commit does not undo the
// passes before it.

use crate::canonical::{canonicalize_payment_location, canonicalize_payment_mode};
use crate::columns::{fields, UploadType};
use crate::dates::DateClass;
use crate::db::{self, UpsertAction};
use crate::entities::{
    CustomerProfile, Order, Transaction, TransactionSource, TransactionType, CATEGORY_GARMENT_RETURN,
    CATEGORY_SALES,
};
use crate::error::{IngestError, IngestResult, StoreResult};
use crate::row::CanonicalRow;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Order numbers starting with this (any case) are garment returns.
pub const DEFAULT_RETURN_PREFIX: &str = "SRN";

// ============================================================================
// PASS OUTCOME
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PassKind {
    Customers,
    Orders,
    Payments,
    Transactions,
}

impl PassKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassKind::Customers => "customers",
            PassKind::Orders => "orders",
            PassKind::Payments => "payments",
            PassKind::Transactions => "transactions",
        }
    }
}

/// A row that was skipped or failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowIssue {
    pub line: u64,
    /// Business key of the row (customer code or order number), when present
    pub key: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassOutcome {
    pub pass: PassKind,
    pub processed: usize,
    pub skipped: usize,
    pub skipped_rows: Vec<RowIssue>,
    pub errors: Vec<RowIssue>,
}

impl PassOutcome {
    fn new(pass: PassKind) -> Self {
        PassOutcome {
            pass,
            processed: 0,
            skipped: 0,
            skipped_rows: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn failed(&self) -> usize {
        self.errors.len()
    }
}

/// What one row did.
#[derive(Debug, Clone, PartialEq)]
enum RowResult {
    Applied,
    /// Not applicable; counted but not reported
    Ignored,
    /// Could not be applied; reported with a reason
    Skipped(String),
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub upload_type: UploadType,
    pub rows: usize,
    pub passes: Vec<PassOutcome>,
}

impl ReconciliationReport {
    pub fn pass(&self, kind: PassKind) -> Option<&PassOutcome> {
        self.passes.iter().find(|p| p.pass == kind)
    }

    pub fn total_errors(&self) -> usize {
        self.passes.iter().map(|p| p.failed()).sum()
    }

    pub fn summary(&self) -> String {
        let parts: Vec<String> = self
            .passes
            .iter()
            .map(|p| {
                format!(
                    "{}: {} processed, {} skipped, {} failed",
                    p.pass.as_str(),
                    p.processed,
                    p.skipped,
                    p.failed()
                )
            })
            .collect();
        format!("{} import of {} rows ({})", self.upload_type, self.rows, parts.join("; "))
    }
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    /// Prefix marking return orders (matched case-insensitively)
    pub return_prefix: String,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine {
            return_prefix: DEFAULT_RETURN_PREFIX.to_string(),
        }
    }

    pub fn with_return_prefix(prefix: &str) -> Self {
        ReconciliationEngine {
            return_prefix: prefix.to_string(),
        }
    }

    pub fn is_return_order(&self, order_no: &str) -> bool {
        let prefix_len = self.return_prefix.len();
        order_no.len() >= prefix_len
            && order_no.is_char_boundary(prefix_len)
            && order_no[..prefix_len].eq_ignore_ascii_case(&self.return_prefix)
    }

    /// Run every pass for the upload type over already-normalized rows.
    pub fn reconcile(
        &self,
        conn: &mut Connection,
        upload_type: UploadType,
        rows: &[CanonicalRow],
    ) -> IngestResult<ReconciliationReport> {
        let mut passes = Vec::new();

        match upload_type {
            UploadType::Orders => {
                passes.push(self.run_pass(conn, PassKind::Customers, rows, |c, r| self.apply_customer(c, r))?);
                passes.push(self.run_pass(conn, PassKind::Orders, rows, |c, r| self.apply_order(c, r))?);
            }
            UploadType::Payments => {
                passes.push(self.run_pass(conn, PassKind::Payments, rows, |c, r| self.apply_payment(c, r))?);
            }
            UploadType::Transactions => {
                passes.push(self.run_pass(conn, PassKind::Transactions, rows, |c, r| {
                    self.apply_ledger_entry(c, r)
                })?);
            }
        }

        Ok(ReconciliationReport {
            upload_type,
            rows: rows.len(),
            passes,
        })
    }

    /// Fold rows through `apply`, one savepoint per row, one commit per pass.
    fn run_pass<F>(
        &self,
        conn: &mut Connection,
        kind: PassKind,
        rows: &[CanonicalRow],
        mut apply: F,
    ) -> IngestResult<PassOutcome>
    where
        F: FnMut(&Connection, &CanonicalRow) -> StoreResult<RowResult>,
    {
        let mut outcome = PassOutcome::new(kind);
        let mut tx = conn.transaction()?;

        for row in rows {
            let key = row_key(row);
            let sp = tx.savepoint()?;

            match apply(&sp, row) {
                Ok(RowResult::Applied) => match sp.commit() {
                    Ok(()) => outcome.processed += 1,
                    Err(e) => {
                        error!(pass = kind.as_str(), line = row.line(), error = %e, "row release failed");
                        outcome.errors.push(RowIssue {
                            line: row.line(),
                            key,
                            message: e.to_string(),
                        });
                    }
                },
                Ok(RowResult::Ignored) => {
                    debug!(pass = kind.as_str(), line = row.line(), "row ignored");
                    outcome.skipped += 1;
                }
                Ok(RowResult::Skipped(reason)) => {
                    warn!(pass = kind.as_str(), line = row.line(), key = ?key, %reason, "row skipped");
                    outcome.skipped += 1;
                    outcome.skipped_rows.push(RowIssue {
                        line: row.line(),
                        key,
                        message: reason,
                    });
                }
                Err(e) => {
                    // savepoint rolls back on drop
                    error!(pass = kind.as_str(), line = row.line(), key = ?key, error = %e, "row failed");
                    outcome.errors.push(RowIssue {
                        line: row.line(),
                        key,
                        message: e.to_string(),
                    });
                }
            }
        }

        tx.commit().map_err(|source| IngestError::Commit {
            pass: kind.as_str(),
            source,
        })?;

        info!(
            pass = kind.as_str(),
            processed = outcome.processed,
            skipped = outcome.skipped,
            failed = outcome.failed(),
            "pass committed"
        );
        Ok(outcome)
    }

    // ========================================================================
    // PASSES
    // ========================================================================

    fn apply_customer(&self, conn: &Connection, row: &CanonicalRow) -> StoreResult<RowResult> {
        let code = match row.get(fields::CUSTOMER_CODE) {
            Some(code) => code,
            None => return Ok(RowResult::Ignored),
        };

        let profile = CustomerProfile::from_row(row);
        db::upsert_customer(conn, code, &profile)?;
        Ok(RowResult::Applied)
    }

    fn apply_order(&self, conn: &Connection, row: &CanonicalRow) -> StoreResult<RowResult> {
        let order_no = match row.get(fields::ORDER_NO) {
            Some(order_no) => order_no,
            None => return Ok(RowResult::Skipped("missing order number".to_string())),
        };
        let code = match row.get(fields::CUSTOMER_CODE) {
            Some(code) => code,
            None => return Ok(RowResult::Skipped("missing customer code".to_string())),
        };
        let customer_id = match db::find_customer_id(conn, code)? {
            Some(id) => id,
            None => return Ok(RowResult::Skipped(format!("customer {} not found", code))),
        };

        let order = Order::from_row(row, order_no, customer_id);
        if let UpsertAction::Updated = db::upsert_order(conn, &order)? {
            debug!(order_no, "order replaced by re-import");
        }
        Ok(RowResult::Applied)
    }

    fn apply_payment(&self, conn: &Connection, row: &CanonicalRow) -> StoreResult<RowResult> {
        let order_no = match row.get(fields::ORDER_NO) {
            Some(order_no) => order_no,
            None => return Ok(RowResult::Skipped("missing order number".to_string())),
        };

        let amount = row.amount(fields::PAYMENT_RECEIVED);
        let adjustment = row.amount(fields::ADJUSTMENT);
        let paid_at = row.date(fields::TRANSACTION_DATE, DateClass::PaymentDate);

        let mut tx = if self.is_return_order(order_no) {
            return_entry(order_no, amount.abs(), adjustment.abs())
        } else {
            let mut order = match db::find_order(conn, order_no)? {
                Some(order) => order,
                None => return Ok(RowResult::Skipped(format!("order {} not found", order_no))),
            };

            let reported_balance = row.amount_parse(fields::BALANCE).value();
            order.apply_payment(amount, adjustment, reported_balance, paid_at);
            db::update_order(conn, &order)?;

            let mut tx = sales_entry(order_no, amount, adjustment);
            tx.order_no = Some(order.order_no.clone());
            tx.customer_id = Some(order.customer_id);
            tx
        };

        tx.transaction_date = paid_at;
        tx.payment_mode = canonicalize_payment_mode(row.get(fields::PAYMENT_MODE));
        tx.reference_no = row.text(fields::TRANSACTION_ID);
        tx.created_by = row.text(fields::ACCEPTED_BY);
        tx.notes = canonicalize_payment_location(row.get(fields::PAYMENT_LOCATION));

        db::insert_transaction(conn, &tx)?;
        debug!(order_no, amount = tx.amount, category = %tx.category, "payment recorded");
        Ok(RowResult::Applied)
    }

    /// Ledger rows link to an existing order but never change its totals.
    fn apply_ledger_entry(&self, conn: &Connection, row: &CanonicalRow) -> StoreResult<RowResult> {
        let amount = row.amount(fields::AMOUNT);

        let mut tx = match row.get(fields::ORDER_NO) {
            Some(order_no) if self.is_return_order(order_no) => return_entry(order_no, amount.abs(), 0.0),
            Some(order_no) => {
                let order = match db::find_order(conn, order_no)? {
                    Some(order) => order,
                    None => return Ok(RowResult::Skipped(format!("order {} not found", order_no))),
                };
                let mut tx = sales_entry(order_no, amount, 0.0);
                tx.order_no = Some(order.order_no);
                tx.customer_id = Some(order.customer_id);
                tx
            }
            None => Transaction::new(
                TransactionType::Income,
                CATEGORY_SALES,
                amount,
                TransactionSource::Csv,
            ),
        };

        tx.transaction_date = row.date(fields::TRANSACTION_DATE, DateClass::TransactionDate);
        tx.payment_mode = canonicalize_payment_mode(row.get(fields::PAYMENT_MODE));
        tx.reference_no = row.text(fields::REFERENCE_NO);
        tx.notes = row.text(fields::NOTES);
        tx.created_by = row.text(fields::CREATED_BY);

        db::insert_transaction(conn, &tx)?;
        Ok(RowResult::Applied)
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// ENTRY BUILDERS
// ============================================================================

/// Refund for a garment return: expense, non-negative, never linked to an order.
fn return_entry(order_no: &str, amount: f64, adjustment: f64) -> Transaction {
    let mut tx = Transaction::new(
        TransactionType::Expense,
        CATEGORY_GARMENT_RETURN,
        amount,
        TransactionSource::Csv,
    );
    tx.total_amount = amount + adjustment;
    tx.source_order_no = Some(order_no.to_string());
    tx.description = Some(format!("Refund for return order {}", order_no));
    tx
}

fn sales_entry(order_no: &str, amount: f64, adjustment: f64) -> Transaction {
    let mut tx = Transaction::new(
        TransactionType::Income,
        CATEGORY_SALES,
        amount,
        TransactionSource::Csv,
    );
    tx.total_amount = amount + adjustment;
    tx.source_order_no = Some(order_no.to_string());
    tx.description = Some(format!("Payment for order {}", order_no));
    tx
}

fn row_key(row: &CanonicalRow) -> Option<String> {
    row.text(fields::ORDER_NO)
        .or_else(|| row.text(fields::CUSTOMER_CODE))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::PaymentMode;
    use crate::db::{find_order, get_all_transactions, setup_database, store_summary};
    use chrono::NaiveDate;

    fn test_db() -> Connection {
        crate::logging::init_test();
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn row(line: u64, cells: &[(&str, &str)]) -> CanonicalRow {
        let mut row = CanonicalRow::new(line);
        for (field, value) in cells {
            row.set(field, value);
        }
        row
    }

    fn order_row(line: u64, order_no: &str, code: &str, net: &str) -> CanonicalRow {
        row(
            line,
            &[
                (fields::ORDER_DATE_TIME, "31 Dec 2023 02:53:53 PM"),
                (fields::ORDER_NO, order_no),
                (fields::CUSTOMER_CODE, code),
                (fields::CUSTOMER_NAME, "Asha Rao"),
                (fields::CUSTOMER_PHONE, "9800000000"),
                (fields::NET_AMOUNT, net),
            ],
        )
    }

    fn payment_row(line: u64, order_no: &str, paid: &str) -> CanonicalRow {
        row(
            line,
            &[
                (fields::TRANSACTION_DATE, "13 Jan 2025 07:28:03 PM"),
                (fields::ORDER_NO, order_no),
                (fields::PAYMENT_RECEIVED, paid),
                (fields::PAYMENT_MODE, "gpay"),
                (fields::PAYMENT_LOCATION, "pos"),
                (fields::ACCEPTED_BY, "counter-1"),
            ],
        )
    }

    fn import(conn: &mut Connection, upload_type: UploadType, rows: &[CanonicalRow]) -> ReconciliationReport {
        ReconciliationEngine::new().reconcile(conn, upload_type, rows).unwrap()
    }

    #[test]
    fn test_return_prefix_detection() {
        let engine = ReconciliationEngine::new();
        assert!(engine.is_return_order("SRN100"));
        assert!(engine.is_return_order("srn-7"));
        assert!(!engine.is_return_order("T100"));
        assert!(!engine.is_return_order("SR"));
        assert!(!engine.is_return_order("₹SRN"));

        let custom = ReconciliationEngine::with_return_prefix("RET");
        assert!(custom.is_return_order("ret55"));
    }

    #[test]
    fn test_orders_reimport_is_idempotent() {
        let mut conn = test_db();
        let rows = vec![order_row(2, "T100", "C1", "500")];

        import(&mut conn, UploadType::Orders, &rows);
        let report = import(&mut conn, UploadType::Orders, &rows);

        let summary = store_summary(&conn).unwrap();
        assert_eq!(summary.customers, 1);
        assert_eq!(summary.orders, 1);
        assert_eq!(report.pass(PassKind::Orders).unwrap().processed, 1);

        let order = find_order(&conn, "T100").unwrap().unwrap();
        assert_eq!(order.net_amount, 500.0);
    }

    #[test]
    fn test_rows_without_customer_code() {
        let mut conn = test_db();
        let rows = vec![order_row(2, "T1", "", "100"), order_row(3, "T2", "C2", "200")];

        let report = import(&mut conn, UploadType::Orders, &rows);

        let customers = report.pass(PassKind::Customers).unwrap();
        assert_eq!(customers.processed, 1);
        assert_eq!(customers.skipped, 1);
        assert!(customers.skipped_rows.is_empty());

        let orders = report.pass(PassKind::Orders).unwrap();
        assert_eq!(orders.processed, 1);
        assert_eq!(orders.skipped, 1);
        assert_eq!(orders.skipped_rows[0].line, 2);
        assert!(find_order(&conn, "T1").unwrap().is_none());
    }

    #[test]
    fn test_failing_row_does_not_sink_the_pass() {
        let mut conn = test_db();
        conn.execute_batch(
            "CREATE TRIGGER reject_bad BEFORE INSERT ON orders
             WHEN NEW.order_no = 'BAD'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();

        let rows = vec![
            order_row(2, "T1", "C1", "100"),
            order_row(3, "BAD", "C1", "100"),
            order_row(4, "T2", "C1", "100"),
        ];
        let report = import(&mut conn, UploadType::Orders, &rows);

        let orders = report.pass(PassKind::Orders).unwrap();
        assert_eq!(orders.processed, 2);
        assert_eq!(orders.failed(), 1);
        assert_eq!(orders.errors[0].line, 3);
        assert_eq!(orders.errors[0].key.as_deref(), Some("BAD"));
        assert!(find_order(&conn, "T1").unwrap().is_some());
        assert!(find_order(&conn, "T2").unwrap().is_some());
        assert_eq!(report.total_errors(), 1);
    }

    #[test]
    fn test_payment_updates_order_and_appends_sale() {
        let mut conn = test_db();
        import(&mut conn, UploadType::Orders, &[order_row(2, "T100", "C1", "500")]);

        let report = import(&mut conn, UploadType::Payments, &[payment_row(2, "T100", "500")]);
        assert_eq!(report.pass(PassKind::Payments).unwrap().processed, 1);

        let order = find_order(&conn, "T100").unwrap().unwrap();
        assert_eq!(order.paid, 500.0);
        assert_eq!(order.balance, 0.0);
        assert_eq!(order.order_status.as_deref(), Some("Delivered"));
        assert!(order.last_payment_activity.is_some());

        let txs = get_all_transactions(&conn).unwrap();
        assert_eq!(txs.len(), 1);
        let tx = &txs[0];
        assert_eq!(tx.category, "Sales");
        assert_eq!(tx.transaction_type, TransactionType::Income);
        assert_eq!(tx.order_no.as_deref(), Some("T100"));
        assert_eq!(tx.customer_id, Some(order.customer_id));
        assert_eq!(tx.payment_mode, Some(PaymentMode::GooglePay));
        assert_eq!(tx.notes.as_deref(), Some("Mobile POS"));
        assert_eq!(tx.created_by.as_deref(), Some("counter-1"));
        assert_eq!(tx.description.as_deref(), Some("Payment for order T100"));
        assert_eq!(tx.source, TransactionSource::Csv);
    }

    #[test]
    fn test_payment_reimport_appends_again() {
        let mut conn = test_db();
        import(&mut conn, UploadType::Orders, &[order_row(2, "T100", "C1", "500")]);

        let rows = vec![payment_row(2, "T100", "100")];
        import(&mut conn, UploadType::Payments, &rows);
        import(&mut conn, UploadType::Payments, &rows);

        assert_eq!(get_all_transactions(&conn).unwrap().len(), 2);
        let order = find_order(&conn, "T100").unwrap().unwrap();
        assert_eq!(order.paid, 200.0);
        assert_eq!(order.balance, 300.0);
    }

    #[test]
    fn test_reported_balance_wins_over_computed() {
        let mut conn = test_db();
        import(&mut conn, UploadType::Orders, &[order_row(2, "T100", "C1", "500")]);

        let mut payment = payment_row(2, "T100", "100");
        payment.set(fields::BALANCE, "0");
        import(&mut conn, UploadType::Payments, &[payment]);

        let order = find_order(&conn, "T100").unwrap().unwrap();
        assert_eq!(order.paid, 100.0);
        assert_eq!(order.balance, 0.0);
    }

    #[test]
    fn test_return_is_an_unlinked_expense() {
        let mut conn = test_db();

        let mut refund = payment_row(2, "SRN100", "-200");
        refund.set(fields::ADJUSTMENT, "-10");
        let report = import(&mut conn, UploadType::Payments, &[refund]);
        assert_eq!(report.pass(PassKind::Payments).unwrap().processed, 1);

        let txs = get_all_transactions(&conn).unwrap();
        assert_eq!(txs.len(), 1);
        let tx = &txs[0];
        assert_eq!(tx.transaction_type, TransactionType::Expense);
        assert_eq!(tx.category, "SRN-Garment Return");
        assert_eq!(tx.amount, 200.0);
        assert_eq!(tx.total_amount, 210.0);
        assert_eq!(tx.order_no, None);
        assert_eq!(tx.customer_id, None);
        assert_eq!(tx.source_order_no.as_deref(), Some("SRN100"));
        assert_eq!(tx.description.as_deref(), Some("Refund for return order SRN100"));
    }

    #[test]
    fn test_payment_for_unknown_order_is_skipped() {
        let mut conn = test_db();
        let report = import(&mut conn, UploadType::Payments, &[payment_row(2, "T404", "50")]);

        let payments = report.pass(PassKind::Payments).unwrap();
        assert_eq!(payments.processed, 0);
        assert_eq!(payments.skipped, 1);
        assert_eq!(payments.skipped_rows[0].key.as_deref(), Some("T404"));
        assert!(get_all_transactions(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_payment_mode_is_kept_visible() {
        let mut conn = test_db();
        import(&mut conn, UploadType::Orders, &[order_row(2, "T1", "C1", "100")]);

        let mut payment = payment_row(2, "T1", "100");
        payment.set(fields::PAYMENT_MODE, "store credit");
        import(&mut conn, UploadType::Payments, &[payment]);

        let tx = &get_all_transactions(&conn).unwrap()[0];
        assert_eq!(tx.payment_mode, Some(PaymentMode::Unlisted("Store Credit".into())));
    }

    #[test]
    fn test_ledger_upload_branches() {
        let mut conn = test_db();
        import(&mut conn, UploadType::Orders, &[order_row(2, "T1", "C1", "100")]);

        let rows = vec![
            row(2, &[(fields::TRANSACTION_DATE, "30 Dec 2023 10:40:29 AM"), (fields::AMOUNT, "75")]),
            row(3, &[(fields::TRANSACTION_DATE, "30 Dec 2023"), (fields::ORDER_NO, "T1"), (fields::AMOUNT, "100")]),
            row(4, &[(fields::TRANSACTION_DATE, "30 Dec 2023"), (fields::ORDER_NO, "T9"), (fields::AMOUNT, "5")]),
            row(5, &[(fields::TRANSACTION_DATE, "31/12/2023"), (fields::ORDER_NO, "srn9"), (fields::AMOUNT, "-40")]),
        ];
        let report = import(&mut conn, UploadType::Transactions, &rows);

        let pass = report.pass(PassKind::Transactions).unwrap();
        assert_eq!(pass.processed, 3);
        assert_eq!(pass.skipped, 1);

        let txs = get_all_transactions(&conn).unwrap();
        assert_eq!(txs.len(), 3);

        let linked = txs.iter().find(|t| t.order_no.as_deref() == Some("T1")).unwrap();
        assert_eq!(linked.category, "Sales");

        let refund = txs.iter().find(|t| t.transaction_type == TransactionType::Expense).unwrap();
        assert_eq!(refund.amount, 40.0);
        assert_eq!(refund.order_no, None);
        assert_eq!(
            refund.transaction_date,
            NaiveDate::from_ymd_opt(2023, 12, 31).and_then(|d| d.and_hms_opt(0, 0, 0))
        );

        // linking never touches the order's totals
        let order = find_order(&conn, "T1").unwrap().unwrap();
        assert_eq!(order.paid, 0.0);
        assert_eq!(order.balance, 100.0);
    }

    #[test]
    fn test_commit_failure_keeps_earlier_passes() {
        let mut conn = test_db();
        // every order insert leaves a dangling reference, checked only at COMMIT
        conn.execute_batch(
            "CREATE TABLE order_audit (
                 customer_id INTEGER REFERENCES customers(id) DEFERRABLE INITIALLY DEFERRED
             );
             CREATE TRIGGER audit_orphan AFTER INSERT ON orders
             BEGIN INSERT INTO order_audit (customer_id) VALUES (-1); END;",
        )
        .unwrap();

        let rows = vec![order_row(2, "T1", "C1", "100")];
        let result = ReconciliationEngine::new().reconcile(&mut conn, UploadType::Orders, &rows);

        match result {
            Err(IngestError::Commit { pass, source }) => {
                assert_eq!(pass, "orders");
                assert!(source.to_string().contains("FOREIGN KEY"));
            }
            other => panic!("expected a commit failure, got {:?}", other.map(|r| r.summary())),
        }

        let summary = store_summary(&conn).unwrap();
        assert_eq!(summary.customers, 1);
        assert_eq!(summary.orders, 0);
        assert!(conn.is_autocommit());
    }

    #[test]
    fn test_failed_ledger_insert_rolls_back_order_update() {
        let mut conn = test_db();
        import(&mut conn, UploadType::Orders, &[order_row(2, "T100", "C1", "500")]);

        conn.execute_batch(
            "CREATE TRIGGER ledger_closed BEFORE INSERT ON transactions
             BEGIN SELECT RAISE(ABORT, 'ledger closed'); END;",
        )
        .unwrap();

        let report = import(&mut conn, UploadType::Payments, &[payment_row(2, "T100", "500")]);
        let pass = report.pass(PassKind::Payments).unwrap();
        assert_eq!(pass.processed, 0);
        assert_eq!(pass.failed(), 1);
        assert!(pass.errors[0].message.contains("ledger closed"));

        // the order update in the same row went back with the failed insert
        let order = find_order(&conn, "T100").unwrap().unwrap();
        assert_eq!(order.paid, 0.0);
        assert_eq!(order.balance, 500.0);
        assert_eq!(order.order_status, None);
        assert_eq!(order.last_payment_activity, None);
        assert!(get_all_transactions(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_end_to_end_scenario() {
        let mut conn = test_db();

        import(&mut conn, UploadType::Orders, &[order_row(2, "T100", "C1", "500")]);
        import(&mut conn, UploadType::Payments, &[payment_row(2, "T100", "500")]);
        let mut refund = CanonicalRow::new(3);
        refund.set(fields::TRANSACTION_DATE, "13 Jan 2025 07:28:03 PM");
        refund.set(fields::ORDER_NO, "SRN100");
        refund.set(fields::PAYMENT_RECEIVED, "-200");
        let report = import(&mut conn, UploadType::Payments, &[refund]);

        assert!(report.summary().contains("payments: 1 processed"));

        let summary = store_summary(&conn).unwrap();
        assert_eq!(summary.customers, 1);
        assert_eq!(summary.orders, 1);
        assert_eq!(summary.transactions, 2);

        let order = find_order(&conn, "T100").unwrap().unwrap();
        assert_eq!(order.paid, 500.0);

        let txs = get_all_transactions(&conn).unwrap();
        assert!(txs.iter().any(|t| t.category == "Sales" && t.amount == 500.0));
        assert!(txs
            .iter()
            .any(|t| t.category == "SRN-Garment Return" && t.amount == 200.0 && t.order_no.is_none()));

        println!("✅ End-to-end reconciliation passed: {}", report.summary());
    }
}
