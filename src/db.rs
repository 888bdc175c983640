// 🗄️ Store - SQLite schema, audit events, entity queries
//
// Timestamps from the POS are naive local values stored as
// "YYYY-MM-DD HH:MM:SS" text so they sort and range-filter as strings.
// System timestamps (created_at, event time) are RFC 3339 UTC.

use crate::canonical::PaymentMode;
use crate::entities::{
    Customer, CustomerProfile, CustomerSummary, ManualTransaction, Order, OrderFilter,
    OrderWithCustomer, Transaction, TransactionSource,
};
use crate::error::{StoreError, StoreResult};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Statement};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Minimum query length for customer search.
const SEARCH_MIN_LEN: usize = 2;
const SEARCH_LIMIT: i64 = 10;

// ============================================================================
// SETUP
// ============================================================================

/// Open (or create) the database file and make sure the schema exists.
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    setup_database(&conn)?;
    info!(path = %path.display(), "database ready");
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Customers
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS customers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            customer_code TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            address TEXT NOT NULL DEFAULT '',
            phone TEXT NOT NULL DEFAULT '',
            preference TEXT NOT NULL DEFAULT '',
            gstin TEXT NOT NULL DEFAULT '',
            area_location TEXT NOT NULL DEFAULT '',
            registration_source TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL
        )",
        [],
    )
    .context("Failed to create customers table")?;

    // ==========================================================================
    // Orders (PK = external order number)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS orders (
            order_no TEXT PRIMARY KEY,
            customer_id INTEGER NOT NULL REFERENCES customers(id),
            order_date TEXT,
            due_date TEXT,
            last_activity TEXT,
            last_payment_activity TEXT,
            pieces INTEGER NOT NULL DEFAULT 0,
            weight REAL NOT NULL DEFAULT 0,
            gross_amount REAL NOT NULL DEFAULT 0,
            discount REAL NOT NULL DEFAULT 0,
            tax REAL NOT NULL DEFAULT 0,
            net_amount REAL NOT NULL DEFAULT 0,
            advance REAL NOT NULL DEFAULT 0,
            paid REAL NOT NULL DEFAULT 0,
            adjustment REAL NOT NULL DEFAULT 0,
            balance REAL NOT NULL DEFAULT 0,
            advance_received REAL NOT NULL DEFAULT 0,
            advance_used REAL NOT NULL DEFAULT 0,
            booked_by TEXT,
            workshop_note TEXT,
            order_note TEXT,
            home_delivery INTEGER NOT NULL DEFAULT 0,
            garments_inspected_by TEXT,
            order_from_pos INTEGER NOT NULL DEFAULT 0,
            package INTEGER NOT NULL DEFAULT 0,
            package_type TEXT,
            package_name TEXT,
            feedback TEXT,
            tags TEXT,
            comment TEXT,
            primary_services TEXT,
            topup_service TEXT,
            order_status TEXT,
            coupon_code TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )
    .context("Failed to create orders table")?;

    // ==========================================================================
    // Transactions (append-only ledger)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tx_uuid TEXT UNIQUE NOT NULL,
            transaction_date TEXT,
            transaction_type TEXT NOT NULL,
            category TEXT NOT NULL,
            amount REAL NOT NULL,
            tax_amount REAL NOT NULL DEFAULT 0,
            total_amount REAL NOT NULL,
            payment_mode TEXT,
            payment_status TEXT NOT NULL,
            reference_no TEXT,
            order_no TEXT REFERENCES orders(order_no),
            source_order_no TEXT,
            customer_id INTEGER REFERENCES customers(id),
            description TEXT,
            notes TEXT,
            created_by TEXT,
            source TEXT NOT NULL CHECK (source IN ('manual', 'csv')),
            created_at TEXT NOT NULL
        )",
        [],
    )
    .context("Failed to create transactions table")?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        )",
        [],
    )
    .context("Failed to create events table")?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    for ddl in [
        "CREATE INDEX IF NOT EXISTS idx_orders_customer ON orders(customer_id)",
        "CREATE INDEX IF NOT EXISTS idx_orders_date ON orders(order_date)",
        "CREATE INDEX IF NOT EXISTS idx_tx_order ON transactions(order_no)",
        "CREATE INDEX IF NOT EXISTS idx_tx_date ON transactions(transaction_date)",
        "CREATE INDEX IF NOT EXISTS idx_tx_source ON transactions(source)",
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
    ] {
        conn.execute(ddl, [])?;
    }

    Ok(())
}

// ============================================================================
// CONVERSIONS
// ============================================================================

fn ts_to_sql(value: Option<NaiveDateTime>) -> Option<String> {
    value.map(|dt| dt.format(TS_FORMAT).to_string())
}

fn ts_from_sql(value: Option<String>) -> Option<NaiveDateTime> {
    value.and_then(|s| NaiveDateTime::parse_from_str(&s, TS_FORMAT).ok())
}

fn utc_from_sql(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// RFC 3339 timestamp read by column name.
fn utc_column(row: &Row, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    utc_from_sql(column_position(row, column)?, &raw)
}

/// Text column parsed into one of the entity vocabularies.
fn parsed_column<T>(row: &Row, column: &str) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(column)?;
    let idx = column_position(row, column)?;
    raw.parse()
        .map_err(|message: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into()))
}

fn column_position(row: &Row, column: &str) -> rusqlite::Result<usize> {
    let stmt: &Statement = row.as_ref();
    stmt.column_index(column)
}

/// Created vs. updated, for upsert callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpsertAction {
    Created,
    Updated,
}

// ============================================================================
// EVENTS (audit trail)
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn insert_event(conn: &Connection, event: &Event) -> StoreResult<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Events for one entity, newest first.
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> StoreResult<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], event_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

/// Latest events of one type, newest first.
pub fn get_events_by_type(conn: &Connection, event_type: &str, limit: i64) -> StoreResult<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE event_type = ?1
         ORDER BY timestamp DESC, id DESC
         LIMIT ?2",
    )?;

    let events = stmt
        .query_map(params![event_type, limit], event_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

fn event_from_row(row: &Row) -> rusqlite::Result<Event> {
    let timestamp: String = row.get(1)?;
    let data_json: String = row.get(5)?;

    Ok(Event {
        event_id: row.get(0)?,
        timestamp: utc_from_sql(1, &timestamp)?,
        event_type: row.get(2)?,
        entity_type: row.get(3)?,
        entity_id: row.get(4)?,
        data: serde_json::from_str(&data_json)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?,
        actor: row.get(6)?,
    })
}

// ============================================================================
// CUSTOMERS
// ============================================================================

const CUSTOMER_COLUMNS: &str = "id, customer_code, name, address, phone, preference, gstin,
    area_location, registration_source, created_at";

fn customer_from_row(row: &Row) -> rusqlite::Result<Customer> {
    Ok(Customer {
        id: row.get("id")?,
        customer_code: row.get("customer_code")?,
        profile: CustomerProfile {
            name: row.get("name")?,
            address: row.get("address")?,
            phone: row.get("phone")?,
            preference: row.get("preference")?,
            gstin: row.get("gstin")?,
            area_location: row.get("area_location")?,
            registration_source: row.get("registration_source")?,
        },
        created_at: utc_column(row, "created_at")?,
    })
}

pub fn find_customer_by_code(conn: &Connection, code: &str) -> StoreResult<Option<Customer>> {
    let sql = format!("SELECT {} FROM customers WHERE customer_code = ?1", CUSTOMER_COLUMNS);
    let customer = conn
        .query_row(&sql, params![code], customer_from_row)
        .optional()?;
    Ok(customer)
}

pub fn find_customer_id(conn: &Connection, code: &str) -> StoreResult<Option<i64>> {
    let id = conn
        .query_row(
            "SELECT id FROM customers WHERE customer_code = ?1",
            params![code],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

pub fn insert_customer(conn: &Connection, code: &str, profile: &CustomerProfile) -> StoreResult<i64> {
    conn.execute(
        "INSERT INTO customers (
            customer_code, name, address, phone, preference, gstin,
            area_location, registration_source, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            code,
            profile.name,
            profile.address,
            profile.phone,
            profile.preference,
            profile.gstin,
            profile.area_location,
            profile.registration_source,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn update_customer(conn: &Connection, id: i64, profile: &CustomerProfile) -> StoreResult<()> {
    conn.execute(
        "UPDATE customers
         SET name = ?1, address = ?2, phone = ?3, preference = ?4, gstin = ?5,
             area_location = ?6, registration_source = ?7
         WHERE id = ?8",
        params![
            profile.name,
            profile.address,
            profile.phone,
            profile.preference,
            profile.gstin,
            profile.area_location,
            profile.registration_source,
            id,
        ],
    )?;
    Ok(())
}

/// Insert on first sighting of the code, overwrite the profile afterwards.
pub fn upsert_customer(
    conn: &Connection,
    code: &str,
    profile: &CustomerProfile,
) -> StoreResult<(i64, UpsertAction)> {
    match find_customer_id(conn, code)? {
        Some(id) => {
            update_customer(conn, id, profile)?;
            debug!(customer_code = code, "updated customer");
            Ok((id, UpsertAction::Updated))
        }
        None => {
            let id = insert_customer(conn, code, profile)?;
            debug!(customer_code = code, id, "created customer");
            Ok((id, UpsertAction::Created))
        }
    }
}

pub fn get_all_customers(conn: &Connection) -> StoreResult<Vec<Customer>> {
    let sql = format!("SELECT {} FROM customers ORDER BY customer_code", CUSTOMER_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let customers = stmt
        .query_map([], customer_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(customers)
}

/// Substring match on name, code or phone. Queries shorter than two
/// characters return nothing.
pub fn search_customers(conn: &Connection, query: &str) -> StoreResult<Vec<CustomerSummary>> {
    let query = query.trim();
    if query.chars().count() < SEARCH_MIN_LEN {
        return Ok(Vec::new());
    }

    let pattern = format!("%{}%", query.to_lowercase());
    let sql = format!(
        "SELECT {} FROM customers
         WHERE lower(name) LIKE ?1 OR lower(customer_code) LIKE ?1 OR lower(phone) LIKE ?1
         ORDER BY customer_code
         LIMIT ?2",
        CUSTOMER_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let customers = stmt
        .query_map(params![pattern, SEARCH_LIMIT], customer_from_row)?
        .map(|r| r.map(CustomerSummary::from))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(customers)
}

// ============================================================================
// ORDERS
// ============================================================================

fn order_from_row(row: &Row) -> rusqlite::Result<Order> {
    Ok(Order {
        order_no: row.get("order_no")?,
        customer_id: row.get("customer_id")?,
        order_date: ts_from_sql(row.get("order_date")?),
        due_date: ts_from_sql(row.get("due_date")?),
        last_activity: ts_from_sql(row.get("last_activity")?),
        last_payment_activity: ts_from_sql(row.get("last_payment_activity")?),
        pieces: row.get("pieces")?,
        weight: row.get("weight")?,
        gross_amount: row.get("gross_amount")?,
        discount: row.get("discount")?,
        tax: row.get("tax")?,
        net_amount: row.get("net_amount")?,
        advance: row.get("advance")?,
        paid: row.get("paid")?,
        adjustment: row.get("adjustment")?,
        balance: row.get("balance")?,
        advance_received: row.get("advance_received")?,
        advance_used: row.get("advance_used")?,
        booked_by: row.get("booked_by")?,
        workshop_note: row.get("workshop_note")?,
        order_note: row.get("order_note")?,
        home_delivery: row.get("home_delivery")?,
        garments_inspected_by: row.get("garments_inspected_by")?,
        order_from_pos: row.get("order_from_pos")?,
        package: row.get("package")?,
        package_type: row.get("package_type")?,
        package_name: row.get("package_name")?,
        feedback: row.get("feedback")?,
        tags: row.get("tags")?,
        comment: row.get("comment")?,
        primary_services: row.get("primary_services")?,
        topup_service: row.get("topup_service")?,
        order_status: row.get("order_status")?,
        coupon_code: row.get("coupon_code")?,
        created_at: utc_column(row, "created_at")?,
    })
}

pub fn find_order(conn: &Connection, order_no: &str) -> StoreResult<Option<Order>> {
    let order = conn
        .query_row(
            "SELECT * FROM orders WHERE order_no = ?1",
            params![order_no],
            order_from_row,
        )
        .optional()?;
    Ok(order)
}

pub fn insert_order(conn: &Connection, order: &Order) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO orders (
            order_no, customer_id, order_date, due_date, last_activity, last_payment_activity,
            pieces, weight, gross_amount, discount, tax, net_amount, advance, paid,
            adjustment, balance, advance_received, advance_used, booked_by, workshop_note,
            order_note, home_delivery, garments_inspected_by, order_from_pos, package,
            package_type, package_name, feedback, tags, comment, primary_services,
            topup_service, order_status, coupon_code, created_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
            ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30, ?31, ?32, ?33, ?34, ?35
        )",
        params![
            order.order_no,
            order.customer_id,
            ts_to_sql(order.order_date),
            ts_to_sql(order.due_date),
            ts_to_sql(order.last_activity),
            ts_to_sql(order.last_payment_activity),
            order.pieces,
            order.weight,
            order.gross_amount,
            order.discount,
            order.tax,
            order.net_amount,
            order.advance,
            order.paid,
            order.adjustment,
            order.balance,
            order.advance_received,
            order.advance_used,
            order.booked_by,
            order.workshop_note,
            order.order_note,
            order.home_delivery,
            order.garments_inspected_by,
            order.order_from_pos,
            order.package,
            order.package_type,
            order.package_name,
            order.feedback,
            order.tags,
            order.comment,
            order.primary_services,
            order.topup_service,
            order.order_status,
            order.coupon_code,
            order.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Overwrite every mutable field and the customer link. created_at is kept.
pub fn update_order(conn: &Connection, order: &Order) -> StoreResult<()> {
    let changed = conn.execute(
        "UPDATE orders SET
            customer_id = ?2, order_date = ?3, due_date = ?4, last_activity = ?5,
            last_payment_activity = ?6, pieces = ?7, weight = ?8, gross_amount = ?9,
            discount = ?10, tax = ?11, net_amount = ?12, advance = ?13, paid = ?14,
            adjustment = ?15, balance = ?16, advance_received = ?17, advance_used = ?18,
            booked_by = ?19, workshop_note = ?20, order_note = ?21, home_delivery = ?22,
            garments_inspected_by = ?23, order_from_pos = ?24, package = ?25,
            package_type = ?26, package_name = ?27, feedback = ?28, tags = ?29,
            comment = ?30, primary_services = ?31, topup_service = ?32,
            order_status = ?33, coupon_code = ?34
         WHERE order_no = ?1",
        params![
            order.order_no,
            order.customer_id,
            ts_to_sql(order.order_date),
            ts_to_sql(order.due_date),
            ts_to_sql(order.last_activity),
            ts_to_sql(order.last_payment_activity),
            order.pieces,
            order.weight,
            order.gross_amount,
            order.discount,
            order.tax,
            order.net_amount,
            order.advance,
            order.paid,
            order.adjustment,
            order.balance,
            order.advance_received,
            order.advance_used,
            order.booked_by,
            order.workshop_note,
            order.order_note,
            order.home_delivery,
            order.garments_inspected_by,
            order.order_from_pos,
            order.package,
            order.package_type,
            order.package_name,
            order.feedback,
            order.tags,
            order.comment,
            order.primary_services,
            order.topup_service,
            order.order_status,
            order.coupon_code,
        ],
    )?;

    if changed == 0 {
        return Err(StoreError::NotFound {
            entity: "order",
            key: order.order_no.clone(),
        });
    }
    Ok(())
}

pub fn upsert_order(conn: &Connection, order: &Order) -> StoreResult<UpsertAction> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM orders WHERE order_no = ?1)",
        params![order.order_no],
        |row| row.get(0),
    )?;

    if exists {
        update_order(conn, order)?;
        debug!(order_no = %order.order_no, "updated order");
        Ok(UpsertAction::Updated)
    } else {
        insert_order(conn, order)?;
        debug!(order_no = %order.order_no, "created order");
        Ok(UpsertAction::Created)
    }
}

/// Orders joined with their customer, newest order date first.
pub fn list_orders(conn: &Connection, filter: &OrderFilter) -> StoreResult<Vec<OrderWithCustomer>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<rusqlite::types::Value> = Vec::new();

    if let Some(customer_id) = filter.customer_id {
        clauses.push("o.customer_id = ?");
        values.push(customer_id.into());
    }
    if let Some(status) = &filter.status {
        clauses.push("o.order_status = ?");
        values.push(status.clone().into());
    }
    if let Some(start) = filter.start_date {
        clauses.push("o.order_date >= ?");
        values.push(format!("{} 00:00:00", start.format("%Y-%m-%d")).into());
    }
    if let Some(end) = filter.end_date {
        clauses.push("o.order_date <= ?");
        values.push(format!("{} 23:59:59", end.format("%Y-%m-%d")).into());
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let sql = format!(
        "SELECT o.*, c.customer_code AS customer_code, c.name AS customer_name
         FROM orders o
         JOIN customers c ON c.id = o.customer_id
         {}
         ORDER BY o.order_date DESC, o.order_no",
        where_sql
    );

    let mut stmt = conn.prepare(&sql)?;
    let orders = stmt
        .query_map(rusqlite::params_from_iter(values), |row| {
            Ok(OrderWithCustomer {
                order: order_from_row(row)?,
                customer_code: row.get("customer_code")?,
                customer_name: row.get("customer_name")?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(orders)
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

fn transaction_from_row(row: &Row) -> rusqlite::Result<Transaction> {
    let payment_mode: Option<String> = row.get("payment_mode")?;

    Ok(Transaction {
        id: Some(row.get("id")?),
        tx_uuid: row.get("tx_uuid")?,
        transaction_date: ts_from_sql(row.get("transaction_date")?),
        transaction_type: parsed_column(row, "transaction_type")?,
        category: row.get("category")?,
        amount: row.get("amount")?,
        tax_amount: row.get("tax_amount")?,
        total_amount: row.get("total_amount")?,
        payment_mode: payment_mode.map(|m| PaymentMode::from_stored(&m)),
        payment_status: parsed_column(row, "payment_status")?,
        reference_no: row.get("reference_no")?,
        order_no: row.get("order_no")?,
        source_order_no: row.get("source_order_no")?,
        customer_id: row.get("customer_id")?,
        description: row.get("description")?,
        notes: row.get("notes")?,
        created_by: row.get("created_by")?,
        source: parsed_column(row, "source")?,
        created_at: utc_column(row, "created_at")?,
    })
}

/// Append one ledger entry; returns the row id.
pub fn insert_transaction(conn: &Connection, tx: &Transaction) -> StoreResult<i64> {
    conn.execute(
        "INSERT INTO transactions (
            tx_uuid, transaction_date, transaction_type, category, amount, tax_amount,
            total_amount, payment_mode, payment_status, reference_no, order_no,
            source_order_no, customer_id, description, notes, created_by, source, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            tx.tx_uuid,
            ts_to_sql(tx.transaction_date),
            tx.transaction_type.as_str(),
            tx.category,
            tx.amount,
            tx.tax_amount,
            tx.total_amount,
            tx.payment_mode.as_ref().map(|m| m.as_str().to_string()),
            tx.payment_status.as_str(),
            tx.reference_no,
            tx.order_no,
            tx.source_order_no,
            tx.customer_id,
            tx.description,
            tx.notes,
            tx.created_by,
            tx.source.as_str(),
            tx.created_at.to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_transaction(conn: &Connection, id: i64) -> StoreResult<Option<Transaction>> {
    let tx = conn
        .query_row(
            "SELECT * FROM transactions WHERE id = ?1",
            params![id],
            transaction_from_row,
        )
        .optional()?;
    Ok(tx)
}

/// Newest first; undated entries last.
pub fn get_all_transactions(conn: &Connection) -> StoreResult<Vec<Transaction>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM transactions
         ORDER BY transaction_date IS NULL, transaction_date DESC, id DESC",
    )?;
    let transactions = stmt
        .query_map([], transaction_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(transactions)
}

pub fn get_transactions_for_order(conn: &Connection, order_no: &str) -> StoreResult<Vec<Transaction>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM transactions
         WHERE order_no = ?1
         ORDER BY transaction_date IS NULL, transaction_date DESC, id DESC",
    )?;
    let transactions = stmt
        .query_map(params![order_no], transaction_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(transactions)
}

/// Store a hand-entered transaction and log it to the audit trail.
pub fn add_manual_transaction(conn: &Connection, input: ManualTransaction) -> StoreResult<Transaction> {
    let mut tx = input.into_transaction()?;

    // entry and audit event commit together
    let db_tx = conn.unchecked_transaction()?;
    let id = insert_transaction(&db_tx, &tx)?;
    tx.id = Some(id);

    let event = Event::new(
        "transaction_added",
        "transaction",
        &tx.tx_uuid,
        serde_json::json!({
            "id": id,
            "type": tx.transaction_type.as_str(),
            "category": tx.category,
            "amount": tx.amount,
        }),
        tx.created_by.as_deref().unwrap_or("manual"),
    );
    insert_event(&db_tx, &event)?;
    db_tx.commit()?;

    info!(id, category = %tx.category, amount = tx.amount, "manual transaction added");
    Ok(tx)
}

/// Only manual entries may be deleted; imported rows are protected.
pub fn delete_manual_transaction(conn: &Connection, id: i64) -> StoreResult<()> {
    let tx = get_transaction(conn, id)?.ok_or_else(|| StoreError::NotFound {
        entity: "transaction",
        key: id.to_string(),
    })?;

    if tx.source != TransactionSource::Manual {
        return Err(StoreError::ProtectedTransaction(id));
    }

    let db_tx = conn.unchecked_transaction()?;
    db_tx.execute("DELETE FROM transactions WHERE id = ?1", params![id])?;

    let event = Event::new(
        "transaction_deleted",
        "transaction",
        &tx.tx_uuid,
        serde_json::json!({ "id": id, "amount": tx.amount }),
        "manual",
    );
    insert_event(&db_tx, &event)?;
    db_tx.commit()?;

    info!(id, "manual transaction deleted");
    Ok(())
}

/// CSV of all manual transactions, newest first.
pub fn export_manual_transactions_csv(conn: &Connection) -> StoreResult<String> {
    let mut stmt = conn.prepare(
        "SELECT * FROM transactions
         WHERE source = 'manual'
         ORDER BY transaction_date IS NULL, transaction_date DESC, id DESC",
    )?;
    let transactions = stmt
        .query_map([], transaction_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "Date",
        "Order No",
        "Type",
        "Amount",
        "Payment Mode",
        "Reference No",
        "Description",
        "Notes",
    ])?;

    for tx in &transactions {
        writer.write_record([
            tx.transaction_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            tx.order_no.clone().unwrap_or_default(),
            tx.transaction_type.as_str().to_string(),
            tx.amount.to_string(),
            tx.payment_mode
                .as_ref()
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            tx.reference_no.clone().unwrap_or_default(),
            tx.description.clone().unwrap_or_default(),
            tx.notes.clone().unwrap_or_default(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| StoreError::Export(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| StoreError::Export(e.to_string()))
}

// ============================================================================
// LEDGER & SUMMARY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LedgerBalance {
    pub income: f64,
    pub expense: f64,
    pub net: f64,
}

/// Income total minus expense total over an optional inclusive date range.
/// Transfers and undated entries outside a bounded range are ignored.
pub fn ledger_balance(
    conn: &Connection,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> StoreResult<LedgerBalance> {
    let from = from.map(|d| format!("{} 00:00:00", d.format("%Y-%m-%d")));
    let to = to.map(|d| format!("{} 23:59:59", d.format("%Y-%m-%d")));

    let (income, expense): (f64, f64) = conn.query_row(
        "SELECT
            COALESCE(SUM(CASE WHEN transaction_type = 'Income' THEN total_amount ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN transaction_type = 'Expense' THEN total_amount ELSE 0 END), 0)
         FROM transactions
         WHERE (?1 IS NULL OR transaction_date >= ?1)
           AND (?2 IS NULL OR transaction_date <= ?2)",
        params![from, to],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(LedgerBalance {
        income,
        expense,
        net: income - expense,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub customers: i64,
    pub orders: i64,
    pub transactions: i64,
    pub manual_transactions: i64,
}

pub fn store_summary(conn: &Connection) -> StoreResult<StoreSummary> {
    let count = |sql: &str| -> StoreResult<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };

    Ok(StoreSummary {
        customers: count("SELECT COUNT(*) FROM customers")?,
        orders: count("SELECT COUNT(*) FROM orders")?,
        transactions: count("SELECT COUNT(*) FROM transactions")?,
        manual_transactions: count("SELECT COUNT(*) FROM transactions WHERE source = 'manual'")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{TransactionType, CATEGORY_SALES};

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn profile(name: &str, phone: &str) -> CustomerProfile {
        CustomerProfile {
            name: name.to_string(),
            phone: phone.to_string(),
            ..Default::default()
        }
    }

    fn sample_order(order_no: &str, customer_id: i64, net: f64) -> Order {
        let mut row = crate::row::CanonicalRow::new(2);
        row.set("net_amount", &net.to_string());
        row.set("order_date_time", "31 Dec 2023 02:53:53 PM");
        Order::from_row(&row, order_no, customer_id)
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = test_db();
        setup_database(&conn).unwrap();
        assert_eq!(store_summary(&conn).unwrap().customers, 0);
    }

    #[test]
    fn test_customer_upsert_never_duplicates() {
        let conn = test_db();

        let (id1, action1) = upsert_customer(&conn, "C1", &profile("Asha", "98")).unwrap();
        let (id2, action2) = upsert_customer(&conn, "C1", &profile("Asha Rao", "99")).unwrap();

        assert_eq!(action1, UpsertAction::Created);
        assert_eq!(action2, UpsertAction::Updated);
        assert_eq!(id1, id2);

        let customer = find_customer_by_code(&conn, "C1").unwrap().unwrap();
        assert_eq!(customer.profile.name, "Asha Rao");
        assert_eq!(customer.profile.phone, "99");
        assert_eq!(get_all_customers(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_customer_search() {
        let conn = test_db();
        upsert_customer(&conn, "C1", &profile("Asha Rao", "9800011111")).unwrap();
        upsert_customer(&conn, "C2", &profile("Vikram", "9800022222")).unwrap();

        assert_eq!(search_customers(&conn, "a").unwrap().len(), 0);
        assert_eq!(search_customers(&conn, "ASHA").unwrap().len(), 1);
        assert_eq!(search_customers(&conn, "98000").unwrap().len(), 2);
        assert_eq!(search_customers(&conn, "c2").unwrap()[0].name, "Vikram");
    }

    #[test]
    fn test_order_round_trip_and_update() {
        let conn = test_db();
        let (c1, _) = upsert_customer(&conn, "C1", &profile("A", "1")).unwrap();
        let (c2, _) = upsert_customer(&conn, "C2", &profile("B", "2")).unwrap();

        let order = sample_order("T100", c1, 500.0);
        assert_eq!(upsert_order(&conn, &order).unwrap(), UpsertAction::Created);

        let stored = find_order(&conn, "T100").unwrap().unwrap();
        assert_eq!(stored.net_amount, 500.0);
        assert_eq!(stored.order_date, order.order_date);
        assert_eq!(stored.customer_id, c1);

        let mut changed = sample_order("T100", c2, 650.0);
        changed.tags = Some("express".into());
        assert_eq!(upsert_order(&conn, &changed).unwrap(), UpsertAction::Updated);

        let stored = find_order(&conn, "T100").unwrap().unwrap();
        assert_eq!(stored.net_amount, 650.0);
        assert_eq!(stored.customer_id, c2);
        assert_eq!(stored.tags.as_deref(), Some("express"));
        assert_eq!(store_summary(&conn).unwrap().orders, 1);
    }

    #[test]
    fn test_order_requires_existing_customer() {
        let conn = test_db();
        let order = sample_order("T1", 42, 100.0);
        assert!(insert_order(&conn, &order).is_err());
    }

    #[test]
    fn test_list_orders_filters() {
        let conn = test_db();
        let (c1, _) = upsert_customer(&conn, "C1", &profile("Asha", "1")).unwrap();
        let (c2, _) = upsert_customer(&conn, "C2", &profile("Vikram", "2")).unwrap();
        upsert_order(&conn, &sample_order("T1", c1, 100.0)).unwrap();
        upsert_order(&conn, &sample_order("T2", c2, 200.0)).unwrap();

        let all = list_orders(&conn, &OrderFilter::default()).unwrap();
        assert_eq!(all.len(), 2);

        let only_c2 = list_orders(
            &conn,
            &OrderFilter {
                customer_id: Some(c2),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(only_c2.len(), 1);
        assert_eq!(only_c2[0].customer_name, "Vikram");

        let in_range = list_orders(
            &conn,
            &OrderFilter {
                start_date: NaiveDate::from_ymd_opt(2023, 12, 31),
                end_date: NaiveDate::from_ymd_opt(2023, 12, 31),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(in_range.len(), 2);

        let out_of_range = list_orders(
            &conn,
            &OrderFilter {
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(out_of_range.is_empty());
    }

    #[test]
    fn test_transaction_round_trip() {
        let conn = test_db();
        let mut tx = Transaction::new(TransactionType::Income, CATEGORY_SALES, 500.0, TransactionSource::Csv);
        tx.payment_mode = Some(PaymentMode::Unlisted("Barter".into()));
        tx.source_order_no = Some("T100".into());

        let id = insert_transaction(&conn, &tx).unwrap();
        let stored = get_transaction(&conn, id).unwrap().unwrap();

        assert_eq!(stored.id, Some(id));
        assert_eq!(stored.tx_uuid, tx.tx_uuid);
        assert_eq!(stored.payment_mode, Some(PaymentMode::Unlisted("Barter".into())));
        assert_eq!(stored.transaction_date, None);
        assert_eq!(stored.source, TransactionSource::Csv);
    }

    #[test]
    fn test_only_manual_transactions_can_be_deleted() {
        let conn = test_db();

        let imported = Transaction::new(TransactionType::Income, CATEGORY_SALES, 10.0, TransactionSource::Csv);
        let imported_id = insert_transaction(&conn, &imported).unwrap();

        let manual = add_manual_transaction(
            &conn,
            ManualTransaction {
                transaction_type: "Expense".into(),
                category: "Supplies".into(),
                amount: 40.0,
                ..Default::default()
            },
        )
        .unwrap();
        let manual_id = manual.id.unwrap();

        assert!(matches!(
            delete_manual_transaction(&conn, imported_id),
            Err(StoreError::ProtectedTransaction(id)) if id == imported_id
        ));
        assert!(matches!(
            delete_manual_transaction(&conn, 9999),
            Err(StoreError::NotFound { .. })
        ));

        delete_manual_transaction(&conn, manual_id).unwrap();
        assert!(get_transaction(&conn, manual_id).unwrap().is_none());
        assert!(get_transaction(&conn, imported_id).unwrap().is_some());

        let events = get_events_for_entity(&conn, "transaction", &manual.tx_uuid).unwrap();
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_manual_changes_roll_back_with_their_audit_event() {
        let conn = test_db();
        let manual = add_manual_transaction(
            &conn,
            ManualTransaction {
                transaction_type: "Expense".into(),
                category: "Rent".into(),
                amount: 900.0,
                ..Default::default()
            },
        )
        .unwrap();

        conn.execute_batch(
            "CREATE TRIGGER audit_closed BEFORE INSERT ON events
             BEGIN SELECT RAISE(ABORT, 'audit log closed'); END;",
        )
        .unwrap();

        let added = add_manual_transaction(
            &conn,
            ManualTransaction {
                transaction_type: "Income".into(),
                category: "Service".into(),
                amount: 50.0,
                ..Default::default()
            },
        );
        assert!(matches!(added, Err(StoreError::Sqlite(_))));
        assert_eq!(store_summary(&conn).unwrap().manual_transactions, 1);

        let manual_id = manual.id.unwrap();
        assert!(matches!(
            delete_manual_transaction(&conn, manual_id),
            Err(StoreError::Sqlite(_))
        ));
        assert!(get_transaction(&conn, manual_id).unwrap().is_some());
        assert!(conn.is_autocommit());
    }

    #[test]
    fn test_decode_errors_name_the_real_column() {
        let conn = test_db();
        let (c1, _) = upsert_customer(&conn, "C1", &profile("A", "1")).unwrap();
        upsert_order(&conn, &sample_order("T1", c1, 100.0)).unwrap();
        conn.execute("UPDATE orders SET created_at = 'yesterday'", []).unwrap();

        match find_order(&conn, "T1") {
            Err(StoreError::Sqlite(rusqlite::Error::FromSqlConversionFailure(idx, _, _))) => {
                assert_eq!(idx, 34)
            }
            other => panic!("unexpected result: {:?}", other.map(|o| o.map(|o| o.order_no))),
        }

        let tx = Transaction::new(TransactionType::Income, CATEGORY_SALES, 1.0, TransactionSource::Csv);
        let id = insert_transaction(&conn, &tx).unwrap();
        conn.execute("UPDATE transactions SET payment_status = 'Lost'", []).unwrap();

        match get_transaction(&conn, id) {
            Err(StoreError::Sqlite(rusqlite::Error::FromSqlConversionFailure(idx, _, _))) => {
                assert_eq!(idx, 9)
            }
            other => panic!("unexpected result: {:?}", other.map(|t| t.map(|t| t.tx_uuid))),
        }
    }

    #[test]
    fn test_manual_export_csv() {
        let conn = test_db();
        add_manual_transaction(
            &conn,
            ManualTransaction {
                transaction_date: Some("2024-02-01".into()),
                transaction_type: "Expense".into(),
                category: "Rent".into(),
                amount: 15000.0,
                payment_mode: Some("upi".into()),
                notes: Some("February".into()),
                ..Default::default()
            },
        )
        .unwrap();
        insert_transaction(
            &conn,
            &Transaction::new(TransactionType::Income, CATEGORY_SALES, 1.0, TransactionSource::Csv),
        )
        .unwrap();

        let csv_text = export_manual_transactions_csv(&conn).unwrap();
        let lines: Vec<&str> = csv_text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "Date,Order No,Type,Amount,Payment Mode,Reference No,Description,Notes");
        assert_eq!(lines[1], "2024-02-01,,Expense,15000,UPI,,,February");
    }

    #[test]
    fn test_ledger_balance() {
        let conn = test_db();
        let day = |d: u32| NaiveDate::from_ymd_opt(2024, 1, d).unwrap().and_hms_opt(10, 0, 0);

        let mut income = Transaction::new(TransactionType::Income, CATEGORY_SALES, 500.0, TransactionSource::Csv);
        income.transaction_date = day(5);
        let mut expense = Transaction::new(TransactionType::Expense, "Rent", 200.0, TransactionSource::Csv);
        expense.transaction_date = day(20);
        insert_transaction(&conn, &income).unwrap();
        insert_transaction(&conn, &expense).unwrap();

        let all = ledger_balance(&conn, None, None).unwrap();
        assert_eq!(all.net, 300.0);

        let early = ledger_balance(&conn, NaiveDate::from_ymd_opt(2024, 1, 1), NaiveDate::from_ymd_opt(2024, 1, 10)).unwrap();
        assert_eq!(early.income, 500.0);
        assert_eq!(early.expense, 0.0);
    }

    #[test]
    fn test_event_log() {
        let conn = test_db();

        let event = Event::new(
            "import_completed",
            "import_job",
            "job-1",
            serde_json::json!({"upload_type": "ORDERS"}),
            "test_actor",
        );
        insert_event(&conn, &event).unwrap();

        let events = get_events_for_entity(&conn, "import_job", "job-1").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "import_completed");
        assert_eq!(events[0].data["upload_type"], "ORDERS");

        assert_eq!(get_events_by_type(&conn, "import_completed", 5).unwrap().len(), 1);
    }
}
