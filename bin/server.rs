// POS Reconcile - Web Server
// Upload endpoints for the three POS exports plus read/ledger API (Axum)

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use pos_reconcile::canonical::PaymentMode;
use pos_reconcile::entities::{EXPENSE_CATEGORIES, INCOME_CATEGORIES, ORDER_STATUSES};
use pos_reconcile::{
    add_manual_transaction, delete_manual_transaction, export_manual_transactions_csv,
    find_customer_by_code, find_order, get_all_customers, get_all_transactions,
    get_transactions_for_order, ingest_upload, ledger_balance, list_orders, logging,
    open_database, search_customers, store_summary, AppConfig, IngestConfig, IngestError,
    Customer, CustomerSummary, LedgerBalance, ManualTransaction, Order, OrderFilter,
    OrderWithCustomer, PaymentStatus, StoreError, StoreSummary, Transaction, TransactionType,
    UploadType,
};

const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    ingest: Arc<IngestConfig>,
}

impl AppState {
    fn db(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::internal("database lock poisoned"))
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

struct ApiError {
    status: StatusCode,
    message: String,
    details: Option<serde_json::Value>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: None,
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse {
            success: false,
            data: self.details,
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match &err {
            StoreError::Invalid(_) => StatusCode::BAD_REQUEST,
            StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            StoreError::ProtectedTransaction(_) => StatusCode::FORBIDDEN,
            StoreError::Sqlite(_) | StoreError::Json(_) | StoreError::Export(_) => {
                error!(error = %err, "store failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        if !err.is_bad_request() {
            error!(error = %err, "import failed");
            return Self::internal(err.to_string());
        }

        warn!(error = %err, "upload rejected");
        let details = match &err {
            IngestError::MissingColumns {
                missing, available, ..
            } => Some(json!({ "missing": missing, "available": available })),
            _ => None,
        };
        Self {
            status: StatusCode::BAD_REQUEST,
            message: err.to_string(),
            details,
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::ok(data)))
}

// ============================================================================
// Upload Handlers
// ============================================================================

/// POST /upload/orders
async fn upload_orders(state: State<AppState>, multipart: Multipart) -> Response {
    handle_upload(state, multipart, UploadType::Orders).await
}

/// POST /upload/payments
async fn upload_payments(state: State<AppState>, multipart: Multipart) -> Response {
    handle_upload(state, multipart, UploadType::Payments).await
}

/// POST /upload/transactions
async fn upload_transactions(state: State<AppState>, multipart: Multipart) -> Response {
    handle_upload(state, multipart, UploadType::Transactions).await
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
    upload_type: UploadType,
) -> Response {
    // first file part wins
    let mut upload: Option<(Option<String>, Vec<u8>)> = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                let file_name = field.file_name().map(str::to_string);
                if file_name.is_none() && field.name() != Some("file") {
                    continue;
                }
                match field.bytes().await {
                    Ok(bytes) => {
                        upload = Some((file_name, bytes.to_vec()));
                        break;
                    }
                    Err(e) => return ApiError::bad_request(format!("failed to read upload: {}", e)).into_response(),
                }
            }
            Ok(None) => break,
            Err(e) => return ApiError::bad_request(format!("invalid multipart body: {}", e)).into_response(),
        }
    }

    let (file_name, bytes) = match upload {
        Some(upload) => upload,
        None => return ApiError::from(IngestError::MissingFile).into_response(),
    };

    let db = state.db.clone();
    let config = state.ingest.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut conn = db
            .lock()
            .map_err(|_| ApiError::internal("database lock poisoned"))?;
        ingest_upload(&mut conn, upload_type, file_name.as_deref(), &bytes, &config).map_err(ApiError::from)
    })
    .await;

    match result {
        Ok(Ok(summary)) => {
            info!(job_id = %summary.job_id, "{}", summary.message());
            (StatusCode::OK, Json(ApiResponse::ok(summary))).into_response()
        }
        Ok(Err(api_error)) => api_error.into_response(),
        Err(e) => {
            error!(error = %e, "import task panicked");
            ApiError::internal("import task failed").into_response()
        }
    }
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok(json!({ "status": "OK", "version": pos_reconcile::VERSION })))
}

/// GET /api/summary
async fn get_summary(State(state): State<AppState>) -> ApiResult<StoreSummary> {
    let conn = state.db()?;
    ok(store_summary(&conn)?)
}

/// GET /api/customers
async fn get_customers(State(state): State<AppState>) -> ApiResult<Vec<Customer>> {
    let conn = state.db()?;
    ok(get_all_customers(&conn)?)
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
}

/// GET /api/customers/search?q=
async fn search_customers_handler(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Vec<CustomerSummary>> {
    let conn = state.db()?;
    ok(search_customers(&conn, &query.q)?)
}

/// GET /api/customers/:code
async fn get_customer(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Customer> {
    let conn = state.db()?;
    match find_customer_by_code(&conn, &code)? {
        Some(customer) => ok(customer),
        None => Err(ApiError::not_found(format!("customer {} not found", code))),
    }
}

/// GET /api/orders?customer_id=&status=&start_date=&end_date=
async fn get_orders(
    State(state): State<AppState>,
    Query(filter): Query<OrderFilter>,
) -> ApiResult<Vec<OrderWithCustomer>> {
    let conn = state.db()?;
    ok(list_orders(&conn, &filter)?)
}

#[derive(Serialize)]
struct OrderDetail {
    order: Order,
    transactions: Vec<Transaction>,
}

/// GET /api/orders/:order_no - order with its ledger entries
async fn get_order(
    State(state): State<AppState>,
    Path(order_no): Path<String>,
) -> ApiResult<OrderDetail> {
    let conn = state.db()?;
    let order = find_order(&conn, &order_no)?
        .ok_or_else(|| ApiError::not_found(format!("order {} not found", order_no)))?;
    let transactions = get_transactions_for_order(&conn, &order_no)?;
    ok(OrderDetail { order, transactions })
}

/// GET /api/transactions - newest first
async fn get_transactions(State(state): State<AppState>) -> ApiResult<Vec<Transaction>> {
    let conn = state.db()?;
    ok(get_all_transactions(&conn)?)
}

/// POST /api/transactions - manual entry
async fn create_transaction(
    State(state): State<AppState>,
    Json(input): Json<ManualTransaction>,
) -> ApiResult<Transaction> {
    let conn = state.db()?;
    ok(add_manual_transaction(&conn, input)?)
}

/// DELETE /api/transactions/:id - manual entries only
async fn delete_transaction(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    let conn = state.db()?;
    delete_manual_transaction(&conn, id)?;
    ok(json!({ "deleted": id }))
}

/// GET /api/transactions/export/manual - CSV download
async fn export_manual(State(state): State<AppState>) -> Result<Response, ApiError> {
    let conn = state.db()?;
    let body = export_manual_transactions_csv(&conn)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"manual_transactions.csv\"",
            ),
        ],
        body,
    )
        .into_response())
}

#[derive(Deserialize)]
struct BalanceQuery {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

/// GET /api/ledger/balance?from=&to=
async fn get_balance(
    State(state): State<AppState>,
    Query(range): Query<BalanceQuery>,
) -> ApiResult<LedgerBalance> {
    let conn = state.db()?;
    ok(ledger_balance(&conn, range.from, range.to)?)
}

/// GET /api/constants - vocabularies for form dropdowns
async fn get_constants() -> impl IntoResponse {
    let transaction_types: Vec<&str> = TransactionType::ALL.iter().map(|t| t.as_str()).collect();
    let payment_modes: Vec<String> = PaymentMode::ALL.iter().map(|m| m.as_str().to_string()).collect();
    let payment_statuses: Vec<&str> = PaymentStatus::ALL.iter().map(|s| s.as_str()).collect();

    Json(ApiResponse::ok(json!({
        "TRANSACTION_TYPES": transaction_types,
        "INCOME_CATEGORIES": INCOME_CATEGORIES,
        "EXPENSE_CATEGORIES": EXPENSE_CATEGORIES,
        "PAYMENT_MODES": payment_modes,
        "PAYMENT_STATUSES": payment_statuses,
        "ORDER_STATUSES": ORDER_STATUSES,
    })))
}

// ============================================================================
// Main Server
// ============================================================================

fn app(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/summary", get(get_summary))
        .route("/constants", get(get_constants))
        .route("/customers", get(get_customers))
        .route("/customers/search", get(search_customers_handler))
        .route("/customers/:code", get(get_customer))
        .route("/orders", get(get_orders))
        .route("/orders/:order_no", get(get_order))
        .route("/transactions", get(get_transactions).post(create_transaction))
        .route("/transactions/export/manual", get(export_manual))
        .route("/transactions/:id", delete(delete_transaction))
        .route("/ledger/balance", get(get_balance));

    let upload_routes = Router::new()
        .route("/orders", post(upload_orders))
        .route("/payments", post(upload_payments))
        .route("/transactions", post(upload_transactions))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES));

    Router::new()
        .nest("/api", api_routes)
        .nest("/upload", upload_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    println!("🌐 POS Reconcile - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = AppConfig::from_env()?;
    let conn = open_database(&config.database_path)?;
    println!("✓ Database opened: {}", config.database_path.display());

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        ingest: Arc::new(config.ingest.clone()),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    println!("\n🚀 Server running on http://{}", config.bind_addr);
    println!("   Upload: POST /upload/orders | /upload/payments | /upload/transactions");
    println!("   API:    GET  /api/transactions");
    println!("\n   Press Ctrl+C to stop\n");
    info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app(state))
        .await
        .context("Server error")?;

    Ok(())
}
