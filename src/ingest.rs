// 📥 Upload Ingestion - bytes → canonical rows → reconciliation
//
// Everything structural is checked before the first pass opens a transaction:
// filename, extension, encoding, header row, required columns. Once rows start
// flowing, failures are per-row and end up in the report instead.

use crate::columns::{verify_required_columns, ColumnNormalizer, UploadType};
use crate::config::IngestConfig;
use crate::db::{insert_event, Event};
use crate::encoding::{self, SourceEncoding};
use crate::error::{IngestError, IngestResult};
use crate::reconciliation::{ReconciliationEngine, ReconciliationReport};
use crate::row::CanonicalRow;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

pub const IMPORT_EVENT: &str = "import_completed";

/// Result of one upload, returned to CLI and HTTP callers.
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub job_id: String,
    pub filename: String,
    pub encoding: SourceEncoding,
    /// SHA-256 of the raw upload, hex
    pub content_hash: String,
    pub started_at: DateTime<Utc>,
    pub report: ReconciliationReport,
}

impl ImportSummary {
    pub fn message(&self) -> String {
        format!("{} uploaded: {}", self.filename, self.report.summary())
    }
}

/// Rows parsed from an upload, ready for reconciliation.
#[derive(Debug, Clone)]
pub struct ParsedUpload {
    pub encoding: SourceEncoding,
    pub columns: Vec<String>,
    pub rows: Vec<CanonicalRow>,
}

/// Full pipeline for one uploaded file.
pub fn ingest_upload(
    conn: &mut Connection,
    upload_type: UploadType,
    filename: Option<&str>,
    bytes: &[u8],
    config: &IngestConfig,
) -> IngestResult<ImportSummary> {
    let filename = check_filename(filename, config)?;
    let started_at = Utc::now();
    let job_id = uuid::Uuid::new_v4().to_string();
    let content_hash = sha256_hex(bytes);

    info!(%job_id, %filename, upload_type = upload_type.as_str(), bytes = bytes.len(), "import started");

    let parsed = parse_upload(upload_type, bytes, &config.encodings)?;
    let report = ReconciliationEngine::new().reconcile(conn, upload_type, &parsed.rows)?;

    let pass_counts: Vec<serde_json::Value> = report
        .passes
        .iter()
        .map(|p| {
            json!({
                "pass": p.pass.as_str(),
                "processed": p.processed,
                "skipped": p.skipped,
                "failed": p.failed(),
            })
        })
        .collect();

    let event = Event::new(
        IMPORT_EVENT,
        "import_job",
        &job_id,
        json!({
            "upload_type": upload_type.as_str(),
            "filename": filename,
            "encoding": parsed.encoding.label(),
            "sha256": content_hash,
            "rows": report.rows,
            "passes": pass_counts,
        }),
        "ingest",
    );
    insert_event(conn, &event)?;

    let summary = ImportSummary {
        job_id,
        filename,
        encoding: parsed.encoding,
        content_hash,
        started_at,
        report,
    };
    info!(job_id = %summary.job_id, "{}", summary.message());
    Ok(summary)
}

fn check_filename(filename: Option<&str>, config: &IngestConfig) -> IngestResult<String> {
    let filename = filename.ok_or(IngestError::MissingFile)?.trim();
    if filename.is_empty() {
        return Err(IngestError::EmptyFilename);
    }
    if !config.accepts(filename) {
        return Err(IngestError::UnsupportedExtension {
            filename: filename.to_string(),
            allowed: config.allowed_extensions.clone(),
        });
    }
    Ok(filename.to_string())
}

/// Decode, read the header, normalize, verify, and collect rows.
pub fn parse_upload(
    upload_type: UploadType,
    bytes: &[u8],
    encodings: &[SourceEncoding],
) -> IngestResult<ParsedUpload> {
    let decoded = encoding::resolve(bytes, encodings)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(decoded.text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| IngestError::MalformedCsv(e.to_string()))?
        .clone();

    let normalizer = ColumnNormalizer::new(upload_type);
    let columns = normalizer.normalize_all(headers.iter().map(str::trim));
    verify_required_columns(&columns, upload_type)?;

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        // header is line 1
        let line = record
            .position()
            .map(|p| p.line())
            .unwrap_or(index as u64 + 2);
        rows.push(CanonicalRow::from_record(&columns, &record, line));
    }

    if rows.is_empty() {
        warn!(upload_type = upload_type.as_str(), "upload has a header but no rows");
    }

    Ok(ParsedUpload {
        encoding: decoded.encoding,
        columns,
        rows,
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{find_order, get_all_transactions, get_events_by_type, setup_database};
    use crate::reconciliation::PassKind;

    fn test_db() -> Connection {
        crate::logging::init_test();
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    const ORDERS_CSV: &str = "\
Order Date / Time,Order No,Customer Code,Customer Name,Customer Phone,Net Amount,Pcs.
31 Dec 2023 02:53:53 PM,T100,C1,Asha Rao,9800000000,\"₹1,500.00\",3
,,,,,,
26 Dec 2023,T101,C2,Ravi K,9800000001,200,1
";

    #[test]
    fn test_filename_checks() {
        let mut conn = test_db();
        let config = IngestConfig::default();

        let err = ingest_upload(&mut conn, UploadType::Orders, None, b"", &config).unwrap_err();
        assert!(matches!(err, IngestError::MissingFile));

        let err = ingest_upload(&mut conn, UploadType::Orders, Some("  "), b"", &config).unwrap_err();
        assert!(matches!(err, IngestError::EmptyFilename));

        let err = ingest_upload(&mut conn, UploadType::Orders, Some("orders.xlsx"), b"", &config).unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedExtension { .. }));
        assert!(err.is_bad_request());
    }

    #[test]
    fn test_missing_columns_rejected_before_any_write() {
        let mut conn = test_db();
        let csv = "Order No,Customer Code\nT1,C1\n";

        let err = ingest_upload(
            &mut conn,
            UploadType::Orders,
            Some("orders.CSV"),
            csv.as_bytes(),
            &IngestConfig::default(),
        )
        .unwrap_err();

        match err {
            IngestError::MissingColumns { missing, available, .. } => {
                assert!(missing.contains(&"net_amount".to_string()));
                assert_eq!(available, vec!["order_no", "customer_code"]);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(find_order(&conn, "T1").unwrap().is_none());
    }

    #[test]
    fn test_parse_upload_keeps_line_numbers_and_skips_blank_rows() {
        let parsed = parse_upload(UploadType::Orders, ORDERS_CSV.as_bytes(), &SourceEncoding::DEFAULT_ORDER).unwrap();
        assert_eq!(parsed.encoding, SourceEncoding::Utf8);
        assert_eq!(parsed.rows.len(), 2);
        assert_eq!(parsed.rows[0].line(), 2);
        assert_eq!(parsed.rows[1].line(), 4);
        assert_eq!(parsed.rows[0].get("order_no"), Some("T100"));
        assert_eq!(parsed.rows[0].amount("net_amount"), 1500.0);
    }

    #[test]
    fn test_windows_1252_upload() {
        let mut bytes = b"transaction_date,order_no,payment_received,accepted_by\n".to_vec();
        bytes.extend_from_slice(b"13 Jan 2025 07:28:03 PM,SRN5,-80,Jos\xe9\n");

        let parsed = parse_upload(UploadType::Payments, &bytes, &SourceEncoding::DEFAULT_ORDER).unwrap();
        assert_eq!(parsed.encoding, SourceEncoding::Windows1252);
        assert_eq!(parsed.rows[0].get("accepted_by"), Some("José"));
    }

    #[test]
    fn test_full_upload_cycle() {
        let mut conn = test_db();
        let config = IngestConfig::default();

        let summary = ingest_upload(
            &mut conn,
            UploadType::Orders,
            Some("orders.csv"),
            ORDERS_CSV.as_bytes(),
            &config,
        )
        .unwrap();
        assert_eq!(summary.report.pass(PassKind::Customers).unwrap().processed, 2);
        assert_eq!(summary.report.pass(PassKind::Orders).unwrap().processed, 2);
        assert_eq!(summary.content_hash.len(), 64);

        let payments = "\
Payment Date,Order No.,Payment Amount,Payment Mode,Payment Made At,Accept By
13 Jan 2025 07:28:03 PM,T100,1500,UPI,APP,counter-2
13 Jan 2025 07:30:00 PM,SRN100,-200,Cash,,counter-2
13 Jan 2025 07:31:00 PM,T999,10,Cash,,counter-2
";
        let summary = ingest_upload(
            &mut conn,
            UploadType::Payments,
            Some("payments.csv"),
            payments.as_bytes(),
            &config,
        )
        .unwrap();

        let pass = summary.report.pass(PassKind::Payments).unwrap();
        assert_eq!(pass.processed, 2);
        assert_eq!(pass.skipped, 1);
        assert_eq!(pass.skipped_rows[0].line, 4);

        let order = find_order(&conn, "T100").unwrap().unwrap();
        assert_eq!(order.paid, 1500.0);
        assert_eq!(order.balance, 0.0);
        assert_eq!(get_all_transactions(&conn).unwrap().len(), 2);

        let events = get_events_by_type(&conn, IMPORT_EVENT, 10).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().any(|e| e.data["upload_type"] == "PAYMENTS"));

        println!("✅ {}", summary.message());
    }
}
