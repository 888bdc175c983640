// 🚨 Error types for ingestion and storage
//
// Structural failures abort an upload before any row is touched.
// Row-level failures never surface here: they are recorded as RowIssue
// values inside the pass outcome (see reconciliation.rs).

use thiserror::Error;

// ============================================================================
// STORE ERRORS
// ============================================================================

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv export failed: {0}")]
    Export(String),

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("transaction {0} was imported from csv and cannot be modified")]
    ProtectedTransaction(i64),
}

impl From<csv::Error> for StoreError {
    fn from(err: csv::Error) -> Self {
        StoreError::Export(err.to_string())
    }
}

// ============================================================================
// INGEST ERRORS
// ============================================================================

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("no file uploaded")]
    MissingFile,

    #[error("no file selected")]
    EmptyFilename,

    #[error("unsupported file '{filename}': expected one of [{}]", .allowed.join(", "))]
    UnsupportedExtension {
        filename: String,
        allowed: Vec<String>,
    },

    #[error("unable to decode upload with any of [{}]; check the file encoding", .tried.join(", "))]
    EncodingResolution { tried: Vec<String> },

    #[error("unreadable csv: {0}")]
    MalformedCsv(String),

    #[error(
        "missing required columns: {}\navailable columns: {}",
        .missing.join(", "),
        .available.join(", ")
    )]
    MissingColumns {
        upload_type: String,
        missing: Vec<String>,
        available: Vec<String>,
    },

    #[error("commit failed during {pass} pass: {source}")]
    Commit {
        pass: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    /// Caller-side failures (HTTP 400). Everything else is a server error.
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            IngestError::MissingFile
                | IngestError::EmptyFilename
                | IngestError::UnsupportedExtension { .. }
                | IngestError::EncodingResolution { .. }
                | IngestError::MalformedCsv(_)
                | IngestError::MissingColumns { .. }
        )
    }
}

impl From<rusqlite::Error> for IngestError {
    fn from(err: rusqlite::Error) -> Self {
        IngestError::Store(StoreError::Sqlite(err))
    }
}

impl From<csv::Error> for IngestError {
    fn from(err: csv::Error) -> Self {
        IngestError::MalformedCsv(err.to_string())
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
pub type StoreResult<T> = Result<T, StoreError>;
