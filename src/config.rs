// ⚙️ Configuration - environment (and optional .env file)

use crate::encoding::SourceEncoding;
use anyhow::{anyhow, Result};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_DATABASE_PATH: &str = "pos_ledger.db";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub bind_addr: String,
    pub ingest: IngestConfig,
}

/// Knobs for the upload pipeline.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Tried in order against the whole upload
    pub encodings: Vec<SourceEncoding>,
    /// Lowercase, without the dot
    pub allowed_extensions: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            encodings: SourceEncoding::DEFAULT_ORDER.to_vec(),
            allowed_extensions: vec!["csv".to_string()],
        }
    }
}

impl IngestConfig {
    /// Case-insensitive extension check.
    pub fn accepts(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((_, ext)) => {
                let ext = ext.to_lowercase();
                self.allowed_extensions.iter().any(|allowed| *allowed == ext)
            }
            None => false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            ingest: IngestConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load `.env` if present, then read `POS_*` variables.
    pub fn from_env() -> Result<Self> {
        // a missing .env file is normal
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; unset keys fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();

        let encodings = match lookup("POS_INGEST_ENCODINGS") {
            Some(raw) => parse_encodings(&raw)?,
            None => defaults.ingest.encodings,
        };

        let allowed_extensions = match lookup("POS_UPLOAD_EXTENSIONS") {
            Some(raw) => parse_extensions(&raw)?,
            None => defaults.ingest.allowed_extensions,
        };

        Ok(AppConfig {
            database_path: lookup("POS_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            bind_addr: lookup("POS_BIND_ADDR").unwrap_or(defaults.bind_addr),
            ingest: IngestConfig {
                encodings,
                allowed_extensions,
            },
        })
    }
}

fn parse_encodings(raw: &str) -> Result<Vec<SourceEncoding>> {
    let encodings = split_list(raw)
        .map(|label| {
            SourceEncoding::from_label(label)
                .ok_or_else(|| anyhow!("POS_INGEST_ENCODINGS: unknown encoding '{}'", label))
        })
        .collect::<Result<Vec<_>>>()?;

    if encodings.is_empty() {
        return Err(anyhow!("POS_INGEST_ENCODINGS must name at least one encoding"));
    }
    Ok(encodings)
}

fn parse_extensions(raw: &str) -> Result<Vec<String>> {
    let extensions: Vec<String> = split_list(raw)
        .map(|ext| ext.trim_start_matches('.').to_lowercase())
        .collect();

    if extensions.is_empty() {
        return Err(anyhow!("POS_UPLOAD_EXTENSIONS must name at least one extension"));
    }
    Ok(extensions)
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}
