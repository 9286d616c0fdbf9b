//! Dealer roster CSV reader
//!
//! Columns by position: brand, name, address, city, phone, website,
//! validationStatus, lastChecked. The first row is a header.

use crate::schema::DealerRecord;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Rows with fewer populated columns than this are dropped
pub const MIN_POPULATED_COLUMNS: usize = 6;

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Failed to read roster {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Malformed roster {path}: {source}")]
    Csv { path: String, source: csv::Error },
}

/// Where the orchestrator gets its dealers from
#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn load(&self) -> Result<Vec<DealerRecord>, RosterError>;
}

/// A fixed, in-memory roster
#[async_trait]
impl RosterSource for Vec<DealerRecord> {
    async fn load(&self) -> Result<Vec<DealerRecord>, RosterError> {
        Ok(self.clone())
    }
}

/// Roster read from a CSV file on every crawl
pub struct CsvRoster {
    path: PathBuf,
}

impl CsvRoster {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RosterSource for CsvRoster {
    async fn load(&self) -> Result<Vec<DealerRecord>, RosterError> {
        load_roster(&self.path).await
    }
}

pub async fn load_roster(path: &Path) -> Result<Vec<DealerRecord>, RosterError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| RosterError::Io {
            path: path.display().to_string(),
            source,
        })?;

    parse_roster(&content).map_err(|source| RosterError::Csv {
        path: path.display().to_string(),
        source,
    })
}

/// Parse roster CSV text, dropping sparse rows
pub fn parse_roster(content: &str) -> Result<Vec<DealerRecord>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut dealers = Vec::new();
    for (line, row) in reader.records().enumerate() {
        let row = row?;
        let populated = row.iter().filter(|f| !f.is_empty()).count();
        if populated < MIN_POPULATED_COLUMNS {
            tracing::debug!(
                "Dropping roster row {} ({} populated columns)",
                line + 2,
                populated
            );
            continue;
        }

        let col = |i: usize| row.get(i).unwrap_or_default().to_string();
        dealers.push(DealerRecord {
            brand: col(0),
            name: col(1),
            address: col(2),
            city: col(3),
            phone: col(4),
            website: col(5),
            validation_status: col(6),
            last_checked: col(7),
        });
    }

    Ok(dealers)
}
