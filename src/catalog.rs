//! Vehicle catalog CSV writer and reader
//!
//! Header: Dealer, Brand, City, Make, Model, Year, Trim, Price, Stock,
//! ScrapedAt, SourceURL. Writes replace the whole file.

use crate::schema::VehicleRecord;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to write catalog {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Catalog CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Catalog encoding error: {0}")]
    Encoding(String),
}

/// Persistence for the consolidated vehicle catalog
#[async_trait]
pub trait CatalogSink: Send + Sync {
    /// Replace the stored catalog with `vehicles`
    async fn replace_all(&self, vehicles: &[VehicleRecord]) -> Result<(), CatalogError>;
}

/// Catalog kept in a CSV file
pub struct CsvCatalog {
    path: PathBuf,
}

impl CsvCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CatalogSink for CsvCatalog {
    async fn replace_all(&self, vehicles: &[VehicleRecord]) -> Result<(), CatalogError> {
        write_catalog(&self.path, vehicles).await?;
        tracing::info!(
            "Wrote {} vehicles to {}",
            vehicles.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Serialize vehicles to CSV text, header included
pub fn to_csv(vehicles: &[VehicleRecord]) -> Result<String, CatalogError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for vehicle in vehicles {
        writer.serialize(vehicle)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| CatalogError::Encoding(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| CatalogError::Encoding(e.to_string()))
}

/// Parse catalog CSV text
pub fn from_csv(content: &str) -> Result<Vec<VehicleRecord>, CatalogError> {
    let mut reader = csv::Reader::from_reader(content.as_bytes());
    let vehicles = reader
        .deserialize()
        .collect::<Result<Vec<VehicleRecord>, _>>()?;
    Ok(vehicles)
}

pub async fn write_catalog(path: &Path, vehicles: &[VehicleRecord]) -> Result<(), CatalogError> {
    let content = to_csv(vehicles)?;
    tokio::fs::write(path, content)
        .await
        .map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })
}

pub async fn read_catalog(path: &Path) -> Result<Vec<VehicleRecord>, CatalogError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
    from_csv(&content)
}
