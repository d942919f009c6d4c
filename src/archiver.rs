use std::fs::File;
use std::io::Write;
use std::path::Path;

use tracing::{debug, error};

use crate::error::ArchiveError;
use crate::models::{Asin, ProductRecord};

/// On-disk format of the product table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

pub fn write_asins(path: &Path, header: &str, asins: &[Asin]) -> Result<(), ArchiveError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([header])?;
    for asin in asins {
        writer.write_record([asin])?;
    }
    writer.flush()?;
    Ok(())
}

/// Identifiers from the `column` column of a CSV file. Blank cells are skipped.
pub fn read_asins(path: &Path, column: &str) -> Result<Vec<Asin>, ArchiveError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    debug!(columns = ?headers, "input columns");

    let Some(index) = headers.iter().position(|h| h.trim() == column) else {
        let err = ArchiveError::MissingColumn {
            column: column.to_string(),
            available: headers.iter().map(str::to_string).collect(),
        };
        error!(path = %path.display(), "{err}");
        return Err(err);
    };

    let mut asins = Vec::new();
    for row in reader.records() {
        let row = row?;
        if let Some(value) = row.get(index).map(str::trim).filter(|v| !v.is_empty()) {
            asins.push(value.to_string());
        }
    }
    Ok(asins)
}

pub fn write_products(
    path: &Path,
    records: &[ProductRecord],
    format: OutputFormat,
) -> Result<(), ArchiveError> {
    match format {
        OutputFormat::Csv => write_products_csv(path, records),
        OutputFormat::Json => save_to_json(path, records),
    }
}

fn write_products_csv(path: &Path, records: &[ProductRecord]) -> Result<(), ArchiveError> {
    // Header is written by hand so an empty run still yields the column row.
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(ProductRecord::COLUMNS)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

fn save_to_json(path: &Path, records: &[ProductRecord]) -> Result<(), ArchiveError> {
    let json = serde_json::to_string_pretty(records)?;
    let mut file = File::create(path)?;
    file.write_all(json.as_bytes())?;
    Ok(())
}
