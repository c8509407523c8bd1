//! Seed loading: CSV files bulk-loaded into the warehouse before
//! models run.

use crate::driver::WarehouseDriver;
use crate::EngineError;
use std::path::Path;
use tracing::info;
use walkdir::WalkDir;

/// One loaded seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSeed {
    pub table: String,
    pub rows: u64,
}

/// Loads every `.csv` under `seeds_dir`; the table name is the file
/// stem.
pub fn load_seeds(
    seeds_dir: &Path,
    driver: &dyn WarehouseDriver,
) -> Result<Vec<LoadedSeed>, EngineError> {
    let mut loaded = Vec::new();
    for entry in WalkDir::new(seeds_dir)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("csv") {
            continue;
        }
        let table = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut reader = csv::Reader::from_path(path).map_err(|err| {
            EngineError::Io(std::io::Error::other(format!(
                "cannot read seed {}: {err}",
                path.display()
            )))
        })?;
        let headers: Vec<String> = reader
            .headers()
            .map_err(|err| EngineError::Io(std::io::Error::other(err.to_string())))?
            .iter()
            .map(|h| h.to_string())
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record =
                record.map_err(|err| EngineError::Io(std::io::Error::other(err.to_string())))?;
            rows.push(record.iter().map(|f| f.to_string()).collect::<Vec<_>>());
        }

        let count = driver.create_table_from_csv(&table, &headers, &rows)?;
        info!(table = %table, rows = count, "seed loaded");
        loaded.push(LoadedSeed { table, rows: count });
    }
    Ok(loaded)
}
