pub mod normalizer;
pub mod types;

use std::path::Path;

use types::RawTransaction;

/// Read a JSON export of raw transactions from disk.
pub fn read_raw_transactions(path: impl AsRef<Path>) -> eyre::Result<Vec<RawTransaction>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("Failed to read transactions file '{}': {}", path.display(), e))?;
    let records = types::parse_raw_transactions(&content)
        .map_err(|e| eyre::eyre!("Failed to parse transactions JSON '{}': {}", path.display(), e))?;

    tracing::info!(records = records.len(), path = %path.display(), "Raw transactions loaded");
    Ok(records)
}
