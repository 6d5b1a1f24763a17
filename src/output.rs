use serde::Serialize;
use std::path::Path;

use crate::scoring::engine::TrustScore;
use crate::scoring::rescaler::FittedRescaler;

#[derive(Debug, Serialize)]
struct ScoreRow<'a> {
    wallet: &'a str,
    credit_score: f64,
}

/// Write `wallet,credit_score` rows in matrix order.
pub fn write_scores_csv(path: impl AsRef<Path>, scores: &[TrustScore]) -> eyre::Result<u64> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| eyre::eyre!("Failed to create scores CSV '{}': {}", path.display(), e))?;

    let mut count = 0u64;
    for score in scores {
        writer.serialize(ScoreRow {
            wallet: &score.wallet_id,
            credit_score: score.trust_score,
        })?;
        count += 1;
    }
    writer.flush()?;

    tracing::info!(rows = count, path = %path.display(), "Trust scores written");
    Ok(count)
}

/// Persist the rescaler so later batches can reuse its mapping.
pub fn save_rescaler(path: impl AsRef<Path>, rescaler: &FittedRescaler) -> eyre::Result<()> {
    let path = path.as_ref();
    let json = rescaler.to_json()?;
    std::fs::write(path, json)
        .map_err(|e| eyre::eyre!("Failed to write rescaler '{}': {}", path.display(), e))?;

    tracing::info!(
        path = %path.display(),
        data_min = rescaler.data_min,
        data_max = rescaler.data_max,
        "Rescaler saved"
    );
    Ok(())
}

pub fn load_rescaler(path: impl AsRef<Path>) -> eyre::Result<FittedRescaler> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("Failed to read rescaler '{}': {}", path.display(), e))?;
    FittedRescaler::from_json(&content)
        .map_err(|e| eyre::eyre!("Failed to parse rescaler '{}': {}", path.display(), e))
}

/// Log the first `rows` scores.
pub fn log_preview(scores: &[TrustScore], rows: usize) {
    for score in scores.iter().take(rows) {
        tracing::info!(
            wallet = %score.wallet_id,
            credit_score = format_args!("{:.2}", score.trust_score),
            anomaly_measure = score.anomaly_measure,
            "Score preview"
        );
    }
}
