use tracing_subscriber::EnvFilter;

use wallet_trust_score::config::Config;
use wallet_trust_score::ingest::read_raw_transactions;
use wallet_trust_score::output;
use wallet_trust_score::pipeline::TrustScorePipeline;

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // Initialize structured logging (set RUST_LOG=debug for per-stage detail)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    tracing::info!("Wallet trust scoring starting");

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)?;
    tracing::info!(
        n_estimators = config.scoring.n_estimators,
        seed = config.scoring.seed,
        "Configuration loaded from {}",
        config_path
    );

    let mut pipeline = TrustScorePipeline::from_config(&config)?;
    if let Some(ref path) = config.scoring.frozen_rescaler_path {
        let frozen = output::load_rescaler(path)?;
        tracing::info!(path = %path, "Loaded frozen rescaler");
        pipeline = pipeline.with_frozen_rescaler(frozen);
    }
    tracing::info!(evaluated_at = %pipeline.evaluated_at(), "Evaluation clock fixed");

    let raw = read_raw_transactions(&config.input.transactions_path)?;
    let batch = pipeline.run(&raw)?;

    output::write_scores_csv(&config.output.scores_csv, &batch.scores)?;
    output::save_rescaler(&config.output.rescaler_path, batch.rescaler())?;
    output::log_preview(&batch.scores, config.output.preview_rows);

    tracing::info!(wallets = batch.scores.len(), "Wallet trust scoring finished");
    Ok(())
}
