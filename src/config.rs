use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::scoring::isolation_forest::IsolationForestConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub input: InputConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// JSON array of raw lending-protocol transactions.
    pub transactions_path: String,
}

// ============================================================
// Scoring Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    /// Per-tree subsample size; unset means min(256, wallets).
    pub max_samples: Option<usize>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_score_min")]
    pub score_min: f64,
    #[serde(default = "default_score_max")]
    pub score_max: f64,
    /// Rescaler persisted by an earlier run. When set, scores are mapped with
    /// it instead of the one fitted on the current batch.
    pub frozen_rescaler_path: Option<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_samples: None,
            seed: 42,
            score_min: 0.0,
            score_max: 1000.0,
            frozen_rescaler_path: None,
        }
    }
}

fn default_n_estimators() -> usize {
    100
}

fn default_seed() -> u64 {
    42
}

fn default_score_min() -> f64 {
    0.0
}

fn default_score_max() -> f64 {
    1000.0
}

impl ScoringConfig {
    pub fn forest(&self) -> IsolationForestConfig {
        IsolationForestConfig {
            n_estimators: self.n_estimators,
            max_samples: self.max_samples,
            seed: self.seed,
        }
    }

    pub fn score_range(&self) -> (f64, f64) {
        (self.score_min, self.score_max)
    }
}

// ============================================================
// Evaluation Config
// ============================================================

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EvaluationConfig {
    /// RFC 3339 instant used as "now" for recency features. Pin it for
    /// reproducible runs; unset means the wall clock at startup.
    pub as_of: Option<String>,
}

impl EvaluationConfig {
    pub fn evaluated_at(&self) -> eyre::Result<DateTime<Utc>> {
        match &self.as_of {
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| eyre::eyre!("Invalid evaluation.as_of '{}': {}", raw, e)),
            None => Ok(Utc::now()),
        }
    }
}

// ============================================================
// Output Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_scores_csv")]
    pub scores_csv: String,
    #[serde(default = "default_rescaler_path")]
    pub rescaler_path: String,
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            scores_csv: default_scores_csv(),
            rescaler_path: default_rescaler_path(),
            preview_rows: default_preview_rows(),
        }
    }
}

fn default_scores_csv() -> String {
    "wallet_scores.csv".to_string()
}

fn default_rescaler_path() -> String {
    "credit_score_rescaler.json".to_string()
}

fn default_preview_rows() -> usize {
    5
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.input.transactions_path.trim().is_empty() {
            return Err(eyre::eyre!("input.transactions_path must not be empty"));
        }
        if self.scoring.n_estimators == 0 {
            return Err(eyre::eyre!("scoring.n_estimators must be at least 1"));
        }
        if self.scoring.max_samples == Some(0) {
            return Err(eyre::eyre!("scoring.max_samples must be at least 1"));
        }
        let (lo, hi) = self.scoring.score_range();
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(eyre::eyre!(
                "Invalid score range [{}, {}]: score_min must be below score_max",
                lo,
                hi
            ));
        }
        self.evaluation.evaluated_at()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Config {
        Config {
            input: InputConfig {
                transactions_path: "user-wallet-transactions.json".to_string(),
            },
            scoring: ScoringConfig::default(),
            evaluation: EvaluationConfig::default(),
            output: OutputConfig::default(),
        }
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[input]
transactions_path = "data/user-wallet-transactions.json"

[scoring]
n_estimators = 50
seed = 7

[evaluation]
as_of = "2025-05-01T00:00:00Z"

[output]
scores_csv = "out/scores.csv"
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.input.transactions_path, "data/user-wallet-transactions.json");
        assert_eq!(config.scoring.n_estimators, 50);
        assert_eq!(config.scoring.seed, 7);
        assert_eq!(config.scoring.max_samples, None);
        assert_eq!(config.scoring.score_range(), (0.0, 1000.0)); // default
        assert_eq!(config.output.scores_csv, "out/scores.csv");
        assert_eq!(config.output.preview_rows, 5); // default
        assert_eq!(
            config.evaluation.evaluated_at().unwrap().to_rfc3339(),
            "2025-05-01T00:00:00+00:00"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_when_sections_missing() {
        let config: Config = toml::from_str("[input]\ntransactions_path = \"tx.json\"\n").unwrap();
        assert_eq!(config.scoring.forest(), IsolationForestConfig::default());
        assert!(config.evaluation.as_of.is_none());
        assert_eq!(config.output.rescaler_path, "credit_score_rescaler.json");
    }

    #[test]
    fn test_validate_zero_estimators() {
        let mut config = minimal();
        config.scoring.n_estimators = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_inverted_score_range() {
        let mut config = minimal();
        config.scoring.score_min = 1000.0;
        config.scoring.score_max = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_as_of() {
        let mut config = minimal();
        config.evaluation.as_of = Some("last tuesday".to_string());
        assert!(config.validate().is_err());
    }
}
