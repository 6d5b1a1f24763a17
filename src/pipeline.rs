use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::error::PipelineError;
use crate::features::matrix::{derive_feature_matrix, FeatureMatrix};
use crate::features::types::{Action, WalletTransaction};
use crate::ingest::normalizer::normalize_records;
use crate::ingest::types::RawTransaction;
use crate::scoring::engine::{FittedTrustModel, TrustScore, TrustScorer};
use crate::scoring::rescaler::FittedRescaler;

/// Everything one batch produced.
#[derive(Debug)]
pub struct ScoredBatch {
    pub matrix: FeatureMatrix,
    pub model: FittedTrustModel,
    pub scores: Vec<TrustScore>,
}

impl ScoredBatch {
    /// The rescaler fitted on this batch, for persistence.
    pub fn rescaler(&self) -> &FittedRescaler {
        self.model.rescaler()
    }
}

/// Orchestrates one batch:
/// 1. Record normalization
/// 2. Feature derivation and matrix assembly
/// 3. Isolation-forest fit over the whole matrix
/// 4. Rescaling into trust scores
///
/// Any fatal error aborts the batch; no wallet is scored unless all are.
pub struct TrustScorePipeline {
    scorer: TrustScorer,
    evaluated_at: DateTime<Utc>,
    frozen_rescaler: Option<FittedRescaler>,
}

impl TrustScorePipeline {
    pub fn new(scorer: TrustScorer, evaluated_at: DateTime<Utc>) -> Self {
        Self {
            scorer,
            evaluated_at,
            frozen_rescaler: None,
        }
    }

    /// Build from config. The evaluation clock is resolved once here.
    pub fn from_config(config: &Config) -> eyre::Result<Self> {
        let scorer = TrustScorer::new(config.scoring.forest(), config.scoring.score_range());
        let evaluated_at = config.evaluation.evaluated_at()?;
        Ok(Self::new(scorer, evaluated_at))
    }

    /// Map scores with a previously fitted rescaler instead of this batch's own.
    pub fn with_frozen_rescaler(mut self, rescaler: FittedRescaler) -> Self {
        self.frozen_rescaler = Some(rescaler);
        self
    }

    pub fn evaluated_at(&self) -> DateTime<Utc> {
        self.evaluated_at
    }

    pub fn run(&self, raw: &[RawTransaction]) -> Result<ScoredBatch, PipelineError> {
        let records = normalize_records(raw)?;
        tracing::info!(
            raw = raw.len(),
            records = records.len(),
            "Raw transactions normalized"
        );
        self.run_records(&records)
    }

    pub fn run_records(&self, records: &[WalletTransaction]) -> Result<ScoredBatch, PipelineError> {
        log_unrecognized_actions(records);

        let matrix = derive_feature_matrix(records, self.evaluated_at);
        let model = self.scorer.fit(&matrix)?;
        let scores = match &self.frozen_rescaler {
            Some(frozen) => {
                tracing::info!(
                    data_min = frozen.data_min,
                    data_max = frozen.data_max,
                    "Scoring with frozen rescaler"
                );
                model.score_with(&matrix, frozen)?
            }
            None => model.score(&matrix)?,
        };

        tracing::info!(
            wallets = scores.len(),
            evaluated_at = %self.evaluated_at,
            "Trust scores computed"
        );

        Ok(ScoredBatch {
            matrix,
            model,
            scores,
        })
    }
}

/// Unknown actions are legal but never feed an action-specific feature.
fn log_unrecognized_actions(records: &[WalletTransaction]) {
    let unknown = records
        .iter()
        .filter(|r| matches!(r.action, Action::Other(_)))
        .count();
    if unknown > 0 {
        tracing::warn!(
            count = unknown,
            "Records with unrecognized actions; counted in activity features only"
        );
    }
}
