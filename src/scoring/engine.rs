use serde::Serialize;

use crate::error::ScoringError;
use crate::features::matrix::FeatureMatrix;

use super::isolation_forest::{IsolationForest, IsolationForestConfig};
use super::rescaler::{FittedRescaler, DEFAULT_SCORE_RANGE};

/// Final per-wallet output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrustScore {
    pub wallet_id: String,
    /// Isolation-forest decision value; higher is more typical of the batch.
    pub anomaly_measure: f64,
    /// `anomaly_measure` mapped onto the score range.
    pub trust_score: f64,
}

/// Fits the anomaly model and rescaler over a whole feature matrix.
#[derive(Debug, Clone)]
pub struct TrustScorer {
    forest: IsolationForestConfig,
    score_range: (f64, f64),
}

impl Default for TrustScorer {
    fn default() -> Self {
        Self::new(IsolationForestConfig::default(), DEFAULT_SCORE_RANGE)
    }
}

impl TrustScorer {
    pub fn new(forest: IsolationForestConfig, score_range: (f64, f64)) -> Self {
        Self {
            forest,
            score_range,
        }
    }

    /// Fit forest and rescaler on `matrix`. Must see the complete batch: the
    /// forest is population-relative and is never fitted per wallet.
    pub fn fit(&self, matrix: &FeatureMatrix) -> Result<FittedTrustModel, ScoringError> {
        if matrix.is_empty() {
            return Err(ScoringError::EmptyBatch);
        }
        check_finite(matrix)?;

        let forest = IsolationForest::fit(&self.forest, matrix.rows())?;
        let measures = forest.decision_function(matrix.rows());
        let rescaler = FittedRescaler::fit(&measures, self.score_range)?;

        tracing::info!(
            wallets = matrix.len(),
            measure_min = rescaler.data_min,
            measure_max = rescaler.data_max,
            seed = self.forest.seed,
            "Trust model fitted"
        );

        Ok(FittedTrustModel {
            columns: matrix.columns().to_vec(),
            forest,
            rescaler,
        })
    }

    /// Fit on `matrix` and score the same wallets.
    pub fn fit_and_score(
        &self,
        matrix: &FeatureMatrix,
    ) -> Result<(FittedTrustModel, Vec<TrustScore>), ScoringError> {
        let model = self.fit(matrix)?;
        let scores = model.score(matrix)?;
        Ok((model, scores))
    }
}

/// A fitted forest plus its rescaler.
///
/// Scoring a different batch reuses the frozen forest and bounds, but the
/// measure itself still describes distance from the *fit* population.
#[derive(Debug, Clone)]
pub struct FittedTrustModel {
    columns: Vec<&'static str>,
    forest: IsolationForest,
    rescaler: FittedRescaler,
}

impl FittedTrustModel {
    pub fn rescaler(&self) -> &FittedRescaler {
        &self.rescaler
    }

    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    /// Raw anomaly measures for every row of `matrix`, in row order.
    pub fn anomaly_measures(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, ScoringError> {
        if matrix.columns() != self.columns.as_slice() {
            return Err(ScoringError::ColumnMismatch {
                expected: self.columns.clone(),
                got: matrix.columns().to_vec(),
            });
        }
        check_finite(matrix)?;
        Ok(self.forest.decision_function(matrix.rows()))
    }

    /// Score with the rescaler fitted alongside this model.
    pub fn score(&self, matrix: &FeatureMatrix) -> Result<Vec<TrustScore>, ScoringError> {
        self.score_with(matrix, &self.rescaler)
    }

    /// Score against an externally supplied rescaler, e.g. one persisted from an
    /// earlier batch so scores stay on that batch's scale. The rescaler is
    /// validated first.
    pub fn score_with(
        &self,
        matrix: &FeatureMatrix,
        rescaler: &FittedRescaler,
    ) -> Result<Vec<TrustScore>, ScoringError> {
        rescaler.validate()?;
        let measures = self.anomaly_measures(matrix)?;
        Ok(matrix
            .wallets()
            .iter()
            .zip(measures)
            .map(|(wallet_id, measure)| TrustScore {
                wallet_id: wallet_id.clone(),
                anomaly_measure: measure,
                trust_score: rescaler.transform(measure),
            })
            .collect())
    }
}

fn check_finite(matrix: &FeatureMatrix) -> Result<(), ScoringError> {
    for (wallet_id, row) in matrix.wallets().iter().zip(matrix.rows()) {
        if let Some((column, value)) = matrix
            .columns()
            .iter()
            .zip(row)
            .find(|(_, v)| !v.is_finite())
        {
            return Err(ScoringError::NonFiniteFeature {
                wallet_id: wallet_id.clone(),
                column: *column,
                value: *value,
            });
        }
    }
    Ok(())
}
