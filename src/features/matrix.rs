use chrono::{DateTime, Utc};

use super::aggregations::{feature_tables, FeatureTable, WalletGroups};
use super::types::{WalletFeatures, WalletTransaction, FEATURE_COLUMNS, FEATURE_COUNT};

/// Dense wallet × feature matrix. Row `i` belongs to `wallets[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<&'static str>,
    wallets: Vec<String>,
    rows: Vec<[f64; FEATURE_COUNT]>,
}

impl FeatureMatrix {
    /// Left-join every feature table onto the wallets seen by `tx_count`,
    /// filling missing cells with 0.
    pub fn assemble(groups: &WalletGroups, evaluated_at: DateTime<Utc>) -> Self {
        let tables = feature_tables(groups, evaluated_at);
        Self::from_tables(&tables)
    }

    fn from_tables(tables: &[(&'static str, FeatureTable)]) -> Self {
        let columns: Vec<&'static str> = tables.iter().map(|(name, _)| *name).collect();
        debug_assert_eq!(columns, FEATURE_COLUMNS.to_vec());

        // tx_count holds every wallet with at least one record
        let wallets: Vec<String> = tables
            .iter()
            .find(|(name, _)| *name == "tx_count")
            .map(|(_, table)| table.keys().cloned().collect())
            .unwrap_or_default();

        let rows = wallets
            .iter()
            .map(|wallet| {
                let mut row = [0.0; FEATURE_COUNT];
                for (cell, (_, table)) in row.iter_mut().zip(tables) {
                    *cell = table.get(wallet).copied().unwrap_or(0.0);
                }
                row
            })
            .collect();

        Self {
            columns,
            wallets,
            rows,
        }
    }

    /// Build a matrix from already-computed feature vectors, e.g. when they were
    /// produced elsewhere and only need scoring.
    pub fn from_features<I>(features: I) -> Self
    where
        I: IntoIterator<Item = (String, WalletFeatures)>,
    {
        let (wallets, rows): (Vec<String>, Vec<[f64; FEATURE_COUNT]>) = features
            .into_iter()
            .map(|(wallet, f)| (wallet, f.to_row()))
            .unzip();
        Self {
            columns: FEATURE_COLUMNS.to_vec(),
            wallets,
            rows,
        }
    }

    pub fn columns(&self) -> &[&'static str] {
        &self.columns
    }

    pub fn wallets(&self) -> &[String] {
        &self.wallets
    }

    pub fn rows(&self) -> &[[f64; FEATURE_COUNT]] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn features(&self, wallet_id: &str) -> Option<WalletFeatures> {
        let idx = self.wallets.iter().position(|w| w == wallet_id)?;
        Some(WalletFeatures::from_row(&self.rows[idx]))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, WalletFeatures)> + '_ {
        self.wallets
            .iter()
            .zip(&self.rows)
            .map(|(w, row)| (w.as_str(), WalletFeatures::from_row(row)))
    }
}

/// Group, aggregate and assemble in one step.
pub fn derive_feature_matrix(
    records: &[WalletTransaction],
    evaluated_at: DateTime<Utc>,
) -> FeatureMatrix {
    let groups = WalletGroups::group(records);
    let matrix = FeatureMatrix::assemble(&groups, evaluated_at);

    tracing::info!(
        records = records.len(),
        wallets = matrix.len(),
        columns = matrix.columns().len(),
        "Feature matrix assembled"
    );

    matrix
}
