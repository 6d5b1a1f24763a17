use thiserror::Error;

/// A raw record could not be turned into a canonical transaction.
/// Fatal: the whole batch is rejected, no partial recovery.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed record at index {index}: field `{field}` {reason}")]
pub struct MalformedRecordError {
    pub index: usize,
    pub field: &'static str,
    pub reason: String,
}

impl MalformedRecordError {
    pub fn missing(index: usize, field: &'static str) -> Self {
        Self {
            index,
            field,
            reason: "is missing".to_string(),
        }
    }

    pub fn invalid(index: usize, field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            index,
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    #[error("feature matrix has no wallets; cannot fit an outlier model")]
    EmptyBatch,
    #[error("non-finite value {value} in column `{column}` for wallet {wallet_id}")]
    NonFiniteFeature {
        wallet_id: String,
        column: &'static str,
        value: f64,
    },
    #[error("feature columns differ from the fitted model: expected {expected:?}, got {got:?}")]
    ColumnMismatch {
        expected: Vec<&'static str>,
        got: Vec<&'static str>,
    },
    #[error("row {row} has {got} features, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        got: usize,
    },
    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),
}

/// The transactions export could not be read into raw records.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("transactions export is not a valid JSON array: {0}")]
    NotAnArray(#[source] serde_json::Error),
    #[error(transparent)]
    MalformedRecord(#[from] MalformedRecordError),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    MalformedRecord(#[from] MalformedRecordError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
}
