//! Behavioral trust scores for lending-protocol wallets.
//!
//! Raw protocol actions are normalized, aggregated into one feature vector per
//! wallet, and scored with an isolation forest whose output is rescaled onto
//! `[0, 1000]`. Scores are relative to the batch the forest was fitted on.

pub mod config;
pub mod error;
pub mod features;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod scoring;

pub use error::{IngestError, MalformedRecordError, PipelineError, ScoringError};
pub use features::matrix::{derive_feature_matrix, FeatureMatrix};
pub use features::types::{Action, WalletFeatures, WalletTransaction, FEATURE_COLUMNS};
pub use pipeline::{ScoredBatch, TrustScorePipeline};
pub use scoring::engine::{FittedTrustModel, TrustScore, TrustScorer};
pub use scoring::rescaler::FittedRescaler;
