use chrono::{DateTime, Utc};
use serde::Serialize;

/// Lending-protocol action kinds. Anything unrecognized is kept verbatim in
/// `Other` and never matches an action-specific aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Deposit,
    Borrow,
    Repay,
    RedeemUnderlying,
    LiquidationCall,
    Other(String),
}

impl Action {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "deposit" => Self::Deposit,
            "borrow" => Self::Borrow,
            "repay" => Self::Repay,
            "redeemunderlying" => Self::RedeemUnderlying,
            "liquidationcall" => Self::LiquidationCall,
            _ => Self::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Deposit => "deposit",
            Self::Borrow => "borrow",
            Self::Repay => "repay",
            Self::RedeemUnderlying => "redeemunderlying",
            Self::LiquidationCall => "liquidationcall",
            Self::Other(raw) => raw,
        }
    }
}

/// A normalized action event, ready for aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletTransaction {
    pub wallet_id: String,
    pub tx_hash: Option<String>,
    pub action: Action,
    pub asset_symbol: Option<String>,
    pub pool_id: Option<String>,
    /// Finite and non-negative, already converted from the exact decimal.
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
}

/// Column order of the feature matrix. Fitting and scoring must agree on it.
pub const FEATURE_COLUMNS: [&str; 17] = [
    "tx_count",
    "unique_asset_count",
    "unique_pool_count",
    "total_deposit",
    "total_borrow",
    "deposit_to_borrow_ratio",
    "total_repay",
    "net_borrow",
    "repayment_ratio",
    "liquidation_rate",
    "avg_tx_amount",
    "tx_amount_std",
    "tx_amount_max",
    "tx_amount_min",
    "user_active_days",
    "avg_time_gap_seconds",
    "days_since_last_tx",
];

pub const FEATURE_COUNT: usize = FEATURE_COLUMNS.len();

/// Per-wallet behavioral profile. One row of the feature matrix.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WalletFeatures {
    pub tx_count: f64,
    pub unique_asset_count: f64,
    pub unique_pool_count: f64,
    pub total_deposit: f64,
    pub total_borrow: f64,
    pub deposit_to_borrow_ratio: f64,
    pub total_repay: f64,
    pub net_borrow: f64,
    pub repayment_ratio: f64,
    /// Liquidation *count* divided by the borrowed *amount*. The units do not
    /// match; kept as-is until the intended rate is settled.
    pub liquidation_rate: f64,
    pub avg_tx_amount: f64,
    pub tx_amount_std: f64,
    pub tx_amount_max: f64,
    pub tx_amount_min: f64,
    pub user_active_days: f64,
    pub avg_time_gap_seconds: f64,
    pub days_since_last_tx: f64,
}

impl WalletFeatures {
    /// Values in `FEATURE_COLUMNS` order.
    pub fn to_row(&self) -> [f64; FEATURE_COUNT] {
        [
            self.tx_count,
            self.unique_asset_count,
            self.unique_pool_count,
            self.total_deposit,
            self.total_borrow,
            self.deposit_to_borrow_ratio,
            self.total_repay,
            self.net_borrow,
            self.repayment_ratio,
            self.liquidation_rate,
            self.avg_tx_amount,
            self.tx_amount_std,
            self.tx_amount_max,
            self.tx_amount_min,
            self.user_active_days,
            self.avg_time_gap_seconds,
            self.days_since_last_tx,
        ]
    }

    pub fn from_row(row: &[f64; FEATURE_COUNT]) -> Self {
        Self {
            tx_count: row[0],
            unique_asset_count: row[1],
            unique_pool_count: row[2],
            total_deposit: row[3],
            total_borrow: row[4],
            deposit_to_borrow_ratio: row[5],
            total_repay: row[6],
            net_borrow: row[7],
            repayment_ratio: row[8],
            liquidation_rate: row[9],
            avg_tx_amount: row[10],
            tx_amount_std: row[11],
            tx_amount_max: row[12],
            tx_amount_min: row[13],
            user_active_days: row[14],
            avg_time_gap_seconds: row[15],
            days_since_last_tx: row[16],
        }
    }
}
