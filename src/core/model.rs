//! Persisted fund entities and provider-normalized records.
//!
//! The five persisted entities (profile, nav, holdings, rating, update log)
//! map one-to-one onto the cache store partitions. Ranking entries are
//! transient: they feed screening and the oracle context but are never
//! written to disk.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Broad fund classification used by the risk tier allow lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FundCategory {
    Bond,
    MoneyMarket,
    FixedIncomePlus,
    Hybrid,
    Equity,
    Index,
    Sector,
    Qdii,
    Other,
}

impl FundCategory {
    /// Maps a provider display label onto a category. Unknown labels become
    /// `Other` rather than an error; a miscategorized fund is filtered later,
    /// a hard parse failure would poison a whole provider payload.
    pub fn parse(label: &str) -> Self {
        let l = label.to_lowercase();
        if l.contains("money market") || l.contains("money-market") {
            FundCategory::MoneyMarket
        } else if l.contains("fixed income plus") || l.contains("fixed-income-plus") {
            FundCategory::FixedIncomePlus
        } else if l.contains("bond") || l.contains("debt") {
            FundCategory::Bond
        } else if l.contains("hybrid") || l.contains("mixed") || l.contains("balanced") {
            FundCategory::Hybrid
        } else if l.contains("index") {
            FundCategory::Index
        } else if l.contains("sector") || l.contains("thematic") {
            FundCategory::Sector
        } else if l.contains("equity") || l.contains("stock") {
            FundCategory::Equity
        } else if l.contains("qdii") {
            FundCategory::Qdii
        } else {
            FundCategory::Other
        }
    }
}

impl Display for FundCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FundCategory::Bond => "Bond",
            FundCategory::MoneyMarket => "Money Market",
            FundCategory::FixedIncomePlus => "Fixed Income Plus",
            FundCategory::Hybrid => "Hybrid",
            FundCategory::Equity => "Equity",
            FundCategory::Index => "Index",
            FundCategory::Sector => "Sector",
            FundCategory::Qdii => "QDII",
            FundCategory::Other => "Other",
        };
        write!(f, "{label}")
    }
}

/// Basic fund facts. Upserted whole on every successful basic-info fetch;
/// a size-only refresh touches just the two size fields and `updated_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundProfile {
    pub code: String,
    pub name: String,
    pub category: FundCategory,
    pub company: Option<String>,
    pub manager: Option<String>,
    pub inception_date: Option<NaiveDate>,
    /// Net asset size in currency units.
    pub net_asset_size: Option<f64>,
    /// Outstanding share size in units.
    pub share_size: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

/// One NAV observation. Unique per (fund_code, nav_date); the store ignores
/// duplicate inserts so the series stays append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavObservation {
    pub fund_code: String,
    pub nav_date: NaiveDate,
    pub unit_nav: f64,
    pub accumulated_nav: f64,
    pub daily_growth_pct: f64,
    pub created_at: DateTime<Utc>,
}

/// One constituent security of a fund's reported portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldingRecord {
    pub fund_code: String,
    pub report_date: NaiveDate,
    pub security_code: String,
    pub security_name: String,
    pub weight_pct: f64,
    pub shares: f64,
    pub market_value: f64,
    pub security_category: String,
    pub created_at: DateTime<Utc>,
}

/// Star ratings (1-5) from one agency on one date. A missing horizon rating
/// is `None`, never a zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingRecord {
    pub fund_code: String,
    pub rating_date: NaiveDate,
    pub agency: String,
    pub rating_1y: Option<u8>,
    pub rating_2y: Option<u8>,
    pub rating_3y: Option<u8>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateStatus {
    Success,
    Error,
}

impl Display for UpdateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateStatus::Success => write!(f, "success"),
            UpdateStatus::Error => write!(f, "error"),
        }
    }
}

/// Append-only audit trail of refresh attempts. Never pruned by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateLogEntry {
    pub category: String,
    pub at: DateTime<Utc>,
    pub status: UpdateStatus,
    pub message: String,
}

impl UpdateLogEntry {
    pub fn success(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            at: Utc::now(),
            status: UpdateStatus::Success,
            message: message.into(),
        }
    }

    pub fn error(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            at: Utc::now(),
            status: UpdateStatus::Error,
            message: message.into(),
        }
    }
}

/// Entry of the fund universe listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundListEntry {
    pub fund_code: String,
    pub fund_name: String,
    pub category: FundCategory,
}

/// Performance ranking row with trailing returns at six horizons.
/// Transient; consumed by screening and the oracle context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingEntry {
    pub fund_code: String,
    pub fund_name: String,
    pub rank: u32,
    pub return_1m: f64,
    pub return_3m: f64,
    pub return_6m: f64,
    pub return_1y: f64,
    pub return_3y: f64,
    pub return_ytd: f64,
}

/// Fund size snapshot returned by the size capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundSize {
    pub net_asset_size: Option<f64>,
    pub share_size: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse_known_labels() {
        assert_eq!(FundCategory::parse("Bond"), FundCategory::Bond);
        assert_eq!(FundCategory::parse("short duration debt"), FundCategory::Bond);
        assert_eq!(FundCategory::parse("Money Market"), FundCategory::MoneyMarket);
        assert_eq!(FundCategory::parse("Equity Large Cap"), FundCategory::Equity);
        assert_eq!(FundCategory::parse("Balanced Hybrid"), FundCategory::Hybrid);
        assert_eq!(FundCategory::parse("Index Tracker"), FundCategory::Index);
        assert_eq!(FundCategory::parse("Sector - Technology"), FundCategory::Sector);
        assert_eq!(FundCategory::parse("QDII"), FundCategory::Qdii);
    }

    #[test]
    fn test_category_parse_unknown_is_other() {
        assert_eq!(FundCategory::parse("Commodities"), FundCategory::Other);
        assert_eq!(FundCategory::parse(""), FundCategory::Other);
    }

    #[test]
    fn test_index_equity_precedence() {
        // "Equity Index" is an index fund, not a plain equity fund
        assert_eq!(FundCategory::parse("Equity Index"), FundCategory::Index);
    }
}
