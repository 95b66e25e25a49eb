//! Risk tiers and the per-tier screening policy table.

use crate::core::model::FundCategory;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Investor risk classification, ordered from least to most risk-tolerant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskTier {
    Conservative,
    Balanced,
    Growth,
    Aggressive,
}

/// Screening thresholds for one tier. Funds outside `allowed_categories` are
/// never returned for that tier; drawdown and volatility bounds are absolute
/// percentages; `min_rating` of `None` disables the rating filter.
#[derive(Debug, Clone)]
pub struct RiskTierPolicy {
    pub allowed_categories: &'static [FundCategory],
    pub max_drawdown_pct: f64,
    pub max_volatility_pct: f64,
    pub min_rating: Option<u8>,
    /// Acceptable net asset size in currency units, inclusive.
    pub size_band: (f64, f64),
}

// Funds below 200M tend to face liquidation risk, above 50B the manager
// loses flexibility. Same band for every tier.
const SIZE_BAND: (f64, f64) = (2e8, 5e10);

impl RiskTier {
    pub const ALL: [RiskTier; 4] = [
        RiskTier::Conservative,
        RiskTier::Balanced,
        RiskTier::Growth,
        RiskTier::Aggressive,
    ];

    pub fn policy(&self) -> RiskTierPolicy {
        match self {
            RiskTier::Conservative => RiskTierPolicy {
                allowed_categories: &[
                    FundCategory::Bond,
                    FundCategory::MoneyMarket,
                    FundCategory::FixedIncomePlus,
                ],
                max_drawdown_pct: 5.0,
                max_volatility_pct: 8.0,
                min_rating: Some(3),
                size_band: SIZE_BAND,
            },
            RiskTier::Balanced => RiskTierPolicy {
                allowed_categories: &[
                    FundCategory::Bond,
                    FundCategory::FixedIncomePlus,
                    FundCategory::Hybrid,
                    FundCategory::Index,
                ],
                max_drawdown_pct: 15.0,
                max_volatility_pct: 15.0,
                min_rating: Some(3),
                size_band: SIZE_BAND,
            },
            RiskTier::Growth => RiskTierPolicy {
                allowed_categories: &[
                    FundCategory::Bond,
                    FundCategory::Hybrid,
                    FundCategory::Equity,
                    FundCategory::Index,
                ],
                max_drawdown_pct: 25.0,
                max_volatility_pct: 22.0,
                min_rating: Some(2),
                size_band: SIZE_BAND,
            },
            RiskTier::Aggressive => RiskTierPolicy {
                allowed_categories: &[
                    FundCategory::Equity,
                    FundCategory::Hybrid,
                    FundCategory::Index,
                    FundCategory::Sector,
                ],
                max_drawdown_pct: 40.0,
                max_volatility_pct: 30.0,
                min_rating: None,
                size_band: SIZE_BAND,
            },
        }
    }

    pub fn allows(&self, category: FundCategory) -> bool {
        self.policy().allowed_categories.contains(&category)
    }
}

impl Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RiskTier::Conservative => "conservative",
            RiskTier::Balanced => "balanced",
            RiskTier::Growth => "growth",
            RiskTier::Aggressive => "aggressive",
        };
        write!(f, "{label}")
    }
}

impl FromStr for RiskTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conservative" => Ok(RiskTier::Conservative),
            "balanced" => Ok(RiskTier::Balanced),
            "growth" => Ok(RiskTier::Growth),
            "aggressive" => Ok(RiskTier::Aggressive),
            _ => Err(anyhow::anyhow!("Unknown risk tier: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conservative_excludes_equity() {
        assert!(!RiskTier::Conservative.allows(FundCategory::Equity));
        assert!(RiskTier::Conservative.allows(FundCategory::Bond));
    }

    #[test]
    fn test_aggressive_has_no_rating_floor() {
        assert!(RiskTier::Aggressive.policy().min_rating.is_none());
        assert_eq!(RiskTier::Conservative.policy().min_rating, Some(3));
    }

    #[test]
    fn test_tier_parse_roundtrip() {
        for tier in RiskTier::ALL {
            assert_eq!(tier.to_string().parse::<RiskTier>().unwrap(), tier);
        }
        assert!("speculative".parse::<RiskTier>().is_err());
    }

    #[test]
    fn test_thresholds_widen_with_tier() {
        let tiers = RiskTier::ALL;
        for pair in tiers.windows(2) {
            assert!(pair[0].policy().max_drawdown_pct < pair[1].policy().max_drawdown_pct);
            assert!(pair[0].policy().max_volatility_pct < pair[1].policy().max_volatility_pct);
        }
    }
}
