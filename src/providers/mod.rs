//! Market-data provider adapters.
//!
//! Each adapter normalizes one provider's native payloads into the entities
//! of `core::model` and implements the capabilities it actually serves;
//! everything else reports unsupported so the fallback chain moves on.

pub mod eastmoney;
pub mod sina;
pub mod tushare;
pub mod util;

use crate::core::model::{
    FundCategory, FundListEntry, FundProfile, FundSize, HoldingRecord, NavObservation,
    RankingEntry, RatingRecord,
};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::fmt::Display;

/// The read capabilities a source may serve. Fallback chains are declared per
/// capability, not per source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    FundList,
    DailyNav,
    History,
    Ranking,
    Holdings,
    Rating,
    BasicInfo,
    Size,
}

impl Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Capability::FundList => "fund_list",
            Capability::DailyNav => "daily_nav",
            Capability::History => "history",
            Capability::Ranking => "ranking",
            Capability::Holdings => "holdings",
            Capability::Rating => "rating",
            Capability::BasicInfo => "basic_info",
            Capability::Size => "size",
        };
        write!(f, "{label}")
    }
}

fn unsupported<T>(source: &str, capability: Capability) -> Result<T> {
    Err(anyhow!("{source} does not serve {capability}"))
}

/// One provider's implementation of the capability set. Default bodies report
/// unsupported; a chain should only list sources that override the method.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fund_list(&self) -> Result<Vec<FundListEntry>> {
        unsupported(self.name(), Capability::FundList)
    }

    async fn daily_nav(&self, fund_code: &str) -> Result<NavObservation> {
        let _ = fund_code;
        unsupported(self.name(), Capability::DailyNav)
    }

    async fn history(&self, fund_code: &str, days: u32) -> Result<Vec<NavObservation>> {
        let _ = (fund_code, days);
        unsupported(self.name(), Capability::History)
    }

    async fn ranking(&self, category: FundCategory) -> Result<Vec<RankingEntry>> {
        let _ = category;
        unsupported(self.name(), Capability::Ranking)
    }

    async fn holdings(&self, fund_code: &str) -> Result<Vec<HoldingRecord>> {
        let _ = fund_code;
        unsupported(self.name(), Capability::Holdings)
    }

    /// Ratings arrive as one table covering the whole universe; callers
    /// filter for the fund they need and cache the rest.
    async fn ratings(&self) -> Result<Vec<RatingRecord>> {
        unsupported(self.name(), Capability::Rating)
    }

    async fn basic_info(&self, fund_code: &str) -> Result<FundProfile> {
        let _ = fund_code;
        unsupported(self.name(), Capability::BasicInfo)
    }

    async fn fund_size(&self, fund_code: &str) -> Result<FundSize> {
        let _ = fund_code;
        unsupported(self.name(), Capability::Size)
    }
}
