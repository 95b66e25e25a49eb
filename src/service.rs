//! Cache-first fund data access.
//!
//! Every read resolves in three tiers: a cached record younger than its TTL
//! is served with zero network, a miss or expiry goes through the gateway
//! chain and refreshes the cache, and an exhausted chain degrades to the
//! most recent cached value marked stale, or to an explicit empty result.
//! Data unavailability is never an error at this layer.

use crate::core::config::TtlConfig;
use crate::core::metrics::{self, RiskMetrics, TrailingReturns};
use crate::core::model::{
    FundCategory, FundListEntry, FundProfile, HoldingRecord, NavObservation, RankingEntry,
    RatingRecord, UpdateLogEntry,
};
use crate::gateway::DataSourceGateway;
use crate::store::CacheStore;
use anyhow::Result;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Served from cache within TTL, or just refreshed from a provider.
    Fresh,
    /// Every provider failed; this is the last value the cache holds.
    Stale,
    /// Every provider failed and the cache holds nothing.
    Missing,
}

/// A resolved read with its provenance attached.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub value: Option<T>,
    pub freshness: Freshness,
}

impl<T> Fetched<T> {
    fn fresh(value: T) -> Self {
        Self {
            value: Some(value),
            freshness: Freshness::Fresh,
        }
    }

    fn stale(value: T) -> Self {
        Self {
            value: Some(value),
            freshness: Freshness::Stale,
        }
    }

    fn missing() -> Self {
        Self {
            value: None,
            freshness: Freshness::Missing,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.freshness == Freshness::Stale
    }
}

/// Everything the pipeline knows about one fund, composed from concurrent
/// cached reads plus derived statistics.
#[derive(Debug, Clone)]
pub struct FundAnalysis {
    pub code: String,
    pub profile: Option<FundProfile>,
    pub latest_nav: Option<NavObservation>,
    pub holdings: Vec<HoldingRecord>,
    pub rating: Option<RatingRecord>,
    pub metrics: RiskMetrics,
    pub trailing: TrailingReturns,
    pub stale: bool,
}

pub struct FundDataService {
    store: Arc<CacheStore>,
    gateway: DataSourceGateway,
    ttl: TtlConfig,
}

impl FundDataService {
    pub fn new(store: Arc<CacheStore>, gateway: DataSourceGateway, ttl: TtlConfig) -> Self {
        Self { store, gateway, ttl }
    }

    fn log_success(&self, category: &str, message: String) {
        debug!("{category}: {message}");
        let _ = self.store.append_log(&UpdateLogEntry::success(category, message));
    }

    /// The cached fund universe, refreshed when the last successful listing
    /// pull is older than the list TTL. Listing rows never overwrite a
    /// richer profile already on record.
    pub async fn fund_list(&self) -> Result<Fetched<Vec<FundListEntry>>> {
        let cached = self.store.all_profiles()?;
        let last_pull = self.store.last_success("fund_list")?;
        let within_ttl =
            last_pull.is_some_and(|at| Utc::now() - at < self.ttl.fund_list());
        if within_ttl && !cached.is_empty() {
            return Ok(Fetched::fresh(profiles_to_entries(&cached)));
        }

        match self.gateway.fund_list().await {
            Ok(entries) => {
                let mut inserted = 0usize;
                for entry in &entries {
                    if self.store.profile(&entry.fund_code)?.is_none() {
                        self.store.upsert_profile(&FundProfile {
                            code: entry.fund_code.clone(),
                            name: entry.fund_name.clone(),
                            category: entry.category,
                            company: None,
                            manager: None,
                            inception_date: None,
                            net_asset_size: None,
                            share_size: None,
                            updated_at: Utc::now(),
                        })?;
                        inserted += 1;
                    }
                }
                self.log_success("fund_list", format!("{} funds, {inserted} new", entries.len()));
                Ok(Fetched::fresh(entries))
            }
            Err(_) if !cached.is_empty() => Ok(Fetched::stale(profiles_to_entries(&cached))),
            Err(_) => Ok(Fetched::missing()),
        }
    }

    pub async fn daily_nav(&self, code: &str) -> Result<Fetched<NavObservation>> {
        let cached = self.store.latest_nav(code)?;
        if let Some(nav) = &cached {
            if Utc::now() - nav.created_at < self.ttl.nav() {
                return Ok(Fetched::fresh(nav.clone()));
            }
        }

        match self.gateway.daily_nav(code).await {
            Ok(nav) => {
                self.store.insert_nav(&nav)?;
                self.log_success("daily_nav", format!("{code} @ {}", nav.nav_date));
                Ok(Fetched::fresh(nav))
            }
            Err(_) => match cached {
                Some(nav) => Ok(Fetched::stale(nav)),
                None => Ok(Fetched::missing()),
            },
        }
    }

    pub async fn history(&self, code: &str, days: u32) -> Result<Fetched<Vec<NavObservation>>> {
        let since = Utc::now().date_naive() - Duration::days(days as i64);
        let cached = self.store.nav_history(code, since)?;
        let newest_fetch = cached.iter().map(|n| n.created_at).max();
        let within_ttl = newest_fetch.is_some_and(|at| Utc::now() - at < self.ttl.nav());
        if within_ttl && !cached.is_empty() {
            return Ok(Fetched::fresh(cached));
        }

        match self.gateway.history(code, days).await {
            Ok(rows) => {
                let mut inserted = 0usize;
                for row in &rows {
                    if self.store.insert_nav(row)? {
                        inserted += 1;
                    }
                }
                self.log_success("history", format!("{code}: {inserted} new observations"));
                // read back so previously cached dates merge into the series
                Ok(Fetched::fresh(self.store.nav_history(code, since)?))
            }
            Err(_) if !cached.is_empty() => Ok(Fetched::stale(cached)),
            Err(_) => Ok(Fetched::missing()),
        }
    }

    /// Rankings are transient: straight pass-through, empty on exhaustion.
    pub async fn ranking(&self, category: FundCategory) -> Vec<RankingEntry> {
        match self.gateway.ranking(category).await {
            Ok(entries) => entries,
            Err(e) => {
                info!("Ranking unavailable for {category}: {e}");
                Vec::new()
            }
        }
    }

    pub async fn holdings(&self, code: &str) -> Result<Fetched<Vec<HoldingRecord>>> {
        let cached = self.store.latest_holdings(code)?;
        let newest_fetch = cached.iter().map(|h| h.created_at).max();
        let within_ttl = newest_fetch.is_some_and(|at| Utc::now() - at < self.ttl.holdings());
        if within_ttl && !cached.is_empty() {
            return Ok(Fetched::fresh(cached));
        }

        match self.gateway.holdings(code).await {
            Ok(rows) => {
                self.store.insert_holdings(&rows)?;
                self.log_success("holdings", format!("{code}: {} positions", rows.len()));
                Ok(Fetched::fresh(rows))
            }
            Err(_) if !cached.is_empty() => Ok(Fetched::stale(cached)),
            Err(_) => Ok(Fetched::missing()),
        }
    }

    /// Ratings arrive as one universe-wide table; a refresh for any fund
    /// upserts every row so the next fund's lookup is already warm.
    pub async fn rating(&self, code: &str) -> Result<Fetched<RatingRecord>> {
        let cached = self.store.latest_rating(code)?;
        if let Some(rating) = &cached {
            if Utc::now() - rating.created_at < self.ttl.rating() {
                return Ok(Fetched::fresh(rating.clone()));
            }
        }

        match self.gateway.ratings().await {
            Ok(rows) => {
                for row in &rows {
                    self.store.insert_rating(row)?;
                }
                self.log_success("rating", format!("{} funds rated", rows.len()));
                match self.store.latest_rating(code)? {
                    Some(rating) => Ok(Fetched::fresh(rating)),
                    None => Ok(Fetched::missing()),
                }
            }
            Err(_) => match cached {
                Some(rating) => Ok(Fetched::stale(rating)),
                None => Ok(Fetched::missing()),
            },
        }
    }

    pub async fn basic_info(&self, code: &str) -> Result<Fetched<FundProfile>> {
        let cached = self.store.profile(code)?;
        if let Some(profile) = &cached {
            // listing rows carry no company; they do not satisfy basic info
            let complete = profile.company.is_some();
            if complete && Utc::now() - profile.updated_at < self.ttl.basic_info() {
                return Ok(Fetched::fresh(profile.clone()));
            }
        }

        match self.gateway.basic_info(code).await {
            Ok(mut profile) => {
                // a size-only refresh may have run since; keep the newer size
                if profile.net_asset_size.is_none() {
                    if let Some(existing) = &cached {
                        profile.net_asset_size = existing.net_asset_size;
                        profile.share_size = existing.share_size;
                    }
                }
                self.store.upsert_profile(&profile)?;
                self.log_success("basic_info", format!("{code} refreshed"));
                Ok(Fetched::fresh(profile))
            }
            Err(_) => match cached {
                Some(profile) => Ok(Fetched::stale(profile)),
                None => Ok(Fetched::missing()),
            },
        }
    }

    /// Refreshes only the size fields of the profile. The rest of the row is
    /// left untouched; a fund with no profile row yet is served without
    /// persisting.
    pub async fn fund_size(&self, code: &str) -> Result<Fetched<FundProfile>> {
        let cached = self.store.profile(code)?;
        if let Some(profile) = &cached {
            if profile.net_asset_size.is_some()
                && Utc::now() - profile.updated_at < self.ttl.basic_info()
            {
                return Ok(Fetched::fresh(profile.clone()));
            }
        }

        match self.gateway.fund_size(code).await {
            Ok(size) => {
                self.log_success("size", format!("{code} refreshed"));
                match cached {
                    Some(mut profile) => {
                        profile.net_asset_size = size.net_asset_size;
                        profile.share_size = size.share_size;
                        profile.updated_at = Utc::now();
                        self.store.upsert_profile(&profile)?;
                        Ok(Fetched::fresh(profile))
                    }
                    None => Ok(Fetched::fresh(FundProfile {
                        code: code.to_string(),
                        name: String::new(),
                        category: FundCategory::Other,
                        company: None,
                        manager: None,
                        inception_date: None,
                        net_asset_size: size.net_asset_size,
                        share_size: size.share_size,
                        updated_at: Utc::now(),
                    })),
                }
            }
            Err(_) => match cached {
                Some(profile) => Ok(Fetched::stale(profile)),
                None => Ok(Fetched::missing()),
            },
        }
    }

    /// Composes the full per-fund picture with concurrent reads, then derives
    /// risk metrics and trailing returns from the refreshed history.
    pub async fn fund_analysis(&self, code: &str) -> Result<FundAnalysis> {
        let (nav, profile, holdings, rating, history) = tokio::join!(
            self.daily_nav(code),
            self.basic_info(code),
            self.holdings(code),
            self.rating(code),
            self.history(code, 365),
        );
        let nav = nav?;
        let profile = profile?;
        let holdings = holdings?;
        let rating = rating?;
        let history = history?;

        let history_rows = history.value.clone().unwrap_or_default();
        let holding_rows = holdings.value.clone().unwrap_or_default();
        let stale = nav.is_stale()
            || profile.is_stale()
            || holdings.is_stale()
            || rating.is_stale()
            || history.is_stale();

        Ok(FundAnalysis {
            code: code.to_string(),
            profile: profile.value,
            latest_nav: nav.value,
            metrics: metrics::risk_metrics(&history_rows, &holding_rows),
            trailing: metrics::trailing_returns(&history_rows),
            holdings: holding_rows,
            rating: rating.value,
            stale,
        })
    }

    // -- batched cached reads for screening ------------------------------

    pub async fn cached_profiles(&self, codes: &[String]) -> Result<HashMap<String, FundProfile>> {
        self.store.profiles(codes)
    }

    pub async fn cached_ratings(&self, codes: &[String]) -> Result<HashMap<String, RatingRecord>> {
        self.store.ratings_batch(codes)
    }

    /// Risk metrics for a batch of funds, derived from whatever history and
    /// holdings the cache already holds. No provider calls.
    pub async fn cached_metrics(&self, codes: &[String]) -> Result<HashMap<String, RiskMetrics>> {
        let since = Utc::now().date_naive() - Duration::days(365);
        let histories = self.store.nav_history_batch(codes, since)?;
        let holdings = self.store.holdings_batch(codes)?;
        Ok(metrics::risk_metrics_batch(&histories, &holdings))
    }
}

fn profiles_to_entries(profiles: &[FundProfile]) -> Vec<FundListEntry> {
    profiles
        .iter()
        .map(|p| FundListEntry {
            fund_code: p.code.clone(),
            fund_name: p.name.clone(),
            category: p.category,
        })
        .collect()
}
