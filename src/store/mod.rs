//! Durable cache over a fjall keyspace.
//!
//! One partition per logical table: profiles, NAV series, holdings, ratings
//! and the refresh audit log. Keys embed the fund code first and an ISO date
//! second, so a prefix scan walks one fund's rows in temporal order. The
//! store knows nothing about freshness; callers judge TTLs from the
//! timestamps carried on each record.

use crate::core::model::{
    FundProfile, HoldingRecord, NavObservation, RatingRecord, UpdateLogEntry, UpdateStatus,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Row caps applied by [`CacheStore::prune`]. Never triggered inline by
/// reads or refreshes.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    pub nav_days: i64,
    pub holding_periods: usize,
    pub rating_periods: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            nav_days: 365,
            holding_periods: 4,
            rating_periods: 12,
        }
    }
}

pub struct CacheStore {
    keyspace: Keyspace,
    profiles: PartitionHandle,
    navs: PartitionHandle,
    holdings: PartitionHandle,
    ratings: PartitionHandle,
    update_log: PartitionHandle,
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).context("Failed to serialize record")
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).context("Failed to deserialize record")
}

/// Collects every value under `prefix`, in key order.
fn scan<T: DeserializeOwned>(partition: &PartitionHandle, prefix: &str) -> Result<Vec<T>> {
    let mut rows = Vec::new();
    for entry in partition.prefix(prefix) {
        let (_, value) = entry.context("Prefix scan failed")?;
        rows.push(decode(&value)?);
    }
    Ok(rows)
}

impl CacheStore {
    pub fn open(path: &Path) -> Result<Self> {
        let keyspace = Config::new(path)
            .open()
            .with_context(|| format!("Failed to open cache store at {}", path.display()))?;
        let open = |name: &str| {
            keyspace
                .open_partition(name, PartitionCreateOptions::default())
                .with_context(|| format!("Failed to open partition {name}"))
        };
        Ok(Self {
            profiles: open("fund_profile")?,
            navs: open("fund_nav")?,
            holdings: open("fund_holdings")?,
            ratings: open("fund_rating")?,
            update_log: open("update_log")?,
            keyspace,
        })
    }

    // -- profiles --------------------------------------------------------

    pub fn upsert_profile(&self, profile: &FundProfile) -> Result<()> {
        self.profiles.insert(&profile.code, encode(profile)?)?;
        Ok(())
    }

    pub fn profile(&self, code: &str) -> Result<Option<FundProfile>> {
        match self.profiles.get(code)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn profiles(&self, codes: &[String]) -> Result<HashMap<String, FundProfile>> {
        let mut out = HashMap::with_capacity(codes.len());
        for code in codes {
            if let Some(profile) = self.profile(code)? {
                out.insert(code.clone(), profile);
            }
        }
        Ok(out)
    }

    pub fn all_profiles(&self) -> Result<Vec<FundProfile>> {
        scan(&self.profiles, "")
    }

    // -- NAV series ------------------------------------------------------

    /// Inserts one observation keyed on (fund, date). Returns false and
    /// leaves the existing row untouched when the date is already present,
    /// keeping the series append-only.
    pub fn insert_nav(&self, nav: &NavObservation) -> Result<bool> {
        let key = format!("{}:{}", nav.fund_code, nav.nav_date);
        if self.navs.contains_key(&key)? {
            return Ok(false);
        }
        self.navs.insert(&key, encode(nav)?)?;
        Ok(true)
    }

    pub fn latest_nav(&self, code: &str) -> Result<Option<NavObservation>> {
        let prefix = format!("{code}:");
        match self.navs.prefix(&prefix).next_back() {
            Some(entry) => {
                let (_, value) = entry.context("Prefix scan failed")?;
                Ok(Some(decode(&value)?))
            }
            None => Ok(None),
        }
    }

    pub fn nav_history(&self, code: &str, since: NaiveDate) -> Result<Vec<NavObservation>> {
        let rows: Vec<NavObservation> = scan(&self.navs, &format!("{code}:"))?;
        Ok(rows.into_iter().filter(|n| n.nav_date >= since).collect())
    }

    pub fn nav_history_batch(
        &self,
        codes: &[String],
        since: NaiveDate,
    ) -> Result<HashMap<String, Vec<NavObservation>>> {
        let mut out = HashMap::with_capacity(codes.len());
        for code in codes {
            out.insert(code.clone(), self.nav_history(code, since)?);
        }
        Ok(out)
    }

    // -- holdings --------------------------------------------------------

    pub fn insert_holdings(&self, rows: &[HoldingRecord]) -> Result<()> {
        for row in rows {
            let key = format!(
                "{}:{}:{}",
                row.fund_code, row.report_date, row.security_code
            );
            self.holdings.insert(&key, encode(row)?)?;
        }
        Ok(())
    }

    /// Holdings of the most recent report period on record.
    pub fn latest_holdings(&self, code: &str) -> Result<Vec<HoldingRecord>> {
        let rows: Vec<HoldingRecord> = scan(&self.holdings, &format!("{code}:"))?;
        let Some(latest) = rows.iter().map(|r| r.report_date).max() else {
            return Ok(Vec::new());
        };
        Ok(rows.into_iter().filter(|r| r.report_date == latest).collect())
    }

    pub fn holdings_batch(
        &self,
        codes: &[String],
    ) -> Result<HashMap<String, Vec<HoldingRecord>>> {
        let mut out = HashMap::with_capacity(codes.len());
        for code in codes {
            out.insert(code.clone(), self.latest_holdings(code)?);
        }
        Ok(out)
    }

    // -- ratings ---------------------------------------------------------

    pub fn insert_rating(&self, rating: &RatingRecord) -> Result<()> {
        let key = format!("{}:{}", rating.fund_code, rating.rating_date);
        self.ratings.insert(&key, encode(rating)?)?;
        Ok(())
    }

    pub fn latest_rating(&self, code: &str) -> Result<Option<RatingRecord>> {
        let prefix = format!("{code}:");
        match self.ratings.prefix(&prefix).next_back() {
            Some(entry) => {
                let (_, value) = entry.context("Prefix scan failed")?;
                Ok(Some(decode(&value)?))
            }
            None => Ok(None),
        }
    }

    pub fn ratings_batch(
        &self,
        codes: &[String],
    ) -> Result<HashMap<String, RatingRecord>> {
        let mut out = HashMap::with_capacity(codes.len());
        for code in codes {
            if let Some(rating) = self.latest_rating(code)? {
                out.insert(code.clone(), rating);
            }
        }
        Ok(out)
    }

    // -- update log ------------------------------------------------------

    pub fn append_log(&self, entry: &UpdateLogEntry) -> Result<()> {
        // RFC 3339 with nanoseconds keeps concurrent entries distinct
        let key = format!(
            "{}:{}",
            entry.category,
            entry.at.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
        );
        self.update_log.insert(&key, encode(entry)?)?;
        Ok(())
    }

    pub fn log_entries(&self, category: &str) -> Result<Vec<UpdateLogEntry>> {
        scan(&self.update_log, &format!("{category}:"))
    }

    pub fn last_success(&self, category: &str) -> Result<Option<DateTime<Utc>>> {
        let entries: Vec<UpdateLogEntry> = scan(&self.update_log, &format!("{category}:"))?;
        Ok(entries
            .into_iter()
            .filter(|e| e.status == UpdateStatus::Success)
            .map(|e| e.at)
            .max())
    }

    // -- maintenance -----------------------------------------------------

    /// Applies the retention caps. NAVs older than the cutoff are dropped;
    /// holdings and ratings keep only the newest N periods per fund.
    pub fn prune(&self, retention: RetentionPolicy) -> Result<()> {
        let nav_cutoff = Utc::now().date_naive() - Duration::days(retention.nav_days);
        let mut dropped = 0usize;

        let navs: Vec<NavObservation> = scan(&self.navs, "")?;
        for nav in navs {
            if nav.nav_date < nav_cutoff {
                self.navs
                    .remove(format!("{}:{}", nav.fund_code, nav.nav_date))?;
                dropped += 1;
            }
        }

        let holdings: Vec<HoldingRecord> = scan(&self.holdings, "")?;
        let mut periods: HashMap<String, Vec<NaiveDate>> = HashMap::new();
        for row in &holdings {
            let dates = periods.entry(row.fund_code.clone()).or_default();
            if !dates.contains(&row.report_date) {
                dates.push(row.report_date);
            }
        }
        for dates in periods.values_mut() {
            dates.sort_unstable();
        }
        for row in &holdings {
            let dates = &periods[&row.fund_code];
            let keep_from = dates.len().saturating_sub(retention.holding_periods);
            if dates[..keep_from].contains(&row.report_date) {
                self.holdings.remove(format!(
                    "{}:{}:{}",
                    row.fund_code, row.report_date, row.security_code
                ))?;
                dropped += 1;
            }
        }

        let ratings: Vec<RatingRecord> = scan(&self.ratings, "")?;
        let mut by_fund: HashMap<String, Vec<NaiveDate>> = HashMap::new();
        for row in &ratings {
            by_fund
                .entry(row.fund_code.clone())
                .or_default()
                .push(row.rating_date);
        }
        for dates in by_fund.values_mut() {
            dates.sort_unstable();
        }
        for row in &ratings {
            let dates = &by_fund[&row.fund_code];
            let keep_from = dates.len().saturating_sub(retention.rating_periods);
            if dates[..keep_from].contains(&row.rating_date) {
                self.ratings
                    .remove(format!("{}:{}", row.fund_code, row.rating_date))?;
                dropped += 1;
            }
        }

        debug!("Pruned {dropped} cached rows");
        self.keyspace.persist(fjall::PersistMode::Buffer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::FundCategory;
    use tempfile::TempDir;

    fn store() -> (TempDir, CacheStore) {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path()).unwrap();
        (dir, store)
    }

    fn nav(code: &str, date: &str, unit: f64) -> NavObservation {
        NavObservation {
            fund_code: code.to_string(),
            nav_date: date.parse().unwrap(),
            unit_nav: unit,
            accumulated_nav: unit,
            daily_growth_pct: 0.0,
            created_at: Utc::now(),
        }
    }

    fn profile(code: &str, name: &str) -> FundProfile {
        FundProfile {
            code: code.to_string(),
            name: name.to_string(),
            category: FundCategory::Hybrid,
            company: None,
            manager: None,
            inception_date: None,
            net_asset_size: None,
            share_size: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_duplicate_nav_insert_is_ignored() {
        let (_dir, store) = store();
        assert!(store.insert_nav(&nav("000001", "2026-08-20", 1.20)).unwrap());
        assert!(!store.insert_nav(&nav("000001", "2026-08-20", 9.99)).unwrap());

        let latest = store.latest_nav("000001").unwrap().unwrap();
        assert_eq!(latest.unit_nav, 1.20);
    }

    #[test]
    fn test_latest_nav_picks_newest_date() {
        let (_dir, store) = store();
        store.insert_nav(&nav("000001", "2026-08-19", 1.18)).unwrap();
        store.insert_nav(&nav("000001", "2026-08-21", 1.22)).unwrap();
        store.insert_nav(&nav("000001", "2026-08-20", 1.20)).unwrap();
        // another fund must not leak into the prefix
        store.insert_nav(&nav("000002", "2026-08-22", 2.00)).unwrap();

        let latest = store.latest_nav("000001").unwrap().unwrap();
        assert_eq!(latest.nav_date.to_string(), "2026-08-21");
    }

    #[test]
    fn test_profile_upsert_keeps_nav_history() {
        let (_dir, store) = store();
        store.insert_nav(&nav("000001", "2026-08-20", 1.20)).unwrap();
        store.upsert_profile(&profile("000001", "Alpha")).unwrap();
        store.upsert_profile(&profile("000001", "Alpha Renamed")).unwrap();

        assert_eq!(store.profile("000001").unwrap().unwrap().name, "Alpha Renamed");
        assert_eq!(store.nav_history("000001", "2026-01-01".parse().unwrap()).unwrap().len(), 1);
    }

    #[test]
    fn test_latest_holdings_groups_by_report_period() {
        let (_dir, store) = store();
        let mk = |date: &str, sec: &str| HoldingRecord {
            fund_code: "000001".to_string(),
            report_date: date.parse().unwrap(),
            security_code: sec.to_string(),
            security_name: sec.to_string(),
            weight_pct: 5.0,
            shares: 0.0,
            market_value: 0.0,
            security_category: "stock".to_string(),
            created_at: Utc::now(),
        };
        store
            .insert_holdings(&[mk("2026-03-31", "600519"), mk("2026-06-30", "600519"), mk("2026-06-30", "000858")])
            .unwrap();

        let latest = store.latest_holdings("000001").unwrap();
        assert_eq!(latest.len(), 2);
        assert!(latest.iter().all(|h| h.report_date.to_string() == "2026-06-30"));
    }

    #[test]
    fn test_last_success_skips_error_entries() {
        let (_dir, store) = store();
        store.append_log(&UpdateLogEntry::error("daily_nav", "eastmoney timed out")).unwrap();
        assert!(store.last_success("daily_nav").unwrap().is_none());

        store.append_log(&UpdateLogEntry::success("daily_nav", "1 row via sina")).unwrap();
        assert!(store.last_success("daily_nav").unwrap().is_some());
    }

    #[test]
    fn test_prune_applies_retention_caps() {
        let (_dir, store) = store();
        let old_date = (Utc::now().date_naive() - Duration::days(400)).to_string();
        store.insert_nav(&nav("000001", &old_date, 1.00)).unwrap();
        store.insert_nav(&nav("000001", "2026-08-20", 1.20)).unwrap();

        for (i, date) in ["2025-09-30", "2025-12-31", "2026-03-31", "2026-06-30"].iter().enumerate() {
            store
                .insert_rating(&RatingRecord {
                    fund_code: "000001".to_string(),
                    rating_date: date.parse().unwrap(),
                    agency: "shanghai".to_string(),
                    rating_1y: Some(3 + (i as u8 % 2)),
                    rating_2y: None,
                    rating_3y: None,
                    created_at: Utc::now(),
                })
                .unwrap();
        }

        store
            .prune(RetentionPolicy {
                nav_days: 365,
                holding_periods: 4,
                rating_periods: 2,
            })
            .unwrap();

        let since = "2000-01-01".parse().unwrap();
        assert_eq!(store.nav_history("000001", since).unwrap().len(), 1);
        let latest = store.latest_rating("000001").unwrap().unwrap();
        assert_eq!(latest.rating_date.to_string(), "2026-06-30");
    }
}
