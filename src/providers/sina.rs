//! Sina quote adapter: the secondary source for daily NAV and history.
//!
//! The quote endpoint answers with a JavaScript variable assignment rather
//! than JSON; history comes as yearly CSV files. Both are normalized here.

use super::MarketDataSource;
use super::util::with_retry;
use crate::core::model::NavObservation;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use tracing::debug;

pub struct SinaSource {
    base_url: String,
    client: reqwest::Client,
}

impl SinaSource {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Extracts the quoted payload of `var hq_str_fund_XXX="...";`.
    fn quote_payload(body: &str) -> Option<&str> {
        let start = body.find("=\"")? + 2;
        let end = body[start..].find('"')? + start;
        Some(&body[start..end])
    }

    /// Quote fields: name, unit nav, accumulated nav, previous nav, date.
    fn parse_quote(fund_code: &str, body: &str) -> Result<NavObservation> {
        let payload =
            Self::quote_payload(body).ok_or_else(|| anyhow!("Quote payload not found"))?;
        let fields: Vec<&str> = payload.split(',').collect();
        if fields.len() < 5 {
            return Err(anyhow!("Quote payload has {} fields, need 5", fields.len()));
        }

        let unit_nav: f64 = fields[1].parse().context("Invalid unit nav")?;
        let previous_nav: f64 = fields[3].parse().unwrap_or(0.0);
        let nav_date = NaiveDate::parse_from_str(fields[4], "%Y-%m-%d")
            .with_context(|| format!("Invalid quote date: {}", fields[4]))?;
        let daily_growth_pct = if previous_nav > 0.0 {
            (unit_nav - previous_nav) / previous_nav * 100.0
        } else {
            0.0
        };

        Ok(NavObservation {
            fund_code: fund_code.to_string(),
            nav_date,
            unit_nav,
            accumulated_nav: fields[2].parse().unwrap_or(0.0),
            daily_growth_pct,
            created_at: Utc::now(),
        })
    }

    /// CSV columns: date, unit nav, accumulated nav, three unused quote
    /// columns, daily growth. Malformed lines are skipped, not fatal.
    fn parse_history_csv(fund_code: &str, body: &str) -> Vec<NavObservation> {
        body.lines()
            .skip(1)
            .filter_map(|line| {
                let parts: Vec<&str> = line.split(',').collect();
                if parts.len() < 7 {
                    return None;
                }
                let nav_date = NaiveDate::parse_from_str(parts[0], "%Y-%m-%d").ok()?;
                let unit_nav: f64 = parts[1].parse().ok()?;
                Some(NavObservation {
                    fund_code: fund_code.to_string(),
                    nav_date,
                    unit_nav,
                    accumulated_nav: parts[2].parse().unwrap_or(0.0),
                    daily_growth_pct: parts[6].parse().unwrap_or(0.0),
                    created_at: Utc::now(),
                })
            })
            .collect()
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        let response = with_retry(|| async { self.client.get(&url).send().await })
            .await
            .with_context(|| format!("Request to {path} failed"))?;
        response.text().await.context("Failed to read response body")
    }
}

#[async_trait]
impl MarketDataSource for SinaSource {
    fn name(&self) -> &'static str {
        "sina"
    }

    async fn daily_nav(&self, fund_code: &str) -> Result<NavObservation> {
        let body = self.get_text(&format!("/fund={fund_code}")).await?;
        Self::parse_quote(fund_code, &body)
    }

    async fn history(&self, fund_code: &str, days: u32) -> Result<Vec<NavObservation>> {
        let today = Utc::now().date_naive();
        let cutoff = today - Duration::days(days as i64);
        let years = cutoff.year()..=today.year();

        let mut observations = Vec::new();
        for year in years {
            let path = format!("/fundkline/{fund_code}_{year}.csv");
            match self.get_text(&path).await {
                Ok(body) => observations.extend(Self::parse_history_csv(fund_code, &body)),
                // A missing year file is common for young funds
                Err(e) => debug!("Sina history fetch for {year} failed: {e}"),
            }
        }

        observations.retain(|o| o.nav_date >= cutoff);
        if observations.is_empty() {
            return Err(anyhow!("No history rows for {fund_code}"));
        }
        Ok(observations)
    }
}
