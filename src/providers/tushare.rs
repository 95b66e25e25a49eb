//! Tushare adapter: token-authenticated fallback for holdings and rankings.
//!
//! Every call is a POST to one endpoint with the api name in the body; rows
//! come back as a `fields` array plus positional `items`, so each response is
//! re-keyed by column name before mapping into `core::model` entities.

use super::MarketDataSource;
use super::util::with_retry;
use crate::core::model::{FundCategory, HoldingRecord, RankingEntry};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::error;

pub struct TushareSource {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ApiResponse {
    code: i64,
    msg: Option<String>,
    data: Option<ApiData>,
}

#[derive(Deserialize)]
struct ApiData {
    fields: Vec<String>,
    items: Vec<Vec<Value>>,
}

/// One response row with values addressable by column name.
struct Row<'a> {
    columns: &'a HashMap<String, usize>,
    values: &'a [Value],
}

impl Row<'_> {
    fn str(&self, name: &str) -> Option<&str> {
        self.values.get(*self.columns.get(name)?)?.as_str()
    }

    fn f64(&self, name: &str) -> Option<f64> {
        self.values.get(*self.columns.get(name)?)?.as_f64()
    }

    fn date(&self, name: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.str(name)?, "%Y%m%d").ok()
    }
}

impl TushareSource {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, api_name: &str, params: Value) -> Result<ApiData> {
        let body = json!({
            "api_name": api_name,
            "token": self.token,
            "params": params,
        });
        let response = with_retry(|| async {
            self.client.post(&self.base_url).json(&body).send().await
        })
        .await
        .with_context(|| format!("Tushare call {api_name} failed"))?;

        let parsed: ApiResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse tushare {api_name} response"))?;
        if parsed.code != 0 {
            let msg = parsed.msg.unwrap_or_default();
            error!("Tushare {api_name} returned code {}: {msg}", parsed.code);
            return Err(anyhow!("Tushare {api_name} error: {msg}"));
        }
        parsed
            .data
            .ok_or_else(|| anyhow!("Tushare {api_name} response has no data"))
    }
}

fn map_rows<T>(data: &ApiData, mut map: impl FnMut(&Row<'_>) -> Option<T>) -> Vec<T> {
    let columns: HashMap<String, usize> = data
        .fields
        .iter()
        .enumerate()
        .map(|(i, f)| (f.clone(), i))
        .collect();
    data.items
        .iter()
        .filter_map(|values| {
            map(&Row {
                columns: &columns,
                values,
            })
        })
        .collect()
}

#[async_trait]
impl MarketDataSource for TushareSource {
    fn name(&self) -> &'static str {
        "tushare"
    }

    async fn ranking(&self, category: FundCategory) -> Result<Vec<RankingEntry>> {
        let data = self
            .call("fund_ranking", json!({ "category": category.to_string() }))
            .await?;
        let mut rank = 0u32;
        Ok(map_rows(&data, |row| {
            rank += 1;
            Some(RankingEntry {
                fund_code: row.str("ts_code")?.trim_end_matches(".OF").to_string(),
                fund_name: row.str("name").unwrap_or_default().to_string(),
                rank,
                return_1m: row.f64("return_1m").unwrap_or(0.0),
                return_3m: row.f64("return_3m").unwrap_or(0.0),
                return_6m: row.f64("return_6m").unwrap_or(0.0),
                return_1y: row.f64("return_1y").unwrap_or(0.0),
                return_3y: row.f64("return_3y").unwrap_or(0.0),
                return_ytd: row.f64("return_ytd").unwrap_or(0.0),
            })
        }))
    }

    async fn holdings(&self, fund_code: &str) -> Result<Vec<HoldingRecord>> {
        let data = self
            .call(
                "fund_portfolio",
                json!({ "ts_code": format!("{fund_code}.OF") }),
            )
            .await?;
        let records = map_rows(&data, |row| {
            Some(HoldingRecord {
                fund_code: fund_code.to_string(),
                report_date: row.date("end_date")?,
                security_code: row.str("symbol")?.to_string(),
                security_name: row.str("stk_name").unwrap_or_default().to_string(),
                weight_pct: row.f64("stk_mkv_ratio").unwrap_or(0.0),
                shares: row.f64("amount").unwrap_or(0.0),
                market_value: row.f64("mkv").unwrap_or(0.0),
                security_category: "stock".to_string(),
                created_at: Utc::now(),
            })
        });
        // The portfolio table spans several report periods; keep the newest.
        let latest = records.iter().map(|r| r.report_date).max();
        match latest {
            Some(date) => Ok(records
                .into_iter()
                .filter(|r| r.report_date == date)
                .collect()),
            None => Ok(Vec::new()),
        }
    }
}
