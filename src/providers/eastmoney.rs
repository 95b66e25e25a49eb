//! Eastmoney adapter: the primary source, serving every capability from its
//! JSON fund API.

use super::MarketDataSource;
use super::util::with_retry;
use crate::core::model::{
    FundCategory, FundListEntry, FundProfile, FundSize, HoldingRecord, NavObservation,
    RankingEntry, RatingRecord,
};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::error;

pub struct EastmoneySource {
    base_url: String,
    client: reqwest::Client,
}

impl EastmoneySource {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = with_retry(|| async { self.client.get(&url).send().await })
            .await
            .with_context(|| format!("Request to {path} failed"))?;

        let body = response.text().await.context("Failed to read response body")?;
        match serde_json::from_str(&body) {
            Ok(parsed) => Ok(parsed),
            Err(e) => {
                error!(error = ?e, path, response = %body, "Failed to parse response");
                Err(e).with_context(|| format!("Failed to parse response from {path}"))
            }
        }
    }

    fn parse_date(date_str: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            .with_context(|| format!("Failed to parse date: {date_str}"))
    }
}

#[derive(Debug, Deserialize)]
struct ListRow {
    code: String,
    name: String,
    category: String,
}

#[derive(Debug, Deserialize)]
struct NavRow {
    date: String,
    unit_nav: f64,
    #[serde(default)]
    accumulated_nav: f64,
    #[serde(default)]
    daily_growth_pct: f64,
}

impl NavRow {
    fn into_observation(self, fund_code: &str) -> Result<NavObservation> {
        Ok(NavObservation {
            fund_code: fund_code.to_string(),
            nav_date: EastmoneySource::parse_date(&self.date)?,
            unit_nav: self.unit_nav,
            accumulated_nav: self.accumulated_nav,
            daily_growth_pct: self.daily_growth_pct,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct RankingRow {
    code: String,
    name: String,
    rank: u32,
    #[serde(default)]
    return_1m: f64,
    #[serde(default)]
    return_3m: f64,
    #[serde(default)]
    return_6m: f64,
    #[serde(default)]
    return_1y: f64,
    /// Funds younger than three years report no 3y figure
    return_3y: Option<f64>,
    #[serde(default)]
    return_ytd: f64,
}

#[derive(Debug, Deserialize)]
struct HoldingsResponse {
    report_date: String,
    positions: Vec<PositionRow>,
}

#[derive(Debug, Deserialize)]
struct PositionRow {
    security_code: String,
    security_name: String,
    weight_pct: f64,
    #[serde(default)]
    shares: f64,
    #[serde(default)]
    market_value: f64,
    #[serde(default)]
    security_category: String,
}

#[derive(Debug, Deserialize)]
struct RatingRow {
    code: String,
    agency: String,
    date: String,
    rating_1y: Option<u8>,
    rating_2y: Option<u8>,
    rating_3y: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct OverviewResponse {
    code: String,
    name: String,
    category: String,
    company: Option<String>,
    manager: Option<String>,
    inception_date: Option<String>,
    net_asset_size: Option<f64>,
    share_size: Option<f64>,
}

#[async_trait]
impl MarketDataSource for EastmoneySource {
    fn name(&self) -> &'static str {
        "eastmoney"
    }

    async fn fund_list(&self) -> Result<Vec<FundListEntry>> {
        let rows: Vec<ListRow> = self.get_json("/api/funds").await?;
        Ok(rows
            .into_iter()
            .map(|r| FundListEntry {
                fund_code: r.code,
                fund_name: r.name,
                category: FundCategory::parse(&r.category),
            })
            .collect())
    }

    async fn daily_nav(&self, fund_code: &str) -> Result<NavObservation> {
        let row: NavRow = self
            .get_json(&format!("/api/funds/{fund_code}/nav/latest"))
            .await?;
        row.into_observation(fund_code)
    }

    async fn history(&self, fund_code: &str, days: u32) -> Result<Vec<NavObservation>> {
        let rows: Vec<NavRow> = self
            .get_json(&format!("/api/funds/{fund_code}/nav/history?days={days}"))
            .await?;
        rows.into_iter()
            .map(|r| r.into_observation(fund_code))
            .collect()
    }

    async fn ranking(&self, category: FundCategory) -> Result<Vec<RankingEntry>> {
        let url = format!("{}/api/rankings", self.base_url);
        let category_label = category.to_string();
        let response = with_retry(|| async {
            self.client
                .get(&url)
                .query(&[("category", category_label.as_str())])
                .send()
                .await
        })
        .await
        .context("Ranking request failed")?;

        let rows: Vec<RankingRow> = response
            .json()
            .await
            .context("Failed to parse ranking response")?;
        Ok(rows
            .into_iter()
            .map(|r| RankingEntry {
                fund_code: r.code,
                fund_name: r.name,
                rank: r.rank,
                return_1m: r.return_1m,
                return_3m: r.return_3m,
                return_6m: r.return_6m,
                return_1y: r.return_1y,
                return_3y: r.return_3y.unwrap_or(0.0),
                return_ytd: r.return_ytd,
            })
            .collect())
    }

    async fn holdings(&self, fund_code: &str) -> Result<Vec<HoldingRecord>> {
        let response: HoldingsResponse = self
            .get_json(&format!("/api/funds/{fund_code}/holdings"))
            .await?;
        let report_date = Self::parse_date(&response.report_date)?;
        Ok(response
            .positions
            .into_iter()
            .map(|p| HoldingRecord {
                fund_code: fund_code.to_string(),
                report_date,
                security_code: p.security_code,
                security_name: p.security_name,
                weight_pct: p.weight_pct,
                shares: p.shares,
                market_value: p.market_value,
                security_category: p.security_category,
                created_at: Utc::now(),
            })
            .collect())
    }

    async fn ratings(&self) -> Result<Vec<RatingRecord>> {
        let rows: Vec<RatingRow> = self.get_json("/api/ratings").await?;
        rows.into_iter()
            .map(|r| {
                Ok(RatingRecord {
                    fund_code: r.code,
                    rating_date: Self::parse_date(&r.date)?,
                    agency: r.agency,
                    rating_1y: r.rating_1y,
                    rating_2y: r.rating_2y,
                    rating_3y: r.rating_3y,
                    created_at: Utc::now(),
                })
            })
            .collect()
    }

    async fn basic_info(&self, fund_code: &str) -> Result<FundProfile> {
        let overview: OverviewResponse = self
            .get_json(&format!("/api/funds/{fund_code}/overview"))
            .await?;
        if overview.code != fund_code {
            return Err(anyhow!(
                "Overview response for {} carries code {}",
                fund_code,
                overview.code
            ));
        }
        Ok(FundProfile {
            code: overview.code,
            name: overview.name,
            category: FundCategory::parse(&overview.category),
            company: overview.company,
            manager: overview.manager,
            inception_date: match overview.inception_date.as_deref() {
                Some(d) if !d.is_empty() => Some(Self::parse_date(d)?),
                _ => None,
            },
            net_asset_size: overview.net_asset_size,
            share_size: overview.share_size,
            updated_at: Utc::now(),
        })
    }

    async fn fund_size(&self, fund_code: &str) -> Result<FundSize> {
        let overview: OverviewResponse = self
            .get_json(&format!("/api/funds/{fund_code}/overview"))
            .await?;
        Ok(FundSize {
            net_asset_size: overview.net_asset_size,
            share_size: overview.share_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_server(request_path: &str, body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(request_path))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_daily_nav_parsing() {
        let body = r#"{"date":"2026-08-21","unit_nav":1.2345,"accumulated_nav":2.3456,"daily_growth_pct":0.42}"#;
        let server = mock_server("/api/funds/000001/nav/latest", body).await;
        let source = EastmoneySource::new(&server.uri());

        let nav = source.daily_nav("000001").await.unwrap();
        assert_eq!(nav.fund_code, "000001");
        assert_eq!(nav.nav_date.to_string(), "2026-08-21");
        assert_eq!(nav.unit_nav, 1.2345);
        assert_eq!(nav.accumulated_nav, 2.3456);
        assert_eq!(nav.daily_growth_pct, 0.42);
    }

    #[tokio::test]
    async fn test_history_parsing() {
        let body = r#"[
            {"date":"2026-08-20","unit_nav":1.22,"accumulated_nav":2.33,"daily_growth_pct":-0.1},
            {"date":"2026-08-21","unit_nav":1.23,"accumulated_nav":2.34,"daily_growth_pct":0.8}
        ]"#;
        let server = mock_server("/api/funds/000001/nav/history", body).await;
        let source = EastmoneySource::new(&server.uri());

        let history = source.history("000001", 365).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].nav_date.to_string(), "2026-08-20");
        assert_eq!(history[1].daily_growth_pct, 0.8);
    }

    #[tokio::test]
    async fn test_ranking_missing_3y_becomes_zero() {
        let body = r#"[
            {"code":"000001","name":"Alpha Growth","rank":1,"return_1m":2.0,"return_3m":5.0,
             "return_6m":9.0,"return_1y":15.0,"return_3y":null,"return_ytd":10.0}
        ]"#;
        let server = mock_server("/api/rankings", body).await;
        let source = EastmoneySource::new(&server.uri());

        let ranking = source.ranking(FundCategory::Equity).await.unwrap();
        assert_eq!(ranking.len(), 1);
        assert_eq!(ranking[0].return_3y, 0.0);
        assert_eq!(ranking[0].return_1y, 15.0);
    }

    #[tokio::test]
    async fn test_holdings_parsing() {
        let body = r#"{"report_date":"2026-06-30","positions":[
            {"security_code":"600519","security_name":"Kweichow Moutai","weight_pct":9.5,
             "shares":120000,"market_value":2.1e8,"security_category":"Consumer"}
        ]}"#;
        let server = mock_server("/api/funds/000001/holdings", body).await;
        let source = EastmoneySource::new(&server.uri());

        let holdings = source.holdings("000001").await.unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].fund_code, "000001");
        assert_eq!(holdings[0].report_date.to_string(), "2026-06-30");
        assert_eq!(holdings[0].weight_pct, 9.5);
    }

    #[tokio::test]
    async fn test_ratings_absent_horizon_is_none() {
        let body = r#"[
            {"code":"000001","agency":"composite","date":"2026-06-30",
             "rating_1y":4,"rating_2y":null,"rating_3y":5}
        ]"#;
        let server = mock_server("/api/ratings", body).await;
        let source = EastmoneySource::new(&server.uri());

        let ratings = source.ratings().await.unwrap();
        assert_eq!(ratings[0].rating_1y, Some(4));
        assert_eq!(ratings[0].rating_2y, None);
        assert_eq!(ratings[0].rating_3y, Some(5));
    }

    #[tokio::test]
    async fn test_basic_info_parsing() {
        let body = r#"{"code":"000001","name":"Alpha Growth Hybrid","category":"Hybrid",
            "company":"Alpha Asset Management","manager":"J. Wei",
            "inception_date":"2015-04-01","net_asset_size":2.5e9,"share_size":2.1e9}"#;
        let server = mock_server("/api/funds/000001/overview", body).await;
        let source = EastmoneySource::new(&server.uri());

        let profile = source.basic_info("000001").await.unwrap();
        assert_eq!(profile.code, "000001");
        assert_eq!(profile.category, FundCategory::Hybrid);
        assert_eq!(profile.company.as_deref(), Some("Alpha Asset Management"));
        assert_eq!(profile.inception_date.unwrap().to_string(), "2015-04-01");
        assert_eq!(profile.net_asset_size, Some(2.5e9));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_error() {
        let server = mock_server("/api/funds/000001/nav/latest", "<html>oops</html>").await;
        let source = EastmoneySource::new(&server.uri());
        assert!(source.daily_nav("000001").await.is_err());
    }
}
