//! Ordered fallback over the provider adapters.
//!
//! Each capability carries its own adapter chain. Sources are tried in
//! order; the first well-formed, non-empty result wins. Failures of any
//! kind (transport error, malformed payload, empty result) are logged to
//! the update audit trail and the chain moves on. A fully exhausted chain
//! is a typed signal, not a panic; the service layer turns it into
//! staleness or emptiness.

use crate::core::config::ProvidersConfig;
use crate::core::model::{
    FundCategory, FundListEntry, FundProfile, FundSize, HoldingRecord, NavObservation,
    RankingEntry, RatingRecord, UpdateLogEntry,
};
use crate::providers::eastmoney::EastmoneySource;
use crate::providers::sina::SinaSource;
use crate::providers::tushare::TushareSource;
use crate::providers::{Capability, MarketDataSource};
use crate::store::CacheStore;
use anyhow::Result;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("all sources exhausted for {capability}")]
    SourceExhausted { capability: Capability },
}

type Source = Arc<dyn MarketDataSource>;

pub struct DataSourceGateway {
    store: Arc<CacheStore>,
    chains: HashMap<Capability, Vec<Source>>,
}

impl DataSourceGateway {
    pub fn new(store: Arc<CacheStore>, config: &ProvidersConfig) -> Self {
        let eastmoney: Source = Arc::new(EastmoneySource::new(&config.eastmoney_base_url));
        let sina: Source = Arc::new(SinaSource::new(&config.sina_base_url));
        let tushare: Option<Source> = config
            .resolved_tushare_token()
            .map(|token| Arc::new(TushareSource::new(&config.tushare_base_url, &token)) as Source);
        Self::with_sources(store, eastmoney, sina, tushare)
    }

    /// Builds the per-capability chains. The NAV capabilities route through
    /// the quote provider as a second leg; holdings and ranking fall back to
    /// the token-gated provider when a token is configured.
    pub fn with_sources(
        store: Arc<CacheStore>,
        eastmoney: Source,
        sina: Source,
        tushare: Option<Source>,
    ) -> Self {
        let mut chains: HashMap<Capability, Vec<Source>> = HashMap::new();
        chains.insert(Capability::FundList, vec![eastmoney.clone()]);
        chains.insert(
            Capability::DailyNav,
            vec![eastmoney.clone(), sina.clone()],
        );
        chains.insert(Capability::History, vec![eastmoney.clone(), sina]);

        let mut ranking = vec![eastmoney.clone()];
        let mut holdings = vec![eastmoney.clone()];
        if let Some(tushare) = tushare {
            ranking.push(tushare.clone());
            holdings.push(tushare);
        }
        chains.insert(Capability::Ranking, ranking);
        chains.insert(Capability::Holdings, holdings);
        chains.insert(Capability::Rating, vec![eastmoney.clone()]);
        chains.insert(Capability::BasicInfo, vec![eastmoney.clone()]);
        chains.insert(Capability::Size, vec![eastmoney]);

        Self { store, chains }
    }

    fn log_failure(&self, capability: Capability, source: &str, reason: &str) {
        warn!("{source} failed serving {capability}: {reason}");
        let entry = UpdateLogEntry::error(capability.to_string(), format!("{source}: {reason}"));
        if let Err(e) = self.store.append_log(&entry) {
            warn!("Failed to record update log entry: {e}");
        }
    }

    async fn resolve<T>(
        &self,
        capability: Capability,
        call: impl Fn(Source) -> BoxFuture<'static, Result<T>>,
        is_empty: impl Fn(&T) -> bool,
    ) -> Result<T, GatewayError> {
        let chain = self.chains.get(&capability).map(Vec::as_slice).unwrap_or(&[]);
        for source in chain {
            let name = source.name();
            match call(source.clone()).await {
                Ok(value) if !is_empty(&value) => {
                    debug!("{name} served {capability}");
                    return Ok(value);
                }
                Ok(_) => self.log_failure(capability, name, "empty result"),
                Err(e) => self.log_failure(capability, name, &format!("{e:#}")),
            }
        }
        Err(GatewayError::SourceExhausted { capability })
    }

    pub async fn fund_list(&self) -> Result<Vec<FundListEntry>, GatewayError> {
        self.resolve(
            Capability::FundList,
            |s| Box::pin(async move { s.fund_list().await }),
            Vec::is_empty,
        )
        .await
    }

    pub async fn daily_nav(&self, fund_code: &str) -> Result<NavObservation, GatewayError> {
        let code = fund_code.to_string();
        self.resolve(
            Capability::DailyNav,
            move |s| {
                let code = code.clone();
                Box::pin(async move { s.daily_nav(&code).await })
            },
            |_| false,
        )
        .await
    }

    pub async fn history(
        &self,
        fund_code: &str,
        days: u32,
    ) -> Result<Vec<NavObservation>, GatewayError> {
        let code = fund_code.to_string();
        self.resolve(
            Capability::History,
            move |s| {
                let code = code.clone();
                Box::pin(async move { s.history(&code, days).await })
            },
            Vec::is_empty,
        )
        .await
    }

    pub async fn ranking(
        &self,
        category: FundCategory,
    ) -> Result<Vec<RankingEntry>, GatewayError> {
        self.resolve(
            Capability::Ranking,
            move |s| Box::pin(async move { s.ranking(category).await }),
            Vec::is_empty,
        )
        .await
    }

    pub async fn holdings(&self, fund_code: &str) -> Result<Vec<HoldingRecord>, GatewayError> {
        let code = fund_code.to_string();
        self.resolve(
            Capability::Holdings,
            move |s| {
                let code = code.clone();
                Box::pin(async move { s.holdings(&code).await })
            },
            Vec::is_empty,
        )
        .await
    }

    pub async fn ratings(&self) -> Result<Vec<RatingRecord>, GatewayError> {
        self.resolve(
            Capability::Rating,
            |s| Box::pin(async move { s.ratings().await }),
            Vec::is_empty,
        )
        .await
    }

    pub async fn basic_info(&self, fund_code: &str) -> Result<FundProfile, GatewayError> {
        let code = fund_code.to_string();
        self.resolve(
            Capability::BasicInfo,
            move |s| {
                let code = code.clone();
                Box::pin(async move { s.basic_info(&code).await })
            },
            |_| false,
        )
        .await
    }

    pub async fn fund_size(&self, fund_code: &str) -> Result<FundSize, GatewayError> {
        let code = fund_code.to_string();
        self.resolve(
            Capability::Size,
            move |s| {
                let code = code.clone();
                Box::pin(async move { s.fund_size(&code).await })
            },
            |_| false,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::UpdateStatus;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::Utc;
    use tempfile::TempDir;

    /// Stub adapter: serves daily NAV either as a fixed value, an error, or
    /// nothing at all depending on construction.
    struct StubSource {
        name: &'static str,
        nav: Option<f64>,
    }

    #[async_trait]
    impl MarketDataSource for StubSource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn daily_nav(&self, fund_code: &str) -> Result<NavObservation> {
            match self.nav {
                Some(unit_nav) => Ok(NavObservation {
                    fund_code: fund_code.to_string(),
                    nav_date: Utc::now().date_naive(),
                    unit_nav,
                    accumulated_nav: unit_nav,
                    daily_growth_pct: 0.0,
                    created_at: Utc::now(),
                }),
                None => Err(anyhow!("{} is down", self.name)),
            }
        }

        async fn history(&self, _fund_code: &str, _days: u32) -> Result<Vec<NavObservation>> {
            // well-formed but empty, which the chain must treat as a miss
            Ok(Vec::new())
        }
    }

    fn gateway(store: Arc<CacheStore>, primary: StubSource, secondary: StubSource) -> DataSourceGateway {
        DataSourceGateway::with_sources(store, Arc::new(primary), Arc::new(secondary), None)
    }

    #[tokio::test]
    async fn test_first_source_short_circuits() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(CacheStore::open(dir.path()).unwrap());
        let gw = gateway(
            store,
            StubSource { name: "primary", nav: Some(1.11) },
            StubSource { name: "secondary", nav: Some(9.99) },
        );

        let nav = gw.daily_nav("000001").await.unwrap();
        assert_eq!(nav.unit_nav, 1.11);
    }

    #[tokio::test]
    async fn test_failure_falls_through_and_is_logged() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(CacheStore::open(dir.path()).unwrap());
        let gw = gateway(
            store.clone(),
            StubSource { name: "primary", nav: None },
            StubSource { name: "secondary", nav: Some(2.22) },
        );

        let nav = gw.daily_nav("000001").await.unwrap();
        assert_eq!(nav.unit_nav, 2.22);

        // the primary's failure left an error entry in the audit trail
        let entries = store.log_entries("daily_nav").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, UpdateStatus::Error);
        assert!(entries[0].message.contains("primary"));
    }

    #[tokio::test]
    async fn test_exhaustion_is_typed() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(CacheStore::open(dir.path()).unwrap());
        let gw = gateway(
            store,
            StubSource { name: "primary", nav: None },
            StubSource { name: "secondary", nav: None },
        );

        let err = gw.daily_nav("000001").await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::SourceExhausted { capability: Capability::DailyNav }
        ));
    }

    #[tokio::test]
    async fn test_empty_result_counts_as_failure() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(CacheStore::open(dir.path()).unwrap());
        let gw = gateway(
            store,
            StubSource { name: "primary", nav: Some(1.0) },
            StubSource { name: "secondary", nav: Some(1.0) },
        );

        let err = gw.history("000001", 365).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::SourceExhausted { capability: Capability::History }
        ));
    }
}
