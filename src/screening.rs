//! Candidate screening for one risk tier.
//!
//! Rankings provide the candidate pool; cached profiles, ratings and derived
//! metrics provide the filter inputs. Filters run in a fixed order and a
//! missing value never rejects a fund: a candidate with no rating or no
//! cached history passes those gates and is judged on what is known. An
//! empty result is returned as-is, never relaxed.

use crate::core::metrics::RiskMetrics;
use crate::core::model::{FundCategory, RankingEntry};
use crate::core::policy::RiskTier;
use crate::service::FundDataService;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Screening output cap.
const MAX_CANDIDATES: usize = 50;

/// One screened fund with everything the recommendation context needs.
#[derive(Debug, Clone)]
pub struct FundCandidate {
    pub code: String,
    pub name: String,
    pub category: FundCategory,
    pub rank: u32,
    pub return_1m: f64,
    pub return_3m: f64,
    pub return_6m: f64,
    pub return_1y: f64,
    pub return_3y: f64,
    pub return_ytd: f64,
    pub rating: Option<u8>,
    pub metrics: RiskMetrics,
    pub net_asset_size: Option<f64>,
    pub company: Option<String>,
    pub manager: Option<String>,
}

pub struct ScreeningEngine {
    service: Arc<FundDataService>,
}

impl ScreeningEngine {
    pub fn new(service: Arc<FundDataService>) -> Self {
        Self { service }
    }

    /// Screens the universe for one tier. `category_hint` narrows the pull to
    /// a single category when it sits inside the tier's allow list; a hint
    /// outside the list is ignored rather than honored.
    pub async fn screen(
        &self,
        tier: RiskTier,
        category_hint: Option<FundCategory>,
    ) -> Result<Vec<FundCandidate>> {
        let policy = tier.policy();
        let categories: Vec<FundCategory> = match category_hint {
            Some(hint) if tier.allows(hint) => vec![hint],
            _ => policy.allowed_categories.to_vec(),
        };

        let mut pool: HashMap<String, (FundCategory, RankingEntry)> = HashMap::new();
        for category in categories {
            for entry in self.service.ranking(category).await {
                pool.entry(entry.fund_code.clone()).or_insert((category, entry));
            }
        }
        if pool.is_empty() {
            info!("No ranking candidates for {tier}");
            return Ok(Vec::new());
        }

        let codes: Vec<String> = pool.keys().cloned().collect();
        let (profiles, ratings, metrics) = tokio::join!(
            self.service.cached_profiles(&codes),
            self.service.cached_ratings(&codes),
            self.service.cached_metrics(&codes),
        );
        let profiles = profiles?;
        let ratings = ratings?;
        let mut metrics = metrics?;

        let mut candidates: Vec<FundCandidate> = Vec::new();
        for (code, (pull_category, entry)) in pool {
            let profile = profiles.get(&code);
            let rating = ratings.get(&code).and_then(|r| {
                r.rating_3y.or(r.rating_2y).or(r.rating_1y)
            });
            let fund_metrics = metrics.remove(&code).unwrap_or_default();

            // gates in fixed order; each comment names the rejection
            if entry.return_1y <= 0.0 {
                continue;
            }
            if let Some(dd) = fund_metrics.max_drawdown_pct {
                if dd.abs() >= policy.max_drawdown_pct {
                    continue;
                }
            }
            if let Some(vol) = fund_metrics.volatility_pct {
                if vol >= policy.max_volatility_pct {
                    continue;
                }
            }
            if let (Some(floor), Some(r)) = (policy.min_rating, rating) {
                if r < floor {
                    continue;
                }
            }
            let size = profile.and_then(|p| p.net_asset_size);
            if let Some(size) = size {
                let (lo, hi) = policy.size_band;
                if size < lo || size > hi {
                    continue;
                }
            }
            // a cached profile may reclassify the fund outside the tier;
            // without a profile the pull category stands, which is allowed
            // by construction
            let category = match profile {
                Some(p) if p.category != FundCategory::Other => p.category,
                _ => pull_category,
            };
            if !tier.allows(category) {
                continue;
            }

            candidates.push(FundCandidate {
                code: code.clone(),
                name: entry.fund_name,
                category,
                rank: entry.rank,
                return_1m: entry.return_1m,
                return_3m: entry.return_3m,
                return_6m: entry.return_6m,
                return_1y: entry.return_1y,
                return_3y: entry.return_3y,
                return_ytd: entry.return_ytd,
                rating,
                metrics: fund_metrics,
                net_asset_size: size,
                company: profile.and_then(|p| p.company.clone()),
                manager: profile.and_then(|p| p.manager.clone()),
            });
        }

        candidates.sort_by(|a, b| b.return_1y.total_cmp(&a.return_1y));
        candidates.truncate(MAX_CANDIDATES);
        debug!("{} candidates survived screening for {tier}", candidates.len());

        self.prefetch_sizes(&candidates);
        Ok(candidates)
    }

    /// Fire-and-forget size refresh for survivors missing it. The results
    /// land in the cache for the next screening round; failures are logged
    /// by the gateway and swallowed here.
    fn prefetch_sizes(&self, candidates: &[FundCandidate]) {
        let missing: Vec<String> = candidates
            .iter()
            .filter(|c| c.net_asset_size.is_none())
            .map(|c| c.code.clone())
            .collect();
        if missing.is_empty() {
            return;
        }
        let service = self.service.clone();
        tokio::spawn(async move {
            for code in missing {
                if let Err(e) = service.fund_size(&code).await {
                    debug!("Size prefetch for {code} failed: {e}");
                }
            }
        });
    }
}
