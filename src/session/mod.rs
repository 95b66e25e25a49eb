//! Conversational recommendation pipeline.
//!
//! One session walks strictly forward through requirement collection, risk
//! assessment, recommendation and validation, then answers follow-up
//! questions. All accumulated state lives on the session; `reset` discards
//! it and returns to the first stage.

pub mod agents;
pub mod oracle;
pub mod validator;

use crate::core::policy::RiskTier;
use crate::screening::{FundCandidate, ScreeningEngine};
use crate::service::FundDataService;
use agents::{RequirementCollector, RiskAssessor, StageReply};
use anyhow::Result;
use oracle::{ChatMessage, OracleRequest, ReasoningOracle};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info};
use validator::{RecommendationValidator, ReviewLoop, ReviewVerdict};

/// Pipeline stages, strictly forward. Recommendation and Validation are
/// transient: they are only observable while the pipeline is generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Requirement,
    Risk,
    Recommendation,
    Validation,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizon {
    Short,
    Medium,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Goal {
    Preservation,
    Income,
    Growth,
    AggressiveGrowth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Experience {
    Novice,
    Intermediate,
    Experienced,
}

/// What the requirement stage learned about the investor. Fields stay `None`
/// when the conversation never surfaced them.
#[derive(Debug, Clone, Default)]
pub struct UserProfile {
    pub amount: Option<f64>,
    pub horizon: Option<Horizon>,
    pub goal: Option<Goal>,
    pub experience: Option<Experience>,
}

impl UserProfile {
    /// Fallback tier when the risk stage completes without naming one.
    /// Novice investors are capped at balanced regardless of stated goal.
    pub fn default_tier(&self) -> RiskTier {
        let by_goal = match self.goal {
            Some(Goal::Preservation) => RiskTier::Conservative,
            Some(Goal::Income) | None => RiskTier::Balanced,
            Some(Goal::Growth) => RiskTier::Growth,
            Some(Goal::AggressiveGrowth) => RiskTier::Aggressive,
        };
        if self.experience == Some(Experience::Novice) {
            by_goal.min(RiskTier::Balanced)
        } else {
            by_goal
        }
    }

    fn summary(&self) -> String {
        let mut out = String::new();
        if let Some(amount) = self.amount {
            let _ = writeln!(out, "- investment amount: {amount:.0}");
        }
        if let Some(horizon) = self.horizon {
            let _ = writeln!(out, "- horizon: {horizon:?}");
        }
        if let Some(goal) = self.goal {
            let _ = writeln!(out, "- goal: {goal:?}");
        }
        if let Some(experience) = self.experience {
            let _ = writeln!(out, "- experience: {experience:?}");
        }
        if out.is_empty() {
            out.push_str("- nothing stated\n");
        }
        out
    }
}

/// How many screened funds are surfaced to the oracle.
const CONTEXT_FUNDS: usize = 10;

pub struct Session {
    oracle: Arc<dyn ReasoningOracle>,
    screening: ScreeningEngine,
    stage: Stage,
    transcript: Vec<ChatMessage>,
    profile: UserProfile,
    tier: Option<RiskTier>,
    candidates: Vec<FundCandidate>,
    recommendation: Option<String>,
    score: Option<u32>,
}

impl Session {
    pub fn new(oracle: Arc<dyn ReasoningOracle>, service: Arc<FundDataService>) -> Self {
        Self {
            oracle,
            screening: ScreeningEngine::new(service),
            stage: Stage::Requirement,
            transcript: Vec::new(),
            profile: UserProfile::default(),
            tier: None,
            candidates: Vec::new(),
            recommendation: None,
            score: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn tier(&self) -> Option<RiskTier> {
        self.tier
    }

    pub fn validation_score(&self) -> Option<u32> {
        self.score
    }

    pub fn greeting() -> &'static str {
        "Hello! I help pick publicly offered funds that match your goals. \
         To start: how much are you planning to invest, and for how long?"
    }

    /// Discards everything and returns to the requirement stage.
    pub fn reset(&mut self) {
        info!("Session reset");
        self.stage = Stage::Requirement;
        self.transcript.clear();
        self.profile = UserProfile::default();
        self.tier = None;
        self.candidates.clear();
        self.recommendation = None;
        self.score = None;
    }

    /// Feeds one user turn into the pipeline and returns the reply to show.
    pub async fn handle(&mut self, input: &str) -> Result<String> {
        match self.stage {
            Stage::Requirement => {
                self.transcript.push(ChatMessage::user(input));
                match RequirementCollector::step(self.oracle.as_ref(), &self.transcript).await? {
                    StageReply::InProgress { reply } => {
                        self.transcript.push(ChatMessage::assistant(&reply));
                        Ok(reply)
                    }
                    StageReply::Complete { value, reply } => {
                        self.profile = value;
                        self.transcript.push(ChatMessage::assistant(&reply));
                        self.stage = Stage::Risk;
                        debug!("Requirement stage complete");
                        Ok(format!(
                            "{reply}\n\nNext, a few questions about your risk tolerance. \
                             How would you react to a 10% drop in value?"
                        ))
                    }
                }
            }
            Stage::Risk => {
                self.transcript.push(ChatMessage::user(input));
                match RiskAssessor::step(self.oracle.as_ref(), &self.transcript, &self.profile)
                    .await?
                {
                    StageReply::InProgress { reply } => {
                        self.transcript.push(ChatMessage::assistant(&reply));
                        Ok(reply)
                    }
                    StageReply::Complete { value, reply } => {
                        self.transcript.push(ChatMessage::assistant(&reply));
                        self.tier = Some(value);
                        debug!("Risk stage complete: {value}");
                        let recommendation = self.recommend(value).await?;
                        Ok(format!("{reply}\n\n{recommendation}"))
                    }
                }
            }
            // transient while generating; user input cannot arrive here
            Stage::Recommendation | Stage::Validation | Stage::Complete => {
                if input.trim().eq_ignore_ascii_case("restart") {
                    self.reset();
                    return Ok(Self::greeting().to_string());
                }
                self.follow_up(input).await
            }
        }
    }

    /// Screens candidates, generates the recommendation and runs it through
    /// the bounded validation loop. Always produces an answer.
    async fn recommend(&mut self, tier: RiskTier) -> Result<String> {
        self.stage = Stage::Recommendation;
        let candidates = self.screening.screen(tier, None).await?;
        if candidates.is_empty() {
            info!("No candidates for {tier}; completing without a recommendation");
            self.stage = Stage::Complete;
            return Ok(format!(
                "No fund currently clears the screening bar for a {tier} portfolio. \
                 Say \"restart\" to begin again with different requirements."
            ));
        }
        self.candidates = candidates;

        let context = recommendation_context(&self.profile, tier, &self.candidates);
        let mut messages = vec![ChatMessage::user(context)];
        let mut review = ReviewLoop::default();
        loop {
            self.stage = Stage::Recommendation;
            let draft = self
                .oracle
                .complete(OracleRequest {
                    system: recommendation_prompt(tier),
                    messages: messages.clone(),
                })
                .await?;

            self.stage = Stage::Validation;
            let result = RecommendationValidator::validate(&draft, tier, &self.candidates);
            match review.record(&draft, &result) {
                ReviewVerdict::Accepted { text, score } => {
                    self.score = Some(score);
                    let annotated = format!("{text}\n\nValidation score: {score}/100");
                    self.recommendation = Some(annotated.clone());
                    self.stage = Stage::Complete;
                    return Ok(annotated);
                }
                ReviewVerdict::Retry { feedback } => {
                    debug!("Regenerating after validation failure (attempt {})", review.attempts());
                    messages.push(ChatMessage::assistant(&draft));
                    messages.push(ChatMessage::user(feedback));
                }
            }
        }
    }

    /// Follow-up Q&A against the stored profile and recommendation.
    async fn follow_up(&mut self, input: &str) -> Result<String> {
        let mut system = String::from(
            "You are a fund investment advisor answering follow-up questions \
             about a recommendation already delivered. Stay consistent with \
             it and do not recommend new funds.\n\nInvestor profile:\n",
        );
        system.push_str(&self.profile.summary());
        if let Some(tier) = self.tier {
            let _ = writeln!(system, "- risk tier: {tier}");
        }
        if let Some(recommendation) = &self.recommendation {
            let _ = write!(system, "\nThe delivered recommendation:\n{recommendation}");
        }

        self.transcript.push(ChatMessage::user(input));
        let reply = self
            .oracle
            .complete(OracleRequest {
                system,
                messages: self.transcript.clone(),
            })
            .await?;
        self.transcript.push(ChatMessage::assistant(&reply));
        Ok(reply)
    }
}

fn recommendation_prompt(tier: RiskTier) -> String {
    format!(
        "You are a fund investment advisor composing a portfolio for a {tier} \
         investor. Use only the funds listed in the context. Reply in exactly \
         this structure:\n\
         [ANALYSIS]your reading of the investor profile[/ANALYSIS]\n\
         [FUND_EVALUATION]comparison of the candidate funds[/FUND_EVALUATION]\n\
         [RECOMMENDATION]\n\
         2 to 4 blocks of:\n\
         [FUND]\ncode: <code>\nname: <name>\nallocation: <percent>\n\
         rationale: <why>\nrisk_warning: <specific risk>\nconfidence: <high|medium|low>\n[/FUND]\n\
         [/RECOMMENDATION]\n\
         [DISCLAIMER]investment risk disclaimer[/DISCLAIMER]\n\
         Allocations must sum to 100."
    )
}

/// Per-fund multi-dimension summary handed to the oracle.
fn recommendation_context(
    profile: &UserProfile,
    tier: RiskTier,
    candidates: &[FundCandidate],
) -> String {
    let mut out = String::from("Investor profile:\n");
    out.push_str(&profile.summary());
    let _ = writeln!(out, "- risk tier: {tier}\n\nScreened candidate funds:");

    for fund in candidates.iter().take(CONTEXT_FUNDS) {
        let _ = writeln!(out, "\n{} {} ({})", fund.code, fund.name, fund.category);
        let _ = writeln!(
            out,
            "  returns %: 1m {:.2}, 3m {:.2}, 6m {:.2}, 1y {:.2}, 3y {:.2}, ytd {:.2}",
            fund.return_1m, fund.return_3m, fund.return_6m,
            fund.return_1y, fund.return_3y, fund.return_ytd
        );
        let _ = writeln!(
            out,
            "  risk: max drawdown {}, volatility {}, top-10 concentration {}",
            fmt_opt_pct(fund.metrics.max_drawdown_pct),
            fmt_opt_pct(fund.metrics.volatility_pct),
            fmt_opt_pct(fund.metrics.top10_concentration_pct),
        );
        let rating = fund
            .rating
            .map(|r| format!("{r} stars"))
            .unwrap_or_else(|| "unrated".to_string());
        let size = fund
            .net_asset_size
            .map(|s| format!("{:.0}M", s / 1e6))
            .unwrap_or_else(|| "unknown".to_string());
        let _ = writeln!(out, "  rating: {rating}, net assets: {size}");
        if let Some(company) = &fund.company {
            let _ = writeln!(out, "  company: {company}");
        }
    }
    out
}

fn fmt_opt_pct(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}%"),
        None => "n/a".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::TtlConfig;
    use crate::core::model::{FundCategory, RankingEntry};
    use crate::gateway::DataSourceGateway;
    use crate::providers::MarketDataSource;
    use crate::store::CacheStore;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Replies in order, panicking if the script runs dry.
    struct ScriptedOracle {
        replies: Mutex<Vec<String>>,
    }

    impl ScriptedOracle {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
            })
        }
    }

    #[async_trait]
    impl ReasoningOracle for ScriptedOracle {
        async fn complete(&self, _request: OracleRequest) -> Result<String> {
            Ok(self.replies.lock().unwrap().pop().expect("script exhausted"))
        }
    }

    struct RankingStub;

    #[async_trait]
    impl MarketDataSource for RankingStub {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn ranking(&self, category: FundCategory) -> Result<Vec<RankingEntry>> {
            if category != FundCategory::Bond {
                return Ok(Vec::new());
            }
            Ok(vec![RankingEntry {
                fund_code: "000001".to_string(),
                fund_name: "Steady Bond A".to_string(),
                rank: 1,
                return_1m: 0.5,
                return_3m: 1.4,
                return_6m: 2.8,
                return_1y: 5.2,
                return_3y: 16.0,
                return_ytd: 3.1,
            }])
        }
    }

    fn session(oracle: Arc<dyn ReasoningOracle>) -> (TempDir, Session) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(CacheStore::open(dir.path()).unwrap());
        let gateway = DataSourceGateway::with_sources(
            store.clone(),
            Arc::new(RankingStub),
            Arc::new(RankingStub),
            None,
        );
        let service = Arc::new(FundDataService::new(store, gateway, TtlConfig::default()));
        (dir, Session::new(oracle, service))
    }

    const VALID_RECOMMENDATION: &str = "\
[ANALYSIS]A conservative saver with a medium horizon.[/ANALYSIS]\n\
[FUND_EVALUATION]Steady Bond A has a consistent record.[/FUND_EVALUATION]\n\
[RECOMMENDATION]\n[FUND]\ncode: 000001\nname: Steady Bond A\nallocation: 100%\n\
rationale: stable returns\nrisk_warning: bond prices fall when rates rise, principal is not guaranteed\n\
confidence: high\n[/FUND]\n[/RECOMMENDATION]\n\
[DISCLAIMER]Markets carry risk; this is not personalized investment advice.[/DISCLAIMER]";

    #[tokio::test]
    async fn test_full_pipeline_walks_stages_forward() {
        let oracle = ScriptedOracle::new(&[
            "How long will you invest for?",
            "Noted: 50,000 to preserve capital over 3 years, beginner. [PROFILE COMPLETE]",
            "You prefer safety: conservative. [RISK COMPLETE]",
            VALID_RECOMMENDATION,
        ]);
        let (_dir, mut session) = session(oracle);
        assert_eq!(session.stage(), Stage::Requirement);

        session.handle("I want to invest 50,000").await.unwrap();
        assert_eq!(session.stage(), Stage::Requirement);

        session.handle("3 years, preserve capital, beginner").await.unwrap();
        assert_eq!(session.stage(), Stage::Risk);

        let reply = session.handle("I would sell on a 10% drop").await.unwrap();
        assert_eq!(session.stage(), Stage::Complete);
        assert_eq!(session.tier(), Some(RiskTier::Conservative));
        assert!(reply.contains("000001"));
        assert!(reply.contains("Validation score: 100/100"));
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        // three invalid drafts: two regenerations, then acceptance as-is
        let oracle = ScriptedOracle::new(&[
            "Profile noted. [PROFILE COMPLETE]",
            "conservative [RISK COMPLETE]",
            "unstructured draft one",
            "unstructured draft two",
            "unstructured draft three",
        ]);
        let (_dir, mut session) = session(oracle);

        session.handle("50,000, 3 years, preserve, beginner").await.unwrap();
        let reply = session.handle("very cautious").await.unwrap();

        assert_eq!(session.stage(), Stage::Complete);
        assert!(reply.contains("draft three"));
        assert!(reply.contains("Validation score: 0/100"));
    }

    #[tokio::test]
    async fn test_reset_discards_state() {
        let oracle = ScriptedOracle::new(&[
            "Profile noted. [PROFILE COMPLETE]",
            "conservative [RISK COMPLETE]",
            VALID_RECOMMENDATION,
        ]);
        let (_dir, mut session) = session(oracle);
        session.handle("50,000, 3 years, preserve").await.unwrap();
        session.handle("cautious").await.unwrap();
        assert_eq!(session.stage(), Stage::Complete);

        session.reset();
        assert_eq!(session.stage(), Stage::Requirement);
        assert!(session.tier().is_none());
        assert!(session.validation_score().is_none());
    }

    #[tokio::test]
    async fn test_restart_keyword_resets_from_complete() {
        let oracle = ScriptedOracle::new(&[
            "Profile noted. [PROFILE COMPLETE]",
            "conservative [RISK COMPLETE]",
            VALID_RECOMMENDATION,
        ]);
        let (_dir, mut session) = session(oracle);
        session.handle("50,000, preserve, 3 years").await.unwrap();
        session.handle("cautious").await.unwrap();

        let reply = session.handle("restart").await.unwrap();
        assert_eq!(session.stage(), Stage::Requirement);
        assert_eq!(reply, Session::greeting());
    }

    #[test]
    fn test_novice_default_tier_is_capped() {
        let profile = UserProfile {
            amount: Some(50_000.0),
            horizon: Some(Horizon::Long),
            goal: Some(Goal::AggressiveGrowth),
            experience: Some(Experience::Novice),
        };
        assert_eq!(profile.default_tier(), RiskTier::Balanced);
    }

    #[test]
    fn test_context_lists_candidates_with_metrics() {
        let profile = UserProfile::default();
        let candidate = FundCandidate {
            code: "000001".to_string(),
            name: "Steady Bond A".to_string(),
            category: FundCategory::Bond,
            rank: 1,
            return_1m: 0.5,
            return_3m: 1.4,
            return_6m: 2.8,
            return_1y: 5.2,
            return_3y: 16.0,
            return_ytd: 3.1,
            rating: Some(4),
            metrics: Default::default(),
            net_asset_size: Some(3.2e9),
            company: Some("Example Asset Management".to_string()),
            manager: None,
        };
        let context = recommendation_context(&profile, RiskTier::Conservative, &[candidate]);
        assert!(context.contains("000001 Steady Bond A (Bond)"));
        assert!(context.contains("1y 5.20"));
        assert!(context.contains("4 stars"));
        assert!(context.contains("3200M"));
        assert!(context.contains("risk tier: conservative"));
    }
}
