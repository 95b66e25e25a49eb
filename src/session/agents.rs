//! Stage collectors for the requirement and risk phases.
//!
//! Each collector drives one conversational stage: it sends the stage
//! prompt with the running transcript, watches the oracle's reply for the
//! stage completion marker, and extracts structured values with keyword
//! rules so the pipeline never depends on the oracle producing JSON.

use super::oracle::{ChatMessage, OracleRequest, ReasoningOracle, Role};
use super::{Experience, Goal, Horizon, UserProfile};
use crate::core::policy::RiskTier;
use anyhow::Result;
use tracing::debug;

/// Outcome of one collector step: either the stage keeps talking, or it is
/// done and yields its extracted value alongside the reply to display.
pub enum StageReply<T> {
    InProgress { reply: String },
    Complete { value: T, reply: String },
}

pub struct RequirementCollector;

impl RequirementCollector {
    pub const MARKER: &'static str = "[PROFILE COMPLETE]";

    pub fn system_prompt() -> String {
        format!(
            "You are a fund investment advisor gathering an investor profile. \
             Ask about, one topic at a time: investment amount, investment \
             horizon, investment goal, and prior investment experience. Be \
             concise and never recommend funds at this stage. When all four \
             are known, summarize them and end your reply with the exact \
             marker {}.",
            Self::MARKER
        )
    }

    pub async fn step(
        oracle: &dyn ReasoningOracle,
        transcript: &[ChatMessage],
    ) -> Result<StageReply<UserProfile>> {
        let reply = oracle
            .complete(OracleRequest {
                system: Self::system_prompt(),
                messages: transcript.to_vec(),
            })
            .await?;

        if !reply.contains(Self::MARKER) {
            return Ok(StageReply::InProgress { reply });
        }

        // extract from everything the user said plus the oracle's summary
        let mut corpus: String = transcript
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        corpus.push('\n');
        corpus.push_str(&reply);

        let profile = UserProfile {
            amount: extract_amount(&corpus),
            horizon: extract_horizon(&corpus),
            goal: extract_goal(&corpus),
            experience: extract_experience(&corpus),
        };
        debug!("Extracted profile: {profile:?}");
        Ok(StageReply::Complete {
            value: profile,
            reply: strip_marker(&reply, Self::MARKER),
        })
    }
}

pub struct RiskAssessor;

impl RiskAssessor {
    pub const MARKER: &'static str = "[RISK COMPLETE]";

    pub fn system_prompt() -> String {
        format!(
            "You are a fund investment advisor assessing risk tolerance. Ask \
             short questions about reaction to losses, acceptable drawdown and \
             income stability. When confident, state the investor's risk tier \
             as exactly one of: conservative, balanced, growth, aggressive, \
             and end your reply with the exact marker {}.",
            Self::MARKER
        )
    }

    pub async fn step(
        oracle: &dyn ReasoningOracle,
        transcript: &[ChatMessage],
        profile: &UserProfile,
    ) -> Result<StageReply<RiskTier>> {
        let reply = oracle
            .complete(OracleRequest {
                system: Self::system_prompt(),
                messages: transcript.to_vec(),
            })
            .await?;

        if !reply.contains(Self::MARKER) {
            return Ok(StageReply::InProgress { reply });
        }

        let tier = extract_tier(&reply).unwrap_or_else(|| profile.default_tier());
        debug!("Assessed risk tier: {tier}");
        Ok(StageReply::Complete {
            value: tier,
            reply: strip_marker(&reply, Self::MARKER),
        })
    }
}

fn strip_marker(reply: &str, marker: &str) -> String {
    reply.replace(marker, "").trim().to_string()
}

/// First tier name mentioned in the text wins.
pub fn extract_tier(text: &str) -> Option<RiskTier> {
    let lower = text.to_lowercase();
    let mut found: Option<(usize, RiskTier)> = None;
    for tier in RiskTier::ALL {
        if let Some(pos) = lower.find(&tier.to_string()) {
            if found.is_none_or(|(best, _)| pos < best) {
                found = Some((pos, tier));
            }
        }
    }
    found.map(|(_, tier)| tier)
}

/// Parses an investment amount. Accepts plain numbers with separators and
/// the common shorthands: 10k, 1.5m, 20w (ten-thousands).
pub fn extract_amount(text: &str) -> Option<f64> {
    let mut best: Option<f64> = None;
    for raw in text.split_whitespace() {
        let token = raw
            .trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '.')
            .replace(',', "");
        if token.is_empty() {
            continue;
        }
        let (digits, multiplier) = match token.chars().last() {
            Some('k') | Some('K') => (&token[..token.len() - 1], 1e3),
            Some('w') | Some('W') => (&token[..token.len() - 1], 1e4),
            Some('m') | Some('M') => (&token[..token.len() - 1], 1e6),
            _ => (token.as_str(), 1.0),
        };
        if let Ok(value) = digits.parse::<f64>() {
            let amount = value * multiplier;
            // years and percentages are small; real amounts are not
            if amount >= 100.0 && best.is_none_or(|b| amount > b) {
                best = Some(amount);
            }
        }
    }
    best
}

pub fn extract_horizon(text: &str) -> Option<Horizon> {
    let lower = text.to_lowercase();
    if lower.contains("short")
        || lower.contains("less than a year")
        || lower.contains("few months")
    {
        Some(Horizon::Short)
    } else if lower.contains("long")
        || lower.contains("5 years")
        || lower.contains("five years")
        || lower.contains("decade")
        || lower.contains("retirement")
    {
        Some(Horizon::Long)
    } else if lower.contains("medium")
        || lower.contains("1-3 year")
        || lower.contains("2 year")
        || lower.contains("3 year")
        || lower.contains("year")
    {
        Some(Horizon::Medium)
    } else {
        None
    }
}

pub fn extract_goal(text: &str) -> Option<Goal> {
    let lower = text.to_lowercase();
    if lower.contains("preserve") || lower.contains("protect") || lower.contains("safe") {
        Some(Goal::Preservation)
    } else if lower.contains("income") || lower.contains("steady") || lower.contains("dividend") {
        Some(Goal::Income)
    } else if lower.contains("maximize") || lower.contains("aggressive") {
        Some(Goal::AggressiveGrowth)
    } else if lower.contains("grow") || lower.contains("appreciat") {
        Some(Goal::Growth)
    } else {
        None
    }
}

pub fn extract_experience(text: &str) -> Option<Experience> {
    let lower = text.to_lowercase();
    if lower.contains("beginner")
        || lower.contains("first time")
        || lower.contains("no experience")
        || lower.contains("never invested")
    {
        Some(Experience::Novice)
    } else if lower.contains("experienced")
        || lower.contains("professional")
        || lower.contains("many years")
    {
        Some(Experience::Experienced)
    } else if lower.contains("some experience") || lower.contains("a few years") {
        Some(Experience::Intermediate)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_amount_variants() {
        assert_eq!(extract_amount("I can invest 50,000 yuan."), Some(50_000.0));
        assert_eq!(extract_amount("around 10k to start"), Some(10_000.0));
        assert_eq!(extract_amount("about 20w"), Some(200_000.0));
        assert_eq!(extract_amount("1.5m over time"), Some(1_500_000.0));
        // horizon years must not be mistaken for an amount
        assert_eq!(extract_amount("maybe 3 years"), None);
    }

    #[test]
    fn test_extract_horizon_keywords() {
        assert_eq!(extract_horizon("short term only"), Some(Horizon::Short));
        assert_eq!(extract_horizon("saving for retirement"), Some(Horizon::Long));
        assert_eq!(extract_horizon("about 2 years"), Some(Horizon::Medium));
        assert_eq!(extract_horizon("not sure"), None);
    }

    #[test]
    fn test_extract_goal_keywords() {
        assert_eq!(extract_goal("I want to preserve capital"), Some(Goal::Preservation));
        assert_eq!(extract_goal("steady income please"), Some(Goal::Income));
        assert_eq!(extract_goal("grow my savings"), Some(Goal::Growth));
        assert_eq!(extract_goal("maximize returns"), Some(Goal::AggressiveGrowth));
    }

    #[test]
    fn test_extract_tier_first_mention_wins() {
        assert_eq!(
            extract_tier("Between balanced and growth, balanced fits best."),
            Some(RiskTier::Balanced)
        );
        assert_eq!(extract_tier("no tier named"), None);
    }

    #[test]
    fn test_marker_is_stripped_from_reply() {
        let cleaned = strip_marker("Your profile is set. [PROFILE COMPLETE]", "[PROFILE COMPLETE]");
        assert_eq!(cleaned, "Your profile is set.");
    }
}
