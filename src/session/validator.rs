//! Rule-based validation of generated recommendations.
//!
//! The oracle's output is expected in tagged sections; five weighted rules
//! score it against the structural contract and the risk tier policy. A
//! failing score triggers a bounded regeneration loop that always terminates
//! with an answer, annotated with the score it earned.

use crate::core::model::FundCategory;
use crate::core::policy::RiskTier;
use crate::screening::FundCandidate;
use std::collections::HashMap;
use std::fmt::Write as _;
use tracing::debug;

pub const PASSING_SCORE: u32 = 60;
pub const MAX_RETRIES: u32 = 2;

/// Minimal substance thresholds, in characters.
const MIN_WARNING_LEN: usize = 10;
const MIN_DISCLAIMER_LEN: usize = 20;

const ALLOCATION_TOLERANCE: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Structure,
    AllocationSum,
    RiskWarnings,
    TierCompliance,
    Disclaimer,
}

impl Dimension {
    pub fn weight(self) -> u32 {
        match self {
            Dimension::Structure => 20,
            Dimension::AllocationSum => 25,
            Dimension::RiskWarnings => 20,
            Dimension::TierCompliance => 25,
            Dimension::Disclaimer => 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Finding {
    pub dimension: Dimension,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub score: u32,
    pub findings: Vec<Finding>,
}

impl ValidationResult {
    pub fn passed(&self) -> bool {
        self.score >= PASSING_SCORE
    }

    /// Dimension-level feedback for a regeneration round, naming only what
    /// failed.
    pub fn feedback(&self) -> String {
        let mut out = String::from(
            "The previous answer failed validation. Fix the following and keep everything else:\n",
        );
        for finding in self.findings.iter().filter(|f| !f.passed) {
            let _ = writeln!(out, "- {}", finding.detail);
        }
        out
    }
}

/// One recommended fund parsed out of the tagged output.
#[derive(Debug, Clone)]
pub struct RecommendedFund {
    pub code: String,
    pub name: String,
    pub allocation_pct: Option<f64>,
    pub risk_warning: String,
}

pub struct RecommendationValidator;

impl RecommendationValidator {
    pub fn validate(
        text: &str,
        tier: RiskTier,
        candidates: &[FundCandidate],
    ) -> ValidationResult {
        let funds = parse_funds(text);
        let mut findings = Vec::with_capacity(5);

        findings.push(check_structure(text, &funds));
        findings.push(check_allocation(&funds));
        findings.push(check_warnings(&funds));
        findings.push(check_tier(&funds, tier, candidates));
        findings.push(check_disclaimer(text));

        let score = findings
            .iter()
            .filter(|f| f.passed)
            .map(|f| f.dimension.weight())
            .sum();
        debug!("Validation score {score}");
        ValidationResult { score, findings }
    }
}

fn check_structure(text: &str, funds: &[RecommendedFund]) -> Finding {
    let missing: Vec<&str> = ["ANALYSIS", "FUND_EVALUATION", "RECOMMENDATION", "DISCLAIMER"]
        .into_iter()
        .filter(|tag| section(text, tag).is_none())
        .collect();
    if !missing.is_empty() {
        return Finding {
            dimension: Dimension::Structure,
            passed: false,
            detail: format!("Missing sections: {}", missing.join(", ")),
        };
    }
    if funds.is_empty() {
        return Finding {
            dimension: Dimension::Structure,
            passed: false,
            detail: "The recommendation section contains no fund blocks".to_string(),
        };
    }
    Finding {
        dimension: Dimension::Structure,
        passed: true,
        detail: "All sections present".to_string(),
    }
}

fn check_allocation(funds: &[RecommendedFund]) -> Finding {
    let sum: f64 = funds.iter().filter_map(|f| f.allocation_pct).sum();
    let passed = !funds.is_empty() && (sum - 100.0).abs() <= ALLOCATION_TOLERANCE;
    Finding {
        dimension: Dimension::AllocationSum,
        passed,
        detail: if passed {
            format!("Allocations sum to {sum:.1}%")
        } else {
            format!("Allocations sum to {sum:.1}%, must total 100%")
        },
    }
}

fn check_warnings(funds: &[RecommendedFund]) -> Finding {
    let lacking: Vec<&str> = funds
        .iter()
        .filter(|f| f.risk_warning.trim().len() < MIN_WARNING_LEN)
        .map(|f| f.code.as_str())
        .collect();
    let passed = !funds.is_empty() && lacking.is_empty();
    Finding {
        dimension: Dimension::RiskWarnings,
        passed,
        detail: if passed {
            "Every fund carries a risk warning".to_string()
        } else {
            format!(
                "Funds without a substantive risk_warning: {}",
                if lacking.is_empty() { "all".to_string() } else { lacking.join(", ") }
            )
        },
    }
}

fn check_tier(funds: &[RecommendedFund], tier: RiskTier, candidates: &[FundCandidate]) -> Finding {
    let categories: HashMap<&str, FundCategory> = candidates
        .iter()
        .map(|c| (c.code.as_str(), c.category))
        .collect();

    let mut violations = Vec::new();
    let mut has_equity = false;
    for fund in funds {
        match categories.get(fund.code.as_str()) {
            Some(category) => {
                if !tier.allows(*category) {
                    violations.push(format!("{} is {category}, outside {tier}", fund.code));
                }
                if matches!(category, FundCategory::Equity | FundCategory::Index) {
                    has_equity = true;
                }
            }
            None => violations.push(format!("{} was not among the screened funds", fund.code)),
        }
    }
    if tier == RiskTier::Aggressive && !funds.is_empty() && !has_equity {
        violations.push("An aggressive portfolio must include at least one equity or index fund".to_string());
    }

    let passed = !funds.is_empty() && violations.is_empty();
    Finding {
        dimension: Dimension::TierCompliance,
        passed,
        detail: if passed {
            format!("All funds comply with the {tier} tier")
        } else {
            violations.join("; ")
        },
    }
}

fn check_disclaimer(text: &str) -> Finding {
    let passed = section(text, "DISCLAIMER")
        .is_some_and(|s| s.trim().len() >= MIN_DISCLAIMER_LEN);
    Finding {
        dimension: Dimension::Disclaimer,
        passed,
        detail: if passed {
            "Disclaimer present".to_string()
        } else {
            "The disclaimer section is missing or trivial".to_string()
        },
    }
}

/// Extracts the body between `[TAG]` and `[/TAG]`.
pub fn section<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("[{tag}]");
    let close = format!("[/{tag}]");
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(&text[start..end])
}

fn field(block: &str, key: &str) -> Option<String> {
    block.lines().find_map(|line| {
        let (k, v) = line.split_once(':')?;
        (k.trim().eq_ignore_ascii_case(key)).then(|| v.trim().to_string())
    })
}

/// Parses the fund blocks of the recommendation section.
pub fn parse_funds(text: &str) -> Vec<RecommendedFund> {
    let Some(recommendation) = section(text, "RECOMMENDATION") else {
        return Vec::new();
    };
    let mut funds = Vec::new();
    let mut rest = recommendation;
    while let Some(block) = section(rest, "FUND") {
        funds.push(RecommendedFund {
            code: field(block, "code").unwrap_or_default(),
            name: field(block, "name").unwrap_or_default(),
            allocation_pct: field(block, "allocation")
                .and_then(|v| v.trim_end_matches('%').trim().parse().ok()),
            risk_warning: field(block, "risk_warning").unwrap_or_default(),
        });
        let consumed = rest.find("[/FUND]").map(|i| i + "[/FUND]".len());
        match consumed {
            Some(i) => rest = &rest[i..],
            None => break,
        }
    }
    funds
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReviewVerdict {
    /// The answer scored at or above the bar, or the retry budget ran out.
    Accepted { text: String, score: u32 },
    /// Regenerate with this feedback appended to the request.
    Retry { feedback: String },
}

/// Bounded regeneration loop state. At most [`MAX_RETRIES`] regenerations;
/// the final attempt is accepted at whatever score it earned.
#[derive(Default)]
pub struct ReviewLoop {
    attempts: u32,
}

impl ReviewLoop {
    pub fn record(&mut self, text: &str, result: &ValidationResult) -> ReviewVerdict {
        if result.passed() || self.attempts >= MAX_RETRIES {
            return ReviewVerdict::Accepted {
                text: text.to_string(),
                score: result.score,
            };
        }
        self.attempts += 1;
        ReviewVerdict::Retry {
            feedback: result.feedback(),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
