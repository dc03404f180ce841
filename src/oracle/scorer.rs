//! Composite scorer - combines component scores and adjustments into a final score.
//!
//! The weighted sum of the component mappers is the base signal. Safety,
//! graduation, smart money and trust-combo adjustments are added on top and the
//! result is clamped to [0, 100].

use crate::config::{ConfigError, ScreenerConfig};
use crate::oracle::features::{
    age_score, log_score_in, price_change_score, safety_score, sanitize_metric,
    sanitize_signed_metric, social_score,
};
use crate::oracle::types::{
    Adjustments, Component, ComponentScores, ScoreBreakdown, ScoreThresholds, SocialPoints,
};
use crate::oracle::weights::Weights;
use crate::types::{Candidate, RiskLevel, SafetyReport, SmartMoneyReport, SocialLinks};
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

pub const DANGER_PENALTY: f64 = -25.0;
pub const WARNING_PENALTY: f64 = -10.0;
pub const SAFE_BONUS: f64 = 5.0;
pub const RUGCHECK_HIGH_BONUS: f64 = 3.0;
pub const RUGCHECK_LOW_PENALTY: f64 = -10.0;
pub const GRADUATION_BONUS: f64 = 10.0;
pub const WHALE_BONUS: f64 = 5.0;

/// Composite scorer. Holds everything it needs; no process-wide state.
#[derive(Debug, Clone)]
pub struct CompositeScorer {
    weights: Weights,
    thresholds: ScoreThresholds,
    social_points: SocialPoints,
}

impl Default for CompositeScorer {
    fn default() -> Self {
        Self::new(Weights::default(), ScoreThresholds::default(), SocialPoints::default())
    }
}

impl CompositeScorer {
    pub fn new(weights: Weights, thresholds: ScoreThresholds, social_points: SocialPoints) -> Self {
        Self {
            weights,
            thresholds,
            social_points,
        }
    }

    /// Validate the configuration and build a scorer from it.
    pub fn from_config(config: &ScreenerConfig) -> Result<Self, ConfigError> {
        let weights = config.validate()?;
        Ok(Self::new(
            weights,
            config.thresholds.clone(),
            config.social_points.clone(),
        ))
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    pub fn thresholds(&self) -> &ScoreThresholds {
        &self.thresholds
    }

    /// Score a candidate against the current time.
    ///
    /// The breakdown and total are stored on the candidate; the total is also
    /// returned. Missing reports mean "no adjustment".
    pub fn score(
        &self,
        candidate: &mut Candidate,
        safety: Option<&SafetyReport>,
        smart_money: Option<&SmartMoneyReport>,
    ) -> f64 {
        self.score_at(candidate, safety, smart_money, Utc::now())
    }

    /// [`score`](Self::score) with an explicit "now".
    #[instrument(skip_all, fields(token = %candidate.token_address))]
    pub fn score_at(
        &self,
        candidate: &mut Candidate,
        safety: Option<&SafetyReport>,
        smart_money: Option<&SmartMoneyReport>,
        now: DateTime<Utc>,
    ) -> f64 {
        let components = self.compute_components(candidate, safety, now);
        let weighted = self.weights.weighted_sum(&components);
        let adjustments = self.adjustments(candidate, safety, smart_money);

        let raw = weighted + adjustments.total();
        let total = if raw.is_finite() {
            (raw.clamp(0.0, 100.0) * 10.0).round() / 10.0
        } else {
            0.0
        };

        let reason = generate_reason(&self.weights, &components, &adjustments, total);
        debug!(
            "Scored {}: weighted={:.2} adjustments={:.1} total={}",
            candidate.label(),
            weighted,
            adjustments.total(),
            total
        );

        candidate.scores = Some(ScoreBreakdown {
            components,
            weighted,
            adjustments,
            total,
            reason,
        });
        candidate.total_score = total;
        total
    }

    /// Run every component mapper. Malformed metrics are coerced to zero first.
    pub fn compute_components(
        &self,
        candidate: &Candidate,
        safety: Option<&SafetyReport>,
        now: DateTime<Utc>,
    ) -> ComponentScores {
        let t = &self.thresholds;
        let mut scores = ComponentScores::new();

        let liquidity = sanitize_metric("liquidity_usd", candidate.liquidity_usd);
        let volume = sanitize_metric("volume_24h_usd", candidate.volume_24h_usd);
        let price_change = sanitize_signed_metric("price_change_24h", candidate.price_change_24h);
        let tx_count = sanitize_metric("tx_count_24h", candidate.tx_count_24h);
        let makers = sanitize_metric("makers_24h", candidate.makers_24h);

        scores.set(Component::Liquidity, log_score_in(liquidity, t.liquidity));
        scores.set(Component::Volume, log_score_in(volume, t.volume));
        scores.set(Component::PriceChange, price_change_score(price_change));
        scores.set(Component::TxCount, log_score_in(tx_count, t.tx_count));
        scores.set(Component::Makers, log_score_in(makers, t.makers));
        scores.set(
            Component::Social,
            social_score(candidate.social_links(), &self.social_points),
        );
        scores.set(Component::SafetyData, safety_score(safety, t));
        scores.set(Component::Age, age_score(candidate.created_at, now));

        for (component, value) in scores.iter() {
            debug!("  {} = {:.1}", component.as_str(), value);
        }
        scores
    }

    /// Additive adjustments, independent of the weighted sum.
    pub fn adjustments(
        &self,
        candidate: &Candidate,
        safety: Option<&SafetyReport>,
        smart_money: Option<&SmartMoneyReport>,
    ) -> Adjustments {
        Adjustments {
            safety: safety_adjustment(safety, &self.thresholds),
            graduation: graduation_bonus(candidate),
            smart_money: smart_money_adjustment(smart_money, &self.thresholds),
            trust_combo: trust_combo_bonus(candidate.social_links(), safety, &self.thresholds),
        }
    }
}

/// Risk verdict adjustment plus the external reputation score.
pub fn safety_adjustment(safety: Option<&SafetyReport>, thresholds: &ScoreThresholds) -> f64 {
    let Some(report) = safety else {
        return 0.0;
    };

    let mut adj = match report.risk_level {
        RiskLevel::Danger => DANGER_PENALTY,
        RiskLevel::Warning => WARNING_PENALTY,
        RiskLevel::Safe => SAFE_BONUS,
        RiskLevel::Unknown => 0.0,
    };

    match report.rugcheck_score {
        Some(rc) if rc >= thresholds.rugcheck_high => adj += RUGCHECK_HIGH_BONUS,
        Some(rc) if rc <= thresholds.rugcheck_low => adj += RUGCHECK_LOW_PENALTY,
        _ => {}
    }
    adj
}

pub fn graduation_bonus(candidate: &Candidate) -> f64 {
    if candidate.is_graduated {
        GRADUATION_BONUS
    } else {
        0.0
    }
}

/// Tiered smart money bonus plus a whale bonus.
pub fn smart_money_adjustment(
    smart_money: Option<&SmartMoneyReport>,
    thresholds: &ScoreThresholds,
) -> f64 {
    let Some(report) = smart_money else {
        return 0.0;
    };

    let score = report.smart_money_score;
    let mut adj = if score >= 80.0 {
        15.0
    } else if score >= 50.0 {
        8.0
    } else if score >= 20.0 {
        3.0
    } else {
        0.0
    };

    if report.whale_count >= thresholds.whale_bonus_count {
        adj += WHALE_BONUS;
    }
    adj
}

/// Number of independent trust signals that hold.
pub fn trust_signal_count(
    links: SocialLinks,
    safety: Option<&SafetyReport>,
    thresholds: &ScoreThresholds,
) -> usize {
    let mut signals = [links.twitter, links.website, links.discord, false, false, false];
    if let Some(report) = safety {
        signals[3] = report
            .lp_locked_pct
            .is_some_and(|pct| pct >= thresholds.lp_locked_trust_pct);
        signals[4] = report.mint_authority.is_renounced();
        signals[5] = report
            .top_holders_pct
            .is_some_and(|pct| pct < thresholds.holders_low_pct);
    }
    signals.iter().filter(|s| **s).count()
}

/// Bonus for correlated trust signals.
pub fn trust_combo_bonus(
    links: SocialLinks,
    safety: Option<&SafetyReport>,
    thresholds: &ScoreThresholds,
) -> f64 {
    match trust_signal_count(links, safety, thresholds) {
        n if n >= 5 => 8.0,
        4 => 5.0,
        3 => 3.0,
        _ => 0.0,
    }
}

/// Short explanation: strongest and weakest weighted components plus applied adjustments.
pub fn generate_reason(
    weights: &Weights,
    components: &ComponentScores,
    adjustments: &Adjustments,
    total: f64,
) -> String {
    let mut impacts: Vec<(Component, f64, f64)> = components
        .iter()
        .filter(|(c, _)| weights.get(*c) > 0.0)
        .map(|(c, score)| (c, score, score * weights.get(c)))
        .collect();
    impacts.sort_by(|a, b| b.2.total_cmp(&a.2));

    let mut reasons = Vec::new();
    for (component, score, _) in impacts.iter().take(3) {
        if *score >= 70.0 {
            reasons.push(format!("strong {}", component.as_str().replace('_', " ")));
        }
    }
    for (component, score, _) in impacts.iter().rev().take(2) {
        if *score < 30.0 {
            reasons.push(format!("weak {}", component.as_str().replace('_', " ")));
        }
    }

    for (label, value) in [
        ("safety", adjustments.safety),
        ("graduated", adjustments.graduation),
        ("smart money", adjustments.smart_money),
        ("trust combo", adjustments.trust_combo),
    ] {
        if value != 0.0 {
            reasons.push(format!("{} {:+}", label, value));
        }
    }

    if reasons.is_empty() {
        format!("Moderate score of {:.1}/100 based on balanced factors", total)
    } else {
        format!("Score {:.1}/100: {}", total, reasons.join(", "))
    }
}
