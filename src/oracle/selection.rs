//! Ranking and selection.
//!
//! Selection never writes to the dedup store. The caller marks what it actually
//! delivered, so a preview or an unsent batch leaves no trace.

use crate::config::ScreeningConfig;
use crate::oracle::scorer::CompositeScorer;
use crate::oracle::types::{ScoreBreakdown, ScoringContext};
use crate::state::{DedupKey, EventCategory, NotificationState};
use crate::types::{Candidate, RiskLevel};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

/// One surfaced candidate, handed to the notification channel.
#[derive(Debug, Clone, Serialize)]
pub struct Selected {
    pub candidate: Candidate,
    #[serde(serialize_with = "serialize_key")]
    pub key: DedupKey,
    pub total_score: f64,
    pub breakdown: ScoreBreakdown,
}

fn serialize_key<S: serde::Serializer>(key: &DedupKey, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(key.as_str())
}

/// Drop candidates below the liquidity or volume floor before scoring.
pub fn prefilter(candidates: Vec<Candidate>, screening: &ScreeningConfig) -> Vec<Candidate> {
    let before = candidates.len();
    let kept: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| {
            let ok = c.liquidity_usd >= screening.min_liquidity_usd
                && c.volume_24h_usd >= screening.min_volume_24h_usd;
            if !ok {
                debug!(
                    "Prefilter dropped {} (liquidity={}, volume={})",
                    c.label(),
                    c.liquidity_usd,
                    c.volume_24h_usd
                );
            }
            ok
        })
        .collect();
    debug!("Prefilter kept {}/{} candidates", kept.len(), before);
    kept
}

/// Drop candidates whose safety report says danger.
pub fn exclude_dangerous(candidates: Vec<Candidate>, context: &ScoringContext) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|c| {
            let danger = context
                .safety_for(c.identity())
                .is_some_and(|r| r.risk_level == RiskLevel::Danger);
            if danger {
                info!("Excluding {} (safety: danger)", c.label());
            }
            !danger
        })
        .collect()
}

/// Score every candidate and sort by total, highest first. Ties keep input order.
pub fn rank(
    scorer: &CompositeScorer,
    candidates: Vec<Candidate>,
    context: &ScoringContext,
    now: DateTime<Utc>,
) -> Vec<Candidate> {
    let mut ranked: Vec<Candidate> = candidates
        .into_iter()
        .map(|mut c| {
            let address = c.token_address.clone();
            scorer.score_at(
                &mut c,
                context.safety_for(&address),
                context.smart_money_for(&address),
                now,
            );
            c
        })
        .collect();
    ranked.sort_by(|a, b| b.total_score.total_cmp(&a.total_score));
    ranked
}

pub async fn select_top(
    scorer: &CompositeScorer,
    candidates: Vec<Candidate>,
    n: usize,
    state: &NotificationState,
    context: &ScoringContext,
    category: EventCategory,
) -> Vec<Selected> {
    select_top_at(scorer, candidates, n, state, context, category, Utc::now()).await
}

/// Rank, drop anything already notified in `category`, keep the first `n`.
#[instrument(skip_all, fields(category = %category, n = n))]
pub async fn select_top_at(
    scorer: &CompositeScorer,
    candidates: Vec<Candidate>,
    n: usize,
    state: &NotificationState,
    context: &ScoringContext,
    category: EventCategory,
    now: DateTime<Utc>,
) -> Vec<Selected> {
    let ranked = rank(scorer, candidates, context, now);
    let mut selected = Vec::with_capacity(n.min(ranked.len()));

    for candidate in ranked {
        if selected.len() >= n {
            break;
        }
        let key = DedupKey::for_candidate(category, &candidate);
        if state.is_notified_at(&key, now).await {
            debug!("Skipping {} ({} already notified)", candidate.label(), key);
            continue;
        }
        let breakdown = candidate.scores.clone().unwrap_or_default();
        selected.push(Selected {
            total_score: candidate.total_score,
            key,
            breakdown,
            candidate,
        });
    }

    debug!("Selected {} {} candidates", selected.len(), category);
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn candidate(address: &str, liquidity: f64) -> Candidate {
        let mut c = Candidate::new(address, address.to_uppercase());
        c.liquidity_usd = liquidity;
        c.volume_24h_usd = 5_000.0;
        c
    }

    #[test]
    fn test_prefilter_floors() {
        let screening = ScreeningConfig::default();
        let mut thin = candidate("thin", 50_000.0);
        thin.volume_24h_usd = 100.0;
        let kept = prefilter(
            vec![candidate("a", 999.0), candidate("b", 1_000.0), thin],
            &screening,
        );
        let ids: Vec<&str> = kept.iter().map(|c| c.identity()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn test_rank_is_stable_on_ties() {
        let now = Utc::now();
        let scorer = CompositeScorer::default();
        let ranked = rank(
            &scorer,
            vec![candidate("first", 5_000.0), candidate("second", 5_000.0), candidate("top", 90_000.0)],
            &ScoringContext::new(),
            now,
        );
        let ids: Vec<&str> = ranked.iter().map(|c| c.identity()).collect();
        assert_eq!(ids, vec!["top", "first", "second"]);
    }

    #[tokio::test]
    async fn test_select_skips_notified_and_truncates() {
        let now = Utc::now();
        let scorer = CompositeScorer::default();
        let state = NotificationState::in_memory(24, 100).await;
        state.mark_notified_at("best", "BEST", 90.0, now - Duration::hours(1)).await;

        let selected = select_top_at(
            &scorer,
            vec![
                candidate("low", 2_000.0),
                candidate("best", 100_000.0),
                candidate("mid", 20_000.0),
                candidate("high", 60_000.0),
            ],
            2,
            &state,
            &ScoringContext::new(),
            EventCategory::Token,
            now,
        )
        .await;

        let ids: Vec<&str> = selected.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid"]);
        assert_eq!(selected[0].total_score, selected[0].breakdown.total);
        // selection does not mark
        assert!(!state.is_notified_at("high", now).await);
    }

    #[tokio::test]
    async fn test_select_zero_is_empty() {
        let state = NotificationState::in_memory(24, 100).await;
        let selected = select_top_at(
            &CompositeScorer::default(),
            vec![candidate("a", 5_000.0)],
            0,
            &state,
            &ScoringContext::new(),
            EventCategory::Token,
            Utc::now(),
        )
        .await;
        assert!(selected.is_empty());
    }

    #[test]
    fn test_exclude_dangerous() {
        let context = ScoringContext::new().with_safety(
            "rug",
            crate::types::SafetyReport {
                risk_level: RiskLevel::Danger,
                ..Default::default()
            },
        );
        let kept = exclude_dangerous(vec![candidate("rug", 5_000.0), candidate("ok", 5_000.0)], &context);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].identity(), "ok");
    }
}
